//! Nginx-style config file parser.
//!
//! A config is a sequence of statements; each statement is one or more
//! whitespace-separated tokens terminated by `;` or followed by a nested
//! `{ ... }` block. `#` starts a comment running to end of line. Parsing
//! is driven by a token-transition table: every token kind is only legal
//! after certain predecessors, and any other pairing is a parse error
//! reported as the offending transition.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// One parsed config statement: its tokens in source order, plus an
/// optional nested block.
///
/// Tokens that came from a quoted literal keep their surrounding quotes;
/// bare words do not.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Statement {
    pub tokens: Vec<String>,
    pub block: Option<Config>,
}

/// A parsed config: an ordered list of statements. The root of the tree
/// and every nested block are both `Config`s.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    pub statements: Vec<Statement>,
}

/// Token kinds tracked by the parser's transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Start,
    Normal,
    StartBlock,
    EndBlock,
    Comment,
    StatementEnd,
    QuotedString,
    Eof,
    Error,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Start => "START",
            TokenKind::Normal => "NORMAL",
            TokenKind::StartBlock => "START_BLOCK",
            TokenKind::EndBlock => "END_BLOCK",
            TokenKind::Comment => "COMMENT",
            TokenKind::StatementEnd => "STATEMENT_END",
            TokenKind::QuotedString => "QUOTED_STRING",
            TokenKind::Eof => "EOF",
            TokenKind::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Why a config failed to parse.
#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be opened or read.
    Io(io::Error),
    /// The token stream took an illegal transition (this also covers
    /// unterminated quotes and unbalanced braces, which surface as a
    /// transition into `ERROR` or an early `EOF`).
    BadTransition { from: TokenKind, to: TokenKind },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "failed to read config file: {err}"),
            ConfigError::BadTransition { from, to } => {
                write!(f, "config parse error: bad transition from {from} to {to}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::Io(err)
    }
}

const DELIMITERS: [char; 7] = [' ', '\t', '\r', '\n', ';', '{', '}'];

struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

#[derive(Clone, Copy)]
enum LexState {
    InitialWhitespace,
    SingleQuote,
    DoubleQuote,
    Comment,
    Normal,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Tokenizer { input, pos: 0 }
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.input[self.pos..].chars().next()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    /// Produce the next token. The token value for quoted strings includes
    /// the surrounding quotes and any backslash escapes verbatim.
    fn next_token(&mut self) -> (TokenKind, String) {
        let mut state = LexState::InitialWhitespace;
        let mut value = String::new();

        while let Some(c) = self.next_char() {
            match state {
                LexState::InitialWhitespace => match c {
                    '{' => return (TokenKind::StartBlock, "{".to_string()),
                    '}' => return (TokenKind::EndBlock, "}".to_string()),
                    ';' => return (TokenKind::StatementEnd, ";".to_string()),
                    '#' => state = LexState::Comment,
                    '"' => {
                        value.push('"');
                        state = LexState::DoubleQuote;
                    }
                    '\'' => {
                        value.push('\'');
                        state = LexState::SingleQuote;
                    }
                    ' ' | '\t' | '\r' | '\n' => {}
                    other => {
                        value.push(other);
                        state = LexState::Normal;
                    }
                },
                LexState::SingleQuote | LexState::DoubleQuote => {
                    value.push(c);
                    if c == '\\' {
                        // Backslash escapes the next character verbatim.
                        if let Some(escaped) = self.next_char() {
                            value.push(escaped);
                        }
                        continue;
                    }
                    let closing = match state {
                        LexState::SingleQuote => '\'',
                        _ => '"',
                    };
                    if c == closing {
                        // The closing quote must be followed by a delimiter
                        // or end of input.
                        match self.peek_char() {
                            Some(next) if !DELIMITERS.contains(&next) => {
                                return (TokenKind::Error, value);
                            }
                            _ => return (TokenKind::QuotedString, value),
                        }
                    }
                }
                LexState::Comment => {
                    if c == '\n' || c == '\r' {
                        return (TokenKind::Comment, value);
                    }
                }
                LexState::Normal => {
                    if DELIMITERS.contains(&c) {
                        self.pos -= c.len_utf8();
                        return (TokenKind::Normal, value);
                    }
                    value.push(c);
                }
            }
        }

        match state {
            // An unterminated quote is a lexer error.
            LexState::SingleQuote | LexState::DoubleQuote => (TokenKind::Error, value),
            // A comment may be terminated by end of input.
            LexState::Comment => (TokenKind::Comment, value),
            LexState::Normal => (TokenKind::Normal, value),
            LexState::InitialWhitespace => (TokenKind::Eof, value),
        }
    }
}

impl Config {
    /// Parse config text into a statement tree.
    pub fn parse(input: &str) -> Result<Config, ConfigError> {
        let mut tokenizer = Tokenizer::new(input);
        // The root block sits at the bottom of the stack; `{` pushes a new
        // block and `}` pops it back onto its parent statement.
        let mut stack: Vec<Config> = vec![Config::default()];
        let mut last = TokenKind::Start;

        loop {
            let (kind, token) = tokenizer.next_token();
            match kind {
                TokenKind::Comment => continue,
                TokenKind::Error => return Err(bad_transition(last, kind)),
                TokenKind::Normal | TokenKind::QuotedString => {
                    match last {
                        TokenKind::Start
                        | TokenKind::StatementEnd
                        | TokenKind::StartBlock
                        | TokenKind::EndBlock
                        | TokenKind::Normal
                        | TokenKind::QuotedString => {
                            let top = stack.last_mut().expect("root block always present");
                            if last != TokenKind::Normal && last != TokenKind::QuotedString {
                                top.statements.push(Statement::default());
                            }
                            top.statements
                                .last_mut()
                                .expect("statement opened above")
                                .tokens
                                .push(token);
                        }
                        _ => return Err(bad_transition(last, kind)),
                    }
                }
                TokenKind::StatementEnd => {
                    if last != TokenKind::Normal && last != TokenKind::QuotedString {
                        return Err(bad_transition(last, kind));
                    }
                }
                TokenKind::StartBlock => {
                    // A block needs a statement head before it.
                    if last != TokenKind::Normal && last != TokenKind::QuotedString {
                        return Err(bad_transition(last, kind));
                    }
                    stack.push(Config::default());
                }
                TokenKind::EndBlock => {
                    // A block may only close after a complete statement,
                    // another block, or immediately (empty block).
                    if last != TokenKind::StatementEnd
                        && last != TokenKind::EndBlock
                        && last != TokenKind::StartBlock
                    {
                        return Err(bad_transition(last, kind));
                    }
                    if stack.len() == 1 {
                        // More closing braces than opening ones.
                        return Err(bad_transition(last, kind));
                    }
                    let block = stack.pop().expect("checked depth above");
                    stack
                        .last_mut()
                        .expect("parent block present")
                        .statements
                        .last_mut()
                        .expect("block always follows a statement head")
                        .block = Some(block);
                }
                TokenKind::Eof => {
                    if last != TokenKind::Start
                        && last != TokenKind::StatementEnd
                        && last != TokenKind::EndBlock
                    {
                        return Err(bad_transition(last, kind));
                    }
                    if stack.len() != 1 {
                        return Err(bad_transition(last, kind));
                    }
                    return Ok(stack.pop().expect("root block"));
                }
                TokenKind::Start => return Err(bad_transition(last, kind)),
            }
            last = kind;
        }
    }

    /// Parse a config file from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let text = fs::read_to_string(path)?;
        Config::parse(&text)
    }

    /// The value of the first top-level `port <value>;` directive, if any.
    pub fn port(&self) -> Option<&str> {
        self.statements
            .iter()
            .find(|s| s.tokens.len() == 2 && s.tokens[0] == "port")
            .map(|s| s.tokens[1].as_str())
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        for statement in &self.statements {
            statement.write_indented(f, depth)?;
        }
        Ok(())
    }
}

impl Statement {
    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        for _ in 0..depth {
            f.write_str("  ")?;
        }
        for (i, token) in self.tokens.iter().enumerate() {
            if i != 0 {
                f.write_str(" ")?;
            }
            f.write_str(token)?;
        }
        match &self.block {
            Some(block) => {
                f.write_str(" {\n")?;
                block.write_indented(f, depth + 1)?;
                for _ in 0..depth {
                    f.write_str("  ")?;
                }
                f.write_str("}")?;
            }
            None => f.write_str(";")?,
        }
        f.write_str("\n")
    }
}

/// Canonical serialization: two-space indent per depth, one statement per
/// line. Parsing the output yields a structurally equal tree.
impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

fn bad_transition(from: TokenKind, to: TokenKind) -> ConfigError {
    ConfigError::BadTransition { from, to }
}
