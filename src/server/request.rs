//! HTTP/1.x request type and the incremental wire parser used by sessions.
//!
//! The reader accepts both CRLF and bare LF line endings and honors
//! `Content-Length` for bodies. Anything it cannot make sense of surfaces
//! as [`RequestError::Malformed`], which the session answers with a 400.

use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, Version};
use std::fmt;
use std::io::{self, Read};

/// Maximum accepted size of a request head (request line + headers).
const MAX_HEAD_BYTES: usize = 64 * 1024;

/// A parsed HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Raw request target: path plus optional query string.
    pub target: String,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Request {
    /// The path component of the target (everything before `?`).
    pub fn path(&self) -> &str {
        match self.target.find('?') {
            Some(idx) => &self.target[..idx],
            None => &self.target,
        }
    }

    /// The query component of the target, without the `?`.
    pub fn query(&self) -> &str {
        match self.target.find('?') {
            Some(idx) => &self.target[idx + 1..],
            None => "",
        }
    }

    /// First value of `name` as a string, if present and valid UTF-8.
    pub fn header_str(&self, name: HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Whether the connection may be reused after this exchange:
    /// `Connection` wins when present, otherwise HTTP/1.1 defaults to
    /// keep-alive and HTTP/1.0 to close.
    pub fn keep_alive(&self) -> bool {
        match self.header_str(header::CONNECTION) {
            Some(value) => {
                let value = value.to_ascii_lowercase();
                if value.contains("close") {
                    false
                } else if value.contains("keep-alive") {
                    true
                } else {
                    self.version == Version::HTTP_11
                }
            }
            None => self.version == Version::HTTP_11,
        }
    }

    /// Serialize the request back to wire form: request line, headers,
    /// blank line, body. Used by the echo handler.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.body.len());
        out.extend_from_slice(self.method.as_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.target.as_bytes());
        out.push(b' ');
        out.extend_from_slice(version_str(self.version).as_bytes());
        out.extend_from_slice(b"\r\n");
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_str().as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

pub(crate) fn version_str(version: Version) -> &'static str {
    if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else {
        "HTTP/1.1"
    }
}

/// Why a request could not be read.
#[derive(Debug)]
pub enum RequestError {
    Io(io::Error),
    Malformed(&'static str),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Io(err) => write!(f, "i/o error while reading request: {err}"),
            RequestError::Malformed(what) => write!(f, "malformed request: {what}"),
        }
    }
}

impl std::error::Error for RequestError {}

impl From<io::Error> for RequestError {
    fn from(err: io::Error) -> Self {
        RequestError::Io(err)
    }
}

/// Incremental request reader. Owns the connection's read buffer so bytes
/// of a pipelined follow-up request survive between calls.
#[derive(Default)]
pub struct RequestReader {
    buf: Vec<u8>,
}

impl RequestReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the next request off `stream`. `Ok(None)` means the peer
    /// closed the connection cleanly between requests.
    pub fn next_request<R: Read>(
        &mut self,
        stream: &mut R,
    ) -> Result<Option<Request>, RequestError> {
        let head_end = loop {
            if let Some(end) = find_head_end(&self.buf) {
                break end;
            }
            if self.buf.len() > MAX_HEAD_BYTES {
                return Err(RequestError::Malformed("request head too large"));
            }
            if self.fill(stream)? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(RequestError::Malformed("connection closed mid-request"));
            }
        };

        let (method, target, version, headers) = parse_head(&self.buf[..head_end])?;

        let content_length = match headers.get(header::CONTENT_LENGTH) {
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .ok_or(RequestError::Malformed("invalid Content-Length"))?,
            None => 0,
        };

        let total = head_end + content_length;
        while self.buf.len() < total {
            if self.fill(stream)? == 0 {
                return Err(RequestError::Malformed("connection closed mid-body"));
            }
        }

        let body = self.buf[head_end..total].to_vec();
        self.buf.drain(..total);

        Ok(Some(Request {
            method,
            target,
            version,
            headers,
            body,
        }))
    }

    fn fill<R: Read>(&mut self, stream: &mut R) -> io::Result<usize> {
        let mut chunk = [0u8; 8192];
        let n = stream.read(&mut chunk)?;
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(n)
    }
}

/// Offset just past the blank line ending the head, accepting `\r\n\r\n`,
/// `\n\n`, and mixed endings.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    for (i, &b) in buf.iter().enumerate() {
        if b != b'\n' {
            continue;
        }
        let rest = &buf[i + 1..];
        if rest.first() == Some(&b'\n') {
            return Some(i + 2);
        }
        if rest.len() >= 2 && rest[0] == b'\r' && rest[1] == b'\n' {
            return Some(i + 3);
        }
    }
    None
}

fn parse_head(head: &[u8]) -> Result<(Method, String, Version, HeaderMap), RequestError> {
    let text =
        std::str::from_utf8(head).map_err(|_| RequestError::Malformed("head is not UTF-8"))?;
    let mut lines = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line));

    let request_line = lines
        .next()
        .ok_or(RequestError::Malformed("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(version), None) => (method, target, version),
        _ => return Err(RequestError::Malformed("bad request line")),
    };

    let method =
        Method::from_bytes(method.as_bytes()).map_err(|_| RequestError::Malformed("bad method"))?;
    let version = match version {
        "HTTP/1.1" => Version::HTTP_11,
        "HTTP/1.0" => Version::HTTP_10,
        _ => return Err(RequestError::Malformed("unsupported HTTP version")),
    };

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let colon = line
            .find(':')
            .ok_or(RequestError::Malformed("header line without colon"))?;
        let name = HeaderName::from_bytes(line[..colon].trim().as_bytes())
            .map_err(|_| RequestError::Malformed("bad header name"))?;
        let value = HeaderValue::from_str(line[colon + 1..].trim())
            .map_err(|_| RequestError::Malformed("bad header value"))?;
        headers.append(name, value);
    }

    Ok((method, target.to_string(), version, headers))
}
