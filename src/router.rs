//! Routing table built from `location` directives.
//!
//! Each `location <prefix> <HandlerType> { ... }` statement becomes a
//! route pairing the prefix with a factory bound to the block's
//! parameters. Matching is a purely textual longest-prefix scan over the
//! request path; a miss yields the NotFound sentinel route.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{Config, Statement};
use crate::fs::FileSystem;
use crate::handlers::{CrudHandler, Handler, MarkdownHandler, SleepHandler, StaticHandler};
use crate::registry::{self, HandlerFactory};

/// One prefix → bound-factory mapping.
pub struct Route {
    pub prefix: String,
    pub kind: String,
    factory: HandlerFactory,
}

impl Route {
    /// Construct a fresh handler instance for one request.
    pub fn instantiate(&self) -> Box<dyn Handler> {
        (self.factory)()
    }
}

/// Why the routing table could not be built. Any of these aborts startup.
#[derive(Debug, PartialEq, Eq)]
pub enum RouteError {
    MalformedLocation { statement: String },
    MissingBlock { prefix: String, kind: String },
    BadPrefix { prefix: String, reason: &'static str },
    DuplicatePrefix { prefix: String },
    UnknownHandler { kind: String },
    MissingDirective { prefix: String, directive: &'static str },
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::MalformedLocation { statement } => {
                write!(
                    f,
                    "location directive must be `location <prefix> <HandlerType> {{ ... }}`: {statement}"
                )
            }
            RouteError::MissingBlock { prefix, kind } => {
                write!(f, "missing block `{{}}` for handler definition at location {prefix} {kind}")
            }
            RouteError::BadPrefix { prefix, reason } => {
                write!(f, "invalid location prefix '{prefix}': {reason}")
            }
            RouteError::DuplicatePrefix { prefix } => write!(f, "duplicate location: {prefix}"),
            RouteError::UnknownHandler { kind } => write!(f, "unknown handler type '{kind}'"),
            RouteError::MissingDirective { prefix, directive } => {
                write!(f, "location {prefix} is missing required `{directive}` directive")
            }
        }
    }
}

impl std::error::Error for RouteError {}

/// The value of a one-argument directive (`root <path>;`) inside a
/// location block.
fn block_directive<'a>(block: &'a Config, name: &str) -> Option<&'a str> {
    block
        .statements
        .iter()
        .find(|s| s.tokens.len() == 2 && s.tokens[0] == name)
        .map(|s| s.tokens[1].as_str())
}

/// Longest-prefix routing table. Built once at startup, immutable after.
pub struct HandlerRegistry {
    routes: Vec<Route>,
    not_found: Route,
}

impl HandlerRegistry {
    /// Walk top-level `location` statements, validate them, and bind a
    /// factory per route.
    pub fn from_config(config: &Config, fs: Arc<dyn FileSystem>) -> Result<Self, RouteError> {
        let mut routes: Vec<Route> = Vec::new();

        for statement in &config.statements {
            if statement.tokens.first().map(String::as_str) != Some("location") {
                continue;
            }
            let route = build_route(statement, &routes, &fs)?;
            routes.push(route);
        }

        // Longest prefix first; scan order then gives best match.
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        let not_found_factory =
            registry::lookup("NotFoundHandler").ok_or(RouteError::UnknownHandler {
                kind: "NotFoundHandler".to_string(),
            })?;

        info!(
            route_count = routes.len(),
            prefixes = ?routes.iter().map(|r| r.prefix.as_str()).collect::<Vec<_>>(),
            "routing table built"
        );

        Ok(HandlerRegistry {
            routes,
            not_found: Route {
                prefix: String::new(),
                kind: "NotFoundHandler".to_string(),
                factory: not_found_factory,
            },
        })
    }

    /// First route whose prefix starts the target's path component, or the
    /// NotFound sentinel.
    pub fn matching(&self, target: &str) -> &Route {
        let path = match target.find('?') {
            Some(idx) => &target[..idx],
            None => target,
        };
        for route in &self.routes {
            if path.starts_with(&route.prefix) {
                debug!(target = %target, prefix = %route.prefix, kind = %route.kind, "route matched");
                return route;
            }
        }
        debug!(target = %target, "no route matched");
        &self.not_found
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

fn build_route(
    statement: &Statement,
    existing: &[Route],
    fs: &Arc<dyn FileSystem>,
) -> Result<Route, RouteError> {
    if statement.tokens.len() != 3 {
        return Err(RouteError::MalformedLocation {
            statement: statement.tokens.join(" "),
        });
    }
    let prefix = statement.tokens[1].clone();
    let kind = statement.tokens[2].clone();

    let block = statement.block.as_ref().ok_or_else(|| RouteError::MissingBlock {
        prefix: prefix.clone(),
        kind: kind.clone(),
    })?;

    if prefix.is_empty() || !prefix.starts_with('/') {
        return Err(RouteError::BadPrefix {
            prefix,
            reason: "must start with '/'",
        });
    }
    if prefix.len() > 1 && prefix.ends_with('/') {
        return Err(RouteError::BadPrefix {
            prefix,
            reason: "must not end with '/'",
        });
    }
    if existing.iter().any(|route| route.prefix == prefix) {
        return Err(RouteError::DuplicatePrefix { prefix });
    }

    let archetype = registry::lookup(&kind).ok_or_else(|| RouteError::UnknownHandler {
        kind: kind.clone(),
    })?;

    let factory: HandlerFactory = match kind.as_str() {
        "StaticHandler" => {
            let root = block_directive(block, "root")
                .ok_or(RouteError::MissingDirective {
                    prefix: prefix.clone(),
                    directive: "root",
                })?
                .to_string();
            let prefix = prefix.clone();
            Arc::new(move || {
                Box::new(StaticHandler::new(prefix.clone(), root.clone())) as Box<dyn Handler>
            })
        }
        "CrudHandler" => {
            let data_path = block_directive(block, "data_path")
                .ok_or(RouteError::MissingDirective {
                    prefix: prefix.clone(),
                    directive: "data_path",
                })?
                .to_string();
            let prefix = prefix.clone();
            let fs = Arc::clone(fs);
            Arc::new(move || {
                Box::new(CrudHandler::new(
                    prefix.clone(),
                    data_path.clone(),
                    Arc::clone(&fs),
                )) as Box<dyn Handler>
            })
        }
        "MarkdownHandler" => {
            let root = block_directive(block, "root")
                .ok_or(RouteError::MissingDirective {
                    prefix: prefix.clone(),
                    directive: "root",
                })?
                .to_string();
            let template = block_directive(block, "template")
                .ok_or(RouteError::MissingDirective {
                    prefix: prefix.clone(),
                    directive: "template",
                })?
                .to_string();
            let prefix = prefix.clone();
            let fs = Arc::clone(fs);
            Arc::new(move || {
                Box::new(MarkdownHandler::new(
                    prefix.clone(),
                    root.clone(),
                    Some(template.clone()),
                    Arc::clone(&fs),
                )) as Box<dyn Handler>
            })
        }
        "SleepHandler" => match block_directive(block, "delay_ms").and_then(|v| v.parse().ok()) {
            Some(delay_ms) => {
                Arc::new(move || Box::new(SleepHandler::new(delay_ms)) as Box<dyn Handler>)
            }
            None => archetype,
        },
        // Parameterless handlers use their archetype factory directly.
        _ => archetype,
    };

    Ok(Route {
        prefix,
        kind,
        factory,
    })
}
