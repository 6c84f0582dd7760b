//! portico: a config-driven HTTP/1.1 application server.
//!
//! An nginx-style config binds URL path prefixes to handler types; the
//! routing table dispatches each request to the best-matching handler by
//! longest prefix. Connections are served by coroutines on the `may`
//! runtime, so a slow handler occupies one coroutine without stalling the
//! rest of the server.

pub mod cli;
pub mod config;
pub mod fs;
pub mod handlers;
pub mod registry;
pub mod router;
pub mod server;

pub use config::{Config, ConfigError};
pub use fs::{FileSystem, MemoryFileSystem, RealFileSystem};
pub use handlers::Handler;
pub use registry::{register_builtin_handlers, HandlerFactory};
pub use router::{HandlerRegistry, RouteError};
pub use server::{HttpServer, Request, Response, ServerHandle};
