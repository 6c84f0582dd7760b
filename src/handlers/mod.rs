//! Request handlers.
//!
//! Every handler implements the one-method [`Handler`] contract: a request
//! in, a response out. Handlers never fail across the boundary; errors are
//! encoded as response status codes.

pub mod crud;
pub mod echo;
pub mod health;
pub mod markdown;
pub mod not_found;
pub mod sleep;
pub mod static_files;

use crate::server::{Request, Response};

pub use crud::CrudHandler;
pub use echo::EchoHandler;
pub use health::HealthHandler;
pub use markdown::MarkdownHandler;
pub use not_found::NotFoundHandler;
pub use sleep::SleepHandler;
pub use static_files::StaticHandler;

/// The request → response contract shared by all handlers.
pub trait Handler: Send {
    /// The handler type name as it appears in config, used in logs.
    fn kind(&self) -> &'static str;

    fn handle(&self, req: &Request) -> Response;
}
