use http::StatusCode;

use super::Handler;
use crate::server::{Request, Response};

/// Mirrors the full serialized request back as `text/plain`. Diagnostics
/// and test plumbing.
pub struct EchoHandler;

impl Handler for EchoHandler {
    fn kind(&self) -> &'static str {
        "EchoHandler"
    }

    fn handle(&self, req: &Request) -> Response {
        let mut res = Response::with_status(StatusCode::OK);
        res.set_header(http::header::CONTENT_TYPE, "text/plain");
        res.body = req.to_bytes();
        res
    }
}
