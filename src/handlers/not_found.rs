use http::StatusCode;

use super::Handler;
use crate::server::{Request, Response};

/// Terminal 404 handler; also the routing table's no-match sentinel.
pub struct NotFoundHandler;

impl Handler for NotFoundHandler {
    fn kind(&self) -> &'static str {
        "NotFoundHandler"
    }

    fn handle(&self, _req: &Request) -> Response {
        Response::text(StatusCode::NOT_FOUND, "404 Not Found")
    }
}
