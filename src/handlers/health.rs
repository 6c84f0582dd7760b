use http::StatusCode;

use super::Handler;
use crate::server::{Request, Response};

/// Liveness probe: always `200 OK` with a plain-text `OK` body.
pub struct HealthHandler;

impl Handler for HealthHandler {
    fn kind(&self) -> &'static str {
        "HealthRequestHandler"
    }

    fn handle(&self, _req: &Request) -> Response {
        Response::text(StatusCode::OK, "OK")
    }
}
