use http::StatusCode;
use std::time::Duration;

use super::Handler;
use crate::server::{Request, Response};

const DEFAULT_DELAY_MS: u64 = 3000;

/// Parks the handling coroutine for a configured delay, then answers
/// `200 Slept`. Exists to demonstrate that a slow handler does not stall
/// unrelated connections.
pub struct SleepHandler {
    delay_ms: u64,
}

impl SleepHandler {
    pub fn new(delay_ms: u64) -> Self {
        SleepHandler { delay_ms }
    }
}

impl Default for SleepHandler {
    fn default() -> Self {
        SleepHandler::new(DEFAULT_DELAY_MS)
    }
}

impl Handler for SleepHandler {
    fn kind(&self) -> &'static str {
        "SleepHandler"
    }

    fn handle(&self, _req: &Request) -> Response {
        // Coroutine sleep: yields the worker instead of blocking it.
        may::coroutine::sleep(Duration::from_millis(self.delay_ms));
        Response::text(StatusCode::OK, "Slept")
    }
}
