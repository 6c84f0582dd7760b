//! Static file serving under a configured root directory.

use http::StatusCode;
use tracing::warn;

use super::Handler;
use crate::server::{Request, Response};

/// Serves files from `root_dir` for targets under `prefix`.
pub struct StaticHandler {
    prefix: String,
    root_dir: String,
}

impl StaticHandler {
    pub fn new(prefix: impl Into<String>, root_dir: impl Into<String>) -> Self {
        StaticHandler {
            prefix: prefix.into(),
            root_dir: root_dir.into(),
        }
    }
}

/// Minimal URL decoding: `%20` and `+` become spaces, everything else is
/// passed through untouched.
fn url_decode_simple(encoded: &str) -> String {
    let mut decoded = String::with_capacity(encoded.len());
    let mut rest = encoded;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("%20") {
            decoded.push(' ');
            rest = after;
        } else if let Some(after) = rest.strip_prefix('+') {
            decoded.push(' ');
            rest = after;
        } else {
            let c = rest.chars().next().expect("checked non-empty");
            decoded.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }
    decoded
}

/// Content type for a file extension (leading dot included).
fn mime_type(ext: &str) -> &'static str {
    match ext {
        ".html" | ".htm" => "text/html",
        ".css" => "text/css",
        ".js" => "application/javascript",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".txt" => "text/plain",
        ".pdf" => "application/pdf",
        ".zip" => "application/zip",
        ".ico" => "image/x-icon",
        ".svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

fn not_found() -> Response {
    Response::text(StatusCode::NOT_FOUND, "404 Not Found")
}

impl Handler for StaticHandler {
    fn kind(&self) -> &'static str {
        "StaticHandler"
    }

    fn handle(&self, req: &Request) -> Response {
        let decoded = url_decode_simple(&req.target);
        if !decoded.starts_with(&self.prefix) {
            warn!(target = %decoded, prefix = %self.prefix, "static: prefix mismatch");
            return not_found();
        }

        let mut rel = decoded[self.prefix.len()..].to_string();
        if !rel.starts_with('/') {
            rel.insert(0, '/');
        }

        let mut path = self.root_dir.clone();
        if path.len() > 1 && path.ends_with('/') {
            path.pop();
        }
        path.push_str(&rel);

        // Traversal guard: no parent-dir escapes, and the joined path must
        // still sit under the configured root.
        if path.contains("..") || !path.starts_with(&self.root_dir) {
            warn!(path = %path, "static: directory traversal attempt");
            return not_found();
        }

        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => {}
            _ => return not_found(),
        }

        let body = match std::fs::read(&path) {
            Ok(body) => body,
            Err(err) => {
                warn!(path = %path, error = %err, "static: read failed");
                return Response::text(StatusCode::INTERNAL_SERVER_ERROR, "500 Internal Server Error");
            }
        };

        let ext = path.rfind('.').map(|idx| &path[idx..]).unwrap_or("");
        let mut res = Response::with_status(StatusCode::OK);
        res.set_header(http::header::CONTENT_TYPE, mime_type(ext));
        res.body = body;
        res
    }
}
