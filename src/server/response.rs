use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{StatusCode, Version};
use serde_json::Value;

use super::request::version_str;

/// An HTTP response under construction. `Content-Length` is derived from
/// the body at serialization time and always matches it.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn with_status(status: StatusCode) -> Self {
        Response {
            status,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Plain-text response.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        let mut res = Self::with_status(status);
        res.set_header(header::CONTENT_TYPE, "text/plain");
        res.body = body.into().into_bytes();
        res
    }

    /// HTML response.
    pub fn html(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        let mut res = Self::with_status(status);
        res.set_header(header::CONTENT_TYPE, "text/html");
        res.body = body.into();
        res
    }

    /// JSON response from a serialized value.
    pub fn json(status: StatusCode, body: &Value) -> Self {
        let mut res = Self::with_status(status);
        res.set_header(header::CONTENT_TYPE, "application/json");
        res.body = body.to_string().into_bytes();
        res
    }

    /// Set (replace) a header. Values are expected to be valid header
    /// text; anything else is dropped.
    pub fn set_header(&mut self, name: HeaderName, value: impl AsRef<str>) {
        if let Ok(value) = HeaderValue::from_str(value.as_ref()) {
            self.headers.insert(name, value);
        }
    }

    pub fn header_str(&self, name: HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// False only when the response itself demands the connection close.
    pub fn keep_alive(&self) -> bool {
        match self.header_str(header::CONNECTION) {
            Some(value) => !value.eq_ignore_ascii_case("close"),
            None => true,
        }
    }

    /// Serialize status line, headers, and body. Emits the authoritative
    /// `Content-Length` computed from the body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let reason = self.status.canonical_reason().unwrap_or("Unknown");
        let mut out = Vec::with_capacity(128 + self.body.len());
        out.extend_from_slice(version_str(self.version).as_bytes());
        out.extend_from_slice(format!(" {} {}\r\n", self.status.as_u16(), reason).as_bytes());
        for (name, value) in &self.headers {
            if name == &header::CONTENT_LENGTH {
                continue;
            }
            out.extend_from_slice(name.as_str().as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("content-length: {}\r\n\r\n", self.body.len()).as_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}
