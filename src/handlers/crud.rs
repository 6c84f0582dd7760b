//! Filesystem-backed JSON CRUD resource store.
//!
//! Each entity type maps to a subdirectory of `data_path`; each entity
//! instance is a file named by its numeric id holding the caller-supplied
//! JSON verbatim.

use http::{header, Method, StatusCode};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use super::Handler;
use crate::fs::FileSystem;
use crate::server::{Request, Response};

pub struct CrudHandler {
    prefix: String,
    data_path: String,
    fs: Arc<dyn FileSystem>,
}

#[derive(Serialize)]
struct CreatedId {
    id: u64,
}

fn json_error(status: StatusCode, message: &str) -> Response {
    Response::json(status, &json!({ "error": message }))
}

impl CrudHandler {
    pub fn new(
        prefix: impl Into<String>,
        data_path: impl Into<String>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        let handler = CrudHandler {
            prefix: prefix.into(),
            data_path: data_path.into(),
            fs,
        };
        // Make sure the mount's data directory exists up front.
        if let Err(err) = handler.fs.create_dir(&handler.data_path) {
            warn!(data_path = %handler.data_path, error = %err, "crud: could not create data directory");
        }
        handler
    }

    fn entity_dir(&self, entity_type: &str) -> String {
        format!("{}/{}", self.data_path, entity_type)
    }

    fn entity_path(&self, entity_type: &str, id: &str) -> String {
        format!("{}/{}/{}", self.data_path, entity_type, id)
    }

    /// Next id for a type: one past the largest integer-parseable filename
    /// in its directory, or 1 when there is none.
    fn next_id(&self, entity_type: &str) -> u64 {
        let dir = self.entity_dir(entity_type);
        if !self.fs.exists(&dir) {
            return 1;
        }
        self.fs
            .list_dir(&dir)
            .iter()
            .filter_map(|name| name.parse::<u64>().ok())
            .filter(|id| *id > 0)
            .max()
            .map(|max| max + 1)
            .unwrap_or(1)
    }

    /// Reject bodies that are empty, carry a non-JSON Content-Type, or do
    /// not parse as JSON.
    fn validate_json_body(&self, req: &Request) -> Option<Response> {
        if req.body.is_empty() {
            return Some(json_error(
                StatusCode::BAD_REQUEST,
                "Request body cannot be empty",
            ));
        }
        if let Some(content_type) = req.header_str(header::CONTENT_TYPE) {
            if content_type != "application/json" {
                return Some(json_error(
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    "Content-Type must be application/json",
                ));
            }
        }
        if serde_json::from_slice::<serde_json::Value>(&req.body).is_err() {
            return Some(json_error(StatusCode::BAD_REQUEST, "Invalid JSON"));
        }
        None
    }

    fn handle_post(&self, req: &Request, entity_type: &str) -> Response {
        if let Some(rejection) = self.validate_json_body(req) {
            return rejection;
        }

        let entity_dir = self.entity_dir(entity_type);
        if let Err(err) = self.fs.create_dir(&entity_dir) {
            warn!(dir = %entity_dir, error = %err, "crud: create_dir failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save entity");
        }

        let id = self.next_id(entity_type);
        let path = self.entity_path(entity_type, &id.to_string());
        if let Err(err) = self.fs.write(&path, &req.body) {
            warn!(path = %path, error = %err, "crud: write failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save entity");
        }

        debug!(path = %path, "crud: entity created");
        let mut res = Response::json(
            StatusCode::CREATED,
            &serde_json::to_value(CreatedId { id }).expect("plain struct serializes"),
        );
        res.set_header(
            header::LOCATION,
            format!("{}/{}/{}", self.prefix, entity_type, id),
        );
        res
    }

    fn handle_get(&self, entity_type: &str, id: Option<&str>) -> Response {
        let entity_dir = self.entity_dir(entity_type);

        if let Some(id) = id {
            let path = self.entity_path(entity_type, id);
            if !self.fs.exists(&path) {
                return json_error(StatusCode::NOT_FOUND, "Entity not found");
            }
            return match self.fs.read(&path) {
                Ok(bytes) => {
                    let mut res = Response::with_status(StatusCode::OK);
                    res.set_header(header::CONTENT_TYPE, "application/json");
                    res.body = bytes;
                    res
                }
                Err(err) => {
                    warn!(path = %path, error = %err, "crud: read failed");
                    json_error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to read entity data",
                    )
                }
            };
        }

        // No id: list the type's ids, lexicographically sorted. A type that
        // was never written lists as empty.
        let mut ids = self.fs.list_dir(&entity_dir);
        ids.sort();
        Response::json(StatusCode::OK, &json!(ids))
    }

    fn handle_put(&self, req: &Request, entity_type: &str, id: &str) -> Response {
        if let Some(rejection) = self.validate_json_body(req) {
            return rejection;
        }

        let entity_dir = self.entity_dir(entity_type);
        if let Err(err) = self.fs.create_dir(&entity_dir) {
            warn!(dir = %entity_dir, error = %err, "crud: create_dir failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save entity");
        }

        let path = self.entity_path(entity_type, id);
        let existed = self.fs.exists(&path);
        if let Err(err) = self.fs.write(&path, &req.body) {
            warn!(path = %path, error = %err, "crud: write failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save entity");
        }

        if existed {
            Response::with_status(StatusCode::NO_CONTENT)
        } else {
            let mut res = Response::with_status(StatusCode::CREATED);
            res.set_header(
                header::LOCATION,
                format!("{}/{}/{}", self.prefix, entity_type, id),
            );
            res
        }
    }

    fn handle_delete(&self, entity_type: &str, id: &str) -> Response {
        let path = self.entity_path(entity_type, id);
        if !self.fs.exists(&path) {
            return json_error(StatusCode::NOT_FOUND, "Entity not found");
        }
        if let Err(err) = self.fs.remove(&path) {
            warn!(path = %path, error = %err, "crud: delete failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete entity");
        }
        Response::with_status(StatusCode::NO_CONTENT)
    }
}

/// Split the path remainder after the mount prefix into
/// `(entity_type, optional id)`. More than two segments, or an empty
/// entity type, is invalid.
fn parse_entity_path(relative: &str) -> Option<(&str, Option<&str>)> {
    let relative = relative.strip_prefix('/').unwrap_or(relative);
    if relative.is_empty() {
        return None;
    }
    match relative.split_once('/') {
        None => Some((relative, None)),
        Some((entity_type, rest)) => {
            if entity_type.is_empty() {
                return None;
            }
            if rest.is_empty() {
                return Some((entity_type, None));
            }
            if rest.contains('/') {
                return None;
            }
            Some((entity_type, Some(rest)))
        }
    }
}

impl Handler for CrudHandler {
    fn kind(&self) -> &'static str {
        "CrudHandler"
    }

    fn handle(&self, req: &Request) -> Response {
        let path = req.path();
        if !path.starts_with(&self.prefix) {
            return json_error(StatusCode::NOT_FOUND, "Not found");
        }

        let relative = &path[self.prefix.len()..];
        let Some((entity_type, id)) = parse_entity_path(relative) else {
            return json_error(StatusCode::BAD_REQUEST, "Invalid request path");
        };

        match req.method {
            Method::POST => {
                if id.is_some() {
                    return json_error(
                        StatusCode::BAD_REQUEST,
                        "POST requests must not include an ID",
                    );
                }
                self.handle_post(req, entity_type)
            }
            Method::GET => self.handle_get(entity_type, id),
            Method::PUT => match id {
                Some(id) => self.handle_put(req, entity_type, id),
                None => json_error(StatusCode::BAD_REQUEST, "PUT requests require an ID"),
            },
            Method::DELETE => match id {
                Some(id) => self.handle_delete(entity_type, id),
                None => json_error(StatusCode::BAD_REQUEST, "DELETE requests require an ID"),
            },
            _ => json_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
        }
    }
}
