//! GitHub-flavoured Markdown rendering with directory indexes and HTTP
//! caching.
//!
//! `.md` files under the configured root render to HTML (optionally
//! wrapped in a template around a `{{content}}` placeholder) with strong
//! ETags and `Last-Modified` validators. Directory targets produce a
//! sorted index page that is cached for five seconds per directory.

use chrono::{DateTime, Utc};
use comrak::{markdown_to_html, ComrakOptions};
use http::{header, StatusCode};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use super::Handler;
use crate::fs::FileSystem;
use crate::server::{Request, Response};

/// Rendered files and templates are capped at 1 MiB.
const MAX_RENDER_BYTES: u64 = 1024 * 1024;

const TEMPLATE_PLACEHOLDER: &str = "{{content}}";

const DIR_CACHE_TTL: Duration = Duration::from_secs(5);

struct DirCacheEntry {
    html: String,
    etag: String,
    last_modified: String,
    saved: Instant,
}

/// Process-global directory-index cache, keyed by canonical directory
/// path. The lock is held only around map access, never during I/O or
/// rendering.
static DIR_CACHE: Lazy<Mutex<HashMap<PathBuf, DirCacheEntry>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub struct MarkdownHandler {
    prefix: String,
    root: String,
    template_path: Option<String>,
    fs: Arc<dyn FileSystem>,
}

fn plain(status: StatusCode, message: &str) -> Response {
    Response::text(status, message)
}

fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

fn epoch_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn render_gfm(markdown: &str) -> String {
    let mut options = ComrakOptions::default();
    options.extension.table = true;
    options.extension.strikethrough = true;
    options.extension.autolink = true;
    options.extension.tagfilter = true;
    options.extension.tasklist = true;
    // Raw HTML in the source passes through.
    options.render.unsafe_ = true;
    markdown_to_html(markdown, &options)
}

/// Resolve `.` and `..` components textually, for targets that do not
/// exist on disk and therefore cannot be canonicalized.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Read a whole file through the capability, refusing anything over the
/// render cap.
fn read_small_file(fs: &Arc<dyn FileSystem>, path: &str) -> Option<Vec<u8>> {
    if !fs.exists(path) {
        return None;
    }
    let bytes = fs.read(path).ok()?;
    if bytes.len() as u64 > MAX_RENDER_BYTES {
        return None;
    }
    Some(bytes)
}

impl MarkdownHandler {
    pub fn new(
        prefix: impl Into<String>,
        root: impl Into<String>,
        template_path: Option<String>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        MarkdownHandler {
            prefix: prefix.into(),
            root: root.into(),
            template_path,
            fs,
        }
    }

    /// Path under the root for a request target, or None when the target
    /// does not align with the configured prefix.
    fn relative_path(&self, target_path: &str) -> Option<String> {
        if self.prefix == "/" {
            return if target_path == "/" {
                Some(String::new())
            } else {
                Some(target_path.strip_prefix('/').unwrap_or(target_path).to_string())
            };
        }
        let with_slash = format!("{}/", self.prefix);
        if let Some(rest) = target_path.strip_prefix(&with_slash) {
            Some(rest.to_string())
        } else if target_path == self.prefix {
            Some(String::new())
        } else {
            None
        }
    }

    /// Substitute the first `{{content}}` occurrence in the configured
    /// template, if the template is readable and carries the placeholder.
    /// Used by the directory index, which silently falls back to the bare
    /// fragment.
    fn wrap_in_template_lenient(&self, fragment: &str) -> String {
        if let Some(template_path) = &self.template_path {
            if let Some(bytes) = read_small_file(&self.fs, template_path) {
                let template = String::from_utf8_lossy(&bytes);
                if template.contains(TEMPLATE_PLACEHOLDER) {
                    return template.replacen(TEMPLATE_PLACEHOLDER, fragment, 1);
                }
            }
        }
        fragment.to_string()
    }

    fn handle_directory(&self, req: &Request, target_path: &str, canonical_dir: &Path) -> Response {
        // Directory URLs are canonical with a trailing slash.
        if !target_path.ends_with('/') {
            let mut res = Response::with_status(StatusCode::MOVED_PERMANENTLY);
            res.set_header(header::LOCATION, format!("{target_path}/"));
            return res;
        }

        let now = Instant::now();
        {
            let cache = DIR_CACHE.lock().unwrap();
            if let Some(entry) = cache.get(canonical_dir) {
                if now.duration_since(entry.saved) < DIR_CACHE_TTL {
                    if let Some(inm) = req.header_str(header::IF_NONE_MATCH) {
                        if inm == entry.etag {
                            return conditional_not_modified(&entry.etag, &entry.last_modified);
                        }
                    }
                    if let Some(ims) = req.header_str(header::IF_MODIFIED_SINCE) {
                        if ims == entry.last_modified {
                            return conditional_not_modified(&entry.etag, &entry.last_modified);
                        }
                    }
                    let mut res = Response::html(StatusCode::OK, entry.html.clone());
                    res.set_header(header::ETAG, &entry.etag);
                    res.set_header(header::LAST_MODIFIED, &entry.last_modified);
                    return res;
                }
            }
        }

        let entries = match std::fs::read_dir(canonical_dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %canonical_dir.display(), error = %err, "markdown: directory scan failed");
                return plain(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error - Directory iteration failed",
                );
            }
        };

        let mut md_files = Vec::new();
        let mut sub_directories = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().into_owned();
            match entry.file_type() {
                Ok(kind) if kind.is_dir() => sub_directories.push(name),
                Ok(kind) if kind.is_file() => {
                    if Path::new(&name).extension().is_some_and(|ext| ext == "md") {
                        md_files.push(name);
                    }
                }
                _ => {}
            }
        }
        sub_directories.sort();
        md_files.sort();

        let mut listing = format!("<h1>Index of {target_path}</h1>\n<ul>\n");
        for dir_name in &sub_directories {
            listing.push_str(&format!(
                "  <li><a href=\"{dir_name}/\">{dir_name}/</a></li>\n"
            ));
        }
        for file_name in &md_files {
            listing.push_str(&format!(
                "  <li><a href=\"{file_name}\">{file_name}</a></li>\n"
            ));
        }
        listing.push_str("</ul>\n");

        let page = self.wrap_in_template_lenient(&listing);

        // Keying the ETag on the directory mtime keeps it stable across
        // cache expiry as long as the directory itself is unchanged.
        let dir_mtime = std::fs::metadata(canonical_dir)
            .and_then(|meta| meta.modified())
            .unwrap_or_else(|_| SystemTime::now());
        let etag = format!("\"{}-{}\"", page.len(), epoch_seconds(dir_mtime));
        let last_modified = http_date(dir_mtime);

        {
            let mut cache = DIR_CACHE.lock().unwrap();
            cache.insert(
                canonical_dir.to_path_buf(),
                DirCacheEntry {
                    html: page.clone(),
                    etag: etag.clone(),
                    last_modified: last_modified.clone(),
                    saved: now,
                },
            );
        }

        let mut res = Response::html(StatusCode::OK, page);
        res.set_header(header::ETAG, etag);
        res.set_header(header::LAST_MODIFIED, last_modified);
        res
    }

    fn handle_file(&self, req: &Request, canonical_target: &Path, raw_requested: bool) -> Response {
        if canonical_target.extension().map(|ext| ext != "md").unwrap_or(true) {
            return plain(StatusCode::NOT_FOUND, "404 Not Found - Not a Markdown file");
        }

        let file_path = canonical_target.to_string_lossy().into_owned();
        let meta = match std::fs::metadata(canonical_target) {
            Ok(meta) if meta.is_file() && self.fs.exists(&file_path) => meta,
            _ => {
                return plain(StatusCode::NOT_FOUND, "404 Not Found - File does not exist");
            }
        };

        let mtime = meta.modified().unwrap_or(UNIX_EPOCH);
        let etag = format!("\"{}-{}\"", meta.len(), epoch_seconds(mtime));
        let last_modified = http_date(mtime);

        let not_modified = match req.header_str(header::IF_NONE_MATCH) {
            Some(inm) => inm == etag,
            None => req
                .header_str(header::IF_MODIFIED_SINCE)
                .map(|ims| ims == last_modified)
                .unwrap_or(false),
        };
        if not_modified {
            return conditional_not_modified(&etag, &last_modified);
        }

        if meta.len() > MAX_RENDER_BYTES {
            warn!(path = %file_path, size = meta.len(), "markdown: file exceeds render cap");
            return plain(
                StatusCode::PAYLOAD_TOO_LARGE,
                "413 Payload Too Large - File exceeds 1MB limit",
            );
        }
        if meta.len() == 0 {
            return Response::html(StatusCode::OK, Vec::new());
        }

        let markdown = match self.fs.read(&file_path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %file_path, error = %err, "markdown: read failed");
                return plain(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error - Could not read file",
                );
            }
        };

        if raw_requested {
            let mut res = Response::with_status(StatusCode::OK);
            res.set_header(header::CONTENT_TYPE, "text/markdown");
            res.body = markdown;
            res.set_header(header::ETAG, etag);
            res.set_header(header::LAST_MODIFIED, last_modified);
            debug!(path = %file_path, "markdown: served raw");
            return res;
        }

        let fragment = render_gfm(&String::from_utf8_lossy(&markdown));

        let page = match &self.template_path {
            Some(template_path) => match read_small_file(&self.fs, template_path) {
                Some(bytes) => {
                    let template = String::from_utf8_lossy(&bytes).into_owned();
                    if template.contains(TEMPLATE_PLACEHOLDER) {
                        template.replacen(TEMPLATE_PLACEHOLDER, &fragment, 1)
                    } else {
                        fragment
                    }
                }
                None => {
                    warn!(template = %template_path, "markdown: template unreadable");
                    return plain(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal Server Error - Could not read template",
                    );
                }
            },
            None => fragment,
        };

        let mut res = Response::html(StatusCode::OK, page);
        res.set_header(header::ETAG, etag);
        res.set_header(header::LAST_MODIFIED, last_modified);
        debug!(path = %file_path, "markdown: served rendered");
        res
    }
}

fn conditional_not_modified(etag: &str, last_modified: &str) -> Response {
    let mut res = Response::with_status(StatusCode::NOT_MODIFIED);
    res.set_header(header::ETAG, etag);
    res.set_header(header::LAST_MODIFIED, last_modified);
    res
}

impl Handler for MarkdownHandler {
    fn kind(&self) -> &'static str {
        "MarkdownHandler"
    }

    fn handle(&self, req: &Request) -> Response {
        let target_path = req.path().to_string();
        let raw_requested = req.query().contains("raw=1");

        let Some(relative) = self.relative_path(&target_path) else {
            warn!(target = %target_path, prefix = %self.prefix, "markdown: target does not align with prefix");
            return plain(StatusCode::NOT_FOUND, "404 Not Found - Path mismatch");
        };

        let root_is_dir = std::fs::metadata(&self.root)
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if !root_is_dir {
            warn!(root = %self.root, "markdown: configured root is not a directory");
            return plain(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error - Invalid root configuration",
            );
        }
        let canonical_root = match std::fs::canonicalize(&self.root) {
            Ok(root) => root,
            Err(err) => {
                warn!(root = %self.root, error = %err, "markdown: root canonicalization failed");
                return plain(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error - Path processing failed",
                );
            }
        };

        let target_fs_path = Path::new(&self.root).join(&relative);
        let canonical_target = std::fs::canonicalize(&target_fs_path)
            .unwrap_or_else(|_| normalize_lexically(&target_fs_path));

        if !canonical_target.starts_with(&canonical_root) {
            warn!(
                requested = %target_fs_path.display(),
                resolved = %canonical_target.display(),
                "markdown: path escapes configured root"
            );
            return plain(StatusCode::NOT_FOUND, "404 Not Found - Invalid path");
        }

        if canonical_target.is_dir() {
            self.handle_directory(req, &target_path, &canonical_target)
        } else {
            self.handle_file(req, &canonical_target, raw_requested)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gfm_extensions_are_active() {
        let html = render_gfm("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~");
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>gone</del>"));
    }

    #[test]
    fn raw_html_passes_through() {
        let html = render_gfm("before\n\n<div class=\"x\">kept</div>");
        assert!(html.contains("<div class=\"x\">kept</div>"));
    }

    #[test]
    fn lexical_normalization_resolves_dots() {
        assert_eq!(
            normalize_lexically(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
    }

    #[test]
    fn relative_paths_align_with_prefix() {
        let fs: Arc<dyn FileSystem> = Arc::new(crate::fs::MemoryFileSystem::new());
        let handler = MarkdownHandler::new("/docs", "/srv/docs", None, fs);
        assert_eq!(handler.relative_path("/docs"), Some(String::new()));
        assert_eq!(handler.relative_path("/docs/"), Some(String::new()));
        assert_eq!(
            handler.relative_path("/docs/a.md"),
            Some("a.md".to_string())
        );
        assert_eq!(handler.relative_path("/docsx/a.md"), None);
        assert_eq!(handler.relative_path("/other"), None);
    }

    #[test]
    fn root_prefix_maps_everything() {
        let fs: Arc<dyn FileSystem> = Arc::new(crate::fs::MemoryFileSystem::new());
        let handler = MarkdownHandler::new("/", "/srv/docs", None, fs);
        assert_eq!(handler.relative_path("/"), Some(String::new()));
        assert_eq!(handler.relative_path("/a.md"), Some("a.md".to_string()));
    }
}
