//! Response post-processing: opportunistic gzip.

use flate2::write::GzEncoder;
use flate2::Compression;
use http::header;
use std::io::{self, Write};
use tracing::warn;

use super::request::Request;
use super::response::Response;

/// Bodies at or below this size are not worth compressing.
const MIN_COMPRESS_BYTES: usize = 1024;

/// Gzip the response body in place when the client advertises gzip
/// support, the body is large enough, and no encoding is already applied.
/// A failed compression leaves the response untouched.
pub fn apply_gzip(req: &Request, res: &mut Response) {
    if res.body.len() <= MIN_COMPRESS_BYTES {
        return;
    }
    if res.headers.contains_key(header::CONTENT_ENCODING) {
        return;
    }
    let client_accepts_gzip = req
        .headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains("gzip"));
    if !client_accepts_gzip {
        return;
    }

    match gzip(&res.body) {
        Ok(compressed) => {
            res.body = compressed;
            res.set_header(header::CONTENT_ENCODING, "gzip");
        }
        Err(err) => {
            // Fall back to the uncompressed body.
            warn!(error = %err, "gzip compression failed");
        }
    }
}

fn gzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
