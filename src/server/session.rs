//! Per-connection session: read a request, route it, run the handler,
//! post-process, write the response, and either recycle the connection or
//! close it.

use http::{header, StatusCode, Version};
use may::net::TcpStream;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::compress;
use super::request::{RequestError, RequestReader};
use super::response::Response;
use crate::router::HandlerRegistry;

pub struct Session {
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<HandlerRegistry>,
}

impl Session {
    pub fn new(stream: TcpStream, peer: SocketAddr, registry: Arc<HandlerRegistry>) -> Self {
        Session {
            stream,
            peer,
            registry,
        }
    }

    /// Drive the connection until it closes. Every exit path drops the
    /// stream and its buffers; a dropped peer is never an error worth
    /// more than a log line.
    pub fn run(mut self) {
        let mut reader = RequestReader::new();

        loop {
            let started = Instant::now();
            let req = match reader.next_request(&mut self.stream) {
                Ok(Some(req)) => req,
                Ok(None) => {
                    debug!(peer = %self.peer, "connection closed by client");
                    return;
                }
                Err(RequestError::Io(err)) => {
                    warn!(peer = %self.peer, error = %err, "read error");
                    return;
                }
                Err(RequestError::Malformed(what)) => {
                    warn!(peer = %self.peer, error = what, "malformed request");
                    let mut res = Response::text(StatusCode::BAD_REQUEST, "400 Bad Request");
                    res.set_header(header::CONNECTION, "close");
                    let _ = self.write_response(&res);
                    return;
                }
            };

            let route = self.registry.matching(&req.target);
            let handler = route.instantiate();
            let mut res = handler.handle(&req);
            res.version = req.version;

            compress::apply_gzip(&req, &mut res);

            let keep_alive = req.keep_alive() && res.keep_alive();
            if !keep_alive {
                res.set_header(header::CONNECTION, "close");
            } else if req.version == Version::HTTP_10 {
                res.set_header(header::CONNECTION, "keep-alive");
            }

            let bytes = match self.write_response(&res) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(peer = %self.peer, error = %err, "write error");
                    return;
                }
            };

            info!(
                peer = %self.peer,
                method = %req.method,
                target = %req.target,
                status = res.status.as_u16(),
                handler = handler.kind(),
                latency_ms = started.elapsed().as_millis() as u64,
                bytes,
                "response written"
            );

            if !keep_alive {
                return;
            }
        }
    }

    fn write_response(&mut self, res: &Response) -> std::io::Result<usize> {
        let bytes = res.to_bytes();
        self.stream.write_all(&bytes)?;
        self.stream.flush()?;
        Ok(bytes.len())
    }
}
