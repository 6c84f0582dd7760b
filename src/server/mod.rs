//! TCP server: bind, accept, and one session coroutine per connection.

pub mod compress;
pub mod request;
pub mod response;
pub mod session;

pub use request::{Request, RequestError, RequestReader};
pub use response::Response;
pub use session::Session;

use may::coroutine::JoinHandle;
use may::go;
use may::net::TcpListener;
use std::io;
use std::net::{SocketAddr, TcpStream as StdTcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::router::HandlerRegistry;

/// How long [`ServerHandle::wait_ready`] keeps probing before giving up.
const READY_DEADLINE: Duration = Duration::from_secs(1);

/// Accepts connections on a TCP port and hands each one to a session.
pub struct HttpServer {
    registry: Arc<HandlerRegistry>,
    port: u16,
}

/// Handle to a running server.
///
/// Shutdown is cooperative: [`stop`](ServerHandle::stop) raises a flag the
/// accept loop checks on every connection, then opens one throwaway
/// connection to itself so a loop parked in `accept` observes the flag.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    accept_loop: JoinHandle<()>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Block until the listener answers a probe connection, or fail after
    /// a deadline. The listener is bound before `start` returns, so this
    /// normally succeeds on the first probe.
    pub fn wait_ready(&self) -> io::Result<()> {
        let deadline = Instant::now() + READY_DEADLINE;
        loop {
            match StdTcpStream::connect_timeout(&self.local_addr, Duration::from_millis(100)) {
                Ok(_probe) => return Ok(()),
                Err(err) if Instant::now() >= deadline => return Err(err),
                Err(_) => thread::sleep(Duration::from_millis(20)),
            }
        }
    }

    /// Stop accepting new connections and wait for the accept loop to
    /// wind down. Sessions already running finish on their own
    /// coroutines.
    pub fn stop(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Wake the accept loop so it notices the flag.
        let _ = StdTcpStream::connect(self.local_addr);
        let _ = self.accept_loop.join();
    }

    /// Block on the accept loop (it only returns after [`stop`] or a
    /// listener failure).
    pub fn join(self) -> io::Result<()> {
        self.accept_loop
            .join()
            .map_err(|_| io::Error::other("accept loop panicked"))
    }
}

impl HttpServer {
    pub fn new(registry: Arc<HandlerRegistry>, port: u16) -> Self {
        HttpServer { registry, port }
    }

    /// Bind the listener and start the accept loop on a coroutine.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be bound.
    pub fn start(self) -> io::Result<ServerHandle> {
        let listener = TcpListener::bind(("0.0.0.0", self.port))?;
        let local_addr = listener.local_addr()?;
        let registry = self.registry;
        let shutdown = Arc::new(AtomicBool::new(false));
        let stopping = Arc::clone(&shutdown);

        info!(addr = %local_addr, "listening");

        let accept_loop = go!(move || {
            for stream in listener.incoming() {
                if stopping.load(Ordering::SeqCst) {
                    info!(addr = %local_addr, "accept loop stopping");
                    break;
                }
                match stream {
                    Ok(stream) => {
                        let peer = match stream.peer_addr() {
                            Ok(peer) => peer,
                            Err(err) => {
                                // Connection went away before we could ask.
                                warn!(error = %err, "dropping connection without peer address");
                                continue;
                            }
                        };
                        let registry = Arc::clone(&registry);
                        go!(move || Session::new(stream, peer, registry).run());
                    }
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                    }
                }
            }
        });

        Ok(ServerHandle {
            local_addr,
            shutdown,
            accept_loop,
        })
    }
}
