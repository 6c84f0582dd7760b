use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

use portico::fs::RealFileSystem;
use portico::{register_builtin_handlers, Config, HandlerRegistry, HttpServer, ServerHandle};

/// Ensures the may runtime is configured only once per test binary.
static MAY_INIT: Once = Once::new();

pub fn setup_may_runtime() {
    MAY_INIT.call_once(|| {
        may::config().set_workers(4);
        may::config().set_stack_size(0x80000);
    });
}

/// Start a server for `config_text` on an ephemeral port and wait until it
/// accepts connections.
pub fn start_server(config_text: &str) -> (ServerHandle, SocketAddr) {
    setup_may_runtime();
    register_builtin_handlers();
    let config = Config::parse(config_text).expect("test config must parse");
    let table = HandlerRegistry::from_config(&config, Arc::new(RealFileSystem))
        .expect("test config must produce a routing table");
    let handle = HttpServer::new(Arc::new(table), 0)
        .start()
        .expect("bind ephemeral port");
    handle.wait_ready().expect("server ready");
    let addr = handle.addr();
    (handle, addr)
}

/// Read one full response off `stream`: the head, then Content-Length
/// worth of body. Falls back to read-until-timeout when no length is
/// present.
pub fn read_response(stream: &mut TcpStream) -> Vec<u8> {
    let mut response = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                response.extend_from_slice(&chunk[..n]);
                if let Some((head_len, body_len)) = head_and_body_len(&response) {
                    if response.len() >= head_len + body_len {
                        break;
                    }
                }
            }
            Err(_) => break,
        }
    }
    response
}

/// Send one raw HTTP request on a fresh connection and return the raw
/// response bytes.
pub fn send_request_bytes(addr: &SocketAddr, req: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_millis(5000)))
        .unwrap();
    stream.write_all(req).unwrap();
    read_response(&mut stream)
}

pub fn send_request(addr: &SocketAddr, req: &str) -> String {
    String::from_utf8_lossy(&send_request_bytes(addr, req.as_bytes())).into_owned()
}

/// Offset of the response body plus its Content-Length, if the head is
/// complete.
fn head_and_body_len(raw: &[u8]) -> Option<(usize, usize)> {
    let head_end = raw.windows(4).position(|w| w == b"\r\n\r\n")? + 4;
    let head = String::from_utf8_lossy(&raw[..head_end]);
    let body_len = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())?
        })
        .unwrap_or(0);
    Some((head_end, body_len))
}

/// Split a raw response into (head, body) honoring Content-Length.
pub fn split_response(raw: &[u8]) -> (String, Vec<u8>) {
    let (head_end, body_len) = head_and_body_len(raw).expect("complete response head");
    let head = String::from_utf8_lossy(&raw[..head_end]).into_owned();
    let body = raw[head_end..std::cmp::min(raw.len(), head_end + body_len)].to_vec();
    (head, body)
}

/// Header value out of a raw response head, case-insensitive.
pub fn header_value(head: &str, name: &str) -> Option<String> {
    head.lines().find_map(|line| {
        let (header, value) = line.split_once(':')?;
        header
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().to_string())
    })
}
