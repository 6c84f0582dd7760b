mod common;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use common::{
    header_value, read_response, send_request, send_request_bytes, split_response, start_server,
};

#[test]
fn echo_round_trip() {
    let (handle, addr) = start_server("port 0;\nlocation /echo EchoHandler {}\n");

    let raw = send_request_bytes(&addr, b"GET /echo/ HTTP/1.1\r\nHost: h\r\n\r\n");
    let (head, body) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(header_value(&head, "content-type").as_deref(), Some("text/plain"));
    assert!(String::from_utf8_lossy(&body).starts_with("GET /echo/ HTTP/1.1"));

    handle.stop();
}

#[test]
fn static_file_serving() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("index.html"), "<h1>Hi</h1>").unwrap();
    let config = format!(
        "port 0;\nlocation /s StaticHandler {{ root {}; }}\n",
        root.path().display()
    );
    let (handle, addr) = start_server(&config);

    let raw = send_request_bytes(&addr, b"GET /s/index.html HTTP/1.1\r\nHost: h\r\n\r\n");
    let (head, body) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(header_value(&head, "content-type").as_deref(), Some("text/html"));
    assert_eq!(body, b"<h1>Hi</h1>");

    let res = send_request(&addr, "GET /s/missing HTTP/1.1\r\nHost: h\r\n\r\n");
    assert!(res.starts_with("HTTP/1.1 404"));

    let res = send_request(&addr, "GET /s/../etc/passwd HTTP/1.1\r\nHost: h\r\n\r\n");
    assert!(res.starts_with("HTTP/1.1 404"));

    handle.stop();
}

#[test]
fn unmatched_target_is_404() {
    let (handle, addr) = start_server("port 0;\nlocation /echo EchoHandler {}\n");
    let res = send_request(&addr, "GET /nothing/here HTTP/1.1\r\nHost: h\r\n\r\n");
    assert!(res.starts_with("HTTP/1.1 404"));
    assert!(res.contains("404 Not Found"));
    handle.stop();
}

#[test]
fn config_without_routes_answers_404_everywhere() {
    let (handle, addr) = start_server("port 0;\n");
    for target in ["/", "/echo", "/anything/else"] {
        let res = send_request(&addr, &format!("GET {target} HTTP/1.1\r\nHost: h\r\n\r\n"));
        assert!(res.starts_with("HTTP/1.1 404"), "expected 404 for {target}");
    }
    handle.stop();
}

#[test]
fn health_endpoint_answers_ok() {
    let (handle, addr) = start_server("port 0;\nlocation /health HealthRequestHandler {}\n");
    let raw = send_request_bytes(&addr, b"GET /health HTTP/1.1\r\nHost: h\r\n\r\n");
    let (head, body) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"OK");
    handle.stop();
}

#[test]
fn malformed_request_gets_400_and_close() {
    let (handle, addr) = start_server("port 0;\nlocation /echo EchoHandler {}\n");

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_millis(2000)))
        .unwrap();
    stream.write_all(b"GARBAGE\r\n\r\n").unwrap();

    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response);
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 400"));
    assert!(text.to_lowercase().contains("connection: close"));
    // read_to_end returning means the server closed the connection.

    handle.stop();
}

#[test]
fn keep_alive_serves_sequential_requests_on_one_connection() {
    let (handle, addr) = start_server("port 0;\nlocation /health HealthRequestHandler {}\n");

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_millis(2000)))
        .unwrap();

    for _ in 0..2 {
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: h\r\n\r\n")
            .unwrap();
        let raw = read_response(&mut stream);
        let (head, body) = split_response(&raw);
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(body, b"OK");
    }

    // Now ask for close; the server should drop the connection after.
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n")
        .unwrap();
    let mut rest = Vec::new();
    let _ = stream.read_to_end(&mut rest);
    assert!(String::from_utf8_lossy(&rest).starts_with("HTTP/1.1 200 OK"));

    handle.stop();
}

#[test]
fn http10_defaults_to_close() {
    let (handle, addr) = start_server("port 0;\nlocation /health HealthRequestHandler {}\n");

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_millis(2000)))
        .unwrap();
    stream
        .write_all(b"GET /health HTTP/1.0\r\nHost: h\r\n\r\n")
        .unwrap();
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response);
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.0 200 OK"));

    handle.stop();
}

#[test]
fn gzip_is_negotiated_for_large_bodies() {
    use flate2::read::GzDecoder;

    let root = tempfile::tempdir().unwrap();
    let contents = "portico ".repeat(512);
    std::fs::write(root.path().join("big.txt"), &contents).unwrap();
    let config = format!(
        "port 0;\nlocation /s StaticHandler {{ root {}; }}\n",
        root.path().display()
    );
    let (handle, addr) = start_server(&config);

    let raw = send_request_bytes(
        &addr,
        b"GET /s/big.txt HTTP/1.1\r\nHost: h\r\nAccept-Encoding: gzip\r\n\r\n",
    );
    let (head, body) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(header_value(&head, "content-encoding").as_deref(), Some("gzip"));
    let advertised: usize = header_value(&head, "content-length").unwrap().parse().unwrap();
    assert_eq!(advertised, body.len());

    let mut decoder = GzDecoder::new(body.as_slice());
    let mut decompressed = String::new();
    decoder.read_to_string(&mut decompressed).unwrap();
    assert_eq!(decompressed, contents);

    // Without the header the body comes back identity-encoded.
    let raw = send_request_bytes(&addr, b"GET /s/big.txt HTTP/1.1\r\nHost: h\r\n\r\n");
    let (head, body) = split_response(&raw);
    assert!(header_value(&head, "content-encoding").is_none());
    assert_eq!(body.len(), contents.len());

    handle.stop();
}

#[test]
fn sleeping_handler_does_not_stall_other_connections() {
    let config = "port 0;\nlocation /sleep SleepHandler { delay_ms 2000; }\nlocation /echo EchoHandler {}\n";
    let (handle, addr) = start_server(config);

    let sleeper = std::thread::spawn(move || {
        let started = Instant::now();
        let res = send_request(&addr, "GET /sleep HTTP/1.1\r\nHost: h\r\n\r\n");
        (res, started.elapsed())
    });

    // Give the sleep request a head start, then race an echo past it.
    std::thread::sleep(Duration::from_millis(200));
    let started = Instant::now();
    let res = send_request(&addr, "GET /echo/x HTTP/1.1\r\nHost: h\r\n\r\n");
    let echo_latency = started.elapsed();
    assert!(res.starts_with("HTTP/1.1 200 OK"));
    assert!(
        echo_latency < Duration::from_millis(1000),
        "echo took {echo_latency:?} while sleep was in flight"
    );

    let (sleep_res, sleep_latency) = sleeper.join().unwrap();
    assert!(sleep_res.starts_with("HTTP/1.1 200 OK"));
    assert!(sleep_res.ends_with("Slept"));
    assert!(sleep_latency >= Duration::from_millis(2000));

    handle.stop();
}

#[test]
fn crud_lifecycle_over_http() {
    let data = tempfile::tempdir().unwrap();
    let config = format!(
        "port 0;\nlocation /c CrudHandler {{ data_path {}; }}\n",
        data.path().display()
    );
    let (handle, addr) = start_server(&config);

    let post = "POST /c/Shoes HTTP/1.1\r\nHost: h\r\nContent-Type: application/json\r\nContent-Length: 13\r\n\r\n{\"brand\":\"N\"}";
    let raw = send_request_bytes(&addr, post.as_bytes());
    let (head, body) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 201"));
    assert_eq!(header_value(&head, "location").as_deref(), Some("/c/Shoes/1"));
    assert_eq!(body, b"{\"id\":1}");

    let raw = send_request_bytes(&addr, b"GET /c/Shoes HTTP/1.1\r\nHost: h\r\n\r\n");
    let (_, body) = split_response(&raw);
    assert_eq!(body, b"[\"1\"]");

    let put = "PUT /c/Shoes/1 HTTP/1.1\r\nHost: h\r\nContent-Type: application/json\r\nContent-Length: 13\r\n\r\n{\"brand\":\"A\"}";
    let res = send_request(&addr, put);
    assert!(res.starts_with("HTTP/1.1 204"));

    let raw = send_request_bytes(&addr, b"GET /c/Shoes/1 HTTP/1.1\r\nHost: h\r\n\r\n");
    let (_, body) = split_response(&raw);
    assert_eq!(body, b"{\"brand\":\"A\"}");

    let res = send_request(&addr, "DELETE /c/Shoes/1 HTTP/1.1\r\nHost: h\r\n\r\n");
    assert!(res.starts_with("HTTP/1.1 204"));

    let res = send_request(&addr, "GET /c/Shoes/1 HTTP/1.1\r\nHost: h\r\n\r\n");
    assert!(res.starts_with("HTTP/1.1 404"));

    handle.stop();
}

#[test]
fn markdown_conditional_get_over_http() {
    let docs = tempfile::tempdir().unwrap();
    std::fs::write(docs.path().join("a.md"), "# Alpha\n").unwrap();
    let template = docs.path().join("page.html");
    std::fs::write(&template, "<main>{{content}}</main>").unwrap();
    let config = format!(
        "port 0;\nlocation /docs MarkdownHandler {{ root {}; template {}; }}\n",
        docs.path().display(),
        template.display()
    );
    let (handle, addr) = start_server(&config);

    let raw = send_request_bytes(&addr, b"GET /docs/a.md HTTP/1.1\r\nHost: h\r\n\r\n");
    let (head, body) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    let etag = header_value(&head, "etag").unwrap();
    assert!(String::from_utf8_lossy(&body).contains("<main>"));

    let conditional = format!("GET /docs/a.md HTTP/1.1\r\nHost: h\r\nIf-None-Match: {etag}\r\n\r\n");
    let raw = send_request_bytes(&addr, conditional.as_bytes());
    let (head, body) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 304"));
    assert!(body.is_empty());

    let raw = send_request_bytes(&addr, b"GET /docs HTTP/1.1\r\nHost: h\r\n\r\n");
    let (head, _) = split_response(&raw);
    assert!(head.starts_with("HTTP/1.1 301"));
    assert_eq!(header_value(&head, "location").as_deref(), Some("/docs/"));

    handle.stop();
}

#[test]
fn longest_prefix_routing_over_http() {
    let (handle, addr) = start_server(
        "port 0;\nlocation /api EchoHandler {}\nlocation /api/health HealthRequestHandler {}\n",
    );

    let raw = send_request_bytes(&addr, b"GET /api/health HTTP/1.1\r\nHost: h\r\n\r\n");
    let (_, body) = split_response(&raw);
    assert_eq!(body, b"OK");

    let raw = send_request_bytes(&addr, b"GET /api/other HTTP/1.1\r\nHost: h\r\n\r\n");
    let (_, body) = split_response(&raw);
    assert!(String::from_utf8_lossy(&body).starts_with("GET /api/other"));

    handle.stop();
}
