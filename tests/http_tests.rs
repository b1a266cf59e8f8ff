//! Wire-level request/response behavior not already exercised by the
//! `#[cfg(test)]` modules in `src/http/request.rs` and `src/http/response.rs`:
//! multi-header requests, a full header-map round trip, and the exact bytes
//! `emit_head` produces for a real file body.

use std::io::Write as _;

use server_proxy::buffer::ByteBuffer;
use server_proxy::http::{HttpRequest, HttpResponse, Method, ParsingState};

#[test]
fn parses_a_post_with_several_headers_and_a_body() {
    let mut req = HttpRequest::new();
    let mut buf = ByteBuffer::with_capacity(256);
    buf.append(
        b"POST /login HTTP/1.1\r\n\
          Host: localhost\r\n\
          Content-Type: application/x-www-form-urlencoded\r\n\
          Content-Length: 27\r\n\
          Connection: keep-alive\r\n\
          \r\n\
          username=alice&password=hi",
    );

    assert!(req.parse(&mut buf));
    assert_eq!(req.state, ParsingState::Body);
    assert_eq!(req.method, Method::Post);
    assert_eq!(req.version, "1.1");
    assert_eq!(req.headers.get("Host").unwrap(), "localhost");
    assert_eq!(req.headers.get("Connection").unwrap(), "keep-alive");
    assert_eq!(req.content_expected, 27);

    assert!(req.parse_urlencoded(&mut buf));
    assert_eq!(req.post.get("username").unwrap(), "alice");
    assert_eq!(req.post.get("password").unwrap(), "hi");
}

#[test]
fn bytes_arriving_one_at_a_time_parse_identically_to_one_shot() {
    let raw: &[u8] = b"GET /a HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n";

    let mut whole_req = HttpRequest::new();
    let mut whole_buf = ByteBuffer::with_capacity(128);
    whole_buf.append(raw);
    assert!(whole_req.parse(&mut whole_buf));

    let mut trickle_req = HttpRequest::new();
    let mut trickle_buf = ByteBuffer::with_capacity(128);
    let mut done = false;
    for byte in raw {
        trickle_buf.append(&[*byte]);
        if trickle_req.parse(&mut trickle_buf) {
            done = true;
        }
    }
    assert!(done);
    assert_eq!(whole_req.method, trickle_req.method);
    assert_eq!(whole_req.url, trickle_req.url);
    assert_eq!(whole_req.version, trickle_req.version);
    assert_eq!(whole_req.headers, trickle_req.headers);
}

#[test]
fn emit_head_round_trips_a_real_file_body() {
    let dir = std::env::temp_dir().join(format!(
        "server_proxy-http-test-{}-{:?}",
        std::process::id(),
        std::thread::current().id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("page.html");
    std::fs::File::create(&path)
        .unwrap()
        .write_all(b"<html></html>")
        .unwrap();

    let mut res = HttpResponse::new();
    assert!(res.set_file_body(&path));
    res.set_status(200);

    let mut out = ByteBuffer::with_capacity(256);
    res.emit_head(&mut out);
    let head = String::from_utf8(out.take(out.len())).unwrap();

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("Content-Type: text/html\r\n"));
    assert!(head.contains("Content-Length: 13\r\n"));
    assert!(head.ends_with("\r\n\r\n"));
    assert_eq!(res.body_remaining(), 13);

    let _ = std::fs::remove_dir_all(&dir);
}
