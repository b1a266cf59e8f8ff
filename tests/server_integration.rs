//! End-to-end scenarios against a real `WebServer` over a real TCP socket,
//! static GET, 404, keep-alive reuse, idle eviction, and a request fed one
//! byte at a time. Mirrors the S1/S2/S5/S6/S7 scenarios from the design doc.
//!
//! The DB pool is expected to be unreachable in this environment;
//! `WebServer::new` logs a warning and continues with `db_pool: None`, which
//! is fine since none of these scenarios touch `/login` or `/register`.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::Duration;

use server_proxy::config::ServerConfig;
use server_proxy::server::WebServer;

static NEXT_PORT: AtomicU16 = AtomicU16::new(19200);

fn next_port() -> u16 {
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

fn temp_resources(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("server_proxy-e2e-{name}"));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("index.html"), b"<html>home</html>").unwrap();
    std::fs::write(dir.join("404.html"), b"<html>missing</html>").unwrap();
    dir
}

/// Spawns a server on its own thread and gives it time to bind before
/// returning the port. The thread is never joined, `run()` loops forever
/// by design, and the process exits at the end of the test binary.
fn spawn_server(src_dir: PathBuf, timeout_ms: i64) -> u16 {
    let port = next_port();
    let config = ServerConfig {
        port,
        trig_mode: 3,
        timeout_ms,
        opt_linger: false,
        sql_port: 3306,
        sql_user: "root".to_string(),
        sql_pwd: "root".to_string(),
        db_name: "webserver".to_string(),
        conn_pool_num: 1,
        thread_num: 2,
        open_log: false,
        log_level: 0,
        log_que_size: 0,
        src_dir,
    };

    thread::spawn(move || {
        let mut server = WebServer::new(config).expect("server constructs");
        server.run().expect("server runs");
    });

    thread::sleep(Duration::from_millis(300));
    port
}

fn connect(port: u16) -> TcpStream {
    let stream = TcpStream::connect(("127.0.0.1", port)).expect("connect to test server");
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
}

#[test]
fn s1_static_get_returns_the_file_body() {
    let dir = temp_resources("s1");
    let port = spawn_server(dir, 60_000);
    let mut stream = connect(port);

    stream
        .write_all(b"GET /index.html HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("Content-Type: text/html\r\n"));
    assert!(text.ends_with("<html>home</html>"));
}

#[test]
fn s2_unknown_url_returns_404_page() {
    let dir = temp_resources("s2");
    let port = spawn_server(dir, 60_000);
    let mut stream = connect(port);

    stream
        .write_all(b"GET /nope HTTP/1.1\r\nConnection: close\r\n\r\n")
        .unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(text.ends_with("<html>missing</html>"));
}

#[test]
fn s5_keep_alive_serves_two_requests_on_one_connection() {
    let dir = temp_resources("s5");
    let port = spawn_server(dir, 60_000);
    let mut stream = connect(port);

    let request = b"GET /index.html HTTP/1.1\r\nConnection: keep-alive\r\n\r\n";
    stream.write_all(request).unwrap();

    let mut buf = [0u8; 4096];
    let n1 = stream.read(&mut buf).unwrap();
    let first = String::from_utf8_lossy(&buf[..n1]).to_string();
    assert!(first.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(first.contains("Connection: keep-alive\r\n"));

    // The connection must still be alive for a second request.
    stream.write_all(request).unwrap();
    let n2 = stream.read(&mut buf).unwrap();
    let second = String::from_utf8_lossy(&buf[..n2]).to_string();
    assert!(second.starts_with("HTTP/1.1 200 OK\r\n"));
}

#[test]
fn s6_idle_connection_is_evicted_after_the_timeout() {
    let dir = temp_resources("s6");
    let port = spawn_server(dir, 150);
    let mut stream = connect(port);

    // Send nothing; wait past the idle timeout.
    thread::sleep(Duration::from_millis(600));

    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0, "server should have closed the idle connection");
}

#[test]
fn s7_request_fed_one_byte_at_a_time_still_parses() {
    let dir = temp_resources("s7");
    let port = spawn_server(dir, 60_000);
    let mut stream = connect(port);

    let request = b"GET /index.html HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n";
    for byte in request {
        stream.write_all(&[*byte]).unwrap();
        thread::sleep(Duration::from_millis(2));
    }

    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.ends_with("<html>home</html>"));
}
