//! Response assembler with a file-descriptor-backed body.
//!
//! Unlike an in-memory `Vec<u8>` body, the response here holds an open
//! `File` plus a length and a send cursor so `HttpConn::write_socket` can
//! stream it straight to the socket with `sendfile(2)`, no user-space copy
//! of a (possibly large) static asset.

use std::collections::HashMap;
use std::fs::File;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use crate::buffer::ByteBuffer;

fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        _ => "Bad Request",
    }
}

fn normalized_code(code: u16) -> u16 {
    match code {
        200 | 400 | 403 | 404 => code,
        _ => 400,
    }
}

pub fn mime_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        _ => "text/plain",
    }
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub content_complete: bool,
    content_file: Option<File>,
    pub content_len: u64,
    pub content_offset: u64,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpResponse {
    pub fn new() -> Self {
        Self {
            status_code: 200,
            headers: HashMap::new(),
            content_complete: false,
            content_file: None,
            content_len: 0,
            content_offset: 0,
        }
    }

    /// Closes any open file and resets every field. Called at the start of
    /// every response build, per the invariant that `content_fd >= 0 iff
    /// content_complete`.
    pub fn clear(&mut self) {
        self.status_code = 200;
        self.headers.clear();
        self.content_complete = false;
        self.content_file = None;
        self.content_len = 0;
        self.content_offset = 0;
    }

    pub fn set_status(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self
    }

    /// Last-writer-wins.
    pub fn set_header(&mut self, key: &str, value: &str) -> &mut Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    pub fn set_body(&mut self, body: Vec<u8>, content_type: &str) {
        self.set_header("Content-Type", content_type);
        self.set_header("Content-Length", &body.len().to_string());
        self.content_len = body.len() as u64;
        self.content_offset = 0;
        self.content_complete = true;
        self.content_file = Some(write_anon_body(body));
    }

    /// Open `path` read-only and stage it as the body. `false` on failure,
    /// the caller picks a status code (typically 404).
    pub fn set_file_body(&mut self, path: &Path) -> bool {
        let Ok(file) = File::open(path) else {
            return false;
        };
        let Ok(meta) = file.metadata() else {
            return false;
        };
        self.content_len = meta.size();
        self.content_offset = 0;
        self.set_header("Content-Type", mime_type_for(path));
        self.set_header("Content-Length", &self.content_len.to_string());
        self.content_complete = true;
        self.content_file = Some(file);
        true
    }

    pub fn content_fd(&self) -> Option<i32> {
        self.content_file.as_ref().map(std::os::unix::io::AsRawFd::as_raw_fd)
    }

    /// `content_len - content_offset`; doesn't account for unflushed header
    /// bytes still sitting in the connection's write buffer, that's the
    /// connection's job (see `HttpConn::remaining`).
    pub fn body_remaining(&self) -> u64 {
        self.content_len - self.content_offset
    }

    pub fn advance(&mut self, n: u64) {
        self.content_offset += n;
        debug_assert!(self.content_offset <= self.content_len);
    }

    /// Writes `HTTP/1.1 <code> <reason>\r\n`, every header, then the blank
    /// line that ends the head. Unknown status codes collapse to 400.
    pub fn emit_head(&self, out: &mut ByteBuffer) {
        let code = normalized_code(self.status_code);
        out.append(format!("HTTP/1.1 {} {}\r\n", code, status_text(code)).as_bytes());
        for (key, value) in &self.headers {
            out.append(format!("{}: {}\r\n", key, value).as_bytes());
        }
        out.append(b"\r\n");
    }
}

/// Stages an in-memory body as an anonymous file so `write_socket` can use
/// one `sendfile` code path for both static files and generated bodies
/// (error pages, login/register results).
fn write_anon_body(body: Vec<u8>) -> File {
    use std::io::{Seek, SeekFrom, Write};
    let mut file = tempfile_in_memory();
    file.write_all(&body).expect("memfd write");
    file.seek(SeekFrom::Start(0)).expect("memfd seek");
    file
}

#[cfg(target_os = "linux")]
fn tempfile_in_memory() -> File {
    use std::ffi::CString;
    use std::os::unix::io::FromRawFd;
    let name = CString::new("http-response-body").unwrap();
    let fd = unsafe { libc::memfd_create(name.as_ptr(), 0) };
    assert!(fd >= 0, "memfd_create failed: {}", std::io::Error::last_os_error());
    unsafe { File::from_raw_fd(fd) }
}

#[cfg(not(target_os = "linux"))]
fn tempfile_in_memory() -> File {
    // Non-Linux dev builds: a unique unlinked file in the OS temp dir plays
    // the same role (no memfd there).
    let path = std::env::temp_dir().join(format!("http-response-body-{:x}", std::process::id()));
    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .expect("temp response body");
    let _ = std::fs::remove_file(&path);
    file
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_body_marks_complete_and_sets_headers() {
        let mut res = HttpResponse::new();
        res.set_body(b"hello".to_vec(), "text/plain");
        assert!(res.content_complete);
        assert_eq!(res.content_len, 5);
        assert_eq!(res.headers.get("Content-Length").unwrap(), "5");
        assert_eq!(res.headers.get("Content-Type").unwrap(), "text/plain");
    }

    #[test]
    fn clear_drops_the_open_file() {
        let mut res = HttpResponse::new();
        res.set_body(b"x".to_vec(), "text/plain");
        assert!(res.content_fd().is_some());
        res.clear();
        assert!(res.content_fd().is_none());
        assert_eq!(res.content_len, 0);
    }

    #[test]
    fn unknown_status_code_collapses_to_400() {
        let mut res = HttpResponse::new();
        res.set_status(599);
        let mut out = ByteBuffer::with_capacity(256);
        res.emit_head(&mut out);
        let head = String::from_utf8(out.take(out.len())).unwrap();
        assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[test]
    fn mime_type_lookup_covers_common_extensions() {
        assert_eq!(mime_type_for(Path::new("a.html")), "text/html");
        assert_eq!(mime_type_for(Path::new("a.css")), "text/css");
        assert_eq!(mime_type_for(Path::new("a.unknown")), "text/plain");
    }

    #[test]
    fn advance_tracks_the_send_cursor() {
        let mut res = HttpResponse::new();
        res.set_body(vec![0u8; 100], "application/octet-stream");
        res.advance(40);
        assert_eq!(res.body_remaining(), 60);
    }
}
