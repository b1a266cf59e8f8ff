//! Incremental HTTP/1.1 request parser.
//!
//! Drives `REQUEST_LINE -> HEADERS -> BODY -> FINISH`, with a terminal
//! `INVALID` on any malformed line. `parse` is safe to call repeatedly as
//! bytes trickle in from the socket: it only ever consumes whole lines from
//! the front of the buffer, so a partial line is left untouched for the
//! next call.

use std::collections::HashMap;
use std::fmt;

use crate::buffer::ByteBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl std::str::FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsingState {
    RequestLine,
    Headers,
    Body,
    Finish,
    Invalid,
}

#[derive(Debug)]
pub struct HttpRequest {
    pub state: ParsingState,
    pub method: Method,
    pub url: String,
    pub version: String,
    /// Case-sensitive, as received. See spec.md §9 on the
    /// `Connection: keep-alive` casing open question.
    pub headers: HashMap<String, String>,
    pub post: HashMap<String, String>,
    pub content_expected: usize,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequest {
    pub fn new() -> Self {
        Self {
            state: ParsingState::RequestLine,
            method: Method::Get,
            url: String::new(),
            version: String::new(),
            headers: HashMap::new(),
            post: HashMap::new(),
            content_expected: 0,
        }
    }

    pub fn clear(&mut self) {
        self.state = ParsingState::RequestLine;
        self.url.clear();
        self.version.clear();
        self.headers.clear();
        self.post.clear();
        self.content_expected = 0;
    }

    /// Consume whole CRLF-delimited lines from `buf`, advancing the state
    /// machine as far as the available bytes allow. Returns `true` iff the
    /// request line and headers are fully parsed (state is `Body` or
    /// later); `false` means either more bytes are needed or the request
    /// is `Invalid` (check `self.state` to tell the two apart).
    pub fn parse(&mut self, buf: &mut ByteBuffer) -> bool {
        loop {
            match self.state {
                ParsingState::RequestLine => {
                    let Some(line) = buf.take_until(b"\r\n") else {
                        return false;
                    };
                    if self.parse_request_line(&line) {
                        self.state = ParsingState::Headers;
                    } else {
                        self.state = ParsingState::Invalid;
                        return false;
                    }
                }
                ParsingState::Headers => {
                    let Some(line) = buf.take_until(b"\r\n") else {
                        return false;
                    };
                    if line == b"\r\n" {
                        self.content_expected = self
                            .headers
                            .get("Content-Length")
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(0);
                        self.state = ParsingState::Body;
                        return true;
                    }
                    if !self.parse_header_line(&line) {
                        self.state = ParsingState::Invalid;
                        return false;
                    }
                }
                ParsingState::Body | ParsingState::Finish => return true,
                ParsingState::Invalid => return false,
            }
        }
    }

    fn parse_request_line(&mut self, line: &[u8]) -> bool {
        let Ok(text) = std::str::from_utf8(line) else {
            return false;
        };
        let text = text.trim_end_matches(['\r', '\n']);
        let mut parts = text.split(' ');
        let (Some(method), Some(url), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return false;
        };
        let Ok(method) = method.parse::<Method>() else {
            return false;
        };
        let Some(version) = version.strip_prefix("HTTP/") else {
            return false;
        };
        if url.is_empty() || !url.starts_with('/') {
            return false;
        }
        self.method = method;
        self.url = url.to_string();
        self.version = version.to_string();
        true
    }

    fn parse_header_line(&mut self, line: &[u8]) -> bool {
        let Ok(text) = std::str::from_utf8(line) else {
            return false;
        };
        let text = text.trim_end_matches(['\r', '\n']);
        let Some((name, value)) = text.split_once(':') else {
            return false;
        };
        if name.is_empty() {
            return false;
        }
        self.headers
            .insert(name.to_string(), value.trim_start().to_string());
        true
    }

    /// Take exactly `content_expected` bytes of body out of `buf`, if
    /// they've all arrived. Doesn't touch the buffer otherwise.
    pub fn take_body(&mut self, buf: &mut ByteBuffer) -> Option<Vec<u8>> {
        if buf.len() < self.content_expected {
            return None;
        }
        Some(buf.take(self.content_expected))
    }

    /// Decode an `application/x-www-form-urlencoded` body into `self.post`,
    /// gated on the full `Content-Length` having arrived. Returns `false`
    /// both when more bytes are needed and when decoding fails (check
    /// `self.state`, `Invalid` means the latter).
    pub fn parse_urlencoded(&mut self, buf: &mut ByteBuffer) -> bool {
        let Some(body) = self.take_body(buf) else {
            return false;
        };
        match decode_urlencoded(&body) {
            Some(fields) => {
                self.post = fields;
                self.state = ParsingState::Finish;
                true
            }
            None => {
                self.state = ParsingState::Invalid;
                false
            }
        }
    }
}

fn decode_urlencoded(body: &[u8]) -> Option<HashMap<String, String>> {
    let mut fields = HashMap::new();
    if body.is_empty() {
        return Some(fields);
    }
    for pair in body.split(|&b| b == b'&') {
        let mut it = pair.splitn(2, |&b| b == b'=');
        let key = it.next().unwrap_or(b"");
        let value = it.next().unwrap_or(b"");
        fields.insert(url_decode(key)?, url_decode(value)?);
    }
    Some(fields)
}

fn url_decode(bytes: &[u8]) -> Option<String> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let hi = *bytes.get(i + 1)?;
                let lo = *bytes.get(i + 2)?;
                let byte = (hex_digit(hi)? << 4) | hex_digit(lo)?;
                out.push(byte);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(req: &mut HttpRequest, buf: &mut ByteBuffer, bytes: &[u8]) -> bool {
        buf.append(bytes);
        req.parse(buf)
    }

    #[test]
    fn parses_a_simple_get_request() {
        let mut req = HttpRequest::new();
        let mut buf = ByteBuffer::with_capacity(256);
        let done = feed(
            &mut req,
            &mut buf,
            b"GET /index.html HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
        );
        assert!(done);
        assert_eq!(req.state, ParsingState::Body);
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.url, "/index.html");
        assert_eq!(req.version, "1.1");
        assert_eq!(req.headers.get("Host").unwrap(), "x");
        assert_eq!(req.content_expected, 0);
    }

    #[test]
    fn chunked_arrival_yields_identical_result() {
        let raw = b"POST /login HTTP/1.1\r\nContent-Length: 9\r\n\r\nname=bob1";
        let mut req = HttpRequest::new();
        let mut buf = ByteBuffer::with_capacity(256);
        let mut done = false;
        for byte in raw {
            buf.append(&[*byte]);
            if req.parse(&mut buf) {
                done = true;
                break;
            }
        }
        assert!(done);
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.content_expected, 9);
        let body = req.take_body(&mut buf).unwrap();
        assert_eq!(body, b"name=bob1");
    }

    #[test]
    fn malformed_request_line_is_invalid_and_terminal() {
        let mut req = HttpRequest::new();
        let mut buf = ByteBuffer::with_capacity(64);
        buf.append(b"GARBAGE\r\n");
        assert!(!req.parse(&mut buf));
        assert_eq!(req.state, ParsingState::Invalid);
        buf.append(b"more garbage\r\n");
        assert!(!req.parse(&mut buf));
        assert_eq!(req.state, ParsingState::Invalid);
    }

    #[test]
    fn partial_request_line_asks_for_more() {
        let mut req = HttpRequest::new();
        let mut buf = ByteBuffer::with_capacity(64);
        buf.append(b"GET /x ");
        assert!(!req.parse(&mut buf));
        assert_eq!(req.state, ParsingState::RequestLine);
    }

    #[test]
    fn parses_urlencoded_body() {
        let mut req = HttpRequest::new();
        let mut buf = ByteBuffer::with_capacity(256);
        let body = b"username=alice&password=se%20cret";
        req.content_expected = body.len();
        req.state = ParsingState::Body;
        buf.append(body);
        assert!(req.parse_urlencoded(&mut buf));
        assert_eq!(req.post.get("username").unwrap(), "alice");
        assert_eq!(req.post.get("password").unwrap(), "se cret");
        assert_eq!(req.state, ParsingState::Finish);
    }

    #[test]
    fn invalid_percent_escape_aborts_to_invalid() {
        let mut req = HttpRequest::new();
        let mut buf = ByteBuffer::with_capacity(64);
        let body = b"a=%zz";
        req.content_expected = body.len();
        req.state = ParsingState::Body;
        buf.append(body);
        assert!(!req.parse_urlencoded(&mut buf));
        assert_eq!(req.state, ParsingState::Invalid);
    }

    #[test]
    fn clear_resets_to_request_line() {
        let mut req = HttpRequest::new();
        let mut buf = ByteBuffer::with_capacity(64);
        feed(&mut req, &mut buf, b"GET / HTTP/1.1\r\n\r\n");
        req.clear();
        assert_eq!(req.state, ParsingState::RequestLine);
        assert!(req.headers.is_empty());
    }
}
