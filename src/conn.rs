//! Per-connection state: the socket, its read/write buffers, the in-flight
//! request/response, and the keep-alive decision between them.
//!
//! Grounded on the original's `HttpConn` (`http/httpconn.h/.cpp`): one
//! instance per accepted fd, read and written by whichever worker the
//! readiness notifier currently hands it to, serialized here by the
//! `Mutex` the connection table wraps it in rather than by a raw
//! `EPOLLONESHOT` flag (see DESIGN.md).

use std::io;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::time::Instant;

use mio::net::TcpStream;

use crate::buffer::ByteBuffer;
use crate::http::{HttpRequest, HttpResponse, ParsingState};
use crate::router::{HandlerKind, HandlerResult, Router};
use crate::sendfile;
use crate::server::ServerContext;

/// Above this many buffered bytes still to write, a level-triggered
/// connection keeps writing instead of yielding back to the poller.
/// Mirrors the original's `isET || toWriteBytes() > 10240` write loop
/// condition.
const WRITE_DRAIN_THRESHOLD: u64 = 10 * 1024;

pub enum ProcessOutcome {
    /// A full response is staged in `write_buf`/`response`.
    Done,
    /// The request is incomplete; wait for more bytes.
    NeedMore,
    /// The request is malformed; close the connection.
    Fail,
}

pub struct HttpConn {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub read_buf: ByteBuffer,
    pub write_buf: ByteBuffer,
    pub request: HttpRequest,
    pub response: HttpResponse,
    handler: Option<HandlerKind>,
    pub keep_alive: bool,
    edge_triggered: bool,
    pub last_activity: Instant,
}

impl HttpConn {
    pub fn new(stream: TcpStream, peer: SocketAddr, edge_triggered: bool) -> Self {
        Self {
            stream,
            peer,
            read_buf: ByteBuffer::with_capacity(4096),
            write_buf: ByteBuffer::with_capacity(1024),
            request: HttpRequest::new(),
            response: HttpResponse::new(),
            handler: None,
            keep_alive: false,
            edge_triggered,
            last_activity: Instant::now(),
        }
    }

    pub fn fd(&self) -> i32 {
        self.stream.as_raw_fd()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Drains the socket into `read_buf`. Loops until `WouldBlock`. Under
    /// mio's always-edge-triggered notifier (see DESIGN.md) this is the
    /// only read strategy that can't lose a readiness edge, regardless of
    /// the configured trigger mode. Returns `Ok(true)` on a clean EOF.
    pub fn read_socket(&mut self) -> io::Result<bool> {
        loop {
            match self.read_buf.read_from(&mut self.stream) {
                Ok(0) => return Ok(true),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) => return Err(e),
            }
        }
    }

    /// Parses as much of the buffered request as possible, resolves and
    /// runs its handler, and stages the response head once a handler
    /// reports completion. Leaves `self.request`/`self.handler` primed to
    /// resume on the next call when more bytes are still needed.
    pub fn process(&mut self, ctx: &ServerContext, router: &Router) -> ProcessOutcome {
        if self.read_buf.is_empty() && self.handler.is_none() {
            return ProcessOutcome::NeedMore;
        }

        if self.handler.is_none() {
            let request = &mut self.request;
            let read_buf = &mut self.read_buf;
            if !request.parse(read_buf) {
                return match request.state {
                    ParsingState::Invalid => ProcessOutcome::Fail,
                    _ => ProcessOutcome::NeedMore,
                };
            }
            self.response.clear();
            self.handler = Some(router.resolve(&self.request, &ctx.src_dir));
        }

        let kind = self.handler.clone().expect("set above");
        match router.dispatch(kind, self, ctx) {
            HandlerResult::NeedMore => ProcessOutcome::NeedMore,
            HandlerResult::Fail => ProcessOutcome::Fail,
            HandlerResult::Done => {
                self.finalize_connection_header();
                self.response.emit_head(&mut self.write_buf);
                self.handler = None;
                self.request.clear();
                ProcessOutcome::Done
            }
        }
    }

    /// Exact, case-sensitive `Connection: keep-alive` on HTTP/1.1. The
    /// original's literal `strcasecmp`-free comparison, preserved rather
    /// than "fixed" into a case-insensitive one (spec.md §9).
    fn finalize_connection_header(&mut self) {
        self.keep_alive = self.request.version == "1.1"
            && self
                .request
                .headers
                .get("Connection")
                .is_some_and(|v| v == "keep-alive");
        if self.keep_alive {
            self.response.set_header("Connection", "keep-alive");
            self.response.set_header("keep-alive", "max=6, timeout=120");
        } else {
            self.response.set_header("Connection", "close");
        }
    }

    /// Unflushed header bytes plus whatever of the response body hasn't
    /// gone out yet.
    pub fn remaining(&self) -> u64 {
        self.write_buf.len() as u64 + self.response.body_remaining()
    }

    /// Flushes `write_buf`, then `sendfile`s the response body. Loops
    /// while edge-triggered or while more than `WRITE_DRAIN_THRESHOLD`
    /// bytes remain, so a small response can be fully sent in one wake.
    pub fn write_socket(&mut self) -> io::Result<()> {
        loop {
            if !self.write_buf.is_empty() {
                match io::Write::write(&mut self.stream, self.write_buf.as_slice()) {
                    Ok(0) => return Ok(()),
                    Ok(n) => self.write_buf.consume(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                    Err(e) => return Err(e),
                }
            } else if self.response.body_remaining() > 0 {
                let Some(fd) = self.response.content_fd() else {
                    return Ok(());
                };
                let want = self.response.body_remaining().min(usize::MAX as u64) as usize;
                match sendfile::send_file(fd, self.fd(), self.response.content_offset, want) {
                    Ok(0) => return Ok(()),
                    Ok(n) => self.response.advance(n as u64),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                    Err(e) => return Err(e),
                }
            } else {
                return Ok(());
            }

            if !self.edge_triggered && self.remaining() <= WRITE_DRAIN_THRESHOLD {
                return Ok(());
            }
        }
    }
}
