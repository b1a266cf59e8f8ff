//! The event loop: one I/O thread polling the listener and every
//! connection, a fixed worker pool doing the actual parse/route/respond
//! work, and a min-heap timer evicting idle connections.
//!
//! Grounded on the original's `WebServer::eventLoop_`
//! (`server/webserver.h/.cpp`): accept on listener readiness, hand
//! readable/writable fds to a thread pool via `dealEvent_`, and a timer
//! heap advancing deadlines on every byte read or written.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mio::net::TcpListener;
use mio::{Interest, Registry, Token, Waker};

use crate::conn::{HttpConn, ProcessOutcome};
use crate::config::ServerConfig;
use crate::notifier::Notifier;
use crate::pool::db::SessionPool;
use crate::pool::worker::WorkerPool;
use crate::router::Router;
use crate::timer::{deadline_in, Timer};
use crate::{log_debug, log_info, log_warn};

/// Reserved so it can never collide with a connection token, which is
/// always a raw fd.
const LISTENER_TOKEN: Token = Token(usize::MAX);

/// Reserved for the close-notification `Waker`, distinct from
/// `LISTENER_TOKEN` and from any fd-keyed connection token.
const WAKER_TOKEN: Token = Token(usize::MAX - 1);

/// Hard cap on simultaneous connections, past this, new accepts are
/// answered with a `503` and immediately dropped rather than queued.
const MAX_CONNECTIONS: usize = 65536;

/// Read-only state shared by every handler dispatch, whether it runs on
/// the I/O thread or a worker.
pub struct ServerContext {
    pub src_dir: PathBuf,
    pub db_pool: Option<SessionPool>,
}

pub struct WebServer {
    config: ServerConfig,
    listener: TcpListener,
    notifier: Notifier,
    registry: Arc<Registry>,
    timer: Timer,
    pool: WorkerPool,
    conns: HashMap<usize, Arc<Mutex<HttpConn>>>,
    ctx: Arc<ServerContext>,
    router: Arc<Router>,
    expired: Arc<Mutex<Vec<usize>>>,
    close_tx: Sender<usize>,
    close_rx: Receiver<usize>,
    waker: Arc<Waker>,
}

impl WebServer {
    pub fn new(config: ServerConfig) -> crate::error::Result<Self> {
        let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
        let mut listener = TcpListener::bind(addr)?;

        let notifier = Notifier::new(1024)?;
        notifier.register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        let registry = Arc::new(notifier.try_clone_registry()?);
        let waker = Arc::new(Waker::new(&registry, WAKER_TOKEN)?);

        let db_pool = match SessionPool::connect(
            "127.0.0.1",
            config.sql_port,
            &config.sql_user,
            &config.sql_pwd,
            &config.db_name,
            config.conn_pool_num,
        ) {
            Ok(pool) => Some(pool),
            Err(e) => {
                log_warn!("database pool unavailable, login/register will fail closed: {e}");
                None
            }
        };

        let ctx = Arc::new(ServerContext {
            src_dir: config.src_dir.clone(),
            db_pool,
        });

        let (close_tx, close_rx) = mpsc::channel();

        Ok(Self {
            pool: WorkerPool::new(config.thread_num),
            listener,
            notifier,
            registry,
            timer: Timer::new(),
            conns: HashMap::new(),
            ctx,
            router: Arc::new(Router::new()),
            expired: Arc::new(Mutex::new(Vec::new())),
            close_tx,
            close_rx,
            waker,
            config,
        })
    }

    pub fn run(&mut self) -> crate::error::Result<()> {
        log_info!("listening on 0.0.0.0:{}", self.config.port);
        loop {
            self.drain_closed();

            let timeout_ms = self.timer.next_tick();
            self.drain_expired();

            let events = self
                .notifier
                .wait(timeout_ms.map(Duration::from_millis))?;

            for event in events {
                if event.token == LISTENER_TOKEN {
                    self.accept_loop();
                    continue;
                }
                if event.token == WAKER_TOKEN {
                    // Just a nudge, the pending close is drained at the top
                    // of the next iteration.
                    continue;
                }
                let fd = event.token.0;
                if event.hangup {
                    self.close_connection(fd);
                    continue;
                }
                self.bump_deadline(fd);
                if event.readable {
                    self.dispatch_read(fd);
                } else if event.writable {
                    self.dispatch_write(fd);
                }
            }
        }
    }

    fn accept_loop(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.accept_one(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log_warn!("accept failed: {e}");
                    break;
                }
            }
            if !self.config.listener_edge_triggered() {
                break;
            }
        }
    }

    fn accept_one(&mut self, mut stream: mio::net::TcpStream, peer: SocketAddr) {
        if self.conns.len() >= MAX_CONNECTIONS {
            let _ = io::Write::write_all(
                &mut stream,
                b"HTTP/1.1 503 Service Unavailable\r\nConnection: close\r\nContent-Length: 13\r\n\r\nServer busy!\n",
            );
            return;
        }

        if self.config.opt_linger {
            set_linger(stream.as_raw_fd());
        }

        let fd = stream.as_raw_fd() as usize;
        let token = Token(fd);
        if let Err(e) = self
            .notifier
            .register(&mut stream, token, Interest::READABLE)
        {
            log_warn!("failed to register connection {fd}: {e}");
            return;
        }

        if self.config.timeout_enabled() {
            let expired = self.expired.clone();
            self.timer.add(
                fd,
                deadline_in(self.config.timeout_ms as u64),
                Box::new(move || expired.lock().unwrap().push(fd)),
            );
        }

        let conn = HttpConn::new(stream, peer, self.config.conn_edge_triggered());
        self.conns.insert(fd, Arc::new(Mutex::new(conn)));
        log_debug!("accepted connection {fd} from {peer}");
    }

    fn bump_deadline(&mut self, fd: usize) {
        if self.config.timeout_enabled() {
            self.timer.update(fd, deadline_in(self.config.timeout_ms as u64));
        }
    }

    fn dispatch_read(&mut self, fd: usize) {
        let Some(conn) = self.conns.get(&fd).cloned() else {
            return;
        };
        let registry = self.registry.clone();
        let ctx = self.ctx.clone();
        let router = self.router.clone();
        let close_tx = self.close_tx.clone();
        let waker = self.waker.clone();
        self.pool
            .submit(move || on_read(conn, fd, &registry, &ctx, &router, &close_tx, &waker));
    }

    fn dispatch_write(&mut self, fd: usize) {
        let Some(conn) = self.conns.get(&fd).cloned() else {
            return;
        };
        let registry = self.registry.clone();
        let close_tx = self.close_tx.clone();
        let waker = self.waker.clone();
        self.pool
            .submit(move || on_write(conn, fd, &registry, &close_tx, &waker));
    }

    fn drain_closed(&mut self) {
        while let Ok(fd) = self.close_rx.try_recv() {
            self.close_connection(fd);
        }
    }

    fn drain_expired(&mut self) {
        let ids: Vec<usize> = std::mem::take(&mut *self.expired.lock().unwrap());
        for fd in ids {
            log_debug!("connection {fd} idle-timed out");
            self.close_connection(fd);
        }
    }

    /// Only the I/O thread ever erases from the connection table, the
    /// single-writer invariant spec.md §5 calls for.
    fn close_connection(&mut self, fd: usize) {
        if let Some(conn) = self.conns.remove(&fd) {
            self.timer.remove(fd);
            let mut c = conn.lock().unwrap();
            let _ = self.notifier.deregister(&mut c.stream);
        }
    }
}

/// Posts `fd` to the I/O thread's close queue and wakes it out of
/// `notifier.wait()` so the close is drained without waiting for the idle
/// timer (or, with no timer, waiting forever).
fn signal_close(close_tx: &Sender<usize>, waker: &Waker, fd: usize) {
    let _ = close_tx.send(fd);
    let _ = waker.wake();
}

/// Runs on a worker thread: drain the socket, advance the request/response
/// state machine as far as buffered bytes allow, then re-arm the fd for
/// whatever it's waiting on next.
fn on_read(
    conn: Arc<Mutex<HttpConn>>,
    fd: usize,
    registry: &Registry,
    ctx: &ServerContext,
    router: &Router,
    close_tx: &Sender<usize>,
    waker: &Waker,
) {
    let mut c = conn.lock().unwrap();
    match c.read_socket() {
        Ok(true) => {
            drop(c);
            signal_close(close_tx, waker, fd);
            return;
        }
        Ok(false) => {}
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
        Err(_) => {
            drop(c);
            signal_close(close_tx, waker, fd);
            return;
        }
    }
    c.touch();

    match c.process(ctx, router) {
        ProcessOutcome::Done => {
            let _ = registry.reregister(&mut c.stream, Token(fd), Interest::WRITABLE);
        }
        ProcessOutcome::NeedMore => {
            let _ = registry.reregister(&mut c.stream, Token(fd), Interest::READABLE);
        }
        ProcessOutcome::Fail => {
            drop(c);
            signal_close(close_tx, waker, fd);
        }
    }
}

/// Runs on a worker thread: flush whatever of the response is left, then
/// either re-arm for a pipelined next request (keep-alive) or signal the
/// I/O thread to close the connection.
fn on_write(
    conn: Arc<Mutex<HttpConn>>,
    fd: usize,
    registry: &Registry,
    close_tx: &Sender<usize>,
    waker: &Waker,
) {
    let mut c = conn.lock().unwrap();
    if c.write_socket().is_err() {
        drop(c);
        signal_close(close_tx, waker, fd);
        return;
    }
    c.touch();

    if c.remaining() > 0 {
        let _ = registry.reregister(&mut c.stream, Token(fd), Interest::WRITABLE);
        return;
    }

    if c.keep_alive {
        c.response.clear();
        let _ = registry.reregister(&mut c.stream, Token(fd), Interest::READABLE);
    } else {
        drop(c);
        signal_close(close_tx, waker, fd);
    }
}

fn set_linger(fd: i32) {
    let linger = libc::linger {
        l_onoff: 1,
        l_linger: 1,
    };
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_LINGER,
            &linger as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::linger>() as libc::socklen_t,
        );
    }
}
