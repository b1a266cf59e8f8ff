//! Thin wrapper over the OS readiness notifier (epoll, via `mio::Poll`).
//!
//! Mirrors the original's `Epoller`: register/modify/remove a raw fd's
//! interest set, block for readiness with a timeout, and hand back a flat
//! list of `(token, readable, writable, hangup)` per ready event.

use mio::event::Source;
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::time::Duration;

pub struct Notifier {
    poll: Poll,
    events: Events,
}

#[derive(Debug, Clone, Copy)]
pub struct Readiness {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    /// RDHUP/HUP/ERR, the peer is gone or the fd is broken.
    pub hangup: bool,
}

impl Notifier {
    pub fn new(capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(capacity),
        })
    }

    pub fn register<S: Source + ?Sized>(
        &self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll.registry().register(source, token, interest)
    }

    pub fn reregister<S: Source + ?Sized>(
        &self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll.registry().reregister(source, token, interest)
    }

    pub fn deregister<S: Source + ?Sized>(&self, source: &mut S) -> io::Result<()> {
        self.poll.registry().deregister(source)
    }

    /// An owned handle to the same underlying poller, safe to hand to
    /// worker threads so `on_read`/`on_write` can re-arm a connection's
    /// interest directly. mio's `Registry` is `Send + Sync` and
    /// `reregister` is just an `epoll_ctl(MOD)`, safe to call concurrently
    /// for distinct fds from any thread.
    pub fn try_clone_registry(&self) -> io::Result<mio::Registry> {
        self.poll.registry().try_clone()
    }

    /// Block up to `timeout` (or forever, if `None`) and return every
    /// ready event this tick. An empty `Vec` on a `None` timeout means the
    /// wait was interrupted by a signal, not that nothing happened.
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<Readiness>> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }
        Ok(self
            .events
            .iter()
            .map(|e| Readiness {
                token: e.token(),
                readable: e.is_readable(),
                writable: e.is_writable(),
                hangup: e.is_read_closed() || e.is_write_closed() || e.is_error(),
            })
            .collect())
    }
}
