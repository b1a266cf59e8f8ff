//! Bounded pool of blocking MySQL connections.
//!
//! Rust counterpart of the original's `SqlConnPool`/`SqlConnRAII` pair: a
//! mutex-guarded queue stands in for the queue + `mtx_`, and `Condvar` plays
//! the role of `sem_t`. `acquire()` blocks until a connection is pushed
//! back rather than spinning on `sem_wait`. `PooledConn` borrows the place
//! of `SqlConnRAII`, returning its connection to the queue on `Drop`
//! instead of requiring the caller to remember to call `FreeConn`.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use mysql::prelude::Queryable;
use mysql::{Conn, Opts, OptsBuilder};

use crate::error::Result;

struct Inner {
    queue: Mutex<VecDeque<Conn>>,
    available: Condvar,
}

#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<Inner>,
}

impl SessionPool {
    pub fn connect(
        host: &str,
        port: u16,
        user: &str,
        password: &str,
        db_name: &str,
        pool_size: usize,
    ) -> Result<Self> {
        let opts: Opts = OptsBuilder::default()
            .ip_or_hostname(Some(host))
            .tcp_port(port)
            .user(Some(user))
            .pass(Some(password))
            .db_name(Some(db_name))
            .into();

        let mut queue = VecDeque::with_capacity(pool_size);
        for _ in 0..pool_size {
            queue.push_back(Conn::new(opts.clone())?);
        }

        Ok(Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(queue),
                available: Condvar::new(),
            }),
        })
    }

    /// Block until a connection is free, then hand out an RAII guard that
    /// returns it to the pool on drop.
    pub fn acquire(&self) -> PooledConn<'_> {
        let mut queue = self.inner.queue.lock().unwrap();
        while queue.is_empty() {
            queue = self.inner.available.wait(queue).unwrap();
        }
        let conn = queue.pop_front().expect("queue non-empty");
        PooledConn {
            pool: self,
            conn: Some(conn),
        }
    }
}

pub struct PooledConn<'a> {
    pool: &'a SessionPool,
    conn: Option<Conn>,
}

impl std::ops::Deref for PooledConn<'_> {
    type Target = Conn;
    fn deref(&self) -> &Conn {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl std::ops::DerefMut for PooledConn<'_> {
    fn deref_mut(&mut self) -> &mut Conn {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConn<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.inner.queue.lock().unwrap().push_back(conn);
            self.pool.inner.available.notify_one();
        }
    }
}

/// Row returned by a username lookup.
pub struct UserRow {
    pub password: String,
}

pub fn find_user(conn: &mut Conn, username: &str) -> Result<Option<UserRow>> {
    let row: Option<String> = conn.exec_first(
        "SELECT password FROM user WHERE username = ? LIMIT 1",
        (username,),
    )?;
    Ok(row.map(|password| UserRow { password }))
}

pub fn create_user(conn: &mut Conn, username: &str, password: &str) -> Result<bool> {
    if find_user(conn, username)?.is_some() {
        return Ok(false);
    }
    conn.exec_drop(
        "INSERT INTO user(username, password) VALUES (?, ?)",
        (username, password),
    )?;
    Ok(true)
}
