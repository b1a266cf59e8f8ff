pub use crate::buffer::ByteBuffer;
pub use crate::config::ServerConfig;
pub use crate::conn::{HttpConn, ProcessOutcome};
pub use crate::error::{CleanError, Result};
pub use crate::http::{HttpRequest, HttpResponse, Method, ParsingState};
pub use crate::pool::db::SessionPool;
pub use crate::pool::worker::WorkerPool;
pub use crate::router::{HandlerKind, HandlerResult, Router};
pub use crate::server::{ServerContext, WebServer};
pub use crate::timer::{deadline_in, Timer};

pub use mio::{
    event::Event,
    net::{TcpListener, TcpStream},
    Events, Interest, Poll, Token,
};

pub use std::collections::HashMap;
pub use std::fs::{self, File};
pub use std::io::{self, Read, Write};
pub use std::net::SocketAddr;
pub use std::path::{Path, PathBuf};
pub use std::sync::{Arc, Mutex};
pub use std::time::{Duration, Instant};

pub const READ_BUF_SIZE: usize = 4096;

// HTTP status codes this server actually emits, see
// `http::response::normalized_code`.
pub const HTTP_OK: u16 = 200;
pub const HTTP_BAD_REQUEST: u16 = 400;
pub const HTTP_FORBIDDEN: u16 = 403;
pub const HTTP_NOT_FOUND: u16 = 404;
