//! Structured logging over `proxy_log`'s colored macros.
//!
//! `proxy_log::{info, warn, errors, debug, trace}` print unconditionally to
//! stdout. This wraps them with the level filter and the asynchronous
//! queued writer the spec's `openLog`/`logLevel`/`logQueSize` knobs call
//! for, grounded in the original's blocking log queue (`log/log.h`,
//! referenced but not retrieved; its shape, a bounded queue drained by one
//! background thread, is standard and reconstructed from `logQueSize`'s
//! presence in the CLI table).

use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::OnceLock;
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl Level {
    pub fn from_u32(n: u32) -> Level {
        match n {
            0 => Level::Error,
            1 => Level::Warn,
            2 => Level::Info,
            3 => Level::Debug,
            _ => Level::Trace,
        }
    }
}

struct Logger {
    open: bool,
    level: Level,
    sender: Option<SyncSender<(Level, String)>>,
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Initialize the process-wide logger. Safe to call once at startup;
/// later calls are ignored (matches the original's single `Log::Instance`).
pub fn init(open_log: bool, log_level: u32, log_que_size: usize) {
    let sender = if open_log && log_que_size > 0 {
        let (tx, rx) = sync_channel::<(Level, String)>(log_que_size);
        thread::spawn(move || {
            while let Ok((level, line)) = rx.recv() {
                emit_line(level, &line);
            }
        });
        Some(tx)
    } else {
        None
    };

    let _ = LOGGER.set(Logger {
        open: open_log,
        level: Level::from_u32(log_level),
        sender,
    });
}

fn emit_line(level: Level, line: &str) {
    match level {
        Level::Error => proxy_log::errors!("{line}"),
        Level::Warn => proxy_log::warn!("{line}"),
        Level::Info => proxy_log::info!("{line}"),
        Level::Debug => proxy_log::debug!("{line}"),
        Level::Trace => proxy_log::trace!("{line}"),
    }
}

#[doc(hidden)]
pub fn dispatch(level: Level, line: String) {
    let Some(logger) = LOGGER.get() else { return };
    if !logger.open || level > logger.level {
        return;
    }
    match &logger.sender {
        // A full queue means the sink can't keep up; drop rather than
        // block the worker that's trying to log.
        Some(tx) => {
            let _ = tx.try_send((level, line));
        }
        None => emit_line(level, &line),
    }
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::log_queue::dispatch($crate::log_queue::Level::Error, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::log_queue::dispatch($crate::log_queue::Level::Warn, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::log_queue::dispatch($crate::log_queue::Level::Info, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::log_queue::dispatch($crate::log_queue::Level::Debug, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        $crate::log_queue::dispatch($crate::log_queue::Level::Trace, format!($($arg)*))
    };
}
