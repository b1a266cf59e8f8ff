//! Zero-copy body transmission via `sendfile(2)`.
//!
//! One call services both real static files and the `memfd`-backed
//! anonymous files `HttpResponse` stages for generated bodies. The kernel
//! copies straight from the source fd to the socket, never through user
//! space.

use std::io;

/// Copies up to `count` bytes from `in_fd` starting at `offset` to
/// `out_fd`. Returns the number of bytes actually sent, which may be less
/// than `count`, the caller advances its own cursor by the result and
/// calls again.
pub fn send_file(in_fd: i32, out_fd: i32, offset: u64, count: usize) -> io::Result<usize> {
    let mut off = offset as libc::off_t;
    let n = unsafe { libc::sendfile(out_fd, in_fd, &mut off, count) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}
