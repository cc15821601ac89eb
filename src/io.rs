/*
 * io.rs
 *
 * no_std diagnostic output. direct write(2) to fd 1/2, no buffering, no
 * locks, no allocation - the fatal path prints through this after the
 * heap and every lock in the system may be gone.
 *
 * partial writes and EINTR are retried; any other failure drops the rest
 * of the line. nobody is left to report a failed crash report to.
 */

use core::fmt::{self, Write};

/* file descriptors */
pub const STDOUT: i32 = 1;
pub const STDERR: i32 = 2;

/// Write all of `bytes` to `fd`, retrying short writes and `EINTR`.
pub fn write_all(fd: i32, mut bytes: &[u8]) {
    while !bytes.is_empty() {
        // SAFETY: bytes is a valid, initialized slice for its whole length;
        // write(2) only reads from it.
        let ret = unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
        if ret > 0 {
            bytes = &bytes[ret as usize..];
        } else if ret < 0 && errno() == libc::EINTR {
            continue;
        } else {
            return;
        }
    }
}

/// Write bytes to stdout
#[inline]
pub fn write_stdout(s: &[u8]) {
    write_all(STDOUT, s);
}

/// Write bytes to stderr
#[inline]
pub fn write_stderr(s: &[u8]) {
    write_all(STDERR, s);
}

/// Write a string to stderr
#[inline]
pub fn eprint_str(s: &str) {
    write_stderr(s.as_bytes());
}

/// `fmt::Write` into stderr via direct syscall.
pub struct StderrWriter;

impl Write for StderrWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        write_stderr(s.as_bytes());
        Ok(())
    }
}

/// `fmt::Write` into stdout via direct syscall.
pub struct StdoutWriter;

impl Write for StdoutWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        write_stdout(s.as_bytes());
        Ok(())
    }
}

/* errno is thread-local; the accessor name differs per libc */
#[inline]
pub(crate) fn errno() -> i32 {
    #[cfg(target_vendor = "apple")]
    // SAFETY: __error always returns a valid pointer to this thread's errno.
    let ptr = unsafe { libc::__error() };
    #[cfg(not(target_vendor = "apple"))]
    // SAFETY: __errno_location always returns a valid pointer to this
    // thread's errno.
    let ptr = unsafe { libc::__errno_location() };
    // SAFETY: ptr points at this thread's errno, valid for the thread's life.
    unsafe { *ptr }
}

/// Print to stderr (no newline)
#[macro_export]
macro_rules! eprint {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = write!($crate::io::StderrWriter, $($arg)*);
    }};
}

/// Print to stderr with newline
#[macro_export]
macro_rules! eprintln {
    () => {{
        $crate::io::write_stderr(b"\n");
    }};
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = write!($crate::io::StderrWriter, $($arg)*);
        $crate::io::write_stderr(b"\n");
    }};
}

/// Print to stdout (no newline)
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = write!($crate::io::StdoutWriter, $($arg)*);
    }};
}

/// Print to stdout with newline
#[macro_export]
macro_rules! println {
    () => {{
        $crate::io::write_stdout(b"\n");
    }};
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = write!($crate::io::StdoutWriter, $($arg)*);
        $crate::io::write_stdout(b"\n");
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_stderr() {
        /* just verify it doesn't crash */
        write_stderr(b"test stderr write\n");
    }

    #[test]
    fn test_write_to_closed_fd_returns() {
        /* EBADF must not loop forever */
        write_all(-1, b"nowhere");
    }

    #[test]
    fn test_writer_fmt() {
        let mut w = StderrWriter;
        let _ = write!(w, "formatted: {} + {} = {}", 1, 2, 3);
    }
}
