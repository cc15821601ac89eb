/*
 * backtrace.rs
 *
 * Stack walk for the fatal path. Fixed array of return addresses, no heap.
 *
 * glibc and macOS: backtrace(3) to capture, backtrace_symbols_fd(3) to
 * print with symbols (that one writes straight to the fd, no malloc).
 * glibc's backtrace loads libgcc_s on first use, which allocates, so
 * prime() runs one capture at start-up while the heap is still healthy.
 *
 * Elsewhere: walk frame pointers. Only meaningful with
 * -C force-frame-pointers=yes; without them the checks stop the walk early
 * instead of chasing garbage.
 */

use core::fmt;

use crate::io;

/// Deepest stack we record.
pub const MAX_FRAMES: usize = 64;

#[cfg(any(all(target_os = "linux", target_env = "gnu"), target_vendor = "apple"))]
mod execinfo {
    use core::ffi::{c_int, c_void};

    unsafe extern "C" {
        pub fn backtrace(buffer: *mut *mut c_void, size: c_int) -> c_int;
        pub fn backtrace_symbols_fd(buffer: *const *mut c_void, size: c_int, fd: c_int);
    }
}

/// Return addresses of the current thread, innermost first.
#[derive(Clone)]
pub struct StackTrace {
    frames: [usize; MAX_FRAMES],
    len: usize,
}

impl StackTrace {
    /// Capture the current thread's stack.
    #[inline(never)]
    pub fn capture() -> Self {
        let mut trace = Self::empty();
        trace.len = capture_into(&mut trace.frames);
        trace
    }

    /// A trace from known addresses, at most `MAX_FRAMES` of them.
    pub fn from_frames(frames: &[usize]) -> Self {
        let mut trace = Self::empty();
        let len = frames.len().min(MAX_FRAMES);
        trace.frames[..len].copy_from_slice(&frames[..len]);
        trace.len = len;
        trace
    }

    pub const fn empty() -> Self {
        Self {
            frames: [0; MAX_FRAMES],
            len: 0,
        }
    }

    /// Frame addresses, innermost first.
    #[inline]
    pub fn frames(&self) -> &[usize] {
        &self.frames[..self.len]
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Print the trace to `fd`, symbolized where the platform allows it.
    pub fn write_to_fd(&self, fd: i32) {
        if self.is_empty() {
            io::write_all(fd, b"  <no frames>\n");
            return;
        }
        #[cfg(any(all(target_os = "linux", target_env = "gnu"), target_vendor = "apple"))]
        {
            // SAFETY: frames() holds len() <= MAX_FRAMES addresses; the
            // function only reads them and writes text to fd.
            unsafe {
                execinfo::backtrace_symbols_fd(
                    self.frames().as_ptr().cast(),
                    self.len as core::ffi::c_int,
                    fd,
                );
            }
        }
        #[cfg(not(any(all(target_os = "linux", target_env = "gnu"), target_vendor = "apple")))]
        {
            use core::fmt::Write;
            let _ = write!(FdWriter(fd), "{self}");
        }
    }
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("  <no frames>\n");
        }
        for (index, address) in self.frames().iter().enumerate() {
            writeln!(f, "  #{index:<2} 0x{address:016x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.frames()).finish()
    }
}

#[cfg(not(any(all(target_os = "linux", target_env = "gnu"), target_vendor = "apple")))]
struct FdWriter(i32);

#[cfg(not(any(all(target_os = "linux", target_env = "gnu"), target_vendor = "apple")))]
impl fmt::Write for FdWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        io::write_all(self.0, s.as_bytes());
        Ok(())
    }
}

/// Walk the current call stack and print it to stderr.
#[inline(never)]
pub fn print_backtrace() {
    let trace = StackTrace::capture();
    io::eprint_str("*** backtrace:\n");
    trace.write_to_fd(io::STDERR);
}

/// Run one throwaway capture so the unwinder is loaded before anything
/// can go wrong. Cheap to call more than once.
pub fn prime() {
    let mut scratch = [0usize; 4];
    let _ = capture_into(&mut scratch);
}

#[cfg(any(all(target_os = "linux", target_env = "gnu"), target_vendor = "apple"))]
#[inline(never)]
fn capture_into(frames: &mut [usize]) -> usize {
    let max = frames.len().min(core::ffi::c_int::MAX as usize) as core::ffi::c_int;
    // SAFETY: frames is valid for frames.len() pointer-sized writes and
    // backtrace writes at most `max` entries.
    let got = unsafe { execinfo::backtrace(frames.as_mut_ptr().cast(), max) };
    got.max(0) as usize
}

#[cfg(all(
    not(any(all(target_os = "linux", target_env = "gnu"), target_vendor = "apple")),
    any(target_arch = "x86_64", target_arch = "aarch64")
))]
#[inline(never)]
fn capture_into(frames: &mut [usize]) -> usize {
    frame_walk::walk(frame_walk::current_frame(), frames)
}

#[cfg(all(
    not(any(all(target_os = "linux", target_env = "gnu"), target_vendor = "apple")),
    not(any(target_arch = "x86_64", target_arch = "aarch64"))
))]
fn capture_into(_frames: &mut [usize]) -> usize {
    0
}

/*
 * frame record layout on x86_64 and aarch64 alike:
 *   [fp + 0] = caller's frame pointer
 *   [fp + 8] = return address
 */
#[cfg_attr(
    any(all(target_os = "linux", target_env = "gnu"), target_vendor = "apple"),
    allow(dead_code)
)]
mod frame_walk {
    /* a frame bigger than this means fp is not a frame pointer */
    const MAX_FRAME_SIZE: usize = 1 << 20;

    #[cfg(target_arch = "x86_64")]
    #[inline(always)]
    pub fn current_frame() -> usize {
        let fp: usize;
        // SAFETY: reading rbp has no side effects.
        unsafe {
            core::arch::asm!("mov {}, rbp", out(reg) fp, options(nomem, nostack, preserves_flags));
        }
        fp
    }

    #[cfg(target_arch = "aarch64")]
    #[inline(always)]
    pub fn current_frame() -> usize {
        let fp: usize;
        // SAFETY: reading x29 has no side effects.
        unsafe {
            core::arch::asm!("mov {}, x29", out(reg) fp, options(nomem, nostack, preserves_flags));
        }
        fp
    }

    /// Follow the frame chain from `fp`, storing return addresses.
    ///
    /// Stops at a null, misaligned, non-increasing or implausibly distant
    /// frame pointer, a zero return address, or when `frames` is full.
    pub fn walk(mut fp: usize, frames: &mut [usize]) -> usize {
        let mut len = 0;
        while len < frames.len() && plausible(fp) {
            // SAFETY: fp is non-null, aligned, and was either read from the
            // frame-pointer register or from the previous frame record; the
            // two-word record it points at is on this thread's stack.
            let (next, ret) = unsafe {
                let record = fp as *const usize;
                (record.read(), record.add(1).read())
            };
            if ret == 0 {
                break;
            }
            /* return address points past the call; -1 lands inside it */
            frames[len] = ret - 1;
            len += 1;
            if next <= fp || next - fp > MAX_FRAME_SIZE {
                break;
            }
            fp = next;
        }
        len
    }

    #[inline]
    fn plausible(fp: usize) -> bool {
        fp != 0 && fp % core::mem::align_of::<usize>() == 0
    }

}
