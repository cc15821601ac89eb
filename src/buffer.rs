/*
 * buffer.rs
 *
 * snprintf without the libc. Format into caller-owned bytes, cut at
 * capacity - 1, terminate with NUL. Never allocates, never fails.
 *
 * Truncation is byte-exact on purpose: a context that ends mid-codepoint
 * is still the first N-1 bytes of what the caller wrote. Display goes
 * through Lossy so readers never trip over the cut.
 */

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicU8, Ordering};

/// Result of a bounded format: bytes kept (excluding the NUL) and whether
/// anything was cut off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Formatted {
    pub len: usize,
    pub truncated: bool,
}

/// Fixed run of byte slots a bounded write lands in.
///
/// Plain caller-owned bytes and the crash-context store's atomic slots
/// both implement this, so both truncate by the same rule.
pub trait ByteSlots {
    /// Number of slots, terminator slot included.
    fn slot_count(&self) -> usize;

    /// Store `bytes` starting at slot `at`. The caller keeps
    /// `at + bytes.len() <= slot_count()`.
    fn put(&mut self, at: usize, bytes: &[u8]);
}

impl ByteSlots for &mut [u8] {
    #[inline]
    fn slot_count(&self) -> usize {
        self.len()
    }

    #[inline]
    fn put(&mut self, at: usize, bytes: &[u8]) {
        self[at..at + bytes.len()].copy_from_slice(bytes);
    }
}

impl ByteSlots for &[AtomicU8] {
    #[inline]
    fn slot_count(&self) -> usize {
        self.len()
    }

    fn put(&mut self, at: usize, bytes: &[u8]) {
        for (slot, &byte) in self[at..at + bytes.len()].iter().zip(bytes) {
            slot.store(byte, Ordering::Relaxed);
        }
    }
}

/// `fmt::Write` over byte slots that keeps at most `slot_count() - 1`
/// bytes.
///
/// Returns `fmt::Error` as soon as the output no longer fits so formatting
/// stops early; `finish` reports that as truncation, not failure.
pub struct BoundedWriter<S: ByteSlots> {
    dst: S,
    len: usize,
    truncated: bool,
}

impl<S: ByteSlots> BoundedWriter<S> {
    #[must_use]
    pub fn new(dst: S) -> Self {
        Self {
            dst,
            len: 0,
            truncated: false,
        }
    }

    /* room left before the terminator slot */
    #[inline]
    fn room(&self) -> usize {
        self.dst.slot_count().saturating_sub(1).saturating_sub(self.len)
    }

    /// Append raw bytes. Returns false once they no longer fit; what did
    /// fit is kept.
    pub fn push(&mut self, bytes: &[u8]) -> bool {
        let take = bytes.len().min(self.room());
        self.dst.put(self.len, &bytes[..take]);
        self.len += take;
        if take < bytes.len() {
            self.truncated = true;
            return false;
        }
        true
    }

    /// Terminate the output and report what was kept.
    pub fn finish(mut self) -> Formatted {
        if self.len < self.dst.slot_count() {
            self.dst.put(self.len, &[0]);
        }
        Formatted {
            len: self.len,
            truncated: self.truncated,
        }
    }
}

impl<S: ByteSlots> Write for BoundedWriter<S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.push(s.as_bytes()) {
            Ok(())
        } else {
            Err(fmt::Error)
        }
    }
}

/// Format `args` into caller-owned `dst`, keeping at most `dst.len() - 1`
/// bytes plus a NUL terminator. A zero-length `dst` receives nothing.
///
/// The crash-context store truncates through the same [`BoundedWriter`];
/// this is the entry point for buffers the caller owns.
///
/// ```
/// use crashctx::buffer::format_bounded;
///
/// let mut buf = [0u8; 8];
/// let out = format_bounded(&mut buf, format_args!("block {}", 123456));
/// assert!(out.truncated);
/// assert_eq!(&buf[..out.len], b"block 1");
/// assert_eq!(buf[out.len], 0);
/// ```
pub fn format_bounded(dst: &mut [u8], args: fmt::Arguments<'_>) -> Formatted {
    let mut writer = BoundedWriter::new(dst);
    /* Err here only ever means "ran out of room" or a Display impl failed;
     * both leave a valid terminated prefix behind */
    let _ = writer.write_fmt(args);
    writer.finish()
}

/// Fixed-capacity owned text, `N` usable bytes (no terminator needed).
///
/// Used wherever the fatal path needs to keep a formatted string around
/// without a heap: panic reasons, report rendering in tests.
#[derive(Clone)]
pub struct FixedBuf<const N: usize> {
    bytes: [u8; N],
    len: usize,
    truncated: bool,
}

impl<const N: usize> FixedBuf<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes: [0; N],
            len: 0,
            truncated: false,
        }
    }

    /// Copy `s`, truncating to `N` bytes.
    #[must_use]
    pub fn from_str_truncated(s: &str) -> Self {
        let mut buf = Self::new();
        let _ = buf.write_str(s);
        buf
    }

    #[must_use]
    pub fn from_args(args: fmt::Arguments<'_>) -> Self {
        let mut buf = Self::new();
        let _ = buf.write_fmt(args);
        buf
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// The longest valid UTF-8 prefix of the contents.
    pub fn text(&self) -> &str {
        valid_prefix(self.as_bytes())
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.truncated = false;
    }
}

impl<const N: usize> Default for FixedBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Write for FixedBuf<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let take = bytes.len().min(N - self.len);
        self.bytes[self.len..self.len + take].copy_from_slice(&bytes[..take]);
        self.len += take;
        if take < bytes.len() {
            self.truncated = true;
            return Err(fmt::Error);
        }
        Ok(())
    }
}

impl<const N: usize> fmt::Debug for FixedBuf<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.text(), f)
    }
}

impl<const N: usize> fmt::Display for FixedBuf<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Lossy(self.as_bytes()), f)
    }
}

/// Displays arbitrary bytes as UTF-8, replacing invalid sequences with
/// U+FFFD.
pub struct Lossy<'a>(pub &'a [u8]);

impl fmt::Display for Lossy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for chunk in self.0.utf8_chunks() {
            f.write_str(chunk.valid())?;
            if !chunk.invalid().is_empty() {
                f.write_char(char::REPLACEMENT_CHARACTER)?;
            }
        }
        Ok(())
    }
}

/* longest prefix of bytes that is valid UTF-8 */
pub(crate) fn valid_prefix(bytes: &[u8]) -> &str {
    match core::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            // SAFETY: valid_up_to() is the length of the longest prefix that
            // from_utf8 verified as valid UTF-8.
            unsafe { core::str::from_utf8_unchecked(&bytes[..e.valid_up_to()]) }
        }
    }
}


/* -------------------------------------------------------------------------- */
/*                              kani proofs                                   */
/* -------------------------------------------------------------------------- */

#[cfg(kani)]
mod kani_proofs {
    use super::*;

    /*
     * whatever gets written, the kept length stays below capacity and the
     * byte right after it is the terminator.
     */
    #[kani::proof]
    #[kani::unwind(9)]
    fn verify_bounded_write_terminates() {
        let mut dst = [0xffu8; 4];
        let len: usize = kani::any();
        kani::assume(len <= 8);
        let src = [b'a'; 8];
        // SAFETY: all bytes are ASCII 'a'
        let s = unsafe { core::str::from_utf8_unchecked(&src[..len]) };

        let mut writer = BoundedWriter::new(&mut dst[..]);
        let _ = writer.write_str(s);
        let out = writer.finish();

        kani::assert(out.len < 4, "kept length below capacity");
        kani::assert(dst[out.len] == 0, "terminator after kept bytes");
        kani::assert(out.truncated == (len > 3), "truncated iff it did not fit");
    }
}
