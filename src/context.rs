/*
 * context.rs
 *
 * The crash-context store: one fixed buffer holding the most recent
 * breadcrumb. Write "handling request from 10.0.0.7" before parsing it;
 * if parsing takes the system down, the panic report shows which request.
 *
 * Static storage, const-initialized, never reallocated. Each write replaces
 * the whole previous value. Bytes live in AtomicU8 slots so a reader racing
 * a writer is never UB, and the SeqGuard tells it whether the copy is torn.
 */

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicU8, Ordering};

use crate::buffer::{BoundedWriter, Lossy};
use crate::sync::{Claim, SeqGuard};

/// Capacity of the process-wide store, terminator included.
pub const CRASH_CONTEXT_CAPACITY: usize = 4096;

static CRASH_CONTEXT: CrashContext<CRASH_CONTEXT_CAPACITY> = CrashContext::new();

/// The process-wide store.
#[inline]
pub fn crash_context() -> &'static CrashContext<CRASH_CONTEXT_CAPACITY> {
    &CRASH_CONTEXT
}

/// Writable storage of the process-wide store, valid for the whole process.
/// Pair with [`crash_context_length`]; prefer [`CrashContext::set`].
#[inline]
pub fn crash_context_buffer() -> &'static [AtomicU8] {
    CRASH_CONTEXT.buffer()
}

/// Capacity of the process-wide store in bytes. Never changes.
#[inline]
pub const fn crash_context_length() -> usize {
    CRASH_CONTEXT_CAPACITY
}

/// Annotate the process-wide crash context, `format!` style.
///
/// Fire and forget: truncates to capacity, never allocates, never fails.
///
/// ```
/// use crashctx::set_crash_context;
///
/// let client_ip = "10.0.0.7";
/// set_crash_context!("handling request from {}", client_ip);
/// ```
#[macro_export]
macro_rules! set_crash_context {
    ($($arg:tt)*) => {{
        let _ = $crate::context::crash_context().set(format_args!($($arg)*));
    }};
}

/// What happened to a write. Purely informational; nothing here is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Whole text stored.
    Stored { len: usize },
    /// Text cut to `capacity - 1` bytes.
    Truncated { len: usize },
    /// Another writer held the store for the whole claim window; this
    /// annotation was dropped and the other one stands.
    Contended,
}

impl WriteOutcome {
    /// Bytes now in the store, if this write landed.
    pub const fn len(self) -> Option<usize> {
        match self {
            Self::Stored { len } | Self::Truncated { len } => Some(len),
            Self::Contended => None,
        }
    }
}

/// Fixed-capacity, overwrite-only text store with single-writer-wins
/// semantics.
///
/// `N` is the capacity including the NUL terminator, so at most `N - 1`
/// bytes of text are kept.
pub struct CrashContext<const N: usize> {
    guard: SeqGuard,
    bytes: [AtomicU8; N],
}

impl<const N: usize> CrashContext<N> {
    /// Empty store. `const` so it can back a `static`.
    #[must_use]
    pub const fn new() -> Self {
        assert!(N > 0, "crash context needs room for the terminator");
        Self {
            guard: SeqGuard::new(),
            bytes: [const { AtomicU8::new(0) }; N],
        }
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// The raw slots.
    #[inline]
    pub fn buffer(&self) -> &[AtomicU8] {
        &self.bytes
    }

    /// Raw pointer to the first slot, for C callers that `snprintf`
    /// straight into the buffer. Such writes skip the claim protocol.
    #[inline]
    pub fn as_mut_ptr(&self) -> *mut u8 {
        /* AtomicU8 has the same in-memory representation as u8 */
        self.bytes.as_ptr() as *mut u8
    }

    /// Replace the contents with formatted text.
    pub fn set(&self, args: fmt::Arguments<'_>) -> WriteOutcome {
        let Some(claim) = self.guard.try_claim() else {
            return WriteOutcome::Contended;
        };
        let mut writer = BoundedWriter::new(self.bytes.as_slice());
        let _ = writer.write_fmt(args);
        Self::publish(writer, claim)
    }

    /// Replace the contents with `text`.
    pub fn set_str(&self, text: &str) -> WriteOutcome {
        self.set_bytes(text.as_bytes())
    }

    /// Replace the contents with raw bytes. An embedded NUL ends the text
    /// early, same as it would for any C reader.
    pub fn set_bytes(&self, text: &[u8]) -> WriteOutcome {
        let Some(claim) = self.guard.try_claim() else {
            return WriteOutcome::Contended;
        };
        let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
        let mut writer = BoundedWriter::new(self.bytes.as_slice());
        writer.push(&text[..end]);
        Self::publish(writer, claim)
    }

    /// Reset to the empty string.
    pub fn clear(&self) -> WriteOutcome {
        self.set_bytes(b"")
    }

    /// Copy the current text out.
    ///
    /// Bounded: if every attempt overlaps a writer (say, one that faulted
    /// mid-write), the last copy is returned flagged as torn.
    pub fn snapshot(&self) -> Snapshot<N> {
        let mut snapshot = Snapshot::empty();
        match self.guard.read(|| self.copy_into(&mut snapshot.bytes)) {
            Some(len) => snapshot.len = len,
            None => {
                snapshot.len = self.copy_into(&mut snapshot.bytes);
                snapshot.torn = true;
            }
        }
        snapshot
    }

    /// Completed writes since start-up (wraps).
    pub fn generation(&self) -> usize {
        self.guard.generation()
    }

    #[cfg(test)]
    pub(crate) fn guard(&self) -> &SeqGuard {
        &self.guard
    }

    /* terminate, then release the claim so readers see a whole value */
    fn publish(writer: BoundedWriter<&[AtomicU8]>, claim: Claim<'_>) -> WriteOutcome {
        let written = writer.finish();
        drop(claim);
        if written.truncated {
            WriteOutcome::Truncated { len: written.len }
        } else {
            WriteOutcome::Stored { len: written.len }
        }
    }

    /* copy up to the terminator, never more than N - 1 bytes */
    fn copy_into(&self, dst: &mut [u8; N]) -> usize {
        let mut len = 0;
        while len < N - 1 {
            let byte = self.bytes[len].load(Ordering::Relaxed);
            if byte == 0 {
                break;
            }
            dst[len] = byte;
            len += 1;
        }
        len
    }
}

impl<const N: usize> Default for CrashContext<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// A copy of the store's text taken at one point in time.
#[derive(Clone)]
pub struct Snapshot<const N: usize> {
    bytes: [u8; N],
    len: usize,
    torn: bool,
}

impl<const N: usize> Snapshot<N> {
    const fn empty() -> Self {
        Self {
            bytes: [0; N],
            len: 0,
            torn: false,
        }
    }

    /// Text bytes, terminator excluded.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Longest valid UTF-8 prefix of the text.
    pub fn text(&self) -> &str {
        crate::buffer::valid_prefix(self.as_bytes())
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when the copy overlapped a write and may mix two values.
    #[inline]
    pub const fn is_torn(&self) -> bool {
        self.torn
    }
}

impl<const N: usize> fmt::Display for Snapshot<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Lossy(self.as_bytes()), f)
    }
}

impl<const N: usize> fmt::Debug for Snapshot<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("text", &self.text())
            .field("torn", &self.torn)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_store_is_empty() {
        let ctx: CrashContext<16> = CrashContext::new();
        let snap = ctx.snapshot();
        assert!(snap.is_empty());
        assert!(!snap.is_torn());
    }

    #[test]
    fn test_set_and_read_back() {
        let ctx: CrashContext<32> = CrashContext::new();
        let outcome = ctx.set(format_args!("writing block {}", 42));
        assert_eq!(outcome, WriteOutcome::Stored { len: 16 });
        assert_eq!(ctx.snapshot().as_bytes(), b"writing block 42");
    }

    #[test]
    fn test_terminator_follows_text() {
        let ctx: CrashContext<8> = CrashContext::new();
        let _ = ctx.set_str("abc");
        assert_eq!(ctx.buffer()[3].load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_truncates_to_capacity_minus_one() {
        let ctx: CrashContext<8> = CrashContext::new();
        let outcome = ctx.set_str("0123456789");
        assert_eq!(outcome, WriteOutcome::Truncated { len: 7 });
        assert_eq!(ctx.snapshot().as_bytes(), b"0123456");
        assert_eq!(ctx.buffer()[7].load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_overwrite_leaves_no_residue() {
        let ctx: CrashContext<32> = CrashContext::new();
        let _ = ctx.set_str("a much longer first value");
        let _ = ctx.set_str("short");
        assert_eq!(ctx.snapshot().as_bytes(), b"short");
    }

    #[test]
    fn test_clear() {
        let ctx: CrashContext<8> = CrashContext::new();
        let _ = ctx.set_str("abc");
        let _ = ctx.clear();
        assert!(ctx.snapshot().is_empty());
    }

    #[test]
    fn test_embedded_nul_ends_text() {
        let ctx: CrashContext<16> = CrashContext::new();
        assert_eq!(ctx.set_bytes(b"head\0tail"), WriteOutcome::Stored { len: 4 });
        assert_eq!(ctx.snapshot().as_bytes(), b"head");
    }

    #[test]
    fn test_write_while_claimed_is_dropped() {
        let ctx: CrashContext<16> = CrashContext::new();
        let _ = ctx.set_str("first");
        let claim = ctx.guard.try_claim().unwrap();
        assert_eq!(ctx.set_str("second"), WriteOutcome::Contended);
        drop(claim);
        assert_eq!(ctx.snapshot().as_bytes(), b"first");
    }

    #[test]
    fn test_snapshot_during_stuck_write_is_torn() {
        /* a writer that faulted mid-write never releases its claim */
        let ctx: CrashContext<16> = CrashContext::new();
        let _ = ctx.set_str("stable");
        let _stuck = ctx.guard.try_claim().unwrap();
        let snap = ctx.snapshot();
        assert!(snap.is_torn());
        assert_eq!(snap.as_bytes(), b"stable");
    }

    #[test]
    fn test_unterminated_raw_write_is_bounded() {
        /* C side filled every byte without a terminator */
        let ctx: CrashContext<4> = CrashContext::new();
        for slot in ctx.buffer() {
            slot.store(b'x', Ordering::Relaxed);
        }
        assert_eq!(ctx.snapshot().as_bytes(), b"xxx");
    }

    #[test]
    fn test_capacity_is_fixed() {
        let ctx: CrashContext<64> = CrashContext::new();
        for i in 0..100 {
            let _ = ctx.set(format_args!("{}", i));
            assert_eq!(ctx.capacity(), 64);
        }
        assert_eq!(ctx.generation(), 100);
    }

    #[test]
    fn test_global_accessors_agree() {
        assert_eq!(crash_context_length(), CRASH_CONTEXT_CAPACITY);
        assert_eq!(crash_context_buffer().len(), crash_context_length());
        assert_eq!(
            crash_context().as_mut_ptr() as *const u8,
            crash_context_buffer().as_ptr() as *const u8
        );
    }
}
