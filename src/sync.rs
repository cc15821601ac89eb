/*
 * sync.rs
 *
 * no_std, non-blocking coordination for the crash-context store.
 *
 * we need exactly two things: "at most one writer at a time, and a second
 * writer never waits long", plus "a reader can tell whether what it copied
 * was torn". a sequence counter does both. no mutex anywhere: the fatal
 * path may run in the context that holds it.
 */

use core::hint::spin_loop;
use core::sync::atomic::{AtomicUsize, Ordering, fence};

/* how long a writer or reader is willing to spin before giving up */
pub const CLAIM_ATTEMPTS: usize = 64;
pub const READ_ATTEMPTS: usize = 64;

/// Odd/even sequence counter guarding a shared buffer.
///
/// # State machine
///
/// - even: idle, contents are consistent
/// - odd: a writer holds the claim, contents may be half written
///
/// A writer moves even -> odd with a compare-and-swap (only one wins) and
/// odd -> even + 2 when its `Claim` drops. Readers note the sequence, copy,
/// and check it did not move.
///
/// Memory ordering:
/// - the claim CAS uses `Acquire`, followed by a `Release` fence so the
///   odd value is visible before any data store
/// - releasing the claim stores with `Release` to publish the data
/// - readers load with `Acquire`, copy, then `Acquire` fence and re-check
pub struct SeqGuard {
    seq: AtomicUsize,
}

impl SeqGuard {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            seq: AtomicUsize::new(0),
        }
    }

    /// Try to become the single writer, spinning at most `CLAIM_ATTEMPTS`
    /// times while another writer is active.
    pub fn try_claim(&self) -> Option<Claim<'_>> {
        for _ in 0..CLAIM_ATTEMPTS {
            let current = self.seq.load(Ordering::Relaxed);
            if current & 1 == 0
                && self
                    .seq
                    .compare_exchange_weak(
                        current,
                        current.wrapping_add(1),
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_ok()
            {
                fence(Ordering::Release);
                return Some(Claim {
                    guard: self,
                    start: current,
                });
            }
            spin_loop();
        }
        None
    }

    /// Run `copy` until it observes a stable sequence, at most
    /// `READ_ATTEMPTS` times. `None` means every attempt overlapped a write.
    pub fn read<T>(&self, mut copy: impl FnMut() -> T) -> Option<T> {
        for _ in 0..READ_ATTEMPTS {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                spin_loop();
                continue;
            }
            let value = copy();
            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return Some(value);
            }
        }
        None
    }

    /* true while a writer holds the claim */
    #[cfg(any(test, kani))]
    #[inline]
    pub(crate) fn is_writing(&self) -> bool {
        self.seq.load(Ordering::Acquire) & 1 == 1
    }

    /// Completed writes so far (wraps).
    #[inline]
    pub fn generation(&self) -> usize {
        self.seq.load(Ordering::Acquire) >> 1
    }
}

impl Default for SeqGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive write access; publishes the write when dropped.
pub struct Claim<'a> {
    guard: &'a SeqGuard,
    start: usize,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.guard
            .seq
            .store(self.start.wrapping_add(2), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_then_release() {
        let guard = SeqGuard::new();
        {
            let _claim = guard.try_claim().expect("idle guard must be claimable");
            assert!(guard.is_writing());
        }
        assert!(!guard.is_writing());
        assert_eq!(guard.generation(), 1);
    }

    #[test]
    fn test_second_claim_is_refused() {
        let guard = SeqGuard::new();
        let _first = guard.try_claim().unwrap();
        assert!(guard.try_claim().is_none());
    }

    #[test]
    fn test_read_during_write_gives_up() {
        let guard = SeqGuard::new();
        let _claim = guard.try_claim().unwrap();
        assert_eq!(guard.read(|| 1), None);
    }

    #[test]
    fn test_read_when_idle() {
        let guard = SeqGuard::new();
        assert_eq!(guard.read(|| 7), Some(7));
    }
}

/* -------------------------------------------------------------------------- */
/*                              kani proofs                                   */
/* -------------------------------------------------------------------------- */

#[cfg(kani)]
mod kani_proofs {
    use super::*;

    /*
     * a claim always moves the counter from even to odd, and its release
     * lands on the next even value. parity is the whole protocol.
     */
    #[kani::proof]
    #[kani::unwind(65)]
    fn verify_claim_parity() {
        let guard = SeqGuard::new();
        let start: usize = kani::any();
        kani::assume(start % 2 == 0);
        guard.seq.store(start, Ordering::Relaxed);

        {
            let claim = guard.try_claim();
            kani::assert(claim.is_some(), "idle guard is claimable");
            kani::assert(guard.is_writing(), "claimed guard is odd");
        }

        kani::assert(
            guard.seq.load(Ordering::Relaxed) == start.wrapping_add(2),
            "release lands on next even value",
        );
    }
}
