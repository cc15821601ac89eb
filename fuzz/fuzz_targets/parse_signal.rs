/*
 * fuzz_targets/parse_signal.rs
 *
 * parse_signal and parse_kill_signal must never panic, and anything they
 * accept must be a signal kill(2) knows.
 *
 * edge cases: "SIGFOO", "999", "-1", "term", "Term", "  TERM  ", "", "0"
 */

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = core::str::from_utf8(data) {
        if let Ok(sig) = crashctx::signal::parse_signal(s) {
            assert!(sig.as_raw() > 0);
        }
        if let Ok(raw) = crashctx::signal::parse_kill_signal(s) {
            assert!(raw == 0 || crashctx::signal::Signal::try_from_raw(raw).is_some());
        }
    }
});
