/*
 * fuzz_targets/parse_args.rs
 *
 * The CLI parser must never panic on arbitrary argv. Input is split on
 * NUL bytes into separate arguments.
 */

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = core::str::from_utf8(data) {
        let _ = crashctx::args::parse_args(s.split('\0'));
    }
});
