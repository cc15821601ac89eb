/*
 * fuzz_targets/format_bounded.rs
 *
 * Bounded formatting and the context store against arbitrary text and
 * buffer sizes. Output must always fit, always be terminated, and always
 * be a prefix of the input.
 */

#![no_main]

use crashctx::buffer::format_bounded;
use crashctx::context::CrashContext;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&size, rest)) = data.split_first() else {
        return;
    };
    let text = String::from_utf8_lossy(rest);

    let mut dst = vec![0xAAu8; usize::from(size) + 1];
    let formatted = format_bounded(&mut dst, format_args!("{text}"));
    assert!(formatted.len < dst.len());
    assert_eq!(dst[formatted.len], 0);
    assert_eq!(&dst[..formatted.len], &text.as_bytes()[..formatted.len]);

    let store: CrashContext<64> = CrashContext::new();
    let _ = store.set_bytes(rest);
    let snapshot = store.snapshot();
    assert!(snapshot.len() < 64);
    assert!(rest.starts_with(snapshot.as_bytes()));
});
