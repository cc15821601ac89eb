/*
 * panic.rs
 *
 * Rust panics in the no_std release binary go through the same fatal path
 * as everything else: reason, crash context, backtrace, halt.
 *
 * Debug builds and tests use std's panic handler.
 */

#[cfg(not(any(debug_assertions, test, doc)))]
use core::panic::PanicInfo;

#[cfg(not(any(debug_assertions, test, doc)))]
use crashctx::buffer::FixedBuf;
#[cfg(not(any(debug_assertions, test, doc)))]
use crashctx::fatal::REASON_CAPACITY;

/// Format the panic message and location into a fixed buffer, then hand
/// it to the fatal path. No allocation.
#[cfg(not(any(debug_assertions, test, doc)))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    let reason: FixedBuf<REASON_CAPACITY> = match info.location() {
        Some(at) => FixedBuf::from_args(format_args!(
            "{} at {}:{}",
            info.message(),
            at.file(),
            at.line()
        )),
        None => FixedBuf::from_args(format_args!("{}", info.message())),
    };
    crashctx::panic(reason.text())
}

/// Required lang item for exception handling personality function.
///
/// Even with panic=abort, some code paths reference this symbol during
/// linking. Unwinding is disabled, so it is never called.
#[cfg(not(any(debug_assertions, test, doc)))]
#[unsafe(no_mangle)]
pub extern "C" fn rust_eh_personality() {}
