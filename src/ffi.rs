/*
 * ffi.rs
 *
 * The C boundary, symbol for symbol:
 *
 *   void   panic(const char* why);            noreturn
 *   void   default_exit();                    noreturn
 *   char*  get_crash_context_buffer();
 *   size_t get_crash_context_length();
 *   void   print_backtrace();
 *
 * so C code keeps writing
 *   snprintf(get_crash_context_buffer(), get_crash_context_length(), ...)
 *
 * kill(2) is not exported: on a hosted target libc already owns that
 * symbol, and signal::kill wraps it for Rust callers.
 */

use core::ffi::{CStr, c_char};

use crate::buffer::valid_prefix;
use crate::context::{crash_context, crash_context_length};

/// C entry to the fatal path. A null `why` reports as `(null)`.
///
/// # Safety
///
/// `why` must be null or point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn panic(why: *const c_char) -> ! {
    if why.is_null() {
        crate::fatal::panic("(null)");
    }
    // SAFETY: caller guarantees why is a valid NUL-terminated string.
    let why = unsafe { CStr::from_ptr(why) };
    crate::fatal::panic(valid_prefix(why.to_bytes()))
}

#[unsafe(no_mangle)]
pub extern "C" fn default_exit() -> ! {
    crate::fatal::default_exit()
}

/// Writable, process-lifetime storage of `get_crash_context_length()`
/// bytes. Never null.
#[unsafe(no_mangle)]
pub extern "C" fn get_crash_context_buffer() -> *mut c_char {
    crash_context().as_mut_ptr().cast()
}

#[unsafe(no_mangle)]
pub extern "C" fn get_crash_context_length() -> usize {
    crash_context_length()
}

#[unsafe(no_mangle)]
pub extern "C" fn print_backtrace() {
    crate::backtrace::print_backtrace();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_is_stable_and_non_null() {
        let first = get_crash_context_buffer();
        assert!(!first.is_null());
        assert_eq!(first, get_crash_context_buffer());
        assert_eq!(get_crash_context_length(), crate::CRASH_CONTEXT_CAPACITY);
    }
}
