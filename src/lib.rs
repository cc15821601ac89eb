/*
 * lib.rs
 *
 * The crash-context store and the fatal path. Everything here has to keep
 * working after the heap, the scheduler or a lock holder has gone bad, so:
 * no allocation, no blocking, no std outside of tests.
 */

//! # crashctx
//!
//! Leave a breadcrumb before doing something risky; if the system dies,
//! the fatal path prints it next to the reason and a backtrace.
//!
//! ```rust
//! use crashctx::{crash_context, set_crash_context};
//!
//! let block = 42;
//! set_crash_context!("writing block {}", block);
//!
//! let snapshot = crash_context().snapshot();
//! assert_eq!(snapshot.as_bytes(), b"writing block 42");
//! ```
//!
//! Unrecoverable failures are values until the top of the call stack:
//!
//! ```rust
//! use crashctx::fatal::{FatalResult, OrFatal};
//!
//! fn mount(device: Option<&str>) -> FatalResult<&str> {
//!     device.or_fatal("no root device")
//! }
//!
//! assert_eq!(mount(Some("vda")).unwrap(), "vda");
//! assert_eq!(mount(None).unwrap_err().reason(), "no root device");
//! ```

#![cfg_attr(not(test), no_std)]

pub mod args;
pub mod backtrace;
pub mod buffer;
pub mod config;
pub mod context;
pub mod error;
pub mod fatal;
#[cfg(feature = "c-abi")]
pub mod ffi;
pub mod io;
pub mod signal;
pub mod sync;

pub use backtrace::{StackTrace, print_backtrace};
pub use buffer::{FixedBuf, Formatted, format_bounded};
pub use config::{PanicAction, Settings};
pub use context::{
    CRASH_CONTEXT_CAPACITY, CrashContext, Snapshot, WriteOutcome, crash_context,
    crash_context_buffer, crash_context_length,
};
pub use error::{Error, Result, exit_codes};
pub use fatal::{Fatal, FatalEvent, FatalResult, OrFatal, default_exit, panic, set_panic_hook};
pub use signal::{Signal, kill, parse_signal, process_exists, signal_name};

/// Runtime start-up: apply `CRASHCTX_*` settings from the environment and
/// warm up the unwinder so the first backtrace does not have to load
/// anything at crash time.
pub fn init() -> Result<()> {
    let settings = config::from_env()?;
    config::configure(settings);
    backtrace::prime();
    Ok(())
}
