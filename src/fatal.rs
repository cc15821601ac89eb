/*
 * fatal.rs
 *
 * The end of the line. panic() prints the reason, the crash context and a
 * backtrace, then stops the system; default_exit() just stops it.
 *
 * Nothing here allocates or takes a lock. Output is direct write(2) to
 * stderr, settings come from atomics, the context copy lives on the stack.
 *
 * Code below the top of the stack should not call panic() directly: return
 * a Fatal and let the entry point terminate with it.
 */

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use crate::backtrace::{self, StackTrace};
use crate::buffer::FixedBuf;
use crate::config::{self, PanicAction};
use crate::context::{CrashContext, Snapshot, crash_context};
use crate::error::exit_codes;
use crate::io::{self, StderrWriter};

/// Longest panic reason a `Fatal` carries.
pub const REASON_CAPACITY: usize = 256;

/* set on entry to the fatal path, never cleared */
static PANICKING: AtomicBool = AtomicBool::new(false);

/* user hook, stored as a type-erased fn pointer; null = none */
static PANIC_HOOK: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// An unrecoverable failure on its way up to the top of the stack.
///
/// There is no way to handle one except [`Fatal::terminate`].
#[must_use = "a Fatal must reach the top of the stack and terminate"]
pub struct Fatal {
    reason: FixedBuf<REASON_CAPACITY>,
}

impl Fatal {
    /// Reason is truncated to `REASON_CAPACITY` bytes.
    pub fn new(reason: &str) -> Self {
        Self {
            reason: FixedBuf::from_str_truncated(reason),
        }
    }

    pub fn from_args(args: fmt::Arguments<'_>) -> Self {
        Self {
            reason: FixedBuf::from_args(args),
        }
    }

    pub fn reason(&self) -> &str {
        self.reason.text()
    }

    /// Run the fatal path with this reason. Does not return.
    pub fn terminate(self) -> ! {
        panic(self.reason())
    }
}

impl fmt::Debug for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Fatal").field(&self.reason()).finish()
    }
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Build a [`Fatal`] with a formatted reason.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::fatal::Fatal::from_args(format_args!($($arg)*))
    };
}

pub type FatalResult<T> = core::result::Result<T, Fatal>;

/// Turn a missing value or a failure into a [`Fatal`].
pub trait OrFatal<T> {
    fn or_fatal(self, reason: &str) -> FatalResult<T>;
}

impl<T> OrFatal<T> for Option<T> {
    fn or_fatal(self, reason: &str) -> FatalResult<T> {
        self.ok_or_else(|| Fatal::new(reason))
    }
}

impl<T, E: fmt::Display> OrFatal<T> for core::result::Result<T, E> {
    /// The reason becomes `"<reason>: <error>"`.
    fn or_fatal(self, reason: &str) -> FatalResult<T> {
        self.map_err(|err| fatal!("{reason}: {err}"))
    }
}

/// Everything the operator gets to see about a crash.
pub struct FatalEvent<'a, const N: usize> {
    pub reason: &'a str,
    pub context: Snapshot<N>,
    pub backtrace: Option<StackTrace>,
}

impl<'a, const N: usize> FatalEvent<'a, N> {
    /// Reason plus a copy of `context`; no backtrace.
    pub fn new(reason: &'a str, context: &CrashContext<N>) -> Self {
        Self {
            reason,
            context: context.snapshot(),
            backtrace: None,
        }
    }

    pub fn with_backtrace(mut self, trace: StackTrace) -> Self {
        self.backtrace = Some(trace);
        self
    }
}

impl<const N: usize> fmt::Display for FatalEvent<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "*** PANIC: {}", self.reason)?;
        if self.context.is_empty() {
            writeln!(f, "*** context: <none>")?;
        } else {
            writeln!(f, "*** context: {}", self.context)?;
        }
        if self.context.is_torn() {
            writeln!(f, "*** context was being written; it may mix two values")?;
        }
        if let Some(trace) = &self.backtrace {
            writeln!(f, "*** backtrace:")?;
            fmt::Display::fmt(trace, f)?;
        }
        Ok(())
    }
}

/// Register a hook that runs after the report and before the system stops.
/// Replaces any earlier hook.
///
/// The hook runs in a broken system: keep it to writing bytes somewhere.
pub fn set_panic_hook(hook: fn(&str)) {
    PANIC_HOOK.store(hook as *mut (), Ordering::Release);
}

/// Remove the panic hook.
pub fn clear_panic_hook() {
    PANIC_HOOK.store(core::ptr::null_mut(), Ordering::Release);
}

fn panic_hook() -> Option<fn(&str)> {
    let raw = PANIC_HOOK.load(Ordering::Acquire);
    if raw.is_null() {
        return None;
    }
    // SAFETY: the only non-null values ever stored are `fn(&str)` pointers
    // cast in set_panic_hook; function and data pointers share a size on
    // every target this crate supports.
    Some(unsafe { core::mem::transmute::<*mut (), fn(&str)>(raw) })
}

/// True once the fatal path has started anywhere in the process.
pub fn is_panicking() -> bool {
    PANICKING.load(Ordering::Acquire)
}

/// Report `reason`, the crash context and a backtrace, then stop.
///
/// A second panic while this one is still reporting (from the hook, or
/// from another thread) prints one line and aborts on the spot.
#[inline(never)]
pub fn panic(reason: &str) -> ! {
    if PANICKING.swap(true, Ordering::AcqRel) {
        crate::eprintln!("*** panic while panicking: {reason}");
        // SAFETY: abort() has no preconditions and never returns.
        unsafe { libc::abort() }
    }

    let settings = config::current();
    let event = FatalEvent::new(reason, crash_context());
    {
        use core::fmt::Write;
        let _ = write!(StderrWriter, "\n{event}");
    }
    if settings.backtrace {
        backtrace::print_backtrace();
    }
    if let Some(hook) = panic_hook() {
        hook(reason);
    }
    crate::eprintln!("*** halting ({})", settings.action.as_str());
    halt(settings.action)
}

/// Orderly shutdown: no report, no backtrace, exit status 0.
pub fn default_exit() -> ! {
    // SAFETY: exit() runs atexit handlers and never returns.
    unsafe { libc::exit(i32::from(exit_codes::SUCCESS)) }
}

/// Stop the system the way `action` says. Does not return.
pub fn halt(action: PanicAction) -> ! {
    match action {
        PanicAction::Abort => {
            // SAFETY: abort() has no preconditions and never returns.
            unsafe { libc::abort() }
        }
        PanicAction::Exit => {
            // SAFETY: _exit() skips atexit handlers (they may touch broken
            // state) and never returns.
            unsafe { libc::_exit(i32::from(exit_codes::PANIC)) }
        }
        PanicAction::Halt => {
            io::eprint_str("*** system halted\n");
            loop {
                // SAFETY: pause() just sleeps until a signal arrives.
                unsafe {
                    libc::pause();
                }
            }
        }
    }
}
