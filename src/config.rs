/*
 * config.rs
 *
 * How the fatal path ends the world, and whether it walks the stack first.
 *
 * Held in atomics, not behind a lock: the fatal path reads these after
 * anything else may have died. Environment first, command-line flags on top.
 *
 *   CRASHCTX_PANIC_ACTION = abort | exit | halt
 *   CRASHCTX_BACKTRACE    = 1 | 0 | on | off
 */

use core::ffi::{CStr, c_char};
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::error::{Error, Result};

pub const ENV_PANIC_ACTION: &CStr = c"CRASHCTX_PANIC_ACTION";
pub const ENV_BACKTRACE: &CStr = c"CRASHCTX_BACKTRACE";

/// What the fatal path does once the report is out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PanicAction {
    /// abort(3): SIGABRT, core dump if the host keeps them.
    #[default]
    Abort = 0,
    /// _exit(2) with `exit_codes::PANIC`, for supervisors that restart on
    /// exit status.
    Exit = 1,
    /// Stop making progress and stay put, so a debugger can attach.
    Halt = 2,
}

impl PanicAction {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.eq_ignore_ascii_case("abort") {
            Ok(Self::Abort)
        } else if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("shutdown") {
            Ok(Self::Exit)
        } else if input.eq_ignore_ascii_case("halt") {
            Ok(Self::Halt)
        } else {
            Err(Error::InvalidPanicAction)
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::Exit => "exit",
            Self::Halt => "halt",
        }
    }

    const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Exit,
            2 => Self::Halt,
            _ => Self::Abort,
        }
    }
}

/// Fatal-path settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub action: PanicAction,
    /// Print a backtrace with the report.
    pub backtrace: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            action: PanicAction::Abort,
            backtrace: true,
        }
    }
}

static ACTION: AtomicU8 = AtomicU8::new(PanicAction::Abort as u8);
static BACKTRACE: AtomicBool = AtomicBool::new(true);

/// Install `settings` process-wide.
pub fn configure(settings: Settings) {
    ACTION.store(settings.action as u8, Ordering::Release);
    BACKTRACE.store(settings.backtrace, Ordering::Release);
}

/// Settings currently in force. Lock-free; safe from the fatal path.
pub fn current() -> Settings {
    Settings {
        action: PanicAction::from_raw(ACTION.load(Ordering::Acquire)),
        backtrace: BACKTRACE.load(Ordering::Acquire),
    }
}

/// Current settings with any `CRASHCTX_*` variables applied on top.
///
/// Unset variables keep the current value; set-but-invalid ones are errors
/// so a typo does not silently change how the system dies.
pub fn from_env() -> Result<Settings> {
    let mut settings = current();
    if let Some(value) = get_env(ENV_PANIC_ACTION) {
        settings.action = PanicAction::parse(value)?;
    }
    if let Some(value) = get_env(ENV_BACKTRACE) {
        settings.backtrace = parse_switch(value)?;
    }
    Ok(settings)
}

pub fn parse_switch(input: &str) -> Result<bool> {
    let input = input.trim();
    if input == "1" || input.eq_ignore_ascii_case("on") || input.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if input == "0"
        || input.eq_ignore_ascii_case("off")
        || input.eq_ignore_ascii_case("false")
    {
        Ok(false)
    } else {
        Err(Error::InvalidBacktraceSetting)
    }
}

/// Read an environment variable without allocating. Non-UTF-8 values read
/// as unset.
///
/// The returned slice points into the environment block; don't call this
/// concurrently with setenv(3).
pub fn get_env(name: &CStr) -> Option<&'static str> {
    // SAFETY: name is a valid NUL-terminated string; getenv only reads it.
    let value: *const c_char = unsafe { libc::getenv(name.as_ptr()) };
    if value.is_null() {
        return None;
    }
    // SAFETY: getenv returned a non-null pointer to a NUL-terminated string
    // in the environment block, which lives until the variable is modified.
    let value = unsafe { CStr::from_ptr(value) };
    value.to_str().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action() {
        assert_eq!(PanicAction::parse("abort").unwrap(), PanicAction::Abort);
        assert_eq!(PanicAction::parse("EXIT").unwrap(), PanicAction::Exit);
        assert_eq!(PanicAction::parse(" halt ").unwrap(), PanicAction::Halt);
        assert_eq!(PanicAction::parse("shutdown").unwrap(), PanicAction::Exit);
        assert_eq!(PanicAction::parse("reboot"), Err(Error::InvalidPanicAction));
    }

    #[test]
    fn test_action_roundtrips_through_raw() {
        for action in [PanicAction::Abort, PanicAction::Exit, PanicAction::Halt] {
            assert_eq!(PanicAction::from_raw(action as u8), action);
            assert_eq!(PanicAction::parse(action.as_str()).unwrap(), action);
        }
    }

    #[test]
    fn test_parse_switch() {
        assert!(parse_switch("1").unwrap());
        assert!(parse_switch("On").unwrap());
        assert!(!parse_switch("0").unwrap());
        assert!(!parse_switch("off").unwrap());
        assert!(parse_switch("maybe").is_err());
    }

    #[test]
    fn test_get_env_unset() {
        assert_eq!(get_env(c"CRASHCTX_SURELY_NOT_SET_ANYWHERE"), None);
    }

    #[test]
    fn test_get_env_reads_path() {
        /* PATH is set in any sane test environment */
        assert!(get_env(c"PATH").is_some());
    }
}
