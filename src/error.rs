/*
 * error.rs
 *
 * Recoverable failures only. Anything unrecoverable is a fatal::Fatal and
 * ends the process; it never shows up here.
 *
 * No String payloads: this has to build without alloc.
 */

use core::fmt;

/// exit codes of the crashctx binary. scripts and supervisors key on these.
pub mod exit_codes {
    /// Command succeeded (or the process was found)
    pub const SUCCESS: u8 = 0;
    /// kill(2) reported failure
    pub const KILL_FAILED: u8 = 1;
    /// Bad command line or environment
    pub const USAGE: u8 = 2;
    /// Fatal path ran with PanicAction::Exit (EX_SOFTWARE)
    pub const PANIC: u8 = 70;
}

/* everything that can go wrong without being fatal */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    NoSuchProcess(i32),    // pid
    PermissionDenied(i32), // pid
    InvalidSignal(i32),    // raw signal number kill(2) rejected
    SignalError(i32),      // any other errno from kill(2)
    UnknownSignal,
    InvalidPid,
    InvalidPanicAction,
    InvalidBacktraceSetting,
    Usage(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchProcess(pid) => write!(f, "no such process: {pid}"),
            Self::PermissionDenied(pid) => write!(f, "permission denied signalling {pid}"),
            Self::InvalidSignal(sig) => write!(f, "invalid signal: {sig}"),
            Self::SignalError(errno) => write!(f, "signal error: errno {errno}"),
            Self::UnknownSignal => write!(f, "unknown signal"),
            Self::InvalidPid => write!(f, "invalid pid"),
            Self::InvalidPanicAction => {
                write!(f, "invalid panic action (expected abort, exit or halt)")
            }
            Self::InvalidBacktraceSetting => {
                write!(f, "invalid backtrace setting (expected 0, 1, off or on)")
            }
            Self::Usage(msg) => write!(f, "{msg}"),
        }
    }
}

impl Error {
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::NoSuchProcess(_)
            | Self::PermissionDenied(_)
            | Self::InvalidSignal(_)
            | Self::SignalError(_) => exit_codes::KILL_FAILED,
            Self::UnknownSignal
            | Self::InvalidPid
            | Self::InvalidPanicAction
            | Self::InvalidBacktraceSetting
            | Self::Usage(_) => exit_codes::USAGE,
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
