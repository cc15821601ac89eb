/*
 * signal.rs
 *
 * kill(2) and the signal names that go with it. Parse "TERM", "SIGTERM",
 * "term", "15"; reject "SIGFOO", "999".
 *
 * This is the one primitive here that reports failure normally: ESRCH and
 * EPERM are ordinary answers, not crashes. Signal 0 is the existence probe.
 *
 * Local Signal enum with libc constants - no nix dependency.
 */

use crate::error::{Error, Result};
use crate::io::errno;

/* POSIX signals as i32 values from libc. Copy/PartialEq for easy comparison. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Signal {
    SIGHUP = libc::SIGHUP,
    SIGINT = libc::SIGINT,
    SIGQUIT = libc::SIGQUIT,
    SIGILL = libc::SIGILL,
    SIGTRAP = libc::SIGTRAP,
    SIGABRT = libc::SIGABRT,
    SIGBUS = libc::SIGBUS,
    SIGFPE = libc::SIGFPE,
    SIGKILL = libc::SIGKILL,
    SIGUSR1 = libc::SIGUSR1,
    SIGSEGV = libc::SIGSEGV,
    SIGUSR2 = libc::SIGUSR2,
    SIGPIPE = libc::SIGPIPE,
    SIGALRM = libc::SIGALRM,
    SIGTERM = libc::SIGTERM,
    SIGCHLD = libc::SIGCHLD,
    SIGCONT = libc::SIGCONT,
    SIGSTOP = libc::SIGSTOP,
    SIGTSTP = libc::SIGTSTP,
    SIGTTIN = libc::SIGTTIN,
    SIGTTOU = libc::SIGTTOU,
    SIGURG = libc::SIGURG,
    SIGXCPU = libc::SIGXCPU,
    SIGXFSZ = libc::SIGXFSZ,
    SIGVTALRM = libc::SIGVTALRM,
    SIGPROF = libc::SIGPROF,
    SIGWINCH = libc::SIGWINCH,
    SIGIO = libc::SIGIO,
    SIGSYS = libc::SIGSYS,
}

impl Signal {
    /* convert from raw signal number */
    pub fn try_from_raw(num: i32) -> Option<Self> {
        ALL_SIGNALS.iter().copied().find(|sig| sig.as_raw() == num)
    }

    /* get raw signal number */
    #[inline]
    pub const fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Parse "TERM", "SIGKILL", "9", "hup" - all the ways to specify a signal.
///
/// # Examples
///
/// ```
/// use crashctx::signal::{parse_signal, Signal};
///
/// assert_eq!(parse_signal("TERM").unwrap(), Signal::SIGTERM);
/// assert_eq!(parse_signal("SIGTERM").unwrap(), Signal::SIGTERM);
/// assert_eq!(parse_signal("term").unwrap(), Signal::SIGTERM);
/// assert_eq!(parse_signal("15").unwrap(), Signal::SIGTERM);
/// assert_eq!(parse_signal("9").unwrap(), Signal::SIGKILL);
/// ```
pub fn parse_signal(input: &str) -> Result<Signal> {
    let input = input.trim();

    /* try as number first */
    if let Ok(num) = input.parse::<i32>() {
        return Signal::try_from_raw(num).ok_or(Error::InvalidSignal(num));
    }

    /* strip optional SIG prefix without allocation */
    let name = input
        .strip_prefix("SIG")
        .or_else(|| input.strip_prefix("sig"))
        .or_else(|| input.strip_prefix("Sig"))
        .unwrap_or(input);

    /* case-insensitive lookup, no heap; TERM and KILL first */
    ALL_SIGNALS
        .iter()
        .copied()
        .find(|sig| {
            signal_name(*sig)[3..].eq_ignore_ascii_case(name)
                || (*sig == Signal::SIGABRT && name.eq_ignore_ascii_case("IOT"))
        })
        .ok_or(Error::UnknownSignal)
}

/// Like [`parse_signal`] but also accepts `0`, the existence probe.
pub fn parse_kill_signal(input: &str) -> Result<i32> {
    if input.trim() == "0" {
        return Ok(0);
    }
    parse_signal(input).map(Signal::as_raw)
}

/// Send raw signal `sig` to `pid`. `sig == 0` only checks that `pid` exists
/// and may be signalled.
///
/// POSIX semantics: `ESRCH`, `EPERM` and `EINVAL` come back as errors for
/// the caller to handle.
pub fn kill(pid: i32, sig: i32) -> Result<()> {
    // SAFETY: kill() is safe with any pid/signal combo, returns -1 on error
    let ret = unsafe { libc::kill(pid, sig) };
    if ret == 0 {
        return Ok(());
    }
    Err(match errno() {
        libc::ESRCH => Error::NoSuchProcess(pid),
        libc::EPERM => Error::PermissionDenied(pid),
        libc::EINVAL => Error::InvalidSignal(sig),
        other => Error::SignalError(other),
    })
}

/// True if `pid` exists, even when we lack permission to signal it.
pub fn process_exists(pid: i32) -> bool {
    match kill(pid, 0) {
        Ok(()) | Err(Error::PermissionDenied(_)) => true,
        Err(_) => false,
    }
}

/* lookup order for name parsing: TERM and KILL cover most usage */
const ALL_SIGNALS: [Signal; 29] = [
    Signal::SIGTERM,
    Signal::SIGKILL,
    Signal::SIGINT,
    Signal::SIGHUP,
    Signal::SIGQUIT,
    Signal::SIGABRT,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGALRM,
    Signal::SIGCONT,
    Signal::SIGSTOP,
    Signal::SIGTSTP,
    Signal::SIGPIPE,
    Signal::SIGCHLD,
    Signal::SIGSEGV,
    Signal::SIGBUS,
    Signal::SIGFPE,
    Signal::SIGILL,
    Signal::SIGTRAP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
    Signal::SIGURG,
    Signal::SIGXCPU,
    Signal::SIGXFSZ,
    Signal::SIGVTALRM,
    Signal::SIGPROF,
    Signal::SIGWINCH,
    Signal::SIGIO,
    Signal::SIGSYS,
];

/* human-readable name for verbose output */
#[must_use]
pub const fn signal_name(signal: Signal) -> &'static str {
    match signal {
        Signal::SIGHUP => "SIGHUP",
        Signal::SIGINT => "SIGINT",
        Signal::SIGQUIT => "SIGQUIT",
        Signal::SIGILL => "SIGILL",
        Signal::SIGTRAP => "SIGTRAP",
        Signal::SIGABRT => "SIGABRT",
        Signal::SIGBUS => "SIGBUS",
        Signal::SIGFPE => "SIGFPE",
        Signal::SIGKILL => "SIGKILL",
        Signal::SIGUSR1 => "SIGUSR1",
        Signal::SIGSEGV => "SIGSEGV",
        Signal::SIGUSR2 => "SIGUSR2",
        Signal::SIGPIPE => "SIGPIPE",
        Signal::SIGALRM => "SIGALRM",
        Signal::SIGTERM => "SIGTERM",
        Signal::SIGCHLD => "SIGCHLD",
        Signal::SIGCONT => "SIGCONT",
        Signal::SIGSTOP => "SIGSTOP",
        Signal::SIGTSTP => "SIGTSTP",
        Signal::SIGTTIN => "SIGTTIN",
        Signal::SIGTTOU => "SIGTTOU",
        Signal::SIGURG => "SIGURG",
        Signal::SIGXCPU => "SIGXCPU",
        Signal::SIGXFSZ => "SIGXFSZ",
        Signal::SIGVTALRM => "SIGVTALRM",
        Signal::SIGPROF => "SIGPROF",
        Signal::SIGWINCH => "SIGWINCH",
        Signal::SIGIO => "SIGIO",
        Signal::SIGSYS => "SIGSYS",
    }
}
