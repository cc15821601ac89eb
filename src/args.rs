/*
 * args.rs
 *
 * Hand-rolled argv parsing over borrowed &str. Nothing here allocates;
 * the release binary has no heap.
 *
 *   crashctx [--action A] [--context TEXT] [--no-backtrace] [-v]
 *            <panic REASON | exit | kill PID [SIGNAL] | show>
 *
 * Flags must come before the subcommand. Everything after `panic` is the
 * reason, so `crashctx panic --action` panics with reason "--action".
 */

use crate::config::PanicAction;
use crate::error::{Error, Result};
use crate::signal::parse_kill_signal;

pub const USAGE: &str = "usage: crashctx [--action abort|exit|halt] [--context TEXT] \
[--no-backtrace] [-v] <panic REASON | exit | kill PID [SIGNAL] | show>";

/// What the binary was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Run the fatal path with this reason.
    Panic { reason: &'a str },
    /// Orderly shutdown.
    Exit,
    /// Send `signal` (0 = probe) to `pid`.
    Kill { pid: i32, signal: i32 },
    /// Print the crash context.
    Show,
    Help,
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Args<'a> {
    /// `--action`, overrides `CRASHCTX_PANIC_ACTION`
    pub action: Option<PanicAction>,
    /// `--context`, stored in the crash context before the command runs
    pub context: Option<&'a str>,
    /// `Some(false)` with `--no-backtrace`
    pub backtrace: Option<bool>,
    pub verbose: bool,
    pub command: Command<'a>,
}

/// Parse the arguments after argv[0].
pub fn parse_args<'a, I>(args: I) -> Result<Args<'a>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut args = args.into_iter();
    let mut action = None;
    let mut context = None;
    let mut backtrace = None;
    let mut verbose = false;

    let command = loop {
        let Some(arg) = args.next() else {
            return Err(Error::Usage("missing command"));
        };
        match arg {
            "-h" | "--help" => break Command::Help,
            "-V" | "--version" => break Command::Version,
            "-v" | "--verbose" => verbose = true,
            "--no-backtrace" => backtrace = Some(false),
            "--backtrace" => backtrace = Some(true),
            "-a" | "--action" => {
                let value = args.next().ok_or(Error::Usage("--action needs a value"))?;
                action = Some(PanicAction::parse(value)?);
            }
            "-c" | "--context" => {
                context = Some(args.next().ok_or(Error::Usage("--context needs a value"))?);
            }
            _ => {
                if let Some(value) = arg.strip_prefix("--action=") {
                    action = Some(PanicAction::parse(value)?);
                } else if let Some(value) = arg.strip_prefix("--context=") {
                    context = Some(value);
                } else {
                    break parse_command(arg, &mut args)?;
                }
            }
        }
    };

    Ok(Args {
        action,
        context,
        backtrace,
        verbose,
        command,
    })
}

fn parse_command<'a>(name: &'a str, rest: &mut impl Iterator<Item = &'a str>) -> Result<Command<'a>> {
    let command = match name {
        "panic" => Command::Panic {
            reason: rest.next().ok_or(Error::Usage("panic needs a reason"))?,
        },
        "exit" => Command::Exit,
        "show" => Command::Show,
        "kill" => {
            let pid = rest.next().ok_or(Error::Usage("kill needs a pid"))?;
            let pid = pid.trim().parse::<i32>().map_err(|_| Error::InvalidPid)?;
            let signal = match rest.next() {
                Some(sig) => parse_kill_signal(sig)?,
                None => libc::SIGTERM,
            };
            Command::Kill { pid, signal }
        }
        _ if name.starts_with('-') => return Err(Error::Usage("unknown option")),
        _ => return Err(Error::Usage("unknown command")),
    };
    if rest.next().is_some() {
        return Err(Error::Usage("too many arguments"));
    }
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &'static str) -> Result<Args<'static>> {
        parse_args(line.split_whitespace())
    }

    #[test]
    fn test_minimal_panic() {
        let args = parse("panic oops").unwrap();
        assert_eq!(args.command, Command::Panic { reason: "oops" });
        assert_eq!(args.action, None);
        assert_eq!(args.context, None);
        assert_eq!(args.backtrace, None);
        assert!(!args.verbose);
    }

    #[test]
    fn test_all_options() {
        let args = parse("--action exit --context block-42 --no-backtrace -v panic disk").unwrap();
        assert_eq!(args.action, Some(PanicAction::Exit));
        assert_eq!(args.context, Some("block-42"));
        assert_eq!(args.backtrace, Some(false));
        assert!(args.verbose);
        assert_eq!(args.command, Command::Panic { reason: "disk" });
    }

    #[test]
    fn test_equals_form() {
        let args = parse("--action=halt --context=boot show").unwrap();
        assert_eq!(args.action, Some(PanicAction::Halt));
        assert_eq!(args.context, Some("boot"));
        assert_eq!(args.command, Command::Show);
    }

    #[test]
    fn test_context_keeps_spaces() {
        let args = parse_args(["--context", "writing block 42", "exit"]).unwrap();
        assert_eq!(args.context, Some("writing block 42"));
        assert_eq!(args.command, Command::Exit);
    }

    #[test]
    fn test_kill_defaults_to_term() {
        let args = parse("kill 1234").unwrap();
        assert_eq!(
            args.command,
            Command::Kill {
                pid: 1234,
                signal: libc::SIGTERM
            }
        );
    }

    #[test]
    fn test_kill_with_signal() {
        assert_eq!(
            parse("kill 7 KILL").unwrap().command,
            Command::Kill {
                pid: 7,
                signal: libc::SIGKILL
            }
        );
        assert_eq!(parse("kill 7 0").unwrap().command, Command::Kill { pid: 7, signal: 0 });
    }

    #[test]
    fn test_kill_errors() {
        assert_eq!(parse("kill"), Err(Error::Usage("kill needs a pid")));
        assert_eq!(parse("kill abc"), Err(Error::InvalidPid));
        assert_eq!(parse("kill 7 SIGFOO"), Err(Error::UnknownSignal));
        assert_eq!(parse("kill 7 999"), Err(Error::InvalidSignal(999)));
    }

    #[test]
    fn test_bad_action() {
        assert_eq!(parse("--action reboot exit"), Err(Error::InvalidPanicAction));
        assert_eq!(parse("--action"), Err(Error::Usage("--action needs a value")));
    }

    #[test]
    fn test_missing_and_unknown() {
        assert_eq!(parse(""), Err(Error::Usage("missing command")));
        assert_eq!(parse("reboot"), Err(Error::Usage("unknown command")));
        assert_eq!(parse("--json show"), Err(Error::Usage("unknown option")));
        assert_eq!(parse("panic"), Err(Error::Usage("panic needs a reason")));
        assert_eq!(parse("exit now"), Err(Error::Usage("too many arguments")));
    }

    #[test]
    fn test_reason_may_look_like_a_flag() {
        assert_eq!(
            parse("panic --action").unwrap().command,
            Command::Panic { reason: "--action" }
        );
    }

    #[test]
    fn test_help_and_version_win() {
        assert_eq!(parse("--help").unwrap().command, Command::Help);
        assert_eq!(parse("-v -V").unwrap().command, Command::Version);
    }
}
