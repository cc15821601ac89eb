/*
 * main.rs
 *
 * Exercise the fatal path from a shell. Parse args, annotate, do the one
 * thing asked. The interesting stuff is in the library.
 *
 *   crashctx --context "writing block 42" panic "disk failure"
 *
 * Release builds are no_std/no_main with no allocator at all: argv is
 * borrowed straight out of the C argv array.
 */

#![cfg_attr(not(any(debug_assertions, test, doc)), no_std)]
#![cfg_attr(not(any(debug_assertions, test, doc)), no_main)]

mod panic;

use crashctx::args::{Args, Command, USAGE, parse_args};
use crashctx::config::{self, PanicAction};
use crashctx::context::{WriteOutcome, crash_context, crash_context_length};
use crashctx::error::exit_codes;
use crashctx::fatal::{Fatal, FatalResult};
use crashctx::signal::{Signal, kill, signal_name};
use crashctx::{default_exit, eprintln, println};

/* more than any sane invocation; the rest is a usage error */
#[cfg(not(any(debug_assertions, test, doc)))]
const MAX_ARGS: usize = 32;

/* release build entry point - C ABI */
#[cfg(not(any(debug_assertions, test, doc)))]
#[unsafe(no_mangle)]
pub extern "C" fn main(argc: i32, argv: *const *const core::ffi::c_char) -> i32 {
    let count = usize::try_from(argc).unwrap_or(0);
    if count > MAX_ARGS {
        eprintln!("crashctx: too many arguments");
        return i32::from(exit_codes::USAGE);
    }
    let mut slots = [""; MAX_ARGS];
    for (index, slot) in slots.iter_mut().enumerate().take(count) {
        // SAFETY: the C runtime hands main argc valid NUL-terminated strings
        // that live until the process exits.
        let arg = unsafe { core::ffi::CStr::from_ptr(*argv.add(index)) };
        match arg.to_str() {
            Ok(arg) => *slot = arg,
            Err(_) => {
                eprintln!("crashctx: argument {} is not valid UTF-8", index);
                return i32::from(exit_codes::USAGE);
            }
        }
    }
    i32::from(finish(run_main(&slots[..count])))
}

/* debug/test builds use standard Rust entry point */
#[cfg(any(debug_assertions, test, doc))]
fn main() {
    let owned: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let argv: Vec<&str> = owned.iter().map(String::as_str).collect();
    std::process::exit(i32::from(finish(run_main(&argv))));
}

/* the top of the stack: a Fatal ends here */
fn finish(result: FatalResult<u8>) -> u8 {
    match result {
        Ok(code) => code,
        Err(fatal) => fatal.terminate(),
    }
}

/* shared implementation; argv[0] included */
fn run_main(argv: &[&str]) -> FatalResult<u8> {
    if let Err(e) = crashctx::init() {
        eprintln!("crashctx: {}", e);
        return Ok(e.exit_code());
    }

    let args = match parse_args(argv.iter().skip(1).copied()) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("crashctx: {}", e);
            eprintln!("{}", USAGE);
            return Ok(e.exit_code());
        }
    };

    apply_overrides(&args);

    if let Some(text) = args.context {
        let outcome = crash_context().set_str(text);
        if args.verbose
            && let WriteOutcome::Truncated { len } = outcome
        {
            eprintln!("crashctx: context truncated to {} bytes", len);
        }
    }

    match args.command {
        Command::Help => {
            println!("{}", USAGE);
            Ok(exit_codes::SUCCESS)
        }
        Command::Version => {
            println!("crashctx {}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::SUCCESS)
        }
        Command::Show => {
            show();
            Ok(exit_codes::SUCCESS)
        }
        Command::Exit => {
            if args.verbose {
                eprintln!("crashctx: orderly shutdown");
            }
            default_exit()
        }
        Command::Kill { pid, signal } => send_signal(pid, signal, args.verbose),
        Command::Panic { reason } => Err(Fatal::new(reason)),
    }
}

/* flags beat CRASHCTX_* from the environment */
fn apply_overrides(args: &Args<'_>) {
    let mut settings = config::current();
    if let Some(action) = args.action {
        settings.action = action;
    }
    if let Some(backtrace) = args.backtrace {
        settings.backtrace = backtrace;
    }
    config::configure(settings);

    if args.verbose {
        eprintln!(
            "crashctx: on panic: {}, backtrace {}",
            describe(settings.action),
            if settings.backtrace { "on" } else { "off" }
        );
    }
}

fn describe(action: PanicAction) -> &'static str {
    match action {
        PanicAction::Abort => "abort (SIGABRT)",
        PanicAction::Exit => "exit 70",
        PanicAction::Halt => "halt and wait",
    }
}

fn show() {
    let snapshot = crash_context().snapshot();
    println!("capacity: {}", crash_context_length());
    if snapshot.is_empty() {
        println!("context: <none>");
    } else {
        println!("context: {}", snapshot);
    }
}

fn send_signal(pid: i32, signal: i32, verbose: bool) -> FatalResult<u8> {
    match kill(pid, signal) {
        Ok(()) => {
            if verbose {
                let name = Signal::try_from_raw(signal).map_or("probe", signal_name);
                eprintln!("crashctx: sent {} to {}", name, pid);
            }
            Ok(exit_codes::SUCCESS)
        }
        Err(e) => {
            eprintln!("crashctx: {}", e);
            Ok(e.exit_code())
        }
    }
}
