/*
 * library_api.rs
 *
 * integration-style tests exercising crashctx as a library.
 *
 * goal: ensure the public API is usable without shelling out to the CLI.
 * the process-wide store and settings are shared by every test in this
 * binary, so each global is touched by exactly one test. panic() never
 * returns; those tests re-run this binary as a child that dies instead.
 */

use std::os::unix::process::ExitStatusExt;
use std::process::Output;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crashctx::buffer::FixedBuf;
use crashctx::config::{self, PanicAction, Settings};
use crashctx::context::{CrashContext, WriteOutcome};
use crashctx::error::{Error, exit_codes};
use crashctx::fatal::{Fatal, FatalEvent, FatalResult, OrFatal};
use crashctx::signal::{Signal, kill, process_exists};
use crashctx::{
    StackTrace, crash_context, crash_context_buffer, crash_context_length, fatal, set_panic_hook,
};

/* =========================================================================
 * PROCESS-WIDE STORE
 * ========================================================================= */

#[test]
fn library_global_store_roundtrip() {
    assert_eq!(crash_context_length(), crashctx::CRASH_CONTEXT_CAPACITY);
    assert_eq!(crash_context_buffer().len(), crash_context_length());

    crashctx::set_crash_context!("handling request from {}", "10.0.0.7");
    assert_eq!(
        crash_context().snapshot().as_bytes(),
        b"handling request from 10.0.0.7"
    );

    /* a longer value first, then a shorter one: no residue */
    let _ = crash_context().set_str("mounting /dev/vda1 read-write");
    let _ = crash_context().set_str("idle");
    assert_eq!(crash_context().snapshot().text(), "idle");

    let huge = "z".repeat(crash_context_length() * 2);
    assert_eq!(
        crash_context().set_str(&huge),
        WriteOutcome::Truncated {
            len: crash_context_length() - 1
        }
    );
    assert_eq!(crash_context().snapshot().len(), crash_context_length() - 1);

    #[cfg(feature = "c-abi")]
    check_c_side_writes();

    let _ = crash_context().clear();
    assert!(crash_context().snapshot().is_empty());
}

/* what C code does: snprintf or memcpy straight into the exported buffer */
#[cfg(feature = "c-abi")]
fn check_c_side_writes() {
    use crashctx::ffi::{get_crash_context_buffer, get_crash_context_length};

    let buf = get_crash_context_buffer();
    let len = get_crash_context_length();

    // SAFETY: buf is valid for len bytes; the format consumes one int.
    let wrote = unsafe { libc::snprintf(buf, len, c"writing block %d".as_ptr(), 42) };
    assert_eq!(wrote, 16);
    let snapshot = crash_context().snapshot();
    assert_eq!(snapshot.text(), "writing block 42");
    assert!(!snapshot.is_torn());

    let event = FatalEvent::new("disk failure", crash_context());
    let report: FixedBuf<256> = FixedBuf::from_args(format_args!("{event}"));
    assert!(report.text().contains("*** context: writing block 42"), "{report}");

    let text = b"handling request from 10.0.0.7\0";
    // SAFETY: text fits in the len-byte buffer and does not overlap it.
    unsafe { std::ptr::copy_nonoverlapping(text.as_ptr(), buf.cast::<u8>(), text.len()) };
    assert_eq!(
        crash_context().snapshot().as_bytes(),
        b"handling request from 10.0.0.7"
    );

    /* every byte filled, no terminator: reads stop one short of capacity */
    // SAFETY: buf is valid for len bytes.
    unsafe { std::ptr::write_bytes(buf.cast::<u8>(), b'q', len) };
    let snapshot = crash_context().snapshot();
    assert_eq!(snapshot.len(), len - 1);
    assert!(snapshot.as_bytes().iter().all(|&b| b == b'q'));

    /* snprintf truncates to len - 1 and terminates */
    let long = std::ffi::CString::new("x".repeat(len * 2)).unwrap();
    // SAFETY: buf is valid for len bytes; long is NUL-terminated.
    unsafe { libc::snprintf(buf, len, c"%s".as_ptr(), long.as_ptr()) };
    assert_eq!(crash_context().snapshot().len(), len - 1);
}

/* =========================================================================
 * CONCURRENT WRITERS
 * ========================================================================= */

#[test]
fn library_concurrent_writers_never_splice() {
    const ROUNDS: usize = 2_000;
    let a = [b'A'; 50];
    let b = [b'B'; 50];

    let ctx: Arc<CrashContext<64>> = Arc::new(CrashContext::new());
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let ctx = Arc::clone(&ctx);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut checked = 0usize;
            while !done.load(Ordering::Acquire) {
                let snapshot = ctx.snapshot();
                if snapshot.is_torn() {
                    continue;
                }
                let bytes = snapshot.as_bytes();
                assert!(
                    bytes.is_empty() || bytes == [b'A'; 50] || bytes == [b'B'; 50],
                    "spliced value: {snapshot}"
                );
                checked += 1;
            }
            checked
        })
    };

    let writers: Vec<_> = [a, b]
        .into_iter()
        .map(|text| {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || {
                let mut landed = 0usize;
                for _ in 0..ROUNDS {
                    if ctx.set_bytes(&text) != WriteOutcome::Contended {
                        landed += 1;
                    }
                }
                landed
            })
        })
        .collect();

    let landed: usize = writers.into_iter().map(|w| w.join().unwrap()).sum();
    done.store(true, Ordering::Release);
    reader.join().unwrap();

    assert!(landed > 0);
    let last = ctx.snapshot();
    assert!(!last.is_torn());
    assert!(last.as_bytes() == [b'A'; 50] || last.as_bytes() == [b'B'; 50]);
}

/* =========================================================================
 * CONFIGURATION
 * ========================================================================= */

#[test]
fn library_configure_roundtrip() {
    /* whatever CRASHCTX_* the shell exports, init applies exactly that */
    crashctx::init().unwrap();
    assert_eq!(config::current(), config::from_env().unwrap());

    let quiet = Settings {
        action: PanicAction::Exit,
        backtrace: false,
    };
    config::configure(quiet);
    assert_eq!(config::current(), quiet);

    config::configure(Settings::default());
    assert_eq!(config::current().action, PanicAction::Abort);
}

/* =========================================================================
 * FATAL OUTCOMES
 * ========================================================================= */

fn find_root(devices: &[&'static str]) -> FatalResult<&'static str> {
    let first = devices.first().copied().or_fatal("no root device")?;
    if first.is_empty() {
        return Err(fatal!("root device {:?} has no name", first));
    }
    Ok(first)
}

#[test]
fn library_fatal_propagates_with_question_mark() {
    assert_eq!(find_root(&["vda"]).unwrap(), "vda");
    assert_eq!(find_root(&[]).unwrap_err().reason(), "no root device");
    assert_eq!(
        find_root(&[""]).unwrap_err().reason(),
        "root device \"\" has no name"
    );
}

#[test]
fn library_fatal_wraps_recoverable_errors() {
    let err = kill(i32::MAX, 0).or_fatal("probe").unwrap_err();
    assert!(err.reason().starts_with("probe: no such process"), "{err}");
    assert_eq!(format!("{:?}", Fatal::new("x")), "Fatal(\"x\")");
}

#[test]
fn library_fatal_event_report() {
    let ctx: CrashContext<128> = CrashContext::new();
    let _ = ctx.set(format_args!("writing block {}", 42));
    let event = FatalEvent::new("disk failure", &ctx)
        .with_backtrace(StackTrace::from_frames(&[0x1000, 0x2000]));

    let report: FixedBuf<512> = FixedBuf::from_args(format_args!("{event}"));
    let lines: Vec<&str> = report.text().lines().collect();
    assert_eq!(lines[0], "*** PANIC: disk failure");
    assert_eq!(lines[1], "*** context: writing block 42");
    assert_eq!(lines[2], "*** backtrace:");
    assert_eq!(lines.len(), 5);
}

/* =========================================================================
 * SIGNALS
 * ========================================================================= */

#[test]
fn library_kill_semantics() {
    let me = std::process::id() as i32;
    assert!(kill(me, 0).is_ok());
    assert!(process_exists(me));
    assert_eq!(kill(i32::MAX, 0), Err(Error::NoSuchProcess(i32::MAX)));
    assert!(!process_exists(i32::MAX));
    assert_eq!(kill(me, -1), Err(Error::InvalidSignal(-1)));
    assert_eq!(Error::NoSuchProcess(1).exit_code(), exit_codes::KILL_FAILED);
    assert_eq!(crashctx::parse_signal("TERM"), Ok(Signal::SIGTERM));
}

/* =========================================================================
 * FATAL PATH, IN A CHILD PROCESS
 * ========================================================================= */

const SCENARIO_ENV: &str = "CRASHCTX_TEST_SCENARIO";

fn report_hook(reason: &str) {
    crashctx::eprintln!("hook ran: {}", reason);
}

fn panicking_hook(reason: &str) {
    if crashctx::fatal::is_panicking() {
        crashctx::panic("second");
    }
    crashctx::eprintln!("hook ran outside a panic: {}", reason);
}

/* does nothing unless a parent test asked for a scenario */
#[test]
fn fatal_path_scenario() {
    let Ok(scenario) = std::env::var(SCENARIO_ENV) else {
        return;
    };
    config::configure(Settings {
        action: PanicAction::Exit,
        backtrace: false,
    });
    let _ = crash_context().set_str("writing block 42");
    match scenario.as_str() {
        "hook" => {
            set_panic_hook(report_hook);
            crashctx::panic("first")
        }
        "reentrant" => {
            set_panic_hook(panicking_hook);
            crashctx::panic("first")
        }
        #[cfg(feature = "c-abi")]
        // SAFETY: null is an accepted argument.
        "c-null" => unsafe { crashctx::ffi::panic(std::ptr::null()) },
        other => panic!("unknown scenario {other}"),
    }
}

fn run_scenario(name: &str) -> Output {
    std::process::Command::new(std::env::current_exe().unwrap())
        .args(["fatal_path_scenario", "--exact", "--test-threads=1"])
        .env(SCENARIO_ENV, name)
        .env_remove("CRASHCTX_PANIC_ACTION")
        .env_remove("CRASHCTX_BACKTRACE")
        .output()
        .unwrap()
}

#[test]
fn library_panic_hook_runs_between_report_and_halt() {
    let output = run_scenario("hook");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(i32::from(exit_codes::PANIC)), "{stderr}");

    let context = stderr.find("*** context: writing block 42").expect("context line");
    let hook = stderr.find("hook ran: first").expect("hook output");
    let halting = stderr.find("*** halting (exit)").expect("halting line");
    assert!(context < hook && hook < halting, "{stderr}");
}

#[test]
fn library_panic_while_panicking_aborts() {
    let output = run_scenario("reentrant");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("*** PANIC: first"), "{stderr}");
    assert!(stderr.contains("*** panic while panicking: second"), "{stderr}");
    assert!(!stderr.contains("*** halting"), "{stderr}");
    assert_eq!(output.status.signal(), Some(libc::SIGABRT));
}

#[cfg(feature = "c-abi")]
#[test]
fn library_c_panic_with_null_reason() {
    let output = run_scenario("c-null");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(i32::from(exit_codes::PANIC)), "{stderr}");
    assert!(stderr.contains("*** PANIC: (null)"), "{stderr}");
    assert!(stderr.contains("*** context: writing block 42"), "{stderr}");
}
