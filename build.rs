/*
 * build.rs
 *
 * Build script for crashctx.
 * Ensures libc is linked for the no_std release binary.
 */

fn main() {
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();

    /* darwin-only link flags */
    if target_os == "macos" {
        // #![no_std] makes rustc pass -nodefaultlibs; write, kill, abort,
        // backtrace and friends come from libSystem.
        println!("cargo:rustc-link-lib=c");
        println!("cargo:rustc-link-lib=System");
    }
    println!("cargo:rerun-if-changed=build.rs");
}
