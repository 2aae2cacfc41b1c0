//! Fixtures and gates shared by `postbranch-core` and `postbranch-cli`'s test
//! suites.
//!
//! Most of this crate's tests need things a sandboxed CI runner typically
//! does not have: `euid == 0`, `zpool`/`zfs` on `$PATH`, a loop-control
//! device. Rather than fail in those environments, tests use the
//! [`requires_root!`] and [`requires_zfs!`] macros to skip themselves with a
//! log message.

pub mod fixture;

#[ctor::ctor]
/// Initialise a logger for tests. Without this, logs are not emitted – and we
/// are left with less informative captured test output when tests fail.
unsafe fn init_logger() {
    use std::io::{stdout, IsTerminal};
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .with_colors(stdout().is_terminal())
        .env()
        .init()
        .expect("could not initialize logger");
}

/// Returns true if the current process is running as root.
pub fn running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Returns true if both `zpool` and `zfs` are present on `$PATH`.
pub fn zfs_tooling_present() -> bool {
    which::which("zpool").is_ok() && which::which("zfs").is_ok()
}

/// Skip (return early from) the calling test unless running as root.
///
/// This crate has no access to a custom test harness, so "skip" means the
/// test body does not run and the test still reports as passed; the log
/// message at `warn` is how a CI run distinguishes "skipped" from "trivially
/// passed" in its output.
#[macro_export]
macro_rules! requires_root {
    () => {
        if !$crate::running_as_root() {
            log::warn!("skipping {}: requires euid == 0", module_path!());
            return;
        }
    };
}

/// Skip the calling test unless `zpool`/`zfs` are on `$PATH`.
#[macro_export]
macro_rules! requires_zfs {
    () => {
        if !$crate::zfs_tooling_present() {
            log::warn!("skipping {}: zpool/zfs not found on $PATH", module_path!());
            return;
        }
    };
}
