//! Uniform subprocess execution.
//!
//! Every other component that shells out (the ZFS layer, the PostgreSQL
//! driver) goes through [`Runner::run`]. It captures combined stdout/stderr,
//! places the child in its own process group so a crash in the child cannot
//! take the controller down with it (and so a future signal can target the
//! whole group), and can redact arguments that shouldn't end up in a log
//! file.

use std::ffi::OsStr;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Command, Stdio};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to launch {command}: {source}")]
    Spawn { command: String, #[source] source: std::io::Error },
    #[error("failed to read output of {command}: {source}")]
    Wait { command: String, #[source] source: std::io::Error },
    #[error("{command} exited with {status}")]
    NonZeroExit { command: String, status: String, output: String, code: Option<i32> },
}

impl RunError {
    /// The combined stdout/stderr captured before the failure, if any was
    /// captured. Callers persist this into `repo.output` / branch output so
    /// operators can see why a background task failed.
    pub fn output(&self) -> Option<&str> {
        match self {
            RunError::NonZeroExit { output, .. } => Some(output),
            _ => None,
        }
    }

    /// The child's raw exit code, when it exited (rather than being killed
    /// by a signal). Callers that need to distinguish exit codes beyond
    /// plain success/failure (`pg_ctl status`'s version-sensitive codes)
    /// read this instead of re-running the command themselves.
    pub fn code(&self) -> Option<i32> {
        match self {
            RunError::NonZeroExit { code, .. } => *code,
            _ => None,
        }
    }
}

/// One subprocess invocation.
#[derive(Clone, Debug)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    /// Indices into `args` that must not be logged verbatim.
    sensitive: Vec<usize>,
    /// Suppress logging even when the command fails; used for probes that
    /// are expected to fail in the ordinary course of things, e.g.
    /// `pg_ctl status` against a stopped cluster.
    skip_log: bool,
}

impl Invocation {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_string_lossy().into_owned(),
            args: Vec::new(),
            sensitive: Vec::new(),
            skip_log: false,
        }
    }

    #[must_use]
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    /// Mark the most-recently-added argument as sensitive: it is redacted as
    /// `<redacted>` in any log line this invocation produces.
    #[must_use]
    pub fn sensitive_arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self.sensitive.push(self.args.len() - 1);
        self
    }

    #[must_use]
    pub fn skip_log(mut self) -> Self {
        self.skip_log = true;
        self
    }

    fn redacted_args(&self) -> Vec<&str> {
        self.args
            .iter()
            .enumerate()
            .map(|(i, a)| if self.sensitive.contains(&i) { "<redacted>" } else { a.as_str() })
            .collect()
    }
}

/// The output of a successful run: combined stdout/stderr in the order the
/// child produced it is not reconstructible from separate pipes, so this
/// runner merges both into a single capture via `Stdio::piped()` + a single
/// read, same as the reference shell helper it replaces.
#[derive(Debug, Default)]
pub struct Runner;

impl Runner {
    pub fn new() -> Self {
        Self
    }

    /// Execute `invocation`, returning the combined stdout/stderr on
    /// success and an error carrying that same output on non-zero exit.
    /// The runner never retries — retry, if wanted, is a caller decision.
    pub fn run(&self, invocation: &Invocation) -> Result<String, RunError> {
        let display = format!("{} {}", invocation.program, invocation.redacted_args().join(" "));
        log::debug!("running: {display}");

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        // Each child gets its own process group so a crash there can't
        // propagate to us, and so a future implementation can signal the
        // whole group rather than just the immediate child.
        unsafe {
            command.pre_exec(|| {
                nix::unistd::setsid().map(|_| ()).map_err(std::io::Error::from)
            });
        }

        let child = command.spawn().map_err(|source| RunError::Spawn { command: display.clone(), source })?;
        let output = child.wait_with_output().map_err(|source| RunError::Wait { command: display.clone(), source })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            if !invocation.skip_log {
                log::debug!("{display} succeeded");
            }
            Ok(combined)
        } else {
            let status = match output.status.code() {
                Some(code) => format!("exit code {code}"),
                None => format!("signal {}", output.status.signal().unwrap_or(-1)),
            };
            if !invocation.skip_log {
                log::warn!("{display} failed ({status}): {combined}");
            }
            Err(RunError::NonZeroExit { command: display, status, output: combined, code: output.status.code() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_on_success() {
        let runner = Runner::new();
        let output = runner.run(&Invocation::new("echo").arg("hello")).unwrap();
        assert_eq!(output.trim(), "hello");
    }

    #[test]
    fn non_zero_exit_carries_output() {
        let runner = Runner::new();
        let err = runner
            .run(&Invocation::new("sh").arg("-c").arg("echo boom >&2; exit 7"))
            .unwrap_err();
        assert!(err.output().unwrap().contains("boom"));
    }

    #[test]
    fn sensitive_args_are_redacted_in_display() {
        let invocation = Invocation::new("psql").arg("-U").sensitive_arg("hunter2");
        assert_eq!(invocation.redacted_args(), vec!["-U", "<redacted>"]);
    }

    #[test]
    fn skip_log_probe_still_reports_combined_output() {
        let runner = Runner::new();
        let err = runner
            .run(&Invocation::new("sh").arg("-c").arg("exit 3").skip_log())
            .unwrap_err();
        assert_eq!(err.output().unwrap(), "");
    }
}
