//! Starting, stopping, and probing a branch's private postmaster via
//! `pg_ctl`.
//!
//! `pg_ctl status` reports "not running" with different exit codes across
//! PostgreSQL's own version history, so interpreting it correctly requires
//! knowing which version is in play first.

use std::path::{Path, PathBuf};

use crate::runner::{Invocation, RunError, Runner};

use super::error::PgError;
use super::path::PgInstallation;
use super::version::Version;

pub struct Postmaster<'a> {
    runner: &'a Runner,
    installation: &'a PgInstallation,
    data_dir: PathBuf,
}

impl<'a> Postmaster<'a> {
    pub fn new(runner: &'a Runner, installation: &'a PgInstallation, data_dir: impl AsRef<Path>) -> Self {
        Self { runner, installation, data_dir: data_dir.as_ref().to_path_buf() }
    }

    fn ctl(&self) -> Invocation {
        Invocation::new(self.installation.bin("pg_ctl")).arg("-D").arg(&self.data_dir)
    }

    pub fn version(&self) -> Result<Version, PgError> {
        let output = self.runner.run(&Invocation::new(self.installation.bin("pg_ctl")).arg("--version"))?;
        output.parse::<Version>().map_err(PgError::from)
    }

    /// Whether the postmaster is running, distinguishing "definitely
    /// running" / "definitely not running" from exit codes whose meaning
    /// `pg_ctl` changed across major versions.
    pub fn running(&self) -> Result<bool, PgError> {
        let invocation = self.ctl().arg("status").skip_log();
        let code = match self.runner.run(&invocation) {
            Ok(_) => return Ok(true),
            Err(RunError::NonZeroExit { code: Some(code), .. }) => code,
            Err(err) => return Err(err.into()),
        };

        let version = self.version()?;
        let exists = self.data_dir.join("PG_VERSION").is_file();
        let running = match version {
            Version::Post10(_, _) => match code {
                3 => Some(false),
                4 if !exists => Some(false),
                _ => None,
            },
            Version::Pre10(9, point, _) if point >= 4 => match code {
                3 => Some(false),
                4 if !exists => Some(false),
                _ => None,
            },
            Version::Pre10(9, point, _) if point >= 2 => match code {
                3 => Some(false),
                _ => None,
            },
            Version::Pre10(9, _, _) => match code {
                1 => Some(false),
                _ => None,
            },
            Version::Pre10(..) => None,
        };

        running.ok_or(PgError::UnsupportedStatusCode { version })
    }

    /// Start the postmaster if it isn't already running. `pg_ctl start -w`
    /// waits for startup to complete before returning. Run under `sudo -u
    /// postbranch`: `postgres` refuses to run as root, and the data
    /// directory is owned by the dedicated unprivileged user after base
    /// backup (see `create_repo`'s recursive chown).
    pub fn start(&self, log_file: &Path) -> Result<(), PgError> {
        if self.running()? {
            return Ok(());
        }
        let invocation = Invocation::new("sudo")
            .arg("-u")
            .arg("postbranch")
            .arg(self.installation.bin("pg_ctl"))
            .arg("start")
            .arg("-D")
            .arg(&self.data_dir)
            .arg("-l")
            .arg(log_file)
            .arg("-s")
            .arg("-w")
            .arg("-o")
            .arg("-h '' -k /var/run/postbranch");
        self.runner.run(&invocation)?;
        Ok(())
    }

    pub fn stop(&self) -> Result<(), PgError> {
        if !self.running()? {
            return Ok(());
        }
        self.runner.run(&self.ctl().arg("stop").arg("-s").arg("-m").arg("fast"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post10_exit_code_3_means_not_running() {
        let version = Version::Post10(15, 2);
        let code = 3;
        let exists = true;
        let running = match version {
            Version::Post10(_, _) => match code {
                3 => Some(false),
                4 if !exists => Some(false),
                _ => None,
            },
            _ => unreachable!(),
        };
        assert_eq!(running, Some(false));
    }

    #[test]
    fn post10_exit_code_4_with_missing_datadir_means_not_running() {
        let exists = false;
        let code = 4;
        let running = match code {
            3 => Some(false),
            4 if !exists => Some(false),
            _ => None,
        };
        assert_eq!(running, Some(false));
    }

    #[test]
    fn post10_unrecognised_code_is_unknown() {
        let exists = true;
        let code = 9;
        let running: Option<bool> = match code {
            3 => Some(false),
            4 if !exists => Some(false),
            _ => None,
        };
        assert_eq!(running, None);
    }
}
