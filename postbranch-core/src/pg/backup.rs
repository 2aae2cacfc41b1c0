use std::path::Path;

use super::error::PgError;
use super::path::PgInstallation;
use crate::runner::{Invocation, Runner};

/// Physical base backup of a remote cluster into `target_dir`, which becomes
/// the `main` branch's data directory. Runs under the caller's `.pgpass`
/// entry (see [`super::secrets::with_pgpass_entry`]); the password itself
/// never appears on the command line.
pub fn base_backup(
    runner: &Runner,
    installation: &PgInstallation,
    host: &str,
    port: u16,
    username: &str,
    target_dir: &Path,
) -> Result<(), PgError> {
    runner.run(
        &Invocation::new(installation.bin("pg_basebackup"))
            .arg("-h")
            .arg(host)
            .arg("-p")
            .arg(port.to_string())
            .arg("-U")
            .arg(username)
            .arg("-D")
            .arg(target_dir)
            .arg("-Fp")
            .arg("-Xs")
            .arg("-P"),
    )?;
    Ok(())
}
