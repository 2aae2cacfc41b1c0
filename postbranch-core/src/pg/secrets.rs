//! `~/.pgpass` handling.
//!
//! The file is process-global (there's one per invoking user, and this
//! daemon runs as a single user) and every base backup writes a line to it,
//! does its work, then removes the line again. Two concurrent base backups
//! would stomp on each other's lines, so access is serialised behind a
//! single process-wide mutex; only one base backup proceeds at a time.

use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use tokio::sync::Mutex;

use super::error::PgError;

static PGPASS_LOCK: Mutex<()> = Mutex::const_new(());

pub struct AuthInfo<'a> {
    pub host: &'a str,
    pub port: u16,
    pub username: &'a str,
    pub password: &'a str,
}

fn pgpass_path(home: &std::path::Path) -> PathBuf {
    home.join(".pgpass")
}

fn format_line(auth: &AuthInfo) -> String {
    format!("{}:{}:*:{}:{}\n", auth.host, auth.port, auth.username, auth.password)
}

/// Hold the process-wide `.pgpass` lock for the duration of `work`, having
/// first written `auth`'s line into the file (mode 0600) and guaranteeing
/// its removal afterwards regardless of how `work` completes.
pub async fn with_pgpass_entry<F, Fut, T>(home: &std::path::Path, auth: AuthInfo<'_>, work: F) -> Result<T, PgError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, PgError>>,
{
    let _permit = PGPASS_LOCK.lock().await;
    let path = pgpass_path(home);
    let mut file =
        std::fs::OpenOptions::new().create(true).append(true).mode(0o600).open(&path)?;
    file.write_all(format_line(&auth).as_bytes())?;
    drop(file);

    let result = work().await;

    remove_line(&path, &auth)?;
    result
}

fn remove_line(path: &std::path::Path, auth: &AuthInfo) -> Result<(), PgError> {
    let line = format_line(auth);
    let contents = std::fs::read_to_string(path).unwrap_or_default();
    let filtered: String = contents.lines().filter(|l| format!("{l}\n") != line).map(|l| format!("{l}\n")).collect();
    std::fs::OpenOptions::new().write(true).truncate(true).mode(0o600).open(path)?.write_all(filtered.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entry_is_removed_after_work_completes() {
        let dir = tempfile::tempdir().unwrap();
        let auth = AuthInfo { host: "127.0.0.1", port: 5432, username: "repl", password: "hunter2" };
        with_pgpass_entry(dir.path(), auth, || async { Ok(()) }).await.unwrap();
        let contents = std::fs::read_to_string(dir.path().join(".pgpass")).unwrap_or_default();
        assert!(!contents.contains("hunter2"));
    }

    #[tokio::test]
    async fn entry_is_removed_even_if_work_fails() {
        let dir = tempfile::tempdir().unwrap();
        let auth = AuthInfo { host: "127.0.0.1", port: 5432, username: "repl", password: "hunter2" };
        let result: Result<(), PgError> =
            with_pgpass_entry(dir.path(), auth, || async { Err(PgError::NotSuperuser) }).await;
        assert!(result.is_err());
        let contents = std::fs::read_to_string(dir.path().join(".pgpass")).unwrap_or_default();
        assert!(!contents.contains("hunter2"));
    }
}
