use std::path::{Path, PathBuf};

use super::error::PgError;

/// A validated PostgreSQL installation: `<path>/bin` holds `pg_ctl`,
/// `postgres`, `pg_basebackup` and `initdb`.
#[derive(Debug, Clone)]
pub struct PgInstallation {
    root: PathBuf,
}

const REQUIRED_BINARIES: &[&str] = &["pg_ctl", "postgres", "pg_basebackup", "initdb"];

impl PgInstallation {
    pub fn validate(path: &Path) -> Result<Self, PgError> {
        for binary in REQUIRED_BINARIES {
            let candidate = path.join("bin").join(binary);
            if !candidate.is_file() {
                return Err(PgError::InvalidInstallation { path: path.to_path_buf(), binary });
            }
        }
        Ok(Self { root: path.to_path_buf() })
    }

    pub fn bin(&self, name: &str) -> PathBuf {
        self.root.join("bin").join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_directory_missing_required_binaries() {
        let dir = tempfile::tempdir().unwrap();
        let err = PgInstallation::validate(dir.path()).unwrap_err();
        assert!(matches!(err, PgError::InvalidInstallation { .. }));
    }

    #[test]
    fn accepts_a_directory_with_all_required_binaries() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        for binary in REQUIRED_BINARIES {
            std::fs::write(bin.join(binary), b"").unwrap();
        }
        assert!(PgInstallation::validate(dir.path()).is_ok());
    }
}
