use thiserror::Error;

use crate::runner::RunError;

use super::version::{Version, VersionError};

#[derive(Error, Debug)]
pub enum PgError {
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("input/output error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error("could not determine whether the postmaster is running (pg_ctl status returned an unrecognised code under PostgreSQL {version})")]
    UnsupportedStatusCode { version: Version },
    #[error("{path} does not look like a PostgreSQL installation (missing {binary})")]
    InvalidInstallation { path: std::path::PathBuf, binary: &'static str },
    #[error("no free port found in [{low}, {high})")]
    PortRangeExhausted { low: u16, high: u16 },
    #[error("dataset recordsize ({actual} bytes) is smaller than a PostgreSQL page (8192 bytes); refusing to synthesize a config with full_page_writes=off")]
    UnsafeRecordsize { actual: u64 },
    #[error("source cluster is not a superuser connection")]
    NotSuperuser,
    #[error("source cluster does not have replication privileges")]
    NoReplicationPrivilege,
}
