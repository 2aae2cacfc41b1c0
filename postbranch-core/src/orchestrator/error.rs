use thiserror::Error;

use crate::blockdev::BlockDeviceError;
use crate::catalog::CatalogError;
use crate::pg::PgError;
use crate::runner::RunError;
use crate::util::SystemUserError;
use crate::zfs::ZfsError;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Zfs(#[from] ZfsError),
    #[error(transparent)]
    Pg(#[from] PgError),
    #[error(transparent)]
    BlockDevice(#[from] BlockDeviceError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error(transparent)]
    SystemUser(#[from] SystemUserError),
    #[error("input/output error: {0}")]
    Io(#[from] std::io::Error),
    #[error("a repo named {0:?} or at path {1:?} already exists")]
    DuplicateRepo(String, String),
    #[error("requested size {requested_mb} MB is smaller than the source cluster ({minimum_mb} MB minimum)")]
    SizeTooSmall { requested_mb: i64, minimum_mb: i64 },
    #[error("branch {0:?} not found")]
    BranchNotFound(String),
    #[error("cannot close the main branch")]
    CannotCloseMain,
    #[error("branch {0:?} is already closed")]
    BranchAlreadyClosed(String),
}
