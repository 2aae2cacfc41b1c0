//! Ties the block device, ZFS, PostgreSQL, and catalog layers together into
//! the operations the control API and the lifecycle driver call directly:
//! create/delete a repo, create/close a branch, and mount/unmount everything
//! at startup and shutdown.

pub mod branch;
pub mod create_repo;
pub mod error;
pub mod mount;

pub use branch::{close_branch, create_branch, start_branch_postmaster};
pub use create_repo::{create_repo, run_base_backup, PgSourceConfig, RepoConfig};
pub use error::OrchestratorError;
pub use mount::{delete_repo, mount_all, unmount_all};
