use std::path::Path;
use std::sync::Arc;

use crate::catalog::model::{Branch, BranchPgStatus, BranchStatus, RepoDetail};
use crate::catalog::Catalog;
use crate::pg::{self, PgInstallation, Postmaster};
use crate::runner::Runner;
use crate::zfs;

use super::error::OrchestratorError;

/// Snapshot the parent dataset, clone it, allocate a port, and insert the
/// new `Branch` row. Starting its postmaster happens in the background (see
/// [`start_branch_postmaster`]) because config rewriting and log cleanup
/// aren't instant and the caller shouldn't block on them.
pub async fn create_branch(
    catalog: &Catalog,
    runner: &Runner,
    detail: &RepoDetail,
    parent_id: i64,
    name: &str,
) -> Result<Branch, OrchestratorError> {
    let parent = detail.branch(parent_id).ok_or_else(|| OrchestratorError::BranchNotFound(parent_id.to_string()))?;

    zfs::snapshot_and_clone(runner, &detail.pool.name, &parent.name, name)?;

    let taken = catalog.allocated_ports().await?;
    let port = pg::port::allocate(&taken)?;

    let branch = catalog.create_branch(detail.repo.id, name, Some(parent_id), i64::from(port)).await?;
    Ok(branch)
}

/// The detached background half of branch creation: rewrite the cloned
/// `postgresql.conf` in place, clear stale log files and PID file, then
/// start the postmaster.
pub async fn start_branch_postmaster(
    catalog: Arc<Catalog>,
    runner: Arc<Runner>,
    repo_name: String,
    pg_path: String,
    mount_path: String,
    branch: Branch,
) {
    if let Err(err) = start_branch_postmaster_inner(&catalog, &runner, &repo_name, &pg_path, &mount_path, &branch).await
    {
        log::error!("failed to start postmaster for branch {}: {err}", branch.name);
        let _ = catalog.update_branch_pg_status(branch.id, BranchPgStatus::Failed).await;
    }
}

async fn start_branch_postmaster_inner(
    catalog: &Catalog,
    runner: &Runner,
    repo_name: &str,
    pg_path: &str,
    mount_path: &str,
    branch: &Branch,
) -> Result<(), OrchestratorError> {
    let data_dir = Path::new(mount_path).join(&branch.name).join("data");
    let log_dir = Path::new(mount_path).join(&branch.name).join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let conf_path = data_dir.join("postgresql.conf");
    pg::config::rewrite_setting(&conf_path, "port", &branch.pg_port.to_string())?;
    pg::config::rewrite_setting(
        &conf_path,
        "log_filename",
        &format!("'{repo_name}_{}__%Y-%m-%d_%H-%M-%S.log'", branch.name),
    )?;
    pg::config::rewrite_setting(&conf_path, "log_directory", &format!("'{}'", log_dir.display()))?;

    for entry in glob::glob(&format!("{}/*", log_dir.display())).into_iter().flatten().flatten() {
        let _ = std::fs::remove_file(entry);
    }
    let _ = std::fs::remove_file(data_dir.join("postmaster.pid"));

    let installation = PgInstallation::validate(Path::new(pg_path))?;
    let postmaster = Postmaster::new(runner, &installation, &data_dir);
    postmaster.start(&log_dir.join("startup.log"))?;
    catalog.update_branch_pg_status(branch.id, BranchPgStatus::Running).await?;
    Ok(())
}

/// Stop the branch's postmaster and destroy its dataset. `main` can never
/// be closed; an already-closed branch is rejected rather than silently
/// accepted.
pub async fn close_branch(
    catalog: &Catalog,
    runner: &Runner,
    detail: &RepoDetail,
    branch: &Branch,
) -> Result<(), OrchestratorError> {
    if branch.name == "main" {
        return Err(OrchestratorError::CannotCloseMain);
    }
    if branch.status == BranchStatus::Closed {
        return Err(OrchestratorError::BranchAlreadyClosed(branch.name.clone()));
    }

    let installation = PgInstallation::validate(Path::new(&detail.repo.pg_path))?;
    let data_dir = Path::new(&detail.pool.mount_path).join(&branch.name).join("data");
    Postmaster::new(runner, &installation, &data_dir).stop()?;

    zfs::destroy_dataset(runner, &detail.pool.name, &branch.name)?;
    catalog.update_branch_status(branch.id, BranchStatus::Closed).await?;
    Ok(())
}
