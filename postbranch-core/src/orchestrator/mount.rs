use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::catalog::model::{BranchStatus, RepoStatus};
use crate::catalog::Catalog;
use crate::pg::{self, PgInstallation};
use crate::runner::Runner;
use crate::zfs;

use super::error::OrchestratorError;

/// Delete a repo. If the backing image file is gone (the operator deleted
/// it out from under us, or it never survived a move), this falls back to
/// *best-effort cleanup*: stop what we can, destroy the pool, remove what's
/// left, and still report success — there's nothing more a retry would
/// accomplish.
pub async fn delete_repo(catalog: &Catalog, runner: &Runner, repo_id: i64) -> Result<(), OrchestratorError> {
    let detail = catalog.get_repo_detail(repo_id).await?;
    let installation = PgInstallation::validate(Path::new(&detail.repo.pg_path)).ok();

    if !Path::new(&detail.pool.path).exists() {
        if let Some(installation) = &installation {
            for branch in &detail.branches {
                let data_dir = Path::new(&detail.pool.mount_path).join(&branch.name).join("data");
                let _ = crate::pg::Postmaster::new(runner, installation, data_dir).stop();
            }
        }
        let _ = zfs::destroy_pool(runner, &detail.pool.name);
        let _ = std::fs::remove_dir_all(&detail.pool.mount_path);
        catalog.delete_repo(repo_id).await?;
        return Ok(());
    }

    for branch in detail.branches.iter().filter(|b| b.status != BranchStatus::Closed) {
        if let Some(installation) = &installation {
            let data_dir = Path::new(&detail.pool.mount_path).join(&branch.name).join("data");
            crate::pg::Postmaster::new(runner, installation, data_dir).stop()?;
        }
    }

    let loopback_path = zfs::find_device_path(runner, &detail.pool.name).ok();
    zfs::destroy_pool(runner, &detail.pool.name)?;

    if detail.pool.pool_type == crate::catalog::model::PoolType::Virtual {
        if let Some(path) = loopback_path {
            let _ = crate::blockdev::detach(&path);
            let _ = crate::blockdev::remove_device_node(&path);
        }
        let _ = std::fs::remove_file(&detail.pool.path);
    }

    std::fs::remove_dir_all(&detail.pool.mount_path)?;
    catalog.delete_repo(repo_id).await?;
    Ok(())
}

/// Phase A + D of startup: stop dangling postmasters across every repo,
/// then (after reattach/import) start the ones that should be running.
/// Both phases fan out one task per branch on a shared join set so slow
/// postmasters don't serialise the whole startup.
pub async fn mount_all(catalog: Arc<Catalog>, runner: Arc<Runner>, cancel: CancellationToken) -> Result<(), OrchestratorError> {
    let details = catalog.list_repo_detail().await?;
    if details.is_empty() {
        log::info!("no repos to mount");
        return Ok(());
    }

    log::info!("stopping potential dangling postgres instances");
    let mut dangling = JoinSet::new();
    for detail in &details {
        let Ok(installation) = PgInstallation::validate(Path::new(&detail.repo.pg_path)) else { continue };
        for branch in detail.branches.iter().filter(|b| b.status != BranchStatus::Closed) {
            let mount_path = detail.pool.mount_path.clone();
            let branch_name = branch.name.clone();
            let installation = installation.clone();
            let runner = runner.clone();
            dangling.spawn_blocking(move || pg::stop_dangling(&runner, &installation, Path::new(&mount_path), &branch_name));
        }
    }
    while dangling.join_next().await.is_some() {}

    let mut reattached = Vec::new();
    for detail in &details {
        if !Path::new(&detail.pool.path).exists() {
            log::error!("image file missing for repo {}, marking FAILED", detail.repo.name);
            catalog.update_repo_status(detail.repo.id, RepoStatus::Failed, Some("backing image file missing")).await?;
            continue;
        }

        if detail.pool.pool_type == crate::catalog::model::PoolType::Virtual {
            let _ = zfs::export_pool(&runner, &detail.pool.name);
            for dangling_loop in crate::blockdev::find_dangling_loops(Path::new(&detail.pool.path)).unwrap_or_default() {
                let _ = crate::blockdev::detach(&dangling_loop);
                let _ = crate::blockdev::remove_device_node(&dangling_loop);
            }
            if let Err(err) = crate::blockdev::attach_with_retry(Path::new(&detail.pool.path)) {
                log::error!("failed to reattach loop device for pool {}: {err}", detail.pool.name);
                catalog.update_repo_status(detail.repo.id, RepoStatus::Failed, Some(&err.to_string())).await?;
                continue;
            }
        }
        reattached.push(detail.clone());
    }

    log::info!("importing {} pool(s)", reattached.len());
    for detail in &reattached {
        if let Err(err) = zfs::import_pool(&runner, &detail.pool.name) {
            log::error!("failed to import pool {}: {err}", detail.pool.name);
            catalog.update_repo_status(detail.repo.id, RepoStatus::Failed, Some(&err.to_string())).await?;
        }
    }

    if cancel.is_cancelled() {
        log::info!("root cancellation token triggered, skipping postmaster startup");
        return Ok(());
    }

    log::info!("starting postgres for all mounted repos");
    let mut starting = JoinSet::new();
    for detail in &reattached {
        let repo = catalog.get_repo(detail.repo.id).await?;
        if repo.status == RepoStatus::Failed {
            continue;
        }
        let Ok(installation) = PgInstallation::validate(Path::new(&detail.repo.pg_path)) else { continue };
        for branch in detail.branches.iter().filter(|b| b.status != BranchStatus::Closed) {
            let catalog = catalog.clone();
            let runner = runner.clone();
            let mount_path = detail.pool.mount_path.clone();
            let installation = installation.clone();
            let branch = branch.clone();
            starting.spawn(async move {
                let data_dir = Path::new(&mount_path).join(&branch.name).join("data");
                let postmaster = crate::pg::Postmaster::new(&runner, &installation, data_dir);
                let log_file = Path::new(&mount_path).join(&branch.name).join("logs").join("startup.log");
                let status = match postmaster.start(&log_file) {
                    Ok(()) => crate::catalog::model::BranchPgStatus::Running,
                    Err(err) => {
                        log::error!("failed to start postmaster for branch {}: {err}", branch.name);
                        crate::catalog::model::BranchPgStatus::Failed
                    }
                };
                let _ = catalog.update_branch_pg_status(branch.id, status).await;
            });
        }
    }
    while starting.join_next().await.is_some() {}

    log::info!("mount-all complete");
    Ok(())
}

/// Stop every running postmaster then export every pool, in that order, so
/// Postgres always gets a clean shutdown before its dataset is unmounted.
pub async fn unmount_all(catalog: Arc<Catalog>, runner: Arc<Runner>) -> Result<(), OrchestratorError> {
    let details: Vec<_> = catalog
        .list_repo_detail()
        .await?
        .into_iter()
        .filter(|d| d.repo.status == RepoStatus::Ready)
        .collect();
    if details.is_empty() {
        log::info!("no repos to unmount");
        return Ok(());
    }

    let mut stopping = JoinSet::new();
    for detail in &details {
        let Ok(installation) = PgInstallation::validate(Path::new(&detail.repo.pg_path)) else { continue };
        for branch in detail.branches.iter().filter(|b| b.status != BranchStatus::Closed) {
            let catalog = catalog.clone();
            let runner = runner.clone();
            let mount_path = detail.pool.mount_path.clone();
            let installation = installation.clone();
            let branch = branch.clone();
            stopping.spawn(async move {
                let data_dir = Path::new(&mount_path).join(&branch.name).join("data");
                let postmaster = crate::pg::Postmaster::new(&runner, &installation, data_dir);
                if let Err(err) = postmaster.stop() {
                    log::error!("failed to stop postmaster for branch {}: {err}", branch.name);
                }
                let _ = catalog
                    .update_branch_pg_status(branch.id, crate::catalog::model::BranchPgStatus::Stopped)
                    .await;
            });
        }
    }
    while stopping.join_next().await.is_some() {}

    for detail in &details {
        zfs::export_pool(&runner, &detail.pool.name)?;
        if detail.pool.pool_type == crate::catalog::model::PoolType::Virtual {
            if let Ok(path) = zfs::find_device_path(&runner, &detail.pool.name) {
                let _ = crate::blockdev::detach(&path);
                let _ = crate::blockdev::remove_device_node(&path);
            }
        }
        let _ = std::fs::remove_dir_all(&detail.pool.mount_path);
    }

    Ok(())
}
