use std::path::Path;
use std::sync::Arc;

use crate::catalog::model::{BranchPgStatus, PoolType, Repo, RepoStatus};
use crate::catalog::Catalog;
use crate::pg::probe::SourceConnection;
use crate::pg::{self, secrets, PgError, PgInstallation, Postmaster};
use crate::runner::Runner;
use crate::zfs;

use super::error::OrchestratorError;

const MINIMUM_SIZE_MB: i64 = 500;
const SOURCE_HEADROOM_MB: i64 = 300;

pub struct RepoConfig {
    pub name: String,
    pub path: String,
    pub size_in_mb: i64,
}

pub struct PgSourceConfig {
    pub postgres_path: String,
    pub host: String,
    pub port: u16,
    pub ssl_mode: String,
    pub db_username: String,
    pub password: String,
}

/// Validate inputs, provision the pool, and insert the `Repo` row with
/// `status=STARTED`. The caller is handed the row back immediately; the
/// actual base backup runs as a detached background task (see
/// [`run_base_backup`]) because it can take minutes.
pub async fn create_repo(
    catalog: &Catalog,
    runner: &Runner,
    repo_config: RepoConfig,
    pg_source: &PgSourceConfig,
) -> Result<Repo, OrchestratorError> {
    if catalog.count_repo_by_name_or_path(&repo_config.name, &repo_config.path).await? > 0 {
        return Err(OrchestratorError::DuplicateRepo(repo_config.name, repo_config.path));
    }

    PgInstallation::validate(Path::new(&pg_source.postgres_path))?;

    let source = SourceConnection::connect(
        &pg_source.host,
        pg_source.port,
        &pg_source.db_username,
        &pg_source.password,
        &pg_source.ssl_mode,
    )
    .await?;
    if !source.is_superuser().await? {
        return Err(PgError::NotSuperuser.into());
    }
    if !source.has_replication_privilege(&pg_source.db_username).await? {
        return Err(PgError::NoReplicationPrivilege.into());
    }
    let cluster_size_mb = source.cluster_size_mb().await?;
    let major_version: i64 = source.major_version().await?.parse().unwrap_or(0);

    let minimum = std::cmp::max(cluster_size_mb + SOURCE_HEADROOM_MB, MINIMUM_SIZE_MB);
    if repo_config.size_in_mb < minimum {
        return Err(OrchestratorError::SizeTooSmall { requested_mb: repo_config.size_in_mb, minimum_mb: minimum });
    }

    let mount_path = format!("/mnt/pb-{}", repo_config.name);
    zfs::create_virtual_pool(
        runner,
        &repo_config.name,
        Path::new(&repo_config.path),
        Path::new(&mount_path),
        repo_config.size_in_mb as u64,
    )?;
    let pool = catalog
        .create_pool(&repo_config.name, &repo_config.path, &mount_path, repo_config.size_in_mb, PoolType::Virtual)
        .await?;

    let repo = catalog.create_repo(&repo_config.name, pool.id, &pg_source.postgres_path, major_version).await?;

    Ok(repo)
}

/// The detached background half of repo creation: base backup, config
/// synthesis, and starting `main`'s postmaster. Failures are recorded on
/// the `Repo` row (`status=FAILED`, `output=<command output>`) rather than
/// propagated, since by the time this runs the caller has already gotten
/// its response.
pub async fn run_base_backup(
    catalog: Arc<Catalog>,
    runner: Arc<Runner>,
    repo: Repo,
    mount_path: String,
    pool_name: String,
    pg_source: PgSourceConfig,
) {
    if let Err(err) = run_base_backup_inner(&catalog, &runner, &repo, &mount_path, &pool_name, &pg_source).await {
        log::error!("base backup failed for repo {}: {err}", repo.name);
        let output = match &err {
            OrchestratorError::Run(e) => e.output().map(str::to_string),
            OrchestratorError::Pg(PgError::Run(e)) => e.output().map(str::to_string),
            _ => None,
        };
        let _ = catalog.update_repo_status(repo.id, RepoStatus::Failed, output.as_deref()).await;
    }
}

async fn run_base_backup_inner(
    catalog: &Catalog,
    runner: &Runner,
    repo: &Repo,
    mount_path: &str,
    pool_name: &str,
    pg_source: &PgSourceConfig,
) -> Result<(), OrchestratorError> {
    zfs::empty_dataset(runner, Path::new(mount_path), pool_name, "main")?;

    let recordsize = zfs::recordsize(runner, &format!("{pool_name}/main"))?;
    crate::pg::config::assert_recordsize_safe(recordsize)?;

    let taken = catalog.allocated_ports().await?;
    let port = pg::port::allocate(&taken)?;

    let data_dir = Path::new(mount_path).join("main").join("data");
    let log_dir = Path::new(mount_path).join("main").join("logs");
    std::fs::create_dir_all(&data_dir)?;
    std::fs::create_dir_all(&log_dir)?;

    let installation = PgInstallation::validate(Path::new(&pg_source.postgres_path))?;
    let home = std::env::var("HOME").map(std::path::PathBuf::from).unwrap_or_else(|_| std::path::PathBuf::from("/root"));
    let auth = secrets::AuthInfo {
        host: &pg_source.host,
        port: pg_source.port,
        username: &pg_source.db_username,
        password: &pg_source.password,
    };

    let host = pg_source.host.clone();
    let port_source = pg_source.port;
    let username = pg_source.db_username.clone();
    let data_dir_clone = data_dir.clone();
    let installation_ref = &installation;
    let runner_ref = runner;
    secrets::with_pgpass_entry(&home, auth, move || async move {
        crate::pg::backup::base_backup(runner_ref, installation_ref, &host, port_source, &username, &data_dir_clone)
    })
    .await?;

    let params = pg::config::ConfigParams {
        port,
        log_directory: &log_dir,
        log_filename: &format!("{}_main__%Y-%m-%d_%H-%M-%S.log", repo.name),
    };
    std::fs::write(data_dir.join("postgresql.conf"), pg::config::render_postgresql_conf(&params))?;

    let source = crate::pg::probe::SourceConnection::connect(
        &pg_source.host,
        pg_source.port,
        &pg_source.db_username,
        &pg_source.password,
        &pg_source.ssl_mode,
    )
    .await?;
    let rules = source.hba_rules().await?;
    std::fs::write(data_dir.join("pg_hba.conf"), pg::config::render_pg_hba_conf(&rules))?;

    let user = crate::util::postbranch_user()?;
    crate::util::chown_recursive(&data_dir, user.uid, user.gid)?;

    catalog.update_repo_status(repo.id, RepoStatus::Ready, None).await?;

    let branch = catalog.create_branch(repo.id, "main", None, i64::from(port)).await?;

    let postmaster = Postmaster::new(runner, &installation, &data_dir);
    let log_file = log_dir.join("startup.log");
    match postmaster.start(&log_file) {
        Ok(()) => catalog.update_branch_pg_status(branch.id, BranchPgStatus::Running).await?,
        Err(err) => {
            log::error!("failed to start postmaster for repo {} main branch: {err}", repo.name);
            catalog.update_branch_pg_status(branch.id, BranchPgStatus::Failed).await?
        }
    }

    Ok(())
}
