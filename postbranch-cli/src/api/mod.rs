//! The control API: a thin HTTP surface over the orchestrator.
//!
//! Every handler here is a direct call into `postbranch_core::orchestrator`
//! translated through the `{data, errors}` envelope; there is no business
//! logic of its own. Handlers that kick off long-running work spawn it on a
//! detached task tracked in the shared join set and return the
//! starting-state entity immediately; clients poll the `GET` endpoints for
//! progress.

pub mod dto;
pub mod envelope;

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use postbranch_core::catalog::Catalog;
use postbranch_core::orchestrator;
use postbranch_core::pg::probe::SourceConnection;
use postbranch_core::runner::Runner;

use dto::{
    BranchResponse, CloseBranchRequest, CreateBranchRequest, ImportHostRequest, PgSourceConfigRequest, RepoResponse,
    ValidateHostRequest, ValidateHostResponse,
};
use envelope::{ApiError, Envelope};

/// State shared across every handler. Background tasks spawned by a handler
/// are pushed into `tasks` so the lifecycle driver can await them at
/// shutdown instead of letting them vanish.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub runner: Arc<Runner>,
    pub tasks: Arc<Mutex<JoinSet<()>>>,
}

impl AppState {
    pub fn new(catalog: Arc<Catalog>, runner: Arc<Runner>, tasks: Arc<Mutex<JoinSet<()>>>) -> Self {
        Self { catalog, runner, tasks }
    }

    async fn track<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tasks.lock().await.spawn(future);
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/repos/postgres/validate/host", post(validate_host))
        .route("/api/repos/import/host", post(import_host))
        .route("/api/repos/import/:repo_name/host", post(reimport_host))
        .route("/api/repos", get(list_repos))
        .route("/api/repos/:repo_name", get(get_repo))
        .route("/api/repos/:repo_name", delete(delete_repo))
        .route("/api/repos/:repo_name/branch", post(create_branch))
        .route("/api/repos/:repo_name/branch/close", post(close_branch))
        .with_state(state)
}

async fn validate_host(
    Json(body): Json<ValidateHostRequest>,
) -> Result<Json<Envelope<ValidateHostResponse>>, ApiError> {
    use postbranch_core::pg::PgError;

    let pg = body.pg_config;
    let source = SourceConnection::connect(&pg.host, pg.port, &pg.db_username, &pg.password, &pg.ssl_mode).await?;
    if !source.is_superuser().await? {
        return Err(PgError::NotSuperuser.into());
    }
    if !source.has_replication_privilege(&pg.db_username).await? {
        return Err(PgError::NoReplicationPrivilege.into());
    }

    let response = dto::ValidateHostResponse {
        cluster_size_in_mb: source.cluster_size_mb().await?,
        pg_config: dto::ValidatedPgConfig {
            postgres_path: pg.postgres_path,
            version: source.major_version().await?,
            host: pg.host,
            port: pg.port,
            ssl_mode: pg.ssl_mode,
            db_username: pg.db_username,
        },
    };
    Ok(Json(Envelope::ok(response)))
}

async fn import_host(
    State(state): State<AppState>,
    Json(body): Json<ImportHostRequest>,
) -> Result<Json<Envelope<RepoResponse>>, ApiError> {
    let repo_config = body.repo_config.into();
    let pg_source: orchestrator::PgSourceConfig = body.pg_config.into();

    let repo = orchestrator::create_repo(&state.catalog, &state.runner, repo_config, &pg_source).await?;

    let detail = state.catalog.get_repo_detail(repo.id).await?;
    let catalog = state.catalog.clone();
    let runner = state.runner.clone();
    let repo_for_task = repo.clone();
    let mount_path = detail.pool.mount_path.clone();
    let pool_name = detail.pool.name.clone();
    state
        .track(async move {
            orchestrator::run_base_backup(catalog, runner, repo_for_task, mount_path, pool_name, pg_source).await;
        })
        .await;

    Ok(Json(Envelope::ok(RepoResponse::from(&repo))))
}

/// Re-run the base backup for a repo whose prior import failed. The repo
/// must already exist and be `FAILED`; this is not a way to create a repo
/// under a name that's already in use.
async fn reimport_host(
    State(state): State<AppState>,
    Path(repo_name): Path<String>,
    Json(pg_config): Json<PgSourceConfigRequest>,
) -> Result<Json<Envelope<RepoResponse>>, ApiError> {
    use postbranch_core::catalog::model::RepoStatus;

    let detail = state.catalog.get_repo_detail_by_name(&repo_name).await?;
    if detail.repo.status != RepoStatus::Failed {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, format!("repo {repo_name:?} is not in a failed state")));
    }

    state.catalog.update_repo_status(detail.repo.id, RepoStatus::Started, None).await?;
    let repo = state.catalog.get_repo(detail.repo.id).await?;

    let pg_source: orchestrator::PgSourceConfig = pg_config.into();
    let catalog = state.catalog.clone();
    let runner = state.runner.clone();
    let repo_for_task = repo.clone();
    let mount_path = detail.pool.mount_path.clone();
    let pool_name = detail.pool.name.clone();
    state
        .track(async move {
            orchestrator::run_base_backup(catalog, runner, repo_for_task, mount_path, pool_name, pg_source).await;
        })
        .await;

    Ok(Json(Envelope::ok(RepoResponse::from(&repo))))
}

async fn list_repos(State(state): State<AppState>) -> Result<Json<Envelope<Vec<RepoResponse>>>, ApiError> {
    let repos = state.catalog.list_repo().await?;
    Ok(Json(Envelope::ok(repos.iter().map(RepoResponse::from).collect())))
}

async fn get_repo(
    State(state): State<AppState>,
    Path(repo_name): Path<String>,
) -> Result<Json<Envelope<dto::RepoDetailResponse>>, ApiError> {
    let detail = state.catalog.get_repo_detail_by_name(&repo_name).await?;
    Ok(Json(Envelope::ok(dto::RepoDetailResponse::from(&detail))))
}

async fn delete_repo(
    State(state): State<AppState>,
    Path(repo_name): Path<String>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let repo = state.catalog.get_repo_by_name(&repo_name).await?;
    orchestrator::delete_repo(&state.catalog, &state.runner, repo.id).await?;
    Ok(Json(Envelope::ok(serde_json::json!({ "name": repo_name }))))
}

async fn create_branch(
    State(state): State<AppState>,
    Path(repo_name): Path<String>,
    Json(body): Json<CreateBranchRequest>,
) -> Result<Json<Envelope<BranchResponse>>, ApiError> {
    let detail = state.catalog.get_repo_detail_by_name(&repo_name).await?;
    let branch = orchestrator::create_branch(&state.catalog, &state.runner, &detail, body.parent_id, &body.name)
        .await
        .map_err(ApiError::from)?;

    let catalog = state.catalog.clone();
    let runner = state.runner.clone();
    let repo_name_for_task = detail.repo.name.clone();
    let pg_path = detail.repo.pg_path.clone();
    let mount_path = detail.pool.mount_path.clone();
    let branch_for_task = branch.clone();
    state
        .track(async move {
            orchestrator::start_branch_postmaster(
                catalog,
                runner,
                repo_name_for_task,
                pg_path,
                mount_path,
                branch_for_task,
            )
            .await;
        })
        .await;

    Ok(Json(Envelope::ok(BranchResponse::from(&branch))))
}

async fn close_branch(
    State(state): State<AppState>,
    Path(repo_name): Path<String>,
    Json(body): Json<CloseBranchRequest>,
) -> Result<Json<Envelope<BranchResponse>>, ApiError> {
    let detail = state.catalog.get_repo_detail_by_name(&repo_name).await?;
    let branch = detail
        .branches
        .iter()
        .find(|b| b.name == body.name)
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, format!("branch {:?} not found", body.name)))?
        .clone();

    orchestrator::close_branch(&state.catalog, &state.runner, &detail, &branch).await?;
    let closed = state.catalog.get_branch(branch.id).await?;
    Ok(Json(Envelope::ok(BranchResponse::from(&closed))))
}
