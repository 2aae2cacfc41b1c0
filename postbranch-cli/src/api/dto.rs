//! JSON request/response shapes for the control API.
//!
//! `postbranch-core`'s catalog model types carry no `serde` impls (the core
//! crate has no reason to know about JSON), so this module is the one place
//! that translates between them and the wire format.

use serde::{Deserialize, Serialize};

use postbranch_core::catalog::model::{Branch, Pool, PoolType, Repo, RepoDetail};
use postbranch_core::orchestrator::{PgSourceConfig, RepoConfig};

#[derive(Debug, Deserialize)]
pub struct RepoConfigRequest {
    pub name: String,
    pub path: String,
    #[serde(rename = "repoType", default)]
    pub repo_type: Option<String>,
    #[serde(rename = "sizeInMb")]
    pub size_in_mb: i64,
}

impl From<RepoConfigRequest> for RepoConfig {
    fn from(req: RepoConfigRequest) -> Self {
        RepoConfig { name: req.name, path: req.path, size_in_mb: req.size_in_mb }
    }
}

#[derive(Debug, Deserialize)]
pub struct PgSourceConfigRequest {
    #[serde(rename = "postgresPath")]
    pub postgres_path: String,
    #[serde(default)]
    pub version: Option<i64>,
    pub host: String,
    pub port: u16,
    #[serde(rename = "sslMode")]
    pub ssl_mode: String,
    #[serde(rename = "dbUsername")]
    pub db_username: String,
    pub password: String,
}

impl From<PgSourceConfigRequest> for PgSourceConfig {
    fn from(req: PgSourceConfigRequest) -> Self {
        PgSourceConfig {
            postgres_path: req.postgres_path,
            host: req.host,
            port: req.port,
            ssl_mode: req.ssl_mode,
            db_username: req.db_username,
            password: req.password,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ImportHostRequest {
    #[serde(rename = "repoConfig")]
    pub repo_config: RepoConfigRequest,
    #[serde(rename = "pgConfig")]
    pub pg_config: PgSourceConfigRequest,
}

#[derive(Debug, Deserialize)]
pub struct ValidateHostRequest {
    #[serde(flatten)]
    pub pg_config: PgSourceConfigRequest,
    #[serde(rename = "sizeInMb", default)]
    pub size_in_mb: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBranchRequest {
    pub name: String,
    #[serde(rename = "parentId")]
    pub parent_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CloseBranchRequest {
    pub name: String,
}

/// Mirrors the source config back to the caller alongside the measured
/// cluster size, the way a successful validation is reported: the checks
/// that can fail (superuser, replication privilege) fail the call outright
/// rather than appearing as response fields.
#[derive(Debug, Serialize)]
pub struct ValidateHostResponse {
    #[serde(rename = "clusterSizeInMb")]
    pub cluster_size_in_mb: i64,
    #[serde(rename = "pgConfig")]
    pub pg_config: ValidatedPgConfig,
}

#[derive(Debug, Serialize)]
pub struct ValidatedPgConfig {
    #[serde(rename = "postgresPath")]
    pub postgres_path: String,
    pub version: String,
    pub host: String,
    pub port: u16,
    #[serde(rename = "sslMode")]
    pub ssl_mode: String,
    #[serde(rename = "dbUsername")]
    pub db_username: String,
}

#[derive(Debug, Serialize)]
pub struct PoolResponse {
    pub name: String,
    pub path: String,
    #[serde(rename = "mountPath")]
    pub mount_path: String,
    #[serde(rename = "sizeInMb")]
    pub size_in_mb: i64,
    #[serde(rename = "poolType")]
    pub pool_type: &'static str,
}

impl From<&Pool> for PoolResponse {
    fn from(pool: &Pool) -> Self {
        Self {
            name: pool.name.clone(),
            path: pool.path.clone(),
            mount_path: pool.mount_path.clone(),
            size_in_mb: pool.size_in_mb,
            pool_type: match pool.pool_type {
                PoolType::Virtual => "virtual",
                PoolType::Block => "block",
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BranchResponse {
    pub id: i64,
    pub name: String,
    #[serde(rename = "parentId")]
    pub parent_id: Option<i64>,
    pub port: i64,
    pub status: &'static str,
    #[serde(rename = "pgStatus")]
    pub pg_status: &'static str,
}

impl From<&Branch> for BranchResponse {
    fn from(branch: &Branch) -> Self {
        Self {
            id: branch.id,
            name: branch.name.clone(),
            parent_id: branch.parent_id,
            port: branch.pg_port,
            status: branch.status.as_str(),
            pg_status: branch.pg_status.as_str(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RepoResponse {
    pub name: String,
    pub status: &'static str,
    #[serde(rename = "pgPath")]
    pub pg_path: String,
    pub version: i64,
    pub output: Option<String>,
}

impl From<&Repo> for RepoResponse {
    fn from(repo: &Repo) -> Self {
        Self {
            name: repo.name.clone(),
            status: repo.status.as_str(),
            pg_path: repo.pg_path.clone(),
            version: repo.version,
            output: repo.output.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RepoDetailResponse {
    #[serde(flatten)]
    pub repo: RepoResponse,
    pub pool: PoolResponse,
    pub branches: Vec<BranchResponse>,
}

impl From<&RepoDetail> for RepoDetailResponse {
    fn from(detail: &RepoDetail) -> Self {
        Self {
            repo: RepoResponse::from(&detail.repo),
            pool: PoolResponse::from(&detail.pool),
            branches: detail.branches.iter().map(BranchResponse::from).collect(),
        }
    }
}
