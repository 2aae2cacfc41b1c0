use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("repo {0:?} not found")]
    RepoNotFound(String),
    #[error("pool {0:?} not found")]
    PoolNotFound(String),
    #[error("branch {0} not found")]
    BranchNotFound(i64),
    #[error("a repo named {0:?} or at path {1:?} already exists")]
    DuplicateRepo(String, String),
}
