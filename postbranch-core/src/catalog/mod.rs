//! The embedded catalog: a SQLite database recording every pool, repo, and
//! branch this daemon owns. It is the only shared mutable state in the
//! system — the ZFS pool namespace and loopback minor pool are
//! system-global but coordinated only by name uniqueness and the kernel.

pub mod error;
pub mod model;

use std::str::FromStr;

use sqlx::sqlite::{SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{ConnectOptions, Row, SqlitePool};

pub use error::CatalogError;
use model::{Branch, BranchPgStatus, BranchStatus, Pool, PoolType, Repo, RepoDetail, RepoStatus};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pool (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    path TEXT NOT NULL,
    mount_path TEXT NOT NULL,
    size_in_mb INTEGER NOT NULL,
    pool_type TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS repo (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    pool_id INTEGER NOT NULL REFERENCES pool(id),
    pg_path TEXT NOT NULL,
    version INTEGER NOT NULL,
    adapter TEXT NOT NULL,
    status TEXT NOT NULL,
    output TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS branch (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL REFERENCES repo(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    parent_id INTEGER REFERENCES branch(id),
    pg_port INTEGER NOT NULL UNIQUE,
    status TEXT NOT NULL,
    pg_status TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    UNIQUE (repo_id, name)
);
"#;

fn parse_enum<T: FromStr>(row: &SqliteRow, column: &str) -> Result<T, CatalogError>
where
    T::Err: std::fmt::Display,
{
    let text: String = row.try_get(column)?;
    text.parse::<T>().map_err(|e: T::Err| CatalogError::Db(sqlx::Error::Decode(e.to_string().into())))
}

fn pool_from_row(row: SqliteRow) -> Result<Pool, CatalogError> {
    Ok(Pool {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        path: row.try_get("path")?,
        mount_path: row.try_get("mount_path")?,
        size_in_mb: row.try_get("size_in_mb")?,
        pool_type: parse_enum(&row, "pool_type")?,
        created_at: row.try_get("created_at")?,
    })
}

fn repo_from_row(row: SqliteRow) -> Result<Repo, CatalogError> {
    Ok(Repo {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        pool_id: row.try_get("pool_id")?,
        pg_path: row.try_get("pg_path")?,
        version: row.try_get("version")?,
        adapter: row.try_get("adapter")?,
        status: parse_enum(&row, "status")?,
        output: row.try_get("output")?,
        created_at: row.try_get("created_at")?,
    })
}

fn branch_from_row(row: SqliteRow) -> Result<Branch, CatalogError> {
    Ok(Branch {
        id: row.try_get("id")?,
        repo_id: row.try_get("repo_id")?,
        name: row.try_get("name")?,
        parent_id: row.try_get("parent_id")?,
        pg_port: row.try_get("pg_port")?,
        status: parse_enum(&row, "status")?,
        pg_status: parse_enum(&row, "pg_status")?,
        created_at: row.try_get("created_at")?,
    })
}

#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    pub async fn open(path: &std::path::Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Normal)
            .disable_statement_logging();
        let pool = SqlitePoolOptions::new().max_connections(4).connect_with(options).await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn create_pool(
        &self,
        name: &str,
        path: &str,
        mount_path: &str,
        size_in_mb: i64,
        pool_type: PoolType,
    ) -> Result<Pool, CatalogError> {
        let row = sqlx::query(
            "INSERT INTO pool (name, path, mount_path, size_in_mb, pool_type)
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(path)
        .bind(mount_path)
        .bind(size_in_mb)
        .bind(pool_type.as_str())
        .fetch_one(&self.pool)
        .await?;
        self.get_pool(row.try_get::<i64, _>("id")?).await
    }

    pub async fn get_pool(&self, id: i64) -> Result<Pool, CatalogError> {
        let row = sqlx::query("SELECT * FROM pool WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CatalogError::PoolNotFound(id.to_string()))?;
        pool_from_row(row)
    }

    pub async fn create_repo(
        &self,
        name: &str,
        pool_id: i64,
        pg_path: &str,
        version: i64,
    ) -> Result<Repo, CatalogError> {
        let row = sqlx::query(
            "INSERT INTO repo (name, pool_id, pg_path, version, adapter, status)
             VALUES (?, ?, ?, ?, 'host', 'STARTED') RETURNING id",
        )
        .bind(name)
        .bind(pool_id)
        .bind(pg_path)
        .bind(version)
        .fetch_one(&self.pool)
        .await?;
        self.get_repo(row.try_get::<i64, _>("id")?).await
    }

    pub async fn update_repo_status(
        &self,
        id: i64,
        status: RepoStatus,
        output: Option<&str>,
    ) -> Result<(), CatalogError> {
        sqlx::query("UPDATE repo SET status = ?, output = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(output)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_repo(&self, id: i64) -> Result<Repo, CatalogError> {
        let row = sqlx::query("SELECT * FROM repo WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CatalogError::RepoNotFound(id.to_string()))?;
        repo_from_row(row)
    }

    pub async fn get_repo_by_name(&self, name: &str) -> Result<Repo, CatalogError> {
        let row = sqlx::query("SELECT * FROM repo WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CatalogError::RepoNotFound(name.to_string()))?;
        repo_from_row(row)
    }

    pub async fn count_repo_by_name_or_path(&self, name: &str, path: &str) -> Result<i64, CatalogError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM repo r JOIN pool p ON p.id = r.pool_id
             WHERE r.name = ? OR p.path = ?",
        )
        .bind(name)
        .bind(path)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("n")?)
    }

    pub async fn delete_repo(&self, id: i64) -> Result<(), CatalogError> {
        sqlx::query("DELETE FROM repo WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn create_branch(
        &self,
        repo_id: i64,
        name: &str,
        parent_id: Option<i64>,
        pg_port: i64,
    ) -> Result<Branch, CatalogError> {
        let row = sqlx::query(
            "INSERT INTO branch (repo_id, name, parent_id, pg_port, status, pg_status)
             VALUES (?, ?, ?, ?, 'OPEN', 'STARTING') RETURNING id",
        )
        .bind(repo_id)
        .bind(name)
        .bind(parent_id)
        .bind(pg_port)
        .fetch_one(&self.pool)
        .await?;
        self.get_branch(row.try_get::<i64, _>("id")?).await
    }

    pub async fn get_branch(&self, id: i64) -> Result<Branch, CatalogError> {
        let row = sqlx::query("SELECT * FROM branch WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CatalogError::BranchNotFound(id))?;
        branch_from_row(row)
    }

    pub async fn update_branch_status(&self, id: i64, status: BranchStatus) -> Result<(), CatalogError> {
        sqlx::query("UPDATE branch SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_branch_pg_status(&self, id: i64, status: BranchPgStatus) -> Result<(), CatalogError> {
        sqlx::query("UPDATE branch SET pg_status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All ports currently recorded against any branch, used by the port
    /// allocator to skip ports the catalog already considers taken.
    pub async fn allocated_ports(&self) -> Result<Vec<i32>, CatalogError> {
        let rows = sqlx::query("SELECT pg_port FROM branch").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.try_get::<i64, _>("pg_port").unwrap_or(0) as i32).collect())
    }

    pub async fn get_repo_detail(&self, id: i64) -> Result<RepoDetail, CatalogError> {
        let repo = self.get_repo(id).await?;
        let pool = self.get_pool(repo.pool_id).await?;
        let rows = sqlx::query("SELECT * FROM branch WHERE repo_id = ?").bind(id).fetch_all(&self.pool).await?;
        let branches = rows.into_iter().map(branch_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(RepoDetail { repo, pool, branches })
    }

    pub async fn get_repo_detail_by_name(&self, name: &str) -> Result<RepoDetail, CatalogError> {
        let repo = self.get_repo_by_name(name).await?;
        self.get_repo_detail(repo.id).await
    }

    pub async fn list_repo(&self) -> Result<Vec<Repo>, CatalogError> {
        let rows = sqlx::query("SELECT * FROM repo ORDER BY id").fetch_all(&self.pool).await?;
        rows.into_iter().map(repo_from_row).collect()
    }

    /// Every repo with its pool and branches, used by `mount-all` /
    /// `unmount-all` to iterate over everything this daemon owns.
    pub async fn list_repo_detail(&self) -> Result<Vec<RepoDetail>, CatalogError> {
        let repos = self.list_repo().await?;
        let mut details = Vec::with_capacity(repos.len());
        for repo in repos {
            details.push(self.get_repo_detail(repo.id).await?);
        }
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_test_catalog() -> Catalog {
        let dir = tempfile::tempdir().unwrap().keep();
        Catalog::open(&dir.join("catalog.db")).await.unwrap()
    }

    #[tokio::test]
    async fn create_and_fetch_repo_round_trips() {
        let catalog = open_test_catalog().await;
        let pool = catalog
            .create_pool("acme", "/var/lib/pb/acme.img", "/mnt/pb-acme", 2048, PoolType::Virtual)
            .await
            .unwrap();
        let repo = catalog.create_repo("acme", pool.id, "/usr/lib/postgresql/15", 15).await.unwrap();
        assert_eq!(repo.status, RepoStatus::Started);

        let fetched = catalog.get_repo_by_name("acme").await.unwrap();
        assert_eq!(fetched.id, repo.id);
    }

    #[tokio::test]
    async fn branch_ports_are_unique() {
        let catalog = open_test_catalog().await;
        let pool = catalog
            .create_pool("acme", "/var/lib/pb/acme.img", "/mnt/pb-acme", 2048, PoolType::Virtual)
            .await
            .unwrap();
        let repo = catalog.create_repo("acme", pool.id, "/usr/lib/postgresql/15", 15).await.unwrap();
        catalog.create_branch(repo.id, "main", None, 5450).await.unwrap();
        let err = catalog.create_branch(repo.id, "feat", None, 5450).await.unwrap_err();
        assert!(matches!(err, CatalogError::Db(_)));
    }

    #[tokio::test]
    async fn repo_detail_aggregates_pool_and_branches() {
        let catalog = open_test_catalog().await;
        let pool = catalog
            .create_pool("acme", "/var/lib/pb/acme.img", "/mnt/pb-acme", 2048, PoolType::Virtual)
            .await
            .unwrap();
        let repo = catalog.create_repo("acme", pool.id, "/usr/lib/postgresql/15", 15).await.unwrap();
        catalog.create_branch(repo.id, "main", None, 5450).await.unwrap();

        let detail = catalog.get_repo_detail(repo.id).await.unwrap();
        assert_eq!(detail.pool.name, "acme");
        assert_eq!(detail.branches.len(), 1);
        assert!(detail.main_branch().is_some());
    }
}
