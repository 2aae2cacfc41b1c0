//! Source-cluster probing.
//!
//! Before importing an external cluster, the orchestrator connects to it and
//! checks that the supplied credentials are actually usable: a superuser,
//! with replication privileges, against a cluster of a size the requested
//! pool can hold. The replication check interpolated the connecting user
//! name into the query text; here it's a bound parameter instead.

use sqlx::Row;

use super::error::PgError;

pub struct SourceConnection {
    pool: sqlx::PgPool,
}

pub struct SourceInfo {
    pub major_version: String,
    pub cluster_size_mb: i64,
}

impl SourceConnection {
    pub async fn connect(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        ssl_mode: &str,
    ) -> Result<Self, PgError> {
        let ssl = match ssl_mode {
            "require" => sqlx::postgres::PgSslMode::Require,
            "disable" => sqlx::postgres::PgSslMode::Disable,
            _ => sqlx::postgres::PgSslMode::Prefer,
        };
        let options = sqlx::postgres::PgConnectOptions::new()
            .host(host)
            .port(port)
            .username(username)
            .password(password)
            .ssl_mode(ssl)
            .database("postgres");
        let pool = sqlx::postgres::PgPoolOptions::new().max_connections(1).connect_with(options).await?;
        Ok(Self { pool })
    }

    pub async fn is_superuser(&self) -> Result<bool, PgError> {
        let row = sqlx::query("SELECT usesuper FROM pg_user WHERE usename = CURRENT_USER")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<bool, _>("usesuper")?)
    }

    /// Whether `username` (or `all`) has a `host` replication rule using a
    /// password-based auth method. `username` is a bound parameter, not
    /// interpolated into the query text.
    pub async fn has_replication_privilege(&self, username: &str) -> Result<bool, PgError> {
        let row = sqlx::query(
            "SELECT EXISTS (
                 SELECT 1
                 FROM pg_hba_file_rules
                 WHERE type = 'host'
                   AND 'replication' = ANY(database)
                   AND auth_method IN ('md5', 'scram-sha-256')
                   AND ($1 = ANY(user_name) OR 'all' = ANY(user_name))
             ) AS allowed",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<bool, _>("allowed")?)
    }

    pub async fn cluster_size_mb(&self) -> Result<i64, PgError> {
        let row = sqlx::query(
            "SELECT CEIL(SUM(pg_database_size(datname)) / (1024 * 1024)) AS total_db_size_mb FROM pg_database",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("total_db_size_mb")?)
    }

    pub async fn major_version(&self) -> Result<String, PgError> {
        let row = sqlx::query(
            "SELECT split_part(current_setting('server_version'), '.', 1) AS major_version",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<String, _>("major_version")?)
    }

    /// `pg_hba.conf` rules with `database`/`user_name` decoded from their
    /// `text[]` columns and rejoined as plain comma-separated tokens, ready
    /// to write into a cloned cluster's own `pg_hba.conf`.
    pub async fn hba_rules(&self) -> Result<Vec<HbaRule>, PgError> {
        let rows = sqlx::query(
            "SELECT type, database, user_name, address, netmask, auth_method
             FROM pg_hba_file_rules
             WHERE auth_method IN ('trust', 'peer', 'md5', 'scram-sha-256')",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| HbaRule {
                rule_type: row.try_get("type").unwrap_or_default(),
                database: join_array(row.try_get::<Vec<String>, _>("database").unwrap_or_default()),
                user_name: join_array(row.try_get::<Vec<String>, _>("user_name").unwrap_or_default()),
                address: row.try_get("address").ok(),
                netmask: row.try_get("netmask").ok(),
                auth_method: row.try_get("auth_method").unwrap_or_default(),
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct HbaRule {
    pub rule_type: String,
    pub database: String,
    pub user_name: String,
    pub address: Option<String>,
    pub netmask: Option<String>,
    pub auth_method: String,
}

/// `pg_hba.conf`'s own list syntax is a bare comma-separated token, not
/// PostgreSQL's `{a,b}` array literal syntax: `text[]` columns decode to
/// `Vec<String>` via sqlx, so this just rejoins them the way a config line
/// expects.
fn join_array(values: Vec<String>) -> String {
    values.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_multiple_values_with_comma() {
        assert_eq!(join_array(vec!["repl".to_string(), "admin".to_string()]), "repl,admin");
    }

    #[test]
    fn joins_single_value_unchanged() {
        assert_eq!(join_array(vec!["all".to_string()]), "all");
    }
}
