use std::str::FromStr;

use chrono::{DateTime, Utc};

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("unrecognised {} value: {other:?}", stringify!($name))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(PoolType {
    Virtual => "virtual",
    Block => "block",
});

text_enum!(RepoStatus {
    Started => "STARTED",
    Ready => "READY",
    Failed => "FAILED",
});

text_enum!(BranchStatus {
    Open => "OPEN",
    Merged => "MERGED",
    Closed => "CLOSED",
});

text_enum!(BranchPgStatus {
    Starting => "STARTING",
    Running => "RUNNING",
    Stopped => "STOPPED",
    Failed => "FAILED",
});

#[derive(Debug, Clone)]
pub struct Pool {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub mount_path: String,
    pub size_in_mb: i64,
    pub pool_type: PoolType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Repo {
    pub id: i64,
    pub name: String,
    pub pool_id: i64,
    pub pg_path: String,
    pub version: i64,
    pub adapter: String,
    pub status: RepoStatus,
    pub output: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Branch {
    pub id: i64,
    pub repo_id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub pg_port: i64,
    pub status: BranchStatus,
    pub pg_status: BranchPgStatus,
    pub created_at: DateTime<Utc>,
}

/// Repo plus its pool and every branch, the aggregate every orchestrator
/// entry point reads.
#[derive(Debug, Clone)]
pub struct RepoDetail {
    pub repo: Repo,
    pub pool: Pool,
    pub branches: Vec<Branch>,
}

impl RepoDetail {
    pub fn main_branch(&self) -> Option<&Branch> {
        self.branches.iter().find(|b| b.name == "main")
    }

    pub fn branch(&self, id: i64) -> Option<&Branch> {
        self.branches.iter().find(|b| b.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enum_round_trips() {
        assert_eq!(RepoStatus::from_str("READY").unwrap(), RepoStatus::Ready);
        assert_eq!(RepoStatus::Ready.as_str(), "READY");
        assert!(RepoStatus::from_str("bogus").is_err());
    }
}
