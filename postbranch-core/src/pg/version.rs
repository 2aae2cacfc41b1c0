//! Parse PostgreSQL version numbers.
//!
//! ```rust
//! # use postbranch_core::pg::version::Version;
//! assert_eq!(Ok(Version::Pre10(9, 6, 17)), "9.6.17".parse());
//! assert_eq!(Ok(Version::Post10(14, 6)), "14.6".parse());
//! ```

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum VersionError {
    #[error("badly formed PostgreSQL version: {text:?}")]
    BadlyFormed { text: Option<String> },
    #[error("no PostgreSQL version found in: {text:?}")]
    NotFound { text: Option<String> },
}

/// A full PostgreSQL version, of the kind reported by `pg_ctl --version`.
/// PostgreSQL's versioning scheme changed at the 10.0 release: before it, a
/// minor release bumped the third number (`9.6.17`); from it on, the major
/// version is a single number and minor releases bump the second
/// (`14.6`). The exit codes `pg_ctl status` uses to report "not running"
/// differ across this boundary (and across minor releases before it), so
/// this distinction has to survive into the postmaster driver.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Version {
    Pre10(u32, u32, u32),
    Post10(u32, u32),
}

impl fmt::Display for Version {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Version::Pre10(a, b, c) => fmt.pad(&format!("{a}.{b}.{c}")),
            Version::Post10(a, b) => fmt.pad(&format!("{a}.{b}")),
        }
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lazy_static! {
            static ref VERSION_RE: Regex =
                Regex::new(r"(?x) \b (\d+) [.] (\d+) (?: [.] (\d+) )? \b").unwrap();
        }
        let badly_formed = |_| VersionError::BadlyFormed { text: Some(s.into()) };
        match VERSION_RE.captures(s) {
            Some(caps) => {
                let a = caps[1].parse::<u32>().map_err(badly_formed)?;
                let b = caps[2].parse::<u32>().map_err(badly_formed)?;
                match caps.get(3) {
                    None if a >= 10 => Ok(Version::Post10(a, b)),
                    None => Err(VersionError::BadlyFormed { text: Some(s.into()) }),
                    Some(_) if a >= 10 => Err(VersionError::BadlyFormed { text: Some(s.into()) }),
                    Some(m) => m
                        .as_str()
                        .parse::<u32>()
                        .map(|c| Version::Pre10(a, b, c))
                        .map_err(badly_formed),
                }
            }
            None => Err(VersionError::NotFound { text: Some(s.into()) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Version::{Post10, Pre10};
    use super::VersionError::*;

    #[test]
    fn parses_version_below_10() {
        assert_eq!(Ok(Pre10(9, 6, 17)), "9.6.17".parse());
    }

    #[test]
    fn parses_version_above_10() {
        assert_eq!(Ok(Post10(14, 6)), "14.6".parse());
    }

    #[test]
    fn rejects_post10_with_three_components() {
        assert!(matches!("10.1.2".parse::<super::Version>(), Err(BadlyFormed { .. })));
    }

    #[test]
    fn rejects_missing_version() {
        assert!(matches!("no version here".parse::<super::Version>(), Err(NotFound { .. })));
    }
}
