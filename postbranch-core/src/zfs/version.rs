use std::fmt;

use regex::Regex;

/// A parsed `major.minor.patch` version out of `zfs --version` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ZfsVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ZfsVersion {
    pub const MINIMUM: ZfsVersion = ZfsVersion { major: 2, minor: 1, patch: 0 };

    /// `zfs --version` typically prints something like
    /// `zfs-2.1.5-1ubuntu6~22.04.4\nzfs-kmod-2.1.5-1ubuntu6~22.04.4`. Take
    /// the first `major.minor.patch` triple found anywhere in the output.
    pub fn parse(output: &str) -> Option<Self> {
        lazy_static::lazy_static! {
            static ref VERSION_RE: Regex = Regex::new(r"(\d+)\.(\d+)\.(\d+)").unwrap();
        }
        let captures = VERSION_RE.captures(output)?;
        Some(Self {
            major: captures[1].parse().ok()?,
            minor: captures[2].parse().ok()?,
            patch: captures[3].parse().ok()?,
        })
    }
}

impl fmt::Display for ZfsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typical_zfs_version_output() {
        let output = "zfs-2.1.5-1ubuntu6~22.04.4\nzfs-kmod-2.1.5-1ubuntu6~22.04.4\n";
        let version = ZfsVersion::parse(output).unwrap();
        assert_eq!(version, ZfsVersion { major: 2, minor: 1, patch: 5 });
    }

    #[test]
    fn accepts_minimum_and_above() {
        assert!(ZfsVersion::MINIMUM >= ZfsVersion::MINIMUM);
        assert!(ZfsVersion { major: 2, minor: 2, patch: 0 } > ZfsVersion::MINIMUM);
    }

    #[test]
    fn rejects_below_minimum() {
        assert!(ZfsVersion { major: 2, minor: 0, patch: 9 } < ZfsVersion::MINIMUM);
        assert!(ZfsVersion { major: 1, minor: 9, patch: 9 } < ZfsVersion::MINIMUM);
    }

    #[test]
    fn unparseable_output_returns_none() {
        assert!(ZfsVersion::parse("command not found").is_none());
    }
}
