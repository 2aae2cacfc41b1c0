//! Lightweight fixtures for exercising the orchestrator without a real disk
//! image or ZFS pool wherever a test can get away with it.

use std::path::PathBuf;

use tempfile::TempDir;

/// A scratch directory standing in for a pool's mountpoint, plus the would-be
/// backing image path alongside it (not created — tests that need a real
/// sparse file create it themselves via `postbranch_core::blockdev`).
pub struct PoolFixture {
    _dir: TempDir,
    pub mount_path: PathBuf,
    pub image_path: PathBuf,
}

impl PoolFixture {
    pub fn new(pool_name: &str) -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let mount_path = dir.path().join(format!("pb-{pool_name}"));
        let image_path = dir.path().join(format!("{pool_name}.img"));
        std::fs::create_dir_all(&mount_path)?;
        Ok(Self { _dir: dir, mount_path, image_path })
    }
}
