//! Thin wrappers over `zpool` and `zfs`.
//!
//! Every function here shells out through [`crate::runner::Runner`]; the
//! non-trivial work is in how the results get interpreted (parsing
//! `zpool list -v` output, deciding whether an existing dataset mountpoint
//! needs clearing versus recreating).

mod version;

pub use version::ZfsVersion;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::blockdev::{self, BlockDeviceError};
use crate::runner::{Invocation, RunError, Runner};

#[derive(Error, Debug)]
pub enum ZfsError {
    #[error(transparent)]
    Run(#[from] RunError),
    #[error(transparent)]
    BlockDevice(#[from] BlockDeviceError),
    #[error("could not find a loop device backing pool {pool}")]
    NoBackingDevice { pool: String },
    #[error("zfs version {found} is not within the supported range (>= {MINIMUM})", MINIMUM = ZfsVersion::MINIMUM)]
    UnsupportedVersion { found: ZfsVersion },
    #[error("could not determine zfs version from `zfs --version` output")]
    UnparseableVersion,
}

/// A ZFS pool built on top of a loop device backed by a sparse file.
pub struct VirtualPool {
    pub name: String,
    pub image_path: PathBuf,
    pub mount_path: PathBuf,
    pub size_mb: u64,
}

/// Create the sparse file, attach a loop device, and `zpool create` a new
/// pool mounted at `mount_path`. The caller persists the resulting
/// [`VirtualPool`] into the catalog; nothing here touches the catalog.
pub fn create_virtual_pool(
    runner: &Runner,
    name: &str,
    image_path: &Path,
    mount_path: &Path,
    size_mb: u64,
) -> Result<VirtualPool, ZfsError> {
    blockdev::create_sparse_file(image_path, size_mb)?;
    let device_path = blockdev::attach_with_retry(image_path)?;

    runner.run(
        &Invocation::new("zpool")
            .arg("create")
            .arg("-m")
            .arg(mount_path)
            .arg(name)
            .arg(&device_path),
    )?;

    Ok(VirtualPool {
        name: name.to_string(),
        image_path: image_path.to_path_buf(),
        mount_path: mount_path.to_path_buf(),
        size_mb,
    })
}

/// Idempotently ensure dataset `<pool>/<name>` exists. If the mountpoint
/// directory is already present (e.g. the dataset survived a prior crash),
/// only the files inside it are removed — the dataset itself is left alone
/// so a restart-time re-mount doesn't lose it. Otherwise the dataset is
/// created fresh.
pub fn empty_dataset(runner: &Runner, pool_mount: &Path, pool_name: &str, name: &str) -> Result<(), ZfsError> {
    let dataset_name = format!("{pool_name}/{name}");
    let dataset_mount = pool_mount.join(name);

    if dataset_mount.is_dir() {
        let pattern = format!("{}/*", dataset_mount.display());
        for entry in glob::glob(&pattern).into_iter().flatten().flatten() {
            if entry.is_dir() {
                let _ = std::fs::remove_dir_all(&entry);
            } else {
                let _ = std::fs::remove_file(&entry);
            }
        }
        return Ok(());
    }

    runner.run(&Invocation::new("zfs").arg("create").arg(&dataset_name))?;
    Ok(())
}

/// Snapshot `<pool>/<parent>` as `pb-branch-<child>` and clone it into
/// `<pool>/<child>`.
pub fn snapshot_and_clone(runner: &Runner, pool_name: &str, parent: &str, child: &str) -> Result<(), ZfsError> {
    let snapshot_name = format!("{pool_name}/{parent}@pb-branch-{child}");
    runner.run(&Invocation::new("zfs").arg("snapshot").arg(&snapshot_name))?;
    runner.run(
        &Invocation::new("zfs").arg("clone").arg(&snapshot_name).arg(format!("{pool_name}/{child}")),
    )?;
    Ok(())
}

/// `zfs destroy -r <pool>/<branch>`.
pub fn destroy_dataset(runner: &Runner, pool_name: &str, name: &str) -> Result<(), ZfsError> {
    runner.run(&Invocation::new("zfs").arg("destroy").arg("-r").arg(format!("{pool_name}/{name}")))?;
    Ok(())
}

pub fn import_pool(runner: &Runner, pool_name: &str) -> Result<(), ZfsError> {
    runner.run(&Invocation::new("zpool").arg("import").arg(pool_name))?;
    Ok(())
}

/// Export (unmount, in ZFS terms) a pool. A failure here usually means the
/// pool was never imported in the first place; callers that call this
/// speculatively during cleanup should ignore the error.
pub fn export_pool(runner: &Runner, pool_name: &str) -> Result<(), ZfsError> {
    runner.run(&Invocation::new("zpool").arg("export").arg(pool_name))?;
    Ok(())
}

pub fn destroy_pool(runner: &Runner, pool_name: &str) -> Result<(), ZfsError> {
    runner.run(&Invocation::new("zpool").arg("destroy").arg("-f").arg(pool_name))?;
    Ok(())
}

/// Recordsize of a dataset, in bytes, used to validate that
/// `full_page_writes=off` is safe (the dataset must use a recordsize at
/// least as large as a Postgres page, 8 KiB).
pub fn recordsize(runner: &Runner, dataset: &str) -> Result<u64, ZfsError> {
    let output = runner.run(
        &Invocation::new("zfs")
            .arg("get")
            .arg("-Hp")
            .arg("-o")
            .arg("value")
            .arg("recordsize")
            .arg(dataset),
    )?;
    Ok(output.trim().parse().unwrap_or(0))
}

/// Parse `zpool list -v <name>` output to find the loop device currently
/// backing a pool. Used during unmount, where the catalog doesn't record
/// which loop minor a pool ended up on.
pub fn find_device_path(runner: &Runner, pool_name: &str) -> Result<PathBuf, ZfsError> {
    let output = runner.run(&Invocation::new("zpool").arg("list").arg("-v").arg(pool_name))?;
    for line in output.lines() {
        let trimmed = line.trim_start();
        if let Some(device) = trimmed.strip_prefix("loop") {
            let name = format!("loop{}", device.split_whitespace().next().unwrap_or(""));
            return Ok(PathBuf::from("/dev").join(name));
        }
    }
    Err(ZfsError::NoBackingDevice { pool: pool_name.to_string() })
}

/// Query and validate the installed `zfs` version against the accepted
/// range.
pub fn check_version(runner: &Runner) -> Result<ZfsVersion, ZfsError> {
    let output = runner.run(&Invocation::new("zfs").arg("--version"))?;
    let version = ZfsVersion::parse(&output).ok_or(ZfsError::UnparseableVersion)?;
    if version < ZfsVersion::MINIMUM {
        return Err(ZfsError::UnsupportedVersion { found: version });
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_device_path_parses_loop_line() {
        let output = "NAME        SIZE\nacme        1G\n  loop7     1G\n";
        let line = output.lines().find_map(|l| l.trim_start().strip_prefix("loop")).unwrap();
        assert_eq!(format!("loop{}", line.split_whitespace().next().unwrap()), "loop7");
    }
}
