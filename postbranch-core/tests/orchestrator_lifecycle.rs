//! Integration tests for the repository orchestrator. The happy paths that
//! need a real ZFS pool and root privileges are gated with
//! `requires_root!`/`requires_zfs!`; the delete-repo best-effort cleanup
//! path needs neither, since every external command it runs is allowed to
//! fail silently.

use postbranch_core::catalog::model::PoolType;
use postbranch_core::catalog::Catalog;
use postbranch_core::orchestrator;
use postbranch_core::runner::Runner;
use postbranch_core::zfs;
use postbranch_test_support::fixture::PoolFixture;
use postbranch_test_support::{requires_root, requires_zfs};

async fn open_test_catalog() -> Catalog {
    let dir = tempfile::tempdir().unwrap().keep();
    Catalog::open(&dir.join("catalog.db")).await.unwrap()
}

/// `delete_repo`'s "backing image file missing" branch tolerates every
/// external command failing (no `zpool`/`zfs` needed, no root needed): the
/// pool row should still be removed from the catalog.
#[tokio::test]
async fn delete_repo_with_missing_image_cleans_up_the_catalog_row() {
    let catalog = open_test_catalog().await;
    let runner = Runner::new();

    let pool = catalog
        .create_pool("ghost", "/nonexistent/ghost.img", "/nonexistent/mnt/pb-ghost", 1024, PoolType::Virtual)
        .await
        .unwrap();
    let repo = catalog.create_repo("ghost", pool.id, "/usr/lib/postgresql/16", 16).await.unwrap();

    orchestrator::delete_repo(&catalog, &runner, repo.id).await.unwrap();

    assert!(catalog.get_repo(repo.id).await.is_err());
}

/// `mount_all` against an empty catalog is a no-op, regardless of
/// privileges or installed tooling.
#[tokio::test]
async fn mount_all_on_an_empty_catalog_is_a_noop() {
    let catalog = std::sync::Arc::new(open_test_catalog().await);
    let runner = std::sync::Arc::new(Runner::new());
    let cancel = tokio_util::sync::CancellationToken::new();

    orchestrator::mount_all(catalog, runner, cancel).await.unwrap();
}

/// A cancelled root token short-circuits `mount_all` before it tries to
/// start any postmaster, even with a repo recorded in the catalog.
#[tokio::test]
async fn mount_all_skips_postmaster_startup_once_cancelled() {
    let catalog = open_test_catalog().await;
    let pool = catalog
        .create_pool("acme", "/nonexistent/acme.img", "/nonexistent/mnt/pb-acme", 2048, PoolType::Virtual)
        .await
        .unwrap();
    catalog.create_repo("acme", pool.id, "/usr/lib/postgresql/16", 16).await.unwrap();

    let catalog = std::sync::Arc::new(catalog);
    let runner = std::sync::Arc::new(Runner::new());
    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();

    orchestrator::mount_all(catalog.clone(), runner, cancel).await.unwrap();

    // The missing image file still gets the repo marked FAILED in phase B,
    // which runs before the cancellation check in phase D.
    let repo = catalog.list_repo().await.unwrap().into_iter().next().unwrap();
    assert_eq!(repo.status.as_str(), "FAILED");
}

/// Full round trip through the ZFS layer: create a virtual pool, snapshot
/// and clone a dataset under it, then tear it all down. Needs root (loop
/// device ioctls) and a real `zpool`/`zfs` on `$PATH`.
#[test]
fn virtual_pool_create_and_destroy_round_trips() {
    requires_root!();
    requires_zfs!();

    let runner = Runner::new();
    let fixture = PoolFixture::new("pbtest").unwrap();
    let pool_name = format!("pbtest-{}", std::process::id());

    let pool = zfs::create_virtual_pool(&runner, &pool_name, &fixture.image_path, &fixture.mount_path, 600).unwrap();
    assert_eq!(pool.name, pool_name);

    zfs::empty_dataset(&runner, &fixture.mount_path, &pool_name, "main").unwrap();
    zfs::snapshot_and_clone(&runner, &pool_name, "main", "feat").unwrap();
    zfs::destroy_dataset(&runner, &pool_name, "feat").unwrap();

    zfs::destroy_pool(&runner, &pool_name).unwrap();
    let device_path = zfs::find_device_path(&runner, &pool_name);
    assert!(device_path.is_err(), "pool should no longer be registered after destroy");
}
