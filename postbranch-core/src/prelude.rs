//! Prelude for `postbranch-core`.

pub use crate::{
    blockdev::{self, BlockDeviceError},
    catalog::{self, Catalog, CatalogError},
    orchestrator::{self, OrchestratorError},
    pg::{self, PgError, PgInstallation, Postmaster},
    runner::{self, Invocation, RunError, Runner},
    zfs::{self, ZfsError},
};
