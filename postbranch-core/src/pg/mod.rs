//! The PostgreSQL driver: path validation, source probing, port allocation,
//! config synthesis, secrets, base backups, and postmaster lifecycle.

pub mod backup;
pub mod config;
pub mod error;
pub mod path;
pub mod port;
pub mod postmaster;
pub mod probe;
pub mod secrets;
pub mod version;

pub use error::PgError;
pub use path::PgInstallation;
pub use postmaster::Postmaster;

use std::path::Path;

use crate::runner::Runner;

/// Stop whatever postmaster might be squatting on `mount_path/dataset_name`
/// before `mount-all`'s Phase B touches the dataset. Dangling postmasters
/// are possible after an unclean shutdown; `pg_ctl stop` against an
/// already-stopped cluster is a harmless no-op, so failures here are logged
/// and swallowed rather than aborting the mount sequence.
pub fn stop_dangling(runner: &Runner, installation: &PgInstallation, mount_path: &Path, dataset_name: &str) {
    let data_dir = mount_path.join(dataset_name).join("data");
    if !data_dir.is_dir() {
        return;
    }
    let postmaster = Postmaster::new(runner, installation, data_dir);
    if let Err(err) = postmaster.stop() {
        log::warn!("could not stop dangling postmaster for {dataset_name}: {err}");
    }
}
