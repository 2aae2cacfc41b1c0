use std::path::PathBuf;

use clap::Parser;

use crate::config::DEFAULT_CONFIG_PATH;

/// ZFS-backed PostgreSQL branching control plane.
#[derive(Parser, Debug)]
#[clap(author, version, about = "Branch PostgreSQL clusters on ZFS", long_about = None)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[clap(
        short = 'c',
        long = "config-file",
        env = "POSTBRANCH_CONFIG",
        value_name = "PATH",
        default_value = DEFAULT_CONFIG_PATH
    )]
    pub config_file: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
