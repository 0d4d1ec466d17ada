//! Command-line surface. Commands are mutually exclusive; the absence of
//! one means "run the server".

use std::path::PathBuf;

use clap::Parser;

/// Multi-protocol ingestion and query front-end for an embedded
/// time-series engine.
#[derive(Debug, Parser)]
#[command(name = "akumulid", version, about)]
pub struct Cli {
    /// Overrides the config file location (default `~/.akumulid`).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Creates a default config file and exits.
    #[arg(long, conflicts_with_all = ["init_expandable", "create", "delete", "debug_dump", "debug_recovery_dump"])]
    pub init: bool,

    /// Same as `--init`, but writes `nvolumes=0` (auto-expanding WAL).
    #[arg(long, conflicts_with_all = ["init", "create", "delete", "debug_dump", "debug_recovery_dump"])]
    pub init_expandable: bool,

    /// With `--init`/`--init-expandable`, omits the `[WAL]` section.
    #[arg(long)]
    pub disable_wal: bool,

    /// Creates database files per the config.
    #[arg(long, conflicts_with_all = ["init", "init_expandable", "delete", "debug_dump", "debug_recovery_dump"])]
    pub create: bool,

    /// With `--create`, preallocates volumes on disk.
    #[arg(long, requires = "create")]
    pub allocate: bool,

    /// With `--create`, uses a 2 MiB test volume size instead of the
    /// configured one.
    #[arg(long = "CI", requires = "create")]
    pub ci: bool,

    /// Deletes database files per the config.
    #[arg(long, conflicts_with_all = ["init", "init_expandable", "create", "debug_dump", "debug_recovery_dump"])]
    pub delete: bool,

    /// Dumps the engine's debug report to a file, or `"stdout"`.
    #[arg(long, value_name = "FILE|stdout", conflicts_with_all = ["init", "init_expandable", "create", "delete", "debug_recovery_dump"])]
    pub debug_dump: Option<String>,

    /// Dumps the engine's post-recovery debug report to a file, or
    /// `"stdout"`.
    #[arg(long, value_name = "FILE|stdout", conflicts_with_all = ["init", "init_expandable", "create", "delete", "debug_dump"])]
    pub debug_recovery_dump: Option<String>,
}

impl Cli {
    fn any_init(&self) -> bool {
        self.init || self.init_expandable
    }

    /// Validates cross-flag constraints clap's declarative attributes
    /// can't express (`--disable-wal` requires one of the init flags).
    pub fn validate(&self) -> Result<(), String> {
        if self.disable_wal && !self.any_init() {
            return Err("--disable-wal requires --init or --init-expandable".to_string());
        }
        Ok(())
    }
}
