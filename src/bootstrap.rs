//! Directory/manifest lifecycle: `--create`, `--delete`, and the
//! pre-flight manifest check the plain "run the server" path performs.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::config::AppConfig;

const MANIFEST_NAME: &str = "db.akumuli";

/// Failures creating, deleting, or locating the on-disk database state.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// `--create` was run against a path that already has a manifest.
    #[error("database already exists at {0}")]
    ManifestExists(PathBuf),

    /// The daemon was asked to run (or `--delete`) against a path with no
    /// manifest.
    #[error("no database at {0}: run with --create first")]
    ManifestMissing(PathBuf),

    /// Filesystem operation failed.
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

fn manifest_path(data_path: &Path) -> PathBuf {
    data_path.join(MANIFEST_NAME)
}

fn volume_path(data_path: &Path, index: u32) -> PathBuf {
    data_path.join(format!("volume_{index}.akumuli"))
}

/// Fails with [`BootstrapError::ManifestMissing`] unless a manifest is
/// already present at `config.path`.
pub fn ensure_manifest_exists(config: &AppConfig) -> Result<(), BootstrapError> {
    let manifest = manifest_path(&config.path);
    if !manifest.exists() {
        return Err(BootstrapError::ManifestMissing(config.path.clone()));
    }
    Ok(())
}

/// Creates the data directory, the manifest, and (for a non-zero volume
/// count) the volume files. Fails if a manifest already exists.
///
/// `allocate` preallocates each volume file to its full `volume_size`
/// rather than leaving it zero-length; `volume_size_override` lets
/// `--CI` substitute a small test size without touching `config`.
pub fn create_database(
    config: &AppConfig,
    allocate: bool,
    volume_size_override: Option<u64>,
) -> Result<(), BootstrapError> {
    let manifest = manifest_path(&config.path);
    if manifest.exists() {
        return Err(BootstrapError::ManifestExists(config.path.clone()));
    }

    fs::create_dir_all(&config.path)?;
    File::create(&manifest)?;

    let volume_size = volume_size_override.unwrap_or(config.volume_size);
    for i in 0..config.nvolumes {
        let path = volume_path(&config.path, i);
        let file = File::create(&path)?;
        if allocate {
            file.set_len(volume_size)?;
        }
    }

    Ok(())
}

/// Removes the manifest and every volume file named in `config`. Fails
/// with [`BootstrapError::ManifestMissing`] if there's nothing there.
pub fn delete_database(config: &AppConfig) -> Result<(), BootstrapError> {
    ensure_manifest_exists(config)?;

    fs::remove_file(manifest_path(&config.path)).ok();
    for i in 0..config.nvolumes {
        fs::remove_file(volume_path(&config.path, i)).ok();
    }
    Ok(())
}
