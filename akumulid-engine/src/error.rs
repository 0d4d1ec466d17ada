//! Errors surfaced across the engine façade.

use std::path::PathBuf;

/// Errors returned by [`crate::DbConnection`], [`crate::DbSession`] and
/// [`crate::DbCursor`] operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Another `DbConnection` is already open against this path in this process.
    #[error("database already open at {0}")]
    AlreadyOpen(PathBuf),

    /// The connection's weak back-reference could no longer be upgraded.
    #[error("connection closed")]
    ConnectionClosed,

    /// A sample arrived with a timestamp older than the series' last write.
    #[error("late write for series {0}")]
    LateWrite(u64),

    /// A sample arrived with a timestamp equal to the series' last write.
    #[error("duplicate timestamp for series {0} at {1}")]
    DuplicateTimestamp(u64, u64),

    /// A query referenced a series name the engine has never seen.
    #[error("unknown series {0:?}")]
    UnknownSeries(String),

    /// A `get_resource` call named a resource the engine doesn't expose.
    #[error("unknown resource {0:?}")]
    UnknownResource(String),

    /// The query text could not be parsed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Backend is shedding load.
    #[error("backend congestion")]
    Congestion,

    /// Underlying I/O failure (manifest/volume files).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from validating a [`crate::WALSettings`].
#[derive(Debug, thiserror::Error)]
pub enum WalConfigError {
    /// `nvolumes` outside `{0} ∪ [2, 1000]`.
    #[error("WAL.nvolumes={0} is out of range (must be 0, or between 2 and 1000)")]
    NVolumes(u32),

    /// `volume_size` outside `[1 MiB, 1 GiB]`.
    #[error("WAL.volume_size={0} is out of range (must be between 1 MiB and 1 GiB)")]
    VolumeSize(u64),

    /// The configured WAL path does not exist.
    #[error("WAL.path {0:?} does not exist")]
    PathMissing(PathBuf),
}
