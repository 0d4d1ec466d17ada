//! `DbConnection`, `DbSession`, `DbCursor`: the owned and weak handles the
//! rest of the daemon is built on.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use crate::error::EngineError;
use crate::registry;
use crate::sample::Sample;
use crate::traits::{CursorPoll, Cursor, Engine, Session};

struct Handle {
    engine: Box<dyn Engine>,
    path: PathBuf,
}

impl Drop for Handle {
    fn drop(&mut self) {
        registry::unregister(&self.path);
    }
}

/// Shared, long-lived, process-global handle to the embedded storage engine.
/// Cheap to clone (reference-counted); the underlying engine is released,
/// and the path freed for reuse, when the last clone is dropped.
#[derive(Clone)]
pub struct DbConnection(Arc<Handle>);

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnection")
            .field("path", &self.0.path)
            .finish()
    }
}

impl DbConnection {
    /// Opens a connection backed by `engine`, enforcing "at most one
    /// DbConnection open per path per process".
    pub fn open(path: impl AsRef<Path>, engine: Box<dyn Engine>) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        registry::register(&path)?;
        Ok(Self(Arc::new(Handle { engine, path })))
    }

    /// A weak back-reference, suitable for holding from the query pipeline
    /// without creating an ownership cycle.
    pub fn downgrade(&self) -> WeakDbConnection {
        WeakDbConnection(Arc::downgrade(&self.0))
    }

    /// Creates a new session against this connection.
    pub fn session(&self) -> Result<DbSession, EngineError> {
        let session = self.0.engine.open_session()?;
        Ok(DbSession {
            session,
            _conn: self.clone(),
        })
    }

    /// Textual statistics blob from the engine.
    pub fn stats(&self) -> String {
        self.0.engine.stats()
    }

    /// An engine-exposed textual resource.
    pub fn resource(&self, name: &str) -> Result<String, EngineError> {
        self.0.engine.resource(name)
    }

    /// Pre-recovery debug report.
    pub fn debug_report(&self) -> String {
        self.0.engine.debug_report()
    }

    /// Post-recovery debug report.
    pub fn debug_report_after_recovery(&self) -> String {
        self.0.engine.debug_report_after_recovery()
    }
}

/// A weak back-reference to a [`DbConnection`]. Every operation must
/// upgrade-or-fail with [`EngineError::ConnectionClosed`].
#[derive(Clone)]
pub struct WeakDbConnection(Weak<Handle>);

impl std::fmt::Debug for WeakDbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WeakDbConnection")
    }
}

impl WeakDbConnection {
    /// Upgrades to a strong [`DbConnection`], failing if the connection has
    /// already been torn down.
    pub fn upgrade(&self) -> Result<DbConnection, EngineError> {
        self.0
            .upgrade()
            .map(DbConnection)
            .ok_or(EngineError::ConnectionClosed)
    }
}

/// Owned by a single ingestion worker for its lifetime, or by a single query
/// for its lifetime. Not safe for concurrent use by multiple workers.
pub struct DbSession {
    session: Box<dyn Session>,
    // Keeps the connection (and thus the path registration) alive for as
    // long as any session referencing it exists.
    _conn: DbConnection,
}

impl DbSession {
    /// Resolves a series name to its parameter id.
    pub fn resolve(&mut self, series: &str) -> Result<u64, EngineError> {
        self.session.resolve(series)
    }

    /// Writes one sample.
    pub fn write(&mut self, sample: Sample) -> Result<(), EngineError> {
        self.session.write(sample)
    }

    /// Opens a cursor evaluating `query` through this session.
    pub fn query(&self, query: &str) -> Result<DbCursor, EngineError> {
        let cursor = self.session.query(query)?;
        Ok(DbCursor { cursor })
    }
}

/// Owned by exactly one query pipeline operation. Produces a finite lazy
/// sequence of samples; not restartable.
pub struct DbCursor {
    cursor: Box<dyn Cursor>,
}

impl DbCursor {
    /// Pulls the next item from the cursor.
    pub fn poll(&mut self) -> Result<CursorPoll, EngineError> {
        self.cursor.poll()
    }
}
