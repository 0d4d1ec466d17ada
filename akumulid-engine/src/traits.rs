//! The seams between this façade and whatever backs it. `DbConnection` is
//! generic over `Box<dyn Engine>`; everything downstream (RESP/OpenTSDB
//! parsers, the query pipeline) only ever sees `DbSession`/`DbCursor`.

use crate::error::EngineError;
use crate::sample::Sample;

/// One step of a cursor's output: either the next sample, or end-of-stream.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorPoll {
    /// A sample pulled from the backend.
    Sample(Sample),
    /// The cursor has no more samples to produce.
    EndOfStream,
}

/// A single-reader handle producing a finite sample stream. Not restartable.
pub trait Cursor: Send {
    /// Pulls the next item from the cursor.
    fn poll(&mut self) -> Result<CursorPoll, EngineError>;
}

/// A single-writer (ingestion) / single-reader (query) handle into the engine.
/// Not safe for concurrent use by multiple callers.
pub trait Session: Send {
    /// Resolves a series name (with tags) to its parameter id, assigning a
    /// fresh one on first sight.
    fn resolve(&mut self, series: &str) -> Result<u64, EngineError>;

    /// Writes one sample through this session.
    fn write(&mut self, sample: Sample) -> Result<(), EngineError>;

    /// Opens a cursor evaluating `query` against the engine.
    fn query(&self, query: &str) -> Result<Box<dyn Cursor>, EngineError>;
}

/// The embedded storage engine itself. Implementations own all on-disk
/// state; this crate never inspects it directly (see spec non-goals).
pub trait Engine: Send + Sync {
    /// Opens a new session against this engine.
    fn open_session(&self) -> Result<Box<dyn Session>, EngineError>;

    /// A textual statistics blob (series count, ingestion rate, etc.).
    fn stats(&self) -> String;

    /// An engine-exposed textual resource (series list, function catalog, ...).
    fn resource(&self, name: &str) -> Result<String, EngineError>;

    /// Pre-recovery debug report, as emitted by `--debug-dump`.
    fn debug_report(&self) -> String;

    /// Post-recovery debug report, as emitted by `--debug-recovery-dump`.
    fn debug_report_after_recovery(&self) -> String;
}
