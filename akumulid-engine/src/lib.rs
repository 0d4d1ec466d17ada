//! Façade over the embedded storage engine: `DbConnection`, `DbSession` and
//! `DbCursor`. The on-disk format, query grammar, and WAL block layout
//! belong to the engine itself and are not defined here — see
//! [`Engine`]/[`Session`]/[`Cursor`], the seam this crate implements against.

#![deny(missing_docs, rust_2018_idioms)]

mod connection;
mod error;
mod memory;
mod registry;
mod sample;
mod traits;
mod wal;

pub use connection::{DbConnection, DbCursor, DbSession, WeakDbConnection};
pub use error::{EngineError, WalConfigError};
pub use memory::MemoryEngine;
pub use sample::{Payload, Sample, SampleFlags};
pub use traits::{Cursor, CursorPoll, Engine, Session};
pub use wal::WalSettings;
