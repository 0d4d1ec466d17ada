//! Errors raised by the query pipeline itself, distinct from
//! [`akumulid_engine::EngineError`], which is what a pooler *surfaces*
//! through `get_error` once the cursor behind it fails.

use akumulid_engine::EngineError;

/// Errors from misusing a [`crate::QueryResultsPooler`] or
/// [`crate::QueryProcessor`].
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// `append` called after `start`, or `start` called twice.
    #[error("pooler already started")]
    AlreadyStarted,

    /// `read_some` called before `start`.
    #[error("pooler not started")]
    NotStarted,

    /// The processor's weak connection reference could not be upgraded.
    #[error("connection closed")]
    ConnectionClosed,

    /// The engine rejected the query or a cursor operation.
    #[error(transparent)]
    Engine(#[from] EngineError),
}
