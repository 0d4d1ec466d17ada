//! Errors raised at server construction, startup, or registry lookup.

use std::io;

use akumulid_engine::EngineError;

/// Failures that abort server startup. All are fatal: the daemon logs and
/// exits non-zero.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// `ServerSettings.name` has no registered factory.
    #[error("unknown protocol {0:?}")]
    UnknownProtocol(String),

    /// A protocol-specific arity check failed (e.g. UDP given two endpoints).
    #[error("invalid settings for {protocol}: {reason}")]
    InvalidSettings {
        /// The protocol whose settings were rejected.
        protocol: &'static str,
        /// Why the settings were rejected.
        reason: String,
    },

    /// Socket create/bind/setsockopt failed.
    #[error("socket setup failed: {0}")]
    Io(#[from] io::Error),

    /// The engine connection could not be opened or a session/cursor
    /// operation failed during startup.
    #[error(transparent)]
    Engine(#[from] EngineError),
}
