//! Parser-side errors. Engine-side errors (late write, duplicate timestamp,
//! ...) are a separate channel — see [`akumulid_engine::EngineError`] — so a
//! caller can tell "malformed input" from "the engine rejected a well-formed
//! sample" apart, per the per-batch error-handling policy. That channel is
//! carried through as [`ParseError::Engine`] rather than flattened, so a
//! caller can still distinguish e.g. a late write from a malformed frame.

use akumulid_engine::EngineError;

/// Failure while parsing a RESP frame or an OpenTSDB telnet line.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The buffer ended before a complete frame could be read.
    #[error("truncated input")]
    Truncated,

    /// A byte that should have been a recognised type prefix or keyword
    /// wasn't.
    #[error("malformed input: {0}")]
    Malformed(&'static str),

    /// A numeric field did not parse as a number.
    #[error("invalid number: {0:?}")]
    InvalidNumber(String),

    /// A timestamp field matched neither the integer nor the compact
    /// ISO-8601 form.
    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    /// An OpenTSDB telnet command other than `put` (e.g. `version`,
    /// `stats`); not an ingestion failure, just nothing to ingest.
    #[error("unsupported command: {0:?}")]
    UnsupportedCommand(String),

    /// The frame parsed cleanly but the engine rejected the resolve or
    /// write call (late write, duplicate timestamp, congestion, ...).
    #[error(transparent)]
    Engine(#[from] EngineError),
}
