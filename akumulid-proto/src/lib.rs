//! Wire parsers consumed by the ingestion front-ends. A parser never talks
//! to a socket itself: the caller copies bytes into the buffer
//! [`Parser::next_buffer`] hands back, then calls [`Parser::parse_next`]
//! with how many of those bytes are valid.

#![deny(missing_docs, rust_2018_idioms)]

mod cursor;
mod error;
mod opentsdb;
mod resp;

pub use error::ParseError;
pub use opentsdb::OpenTsdbParser;
pub use resp::RespParser;

use akumulid_engine::DbSession;

/// Consumes a byte stream from a transport and writes the samples it finds
/// through a [`DbSession`]. Implementations are cheap to construct and are
/// expected to be thrown away after one batch: a parse error never needs to
/// leave partially-consumed internal state behind for the next batch.
pub trait Parser: Send {
    /// Called once before any batch is parsed. Intentionally not called
    /// again between batches — some implementations log on `start`, and a
    /// worker processing many batches per second would otherwise spam the
    /// log.
    fn start(&mut self);

    /// Returns a buffer of exactly `len` bytes for the caller to fill with
    /// the next unparsed chunk (one UDP datagram, or the next read from a
    /// TCP stream).
    fn next_buffer(&mut self, len: usize) -> &mut [u8];

    /// Parses the first `len` bytes of the buffer returned by the most
    /// recent [`Parser::next_buffer`] call, writing any samples found
    /// through `session`. A single call may parse more than one sample.
    fn parse_next(&mut self, len: usize, session: &mut DbSession) -> Result<(), ParseError>;

    /// Releases any resources held by the parser. Safe to call even if no
    /// batch was ever parsed.
    fn close(&mut self);
}
