//! The read side of akumulid: turns a parsed query string into a streamed,
//! backpressure-aware byte response.
//!
//! [`QueryProcessor`] is the long-lived, per-connection-pool object the
//! HTTP server holds; it manufactures a fresh [`QueryResultsPooler`] per
//! request, bound to the [`ApiEndpoint`] the request's path selected.

#![deny(missing_docs, rust_2018_idioms)]

mod endpoint;
mod error;
mod formatter;
mod pooler;
mod processor;

pub use endpoint::{ApiEndpoint, QueryFormat};
pub use error::QueryError;
pub use formatter::{
    make_formatter, CsvQueryFormatter, Formatter, JsonQueryFormatter, SearchFormatter,
    SuggestFormatter,
};
pub use pooler::{QueryResultsPooler, DEFAULT_ITEM_CAPACITY};
pub use processor::QueryProcessor;
