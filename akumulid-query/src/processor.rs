//! `QueryProcessor`: the builder side of the query pipeline. Holds only a
//! weak back-reference to the engine connection so that
//! processor → connection → sessions → processor never becomes a reference
//! cycle the connection can't be torn down through.

use akumulid_engine::WeakDbConnection;

use crate::endpoint::ApiEndpoint;
use crate::error::QueryError;
use crate::pooler::{QueryResultsPooler, DEFAULT_ITEM_CAPACITY};

/// Manufactures one [`QueryResultsPooler`] per incoming HTTP query, and
/// answers the stats/resource side-channels the HTTP server exposes.
pub struct QueryProcessor {
    connection: WeakDbConnection,
    default_item_capacity: usize,
}

impl QueryProcessor {
    /// Creates a processor holding a weak reference to `connection`.
    pub fn new(connection: WeakDbConnection) -> Self {
        Self {
            connection,
            default_item_capacity: DEFAULT_ITEM_CAPACITY,
        }
    }

    /// Overrides the default read-buffer sizing (in records) new poolers
    /// are created with.
    pub fn with_item_capacity(mut self, item_capacity: usize) -> Self {
        self.default_item_capacity = item_capacity;
        self
    }

    /// Creates a new pooler, bound to a freshly opened session, formatting
    /// for `endpoint`. Fails with [`QueryError::ConnectionClosed`] if the
    /// engine connection has already been torn down.
    pub fn create(&self, endpoint: ApiEndpoint) -> Result<QueryResultsPooler, QueryError> {
        let conn = self.connection.upgrade()?;
        let session = conn.session()?;
        Ok(QueryResultsPooler::new(
            session,
            endpoint,
            self.default_item_capacity,
        ))
    }

    /// The engine's textual statistics blob.
    pub fn get_all_stats(&self) -> Result<String, QueryError> {
        Ok(self.connection.upgrade()?.stats())
    }

    /// An engine-exposed textual resource (series list, function catalog, ...).
    pub fn get_resource(&self, name: &str) -> Result<String, QueryError> {
        Ok(self.connection.upgrade()?.resource(name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::QueryFormat;
    use akumulid_engine::{DbConnection, MemoryEngine};

    #[test]
    fn create_fails_once_connection_is_dropped() {
        let conn = DbConnection::open(
            std::env::temp_dir().join("akumulid-processor-test-dropped"),
            Box::new(MemoryEngine::new()),
        )
        .unwrap();
        let processor = QueryProcessor::new(conn.downgrade());
        drop(conn);

        assert!(matches!(
            processor.create(ApiEndpoint::Query(QueryFormat::Csv)),
            Err(QueryError::ConnectionClosed)
        ));
        assert!(matches!(
            processor.get_all_stats(),
            Err(QueryError::ConnectionClosed)
        ));
    }

    #[test]
    fn create_succeeds_while_connection_is_alive() {
        let conn = DbConnection::open(
            std::env::temp_dir().join("akumulid-processor-test-alive"),
            Box::new(MemoryEngine::new()),
        )
        .unwrap();
        let processor = QueryProcessor::new(conn.downgrade());
        assert!(processor.create(ApiEndpoint::Suggest).is_ok());
        assert!(processor.get_all_stats().is_ok());
    }
}
