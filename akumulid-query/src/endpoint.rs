//! The tag that selects a pooler's output formatter.

/// Output encoding for the query endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryFormat {
    /// Comma-separated `param_id,timestamp,value` rows.
    Csv,
    /// A JSON array of `{"id":...,"ts":...,"value":...}` objects.
    Json,
}

/// Which HTTP endpoint shape a [`crate::QueryResultsPooler`] is formatting
/// its output for. Selected once, at `start`, and dispatched as a tagged
/// variant rather than through a per-sample virtual call on the hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiEndpoint {
    /// `/api/query`: a range/aggregation read over one series.
    Query(QueryFormat),
    /// `/api/suggest`: series-name autocompletion.
    Suggest,
    /// `/api/search`: series lookup by tag predicate.
    Search,
}
