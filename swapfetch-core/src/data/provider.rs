//! Subgraph client traits and structured error types.
//!
//! `SubgraphClient` abstracts over where swap records come from (the
//! Playgrounds GraphQL proxy in production, in-memory fakes in tests).
//! A client hands out one `SubgraphSession` per fetch operation; the session
//! owns its network resources and releases them when dropped.

use super::query::SwapQuery;
use super::table::SwapTable;
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

/// Structured error types for fetch and persist operations.
///
/// Everything here is caught at the per-window boundary and reported
/// alongside the window's date.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("HTTP {status} from subgraph endpoint")]
    HttpStatus { status: u16 },

    #[error("rate limited by subgraph endpoint (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("query rejected by subgraph: {0}")]
    Query(String),

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("field '{field}' is not defined on subgraph type '{type_name}'")]
    UnknownField { type_name: String, field: String },

    #[error("no swaps returned for {date}")]
    EmptyResult { date: NaiveDate },

    #[error("hard stop: subgraph endpoint keeps failing (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("store error: {0}")]
    StoreError(String),

    #[error("operation timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl DataError {
    /// Transport-level failures count against the circuit breaker; query and
    /// schema errors do not, since retrying them cannot help.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DataError::NetworkUnreachable(_)
                | DataError::HttpStatus { .. }
                | DataError::RateLimited { .. }
                | DataError::Timeout { .. }
        )
    }
}

/// Source of subgraph sessions.
#[async_trait]
pub trait SubgraphClient: Send + Sync {
    /// Human-readable name of this client.
    fn name(&self) -> &str;

    /// Acquire a fresh session scoped to a single fetch operation.
    ///
    /// Implementations may perform schema discovery here.
    async fn open_session(&self) -> Result<Box<dyn SubgraphSession>, DataError>;

    /// Whether the client is currently accepting work (not tripped).
    fn is_available(&self) -> bool {
        true
    }
}

/// A scoped connection to the subgraph. Dropping it releases the connection.
#[async_trait]
pub trait SubgraphSession: Send {
    /// Execute `query` and return every matching row, up to `query.first`.
    async fn query_swaps(&mut self, query: &SwapQuery) -> Result<SwapTable, DataError>;
}
