//! Swap data: windows, subgraph access, CSV artifacts, batch fetching

pub mod circuit_breaker;
pub mod fetch;
pub mod provider;
pub mod query;
pub mod store;
pub mod subgraph;
pub mod table;
pub mod window;

pub use circuit_breaker::CircuitBreaker;
pub use fetch::{BatchFetcher, FetchProgress, FetchSummary, TracingProgress, WindowOutcome, WindowReport};
pub use provider::{DataError, SubgraphClient, SubgraphSession};
pub use query::{FieldPath, SwapQuery};
pub use store::CsvStore;
pub use subgraph::{ClientOptions, PlaygroundsClient, SubgraphEndpoint};
pub use table::{SwapTable, PROTOCOL_COLUMN};
pub use window::{daily_windows, parse_start_date, TimeWindow};
