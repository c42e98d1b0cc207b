//! SwapFetch Core: daily swap extraction from a subgraph into CSV files.
//!
//! - Day windows and their output file identities
//! - GraphQL query rendering and a paginating subgraph client
//! - Atomic per-day CSV store whose files double as the completion record
//! - Bounded-concurrency batch fetcher with per-window failure isolation

pub mod config;
pub mod data;

pub use config::{ConfigError, FetchConfig};
