//! Activity sync engine
//!
//! Exposes a remote paginated activity feed through a local SQLite cache so
//! repeated queries avoid re-fetching full history and tolerate upstream
//! instability.
//!
//! ## Module Organization
//!
//! - `types` - activity records, identity keys, window filter, dedup
//! - `error` - fetch / store / sync error taxonomy
//! - `backoff` - reusable retry policy
//! - `source` - retrying HTTP client for the upstream endpoint
//! - `store` - `ActivityStore` trait and SQLite implementation
//! - `engine` - PROBE/STREAM/MERGE orchestration (the core)
//! - `query` - thin façade used by the serving layer
//! - `sweeper` - background eviction of expired cache rows
//! - `trace` - optional first-page dump sink for debugging

pub mod backoff;
pub mod engine;
pub mod error;
pub mod query;
pub mod source;
pub mod store;
pub mod sweeper;
pub mod trace;
pub mod types;

pub use backoff::BackoffPolicy;
pub use engine::{SyncEngine, SyncSettings};
pub use error::{FetchError, StoreError, SyncError};
pub use query::{QueryOptions, QueryService};
pub use source::{ActivitySource, PageRequest, RemoteActivitySource, MAX_PAGE_LIMIT};
pub use store::{ActivityStore, CacheStats, SqliteActivityStore};
pub use types::{ActivityRecord, IdentityKey, SortDirection};
