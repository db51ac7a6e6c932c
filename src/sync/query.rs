//! Query façade over the sync engine
//!
//! Translates "give me page N" / "give me everything" requests into engine
//! calls and passes cache maintenance straight through to the store. The
//! serving layer talks only to this type.

use crate::sync::engine::SyncEngine;
use crate::sync::error::{StoreError, SyncError};
use crate::sync::store::CacheStats;
use crate::sync::types::{ActivityRecord, SortDirection};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared query options
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub sort_direction: SortDirection,
    pub use_cache: bool,
    pub exclude_deposits_withdrawals: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            sort_direction: SortDirection::Desc,
            use_cache: true,
            exclude_deposits_withdrawals: true,
        }
    }
}

pub struct QueryService {
    engine: Arc<SyncEngine>,
    default_batch_size: u32,
}

impl QueryService {
    pub fn new(engine: Arc<SyncEngine>, default_batch_size: u32) -> Self {
        Self {
            engine,
            default_batch_size,
        }
    }

    /// One bounded page of activity
    pub async fn page(
        &self,
        owner: &str,
        limit: u32,
        offset: u32,
        options: &QueryOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<ActivityRecord>, SyncError> {
        self.engine
            .get_page(
                owner,
                limit,
                offset,
                options.sort_direction,
                options.use_cache,
                options.exclude_deposits_withdrawals,
                cancel,
            )
            .await
    }

    /// Everything within the retention window
    pub async fn full_history(
        &self,
        owner: &str,
        batch_size: Option<u32>,
        max_records: Option<usize>,
        options: &QueryOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<ActivityRecord>, SyncError> {
        self.engine
            .get_all(
                owner,
                options.sort_direction,
                batch_size.unwrap_or(self.default_batch_size),
                max_records,
                options.use_cache,
                options.exclude_deposits_withdrawals,
                cancel,
            )
            .await
    }

    pub async fn clear_cache(&self, owner: &str) -> Result<usize, StoreError> {
        self.engine.store().clear(owner).await
    }

    pub async fn cache_stats(&self, owner: Option<&str>) -> Result<CacheStats, StoreError> {
        self.engine.store().stats(owner).await
    }
}
