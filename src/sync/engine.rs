//! Sync engine
//!
//! Drives pagination against the remote source, filters to the trailing
//! retention window, deduplicates, detects pagination anomalies, and merges
//! fresh data with the cache.
//!
//! ## Full-history sync
//!
//! `get_all` runs INIT -> PROBE -> STREAM -> MERGE:
//!
//! 1. INIT reads everything cached for the owner.
//! 2. PROBE fetches one live page; if every in-window key on it is already
//!    cached, the cache is current and STREAM is skipped entirely.
//! 3. STREAM walks pages forward, window-filtering each one, dropping
//!    intra-page duplicates, and upserting incrementally so partial
//!    progress survives a later failure. An order-inversion guard stops
//!    the walk when a page's newest timestamp exceeds the previous page's
//!    minimum (unstable upstream pagination would otherwise loop or
//!    accumulate duplicates without bound).
//! 4. MERGE takes the streamed set as authoritative per identity key, adds
//!    window-filtered cached entries not already present, sorts, and
//!    truncates.
//!
//! ## Bounded page read
//!
//! `get_page` tops the cache up from offset 0 and then serves the requested
//! range from the cache, so offset-based paging stays stable while the live
//! feed appends at the head.
//!
//! Upstream failures degrade to cached data whenever any exists; a hard
//! error is raised only when both the fetch and the cache come up empty.

use crate::sync::error::SyncError;
use crate::sync::source::{ActivitySource, PageRequest, MAX_PAGE_LIMIT};
use crate::sync::store::ActivityStore;
use crate::sync::types::{dedup_page, filter_window, ActivityRecord, IdentityKey, SortDirection};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Tunables for the sync engine
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Trailing window in days; older records are excluded from full-history results
    pub retention_days: u32,
    /// Minimum refresh batch size before trusting the cache for a page read
    pub refresh_floor: u32,
    /// Hard ceiling on pagination offset, guards against runaway scans
    pub max_offset: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            retention_days: 90,
            refresh_floor: 100,
            max_offset: 10_000,
        }
    }
}

/// One engine instance owns an injected source and store; no global state
pub struct SyncEngine {
    source: Arc<dyn ActivitySource>,
    store: Arc<dyn ActivityStore>,
    settings: SyncSettings,
    /// Admission gates guaranteeing at most one in-flight full sync per owner
    gates: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn ActivitySource>,
        store: Arc<dyn ActivityStore>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            source,
            store,
            settings,
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> Arc<dyn ActivityStore> {
        self.store.clone()
    }

    fn window_cutoff(&self) -> i64 {
        chrono::Utc::now().timestamp() - self.settings.retention_days as i64 * 86_400
    }

    fn owner_gate(&self, owner: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.gates.lock().unwrap();
        gates
            .entry(owner.to_lowercase())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Bounded page read with stable offsets
    ///
    /// With `use_cache` the requested range is always served from the cache
    /// after a best-effort top-up fetch from offset 0, so repeated calls
    /// never skip or duplicate records when new items shift the live feed.
    #[allow(clippy::too_many_arguments)]
    pub async fn get_page(
        &self,
        owner: &str,
        limit: u32,
        offset: u32,
        direction: SortDirection,
        use_cache: bool,
        exclude_deposits_withdrawals: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<ActivityRecord>, SyncError> {
        ensure_live(cancel)?;

        if !use_cache {
            let request = PageRequest::new(owner, limit, offset, direction)
                .exclude(exclude_deposits_withdrawals);
            return Ok(self.source.fetch_page(&request).await?);
        }

        let refresh_limit = (limit + offset).max(self.settings.refresh_floor);
        let request = PageRequest::new(owner, refresh_limit, 0, direction)
            .exclude(exclude_deposits_withdrawals);

        let mut fetch_error = None;
        match self.source.fetch_page(&request).await {
            Ok(batch) => {
                if !batch.is_empty() {
                    ensure_live(cancel)?;
                    if let Err(e) = self.store.upsert(owner, &batch).await {
                        log::warn!("Refresh upsert failed for {}: {}", owner, e);
                    }
                }
            }
            Err(e) => {
                log::warn!("Refresh fetch failed for {}, serving cache: {}", owner, e);
                fetch_error = Some(e);
            }
        }

        ensure_live(cancel)?;
        let cached = self
            .store
            .query_range(owner, Some(limit), offset, direction)
            .await?;

        // Stale-but-available beats failing; fail only with nothing to serve
        if cached.is_empty() {
            if let Some(e) = fetch_error {
                return Err(SyncError::Upstream(e));
            }
        }

        Ok(cached)
    }

    /// Full-history sync over the retention window
    #[allow(clippy::too_many_arguments)]
    pub async fn get_all(
        &self,
        owner: &str,
        direction: SortDirection,
        batch_size: u32,
        max_records: Option<usize>,
        use_cache: bool,
        exclude_deposits_withdrawals: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<ActivityRecord>, SyncError> {
        let gate = self.owner_gate(owner);
        let _guard = gate.lock().await;

        let batch_size = batch_size.clamp(1, MAX_PAGE_LIMIT);
        let cutoff = self.window_cutoff();

        // INIT
        let cached = if use_cache {
            ensure_live(cancel)?;
            self.store.query_all(owner, direction).await?
        } else {
            Vec::new()
        };

        let mut streamed: Vec<ActivityRecord> = Vec::new();
        let mut offset: u32 = 0;
        let mut prior_min: Option<i64> = None;
        let mut finished = false;

        // PROBE: with a warm cache, one page decides whether to re-paginate
        if !cached.is_empty() {
            ensure_live(cancel)?;
            let request = PageRequest::new(owner, batch_size, 0, direction)
                .exclude(exclude_deposits_withdrawals);

            match self.source.fetch_page(&request).await {
                Ok(page) if !page.is_empty() => {
                    let (filtered, truncated) = filter_window(&page, cutoff);
                    if filtered.is_empty() {
                        finished = true;
                    } else {
                        let cached_keys: HashSet<IdentityKey> = cached
                            .iter()
                            .filter(|r| r.timestamp >= cutoff)
                            .map(|r| r.identity_key())
                            .collect();

                        if filtered.iter().all(|r| cached_keys.contains(&r.identity_key())) {
                            log::info!("Cache is current for {}, skipping pagination", owner);
                            finished = true;
                        } else {
                            let unique = dedup_page(filtered);
                            ensure_live(cancel)?;
                            if let Err(e) = self.store.upsert(owner, &unique).await {
                                log::warn!("Probe upsert failed for {}: {}", owner, e);
                            }
                            prior_min = unique.iter().map(|r| r.timestamp).min();
                            streamed.extend(unique);
                            offset = batch_size;

                            if truncated {
                                finished = true;
                            } else if let Some(max) = max_records {
                                if streamed.len() >= max {
                                    streamed.truncate(max);
                                    finished = true;
                                }
                            }
                        }
                    }
                }
                Ok(_) => {
                    // Live feed is empty, nothing beyond the cache
                    finished = true;
                }
                Err(e) => {
                    log::warn!("Probe fetch failed for {}, using cache only: {}", owner, e);
                    finished = true;
                }
            }
        }

        // STREAM
        while !finished {
            ensure_live(cancel)?;
            let request = PageRequest::new(owner, batch_size, offset, direction)
                .exclude(exclude_deposits_withdrawals);

            let page = match self.source.fetch_page(&request).await {
                Ok(page) => page,
                Err(e) => {
                    if streamed.is_empty() && cached.is_empty() {
                        return Err(SyncError::Upstream(e));
                    }
                    log::warn!(
                        "Fetch failed at offset {} for {}, returning accumulated data: {}",
                        offset,
                        owner,
                        e
                    );
                    break;
                }
            };

            if page.is_empty() {
                break;
            }

            let (filtered, truncated) = filter_window(&page, cutoff);
            if filtered.is_empty() {
                break;
            }

            // Order-inversion guard: a page newer than the previous page's
            // minimum means upstream pagination shifted under us
            if let Some(min) = prior_min {
                if filtered[0].timestamp > min {
                    log::warn!(
                        "Order inversion at offset {} for {} ({} > {}), stopping stream",
                        offset,
                        owner,
                        filtered[0].timestamp,
                        min
                    );
                    break;
                }
            }

            let unique = dedup_page(filtered);
            let page_min = unique.iter().map(|r| r.timestamp).min();

            // Incremental upsert so partial progress survives a later failure
            if use_cache && !unique.is_empty() {
                ensure_live(cancel)?;
                if let Err(e) = self.store.upsert(owner, &unique).await {
                    log::warn!("Incremental upsert failed for {}: {}", owner, e);
                }
            }

            streamed.extend(unique);
            if let Some(min) = page_min {
                prior_min = Some(min);
            }

            // Stop conditions, in order
            if truncated {
                break;
            }
            if let Some(max) = max_records {
                if streamed.len() >= max {
                    streamed.truncate(max);
                    break;
                }
            }
            offset += batch_size;
            if offset > self.settings.max_offset {
                log::warn!(
                    "Offset ceiling {} reached for {}, stopping stream",
                    self.settings.max_offset,
                    owner
                );
                break;
            }
        }

        // MERGE
        Ok(merge(streamed, &cached, cutoff, direction, max_records))
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), SyncError> {
    if cancel.is_cancelled() {
        Err(SyncError::Cancelled)
    } else {
        Ok(())
    }
}

/// Combine streamed and cached records
///
/// The streamed set is authoritative for any identity key it contains;
/// cached entries fill in the rest of the retention window.
fn merge(
    streamed: Vec<ActivityRecord>,
    cached: &[ActivityRecord],
    cutoff: i64,
    direction: SortDirection,
    max_records: Option<usize>,
) -> Vec<ActivityRecord> {
    let mut seen: HashSet<IdentityKey> = HashSet::with_capacity(streamed.len() + cached.len());
    let mut merged = Vec::with_capacity(streamed.len() + cached.len());

    for record in streamed {
        if seen.insert(record.identity_key()) {
            merged.push(record);
        }
    }
    for record in cached {
        if record.timestamp >= cutoff && seen.insert(record.identity_key()) {
            merged.push(record.clone());
        }
    }

    merged.sort_by(|a, b| match direction {
        SortDirection::Desc => b.timestamp.cmp(&a.timestamp),
        SortDirection::Asc => a.timestamp.cmp(&b.timestamp),
    });

    if let Some(max) = max_records {
        merged.truncate(max);
    }

    merged
}
