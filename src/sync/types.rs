//! Core data model for the activity sync engine
//!
//! An `ActivityRecord` is one event belonging to an account. The upstream
//! payload is carried opaquely as `serde_json::Value`; only the fields the
//! engine needs (identity key and timestamp) are lifted out.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Timestamps above this are millisecond-scale and get divided down to seconds.
pub const MILLIS_THRESHOLD: i64 = 10_000_000_000;

/// Normalize a timestamp to whole seconds (milliseconds divided by 1000)
pub fn normalize_timestamp(timestamp: i64) -> i64 {
    if timestamp > MILLIS_THRESHOLD {
        timestamp / 1000
    } else {
        timestamp
    }
}

/// Canonical deduplication key: (transactionHash, conditionId)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub tx_hash: String,
    pub condition_id: String,
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tx_hash, self.condition_id)
    }
}

/// Sort direction accepted by the upstream API and the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl Default for SortDirection {
    fn default() -> Self {
        SortDirection::Desc
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            other => Err(format!("invalid sort direction: {}", other)),
        }
    }
}

/// One activity event, as fetched from upstream or read back from the cache
///
/// `timestamp` is always second-scale after construction. `payload` is the
/// full original record, preserved verbatim for the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    pub tx_hash: String,
    pub condition_id: String,
    pub timestamp: i64,
    pub payload: Value,
}

impl ActivityRecord {
    /// Build a record from one element of the upstream response array
    pub fn from_value(value: &Value) -> Self {
        let tx_hash = value
            .get("transactionHash")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let condition_id = value
            .get("conditionId")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let timestamp = normalize_timestamp(
            value.get("timestamp").and_then(|v| v.as_i64()).unwrap_or(0),
        );

        Self {
            tx_hash,
            condition_id,
            timestamp,
            payload: value.clone(),
        }
    }

    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            tx_hash: self.tx_hash.clone(),
            condition_id: self.condition_id.clone(),
        }
    }
}

/// Filter a time-ordered page down to the retention window
///
/// Scans in order and stops at the first record older than `cutoff`; the
/// remainder of the page is discarded. Returns the retained prefix and
/// whether anything was cut off (which marks the page as the final page of
/// a scan).
pub fn filter_window(records: &[ActivityRecord], cutoff: i64) -> (Vec<ActivityRecord>, bool) {
    let mut kept = Vec::with_capacity(records.len());
    for record in records {
        if record.timestamp >= cutoff {
            kept.push(record.clone());
        } else {
            // Pages are time-ordered, everything after this is older still
            return (kept, true);
        }
    }
    (kept, false)
}

/// Drop records whose identity key already appeared earlier in the same page
pub fn dedup_page(records: Vec<ActivityRecord>) -> Vec<ActivityRecord> {
    let mut seen: HashSet<IdentityKey> = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(record.identity_key()))
        .collect()
}
