//! Optional fetch trace sink
//!
//! The first page of a pagination run can be dumped for manual inspection.
//! Modeled as an injectable sink so it is never a required behavior of the
//! engine; the default is a no-op.

use crate::sync::source::PageRequest;
use chrono::Utc;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

/// Observer for raw upstream responses
pub trait FetchTrace: Send + Sync {
    /// Called with the raw response body of the first page (offset 0) of a run
    fn first_page(&self, request: &PageRequest, raw: &Value);
}

/// Default sink: does nothing
pub struct NoopTrace;

impl FetchTrace for NoopTrace {
    fn first_page(&self, _request: &PageRequest, _raw: &Value) {}
}

/// Dumps the first page to a timestamped JSON file for debugging
///
/// Enabled via `TRACE_DUMP_DIR`. Dump failures are logged and ignored.
pub struct FileDumpTrace {
    dir: PathBuf,
}

impl FileDumpTrace {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FetchTrace for FileDumpTrace {
    fn first_page(&self, request: &PageRequest, raw: &Value) {
        let name = format!("api_debug_{}.json", Utc::now().format("%Y%m%d_%H%M%S"));
        let path = self.dir.join(name);

        let dump = serde_json::json!({
            "request": {
                "user": request.owner,
                "limit": request.limit,
                "offset": request.offset,
                "sortBy": request.sort_by,
                "sortDirection": request.sort_direction.as_str(),
                "excludeDepositsWithdrawals": request.exclude_deposits_withdrawals,
            },
            "response": raw,
        });

        let result = serde_json::to_string_pretty(&dump)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).map_err(|e| e.to_string())?;
                }
                fs::write(&path, json).map_err(|e| e.to_string())
            });

        match result {
            Ok(()) => log::info!("Saved first-page dump to {}", path.display()),
            Err(e) => log::warn!("Failed to save first-page dump: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::SortDirection;

    #[test]
    fn test_file_dump_writes_request_and_response() {
        let dir = tempfile::tempdir().unwrap();
        let trace = FileDumpTrace::new(dir.path());

        let request = PageRequest {
            owner: "0xabc".to_string(),
            limit: 100,
            offset: 0,
            sort_by: "TIMESTAMP".to_string(),
            sort_direction: SortDirection::Desc,
            exclude_deposits_withdrawals: true,
        };
        let raw = serde_json::json!([{"transactionHash": "0x1", "timestamp": 1700000000}]);

        trace.first_page(&request, &raw);

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let body = fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        let dump: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(dump["request"]["user"], "0xabc");
        assert_eq!(dump["response"][0]["transactionHash"], "0x1");
    }
}
