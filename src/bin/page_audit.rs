//! Pagination audit tool
//!
//! Walks the raw upstream feed for one account and reports pagination
//! anomalies: identity keys that reappear across offsets and pages whose
//! newest timestamp exceeds the previous page's minimum. Rows are written
//! to a TSV file for manual inspection.
//!
//! Usage:
//!   cargo run --release --bin page_audit -- 0x45deaaD70997b2998FBb9433B1819178e34B409C

use chrono::Utc;
use polyflow::sync::backoff::BackoffPolicy;
use polyflow::sync::source::{ActivitySource, PageRequest, RemoteActivitySource, MAX_PAGE_LIMIT};
use polyflow::sync::types::{IdentityKey, SortDirection};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;

const MAX_RECORDS: usize = 15_000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let user = std::env::args()
        .nth(1)
        .ok_or("usage: page_audit <user-address>")?;

    let base_url = std::env::var("POLYFLOW_BASE_URL")
        .unwrap_or_else(|_| "https://data-api.polymarket.com".to_string());
    let source = RemoteActivitySource::new(&base_url, BackoffPolicy::default())?;

    println!("Fetching raw pages for {}...", user);

    // (record, offset it came from)
    let mut all = Vec::new();
    let mut offset: u32 = 0;
    let mut prior_min: Option<i64> = None;
    let mut inversions = 0;

    while all.len() < MAX_RECORDS {
        let request = PageRequest::new(&user, MAX_PAGE_LIMIT, offset, SortDirection::Desc);
        let page = source.fetch_page(&request).await?;

        if page.is_empty() {
            println!("offset {}: no more data", offset);
            break;
        }

        if let (Some(min), Some(first)) = (prior_min, page.first()) {
            if first.timestamp > min {
                inversions += 1;
                println!(
                    "⚠️  order inversion at offset {}: page starts at {} but previous page bottomed out at {}",
                    offset, first.timestamp, min
                );
            }
        }
        prior_min = page.iter().map(|r| r.timestamp).min().or(prior_min);

        println!("offset {}: {} records ({} total)", offset, page.len(), all.len() + page.len());
        for record in page {
            all.push((record, offset));
        }

        offset += MAX_PAGE_LIMIT;
        if offset > MAX_RECORDS as u32 {
            println!("offset ceiling reached");
            break;
        }

        // Be polite to the upstream
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }

    if all.is_empty() {
        println!("no data fetched");
        return Ok(());
    }

    // First offset each identity key was seen at
    let mut first_seen: HashMap<IdentityKey, (usize, u32)> = HashMap::new();
    let mut occurrences: HashMap<IdentityKey, usize> = HashMap::new();
    for (index, (record, page_offset)) in all.iter().enumerate() {
        let key = record.identity_key();
        *occurrences.entry(key.clone()).or_insert(0) += 1;
        first_seen.entry(key).or_insert((index, *page_offset));
    }

    let mut tsv = String::from(
        "index\tduplicate\tfirst_seen_offset\tpage_offset\ttransactionHash\tconditionId\ttimestamp\ttype\tside\n",
    );
    let mut duplicates = 0;

    for (index, (record, page_offset)) in all.iter().enumerate() {
        let key = record.identity_key();
        let count = occurrences[&key];
        let (first_index, first_offset) = first_seen[&key];
        let is_duplicate = count > 1 && index != first_index;
        if is_duplicate {
            duplicates += 1;
        }

        writeln!(
            tsv,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            index + 1,
            if is_duplicate { "yes" } else { "no" },
            if is_duplicate { first_offset.to_string() } else { String::new() },
            page_offset,
            record.tx_hash,
            record.condition_id,
            record.timestamp,
            record.payload.get("type").and_then(|v| v.as_str()).unwrap_or(""),
            record.payload.get("side").and_then(|v| v.as_str()).unwrap_or(""),
        )?;
    }

    let output = format!(
        "page_audit_{}_{}.tsv",
        &user[..10.min(user.len())],
        Utc::now().format("%Y%m%d_%H%M%S")
    );
    fs::write(&output, tsv)?;

    println!();
    println!("Wrote {} rows to {}", all.len(), output);
    println!("Unique keys:    {}", occurrences.len());
    println!("Duplicate rows: {}", duplicates);
    println!("Inversions:     {}", inversions);

    Ok(())
}
