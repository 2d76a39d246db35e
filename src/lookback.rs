use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::date_util::parse_date;
use crate::error::{Error, Result};
use crate::toggles::Snapshot;

/// Fixed pause between page requests, respecting the Lookback service's rate
/// limits. A scheduling policy only; correctness never depends on it.
const PAGE_DELAY_MS: u64 = 1000;

const DEFAULT_PAGE_SIZE: u64 = 100;

/// Snapshot history for one work item. `complete` is false when pagination
/// stopped early; the accumulated metrics are then a data-quality risk the
/// caller must surface, not a computation fault.
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    pub snapshots: Vec<Snapshot>,
    pub complete: bool,
    pub total: u64,
}

/// Wire envelope of a Lookback query response.
#[derive(Debug, Deserialize)]
struct LookbackPage {
    #[serde(rename = "TotalResultCount")]
    total_result_count: u64,
    #[serde(rename = "Results", default)]
    results: Vec<serde_json::Value>,
    #[serde(rename = "Errors", default)]
    errors: Vec<String>,
}

/// Client for the Lookback snapshot-history service.
pub struct LookbackClient {
    http: reqwest::Client,
    query_url: String,
    user: String,
    pass: String,
    page_size: u64,
}

impl LookbackClient {
    pub fn new(base_url: &str, workspace_id: u64, user: &str, pass: &str) -> Self {
        let query_url = format!(
            "{}/analytics/v2.0/service/rally/workspace/{}/artifact/snapshot/query.js",
            base_url.trim_end_matches('/'),
            workspace_id
        );
        Self {
            http: reqwest::Client::new(),
            query_url,
            user: user.to_string(),
            pass: pass.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Fetch the full time-ordered snapshot history for one item, page by
    /// page until the server-reported total is reached.
    ///
    /// A failure after the first page returns whatever was fetched with
    /// `complete = false` rather than erroring; metric computation proceeds
    /// on partial history and the caller reports the condition.
    pub async fn fetch_snapshots(&self, object_id: u64) -> Result<SnapshotHistory> {
        let mut snapshots = Vec::new();
        let mut start = 0u64;
        let mut total = 0u64;

        loop {
            let body = json!({
                "find": { "ObjectID": object_id },
                "sort": { "_ValidFrom": 1 },
                "fields": ["ScheduleState", "_ValidFrom"],
                "hydrate": ["ScheduleState"],
                "pagesize": self.page_size,
                "start": start,
            });

            let page = match self.post_query(&body).await {
                Ok(page) => page,
                Err(e) if start > 0 => {
                    log::warn!(
                        "snapshot scan for {object_id} stopped at offset {start}: {e}"
                    );
                    return Ok(SnapshotHistory {
                        snapshots,
                        complete: false,
                        total,
                    });
                }
                Err(e) => return Err(e),
            };

            total = page.total_result_count;
            let returned = page.results.len() as u64;
            for record in &page.results {
                if let Some(snapshot) = parse_snapshot(record) {
                    snapshots.push(snapshot);
                }
            }

            match next_start(start, returned, total) {
                Some(next) => start = next,
                None => break,
            }
            tokio::time::sleep(std::time::Duration::from_millis(PAGE_DELAY_MS)).await;
        }

        Ok(SnapshotHistory {
            snapshots,
            complete: true,
            total,
        })
    }

    /// First time the item reached the Defined state, if it ever did.
    /// A single-record query; parse failures and empty results both yield
    /// `None` so the queue-time metric degrades instead of failing the item.
    pub async fn defined_at(&self, object_id: u64) -> Result<Option<DateTime<Utc>>> {
        let body = json!({
            "find": { "ObjectID": object_id, "ScheduleState": "Defined" },
            "sort": { "_ValidFrom": 1 },
            "fields": ["_ValidFrom"],
            "hydrate": ["ScheduleState"],
            "pagesize": 1,
        });
        let page = self.post_query(&body).await?;
        Ok(page
            .results
            .first()
            .and_then(|r| parse_date(r.get("_ValidFrom").and_then(|v| v.as_str()))))
    }

    async fn post_query(&self, body: &serde_json::Value) -> Result<LookbackPage> {
        let response = self
            .http
            .post(&self.query_url)
            .basic_auth(&self.user, Some(&self.pass))
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        let page: LookbackPage = response.json().await?;
        if !page.errors.is_empty() {
            return Err(Error::Lookback(page.errors.join("; ")));
        }
        Ok(page)
    }
}

/// Offset of the next page, or `None` when the cumulative count covered the
/// server-reported total. An empty page also terminates, whatever the total
/// claims, so a lying server cannot loop us forever.
fn next_start(start: u64, returned: u64, total: u64) -> Option<u64> {
    if returned == 0 {
        return None;
    }
    let next = start + returned;
    if next >= total {
        None
    } else {
        Some(next)
    }
}

fn parse_snapshot(record: &serde_json::Value) -> Option<Snapshot> {
    let valid_from = parse_date(record.get("_ValidFrom").and_then(|v| v.as_str()))?;
    let state_label = record.get("ScheduleState")?.as_str()?.to_string();
    Some(Snapshot {
        state_label,
        valid_from,
    })
}
