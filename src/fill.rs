use chrono::{Duration, Utc};
use serde::Serialize;

use crate::accumulate::{active_duration, FallbackDates};
use crate::config::{Config, WorkspaceConfig};
use crate::error::{Error, Result};
use crate::lookback::LookbackClient;
use crate::metrics::{derive_metrics, ReferenceDates, TimeMetrics};
use crate::reconcile::changed_fields;
use crate::toggles::extract_toggles;
use crate::wsapi::{accepted_since_query, ArtifactSummary, StoreClient};

/// Standard Rally schedule-state labels.
const ACTIVE_STATE: &str = "In-Progress";
const ACCEPTED_STATE: &str = "Accepted";

pub const DEFAULT_BASE_URL: &str = "https://rally1.rallydev.com";

/// Options controlling a fill run, resolved against each workspace's config.
#[derive(Debug, Clone, Default)]
pub struct FillOptions {
    /// Backtrack window override in days. 0 forces a full refresh.
    pub days: Option<u32>,
    /// Compute and log change-sets without committing any write.
    pub dry_run: bool,
    /// Reprocess every item regardless of the backtrack window.
    pub full: bool,
}

/// Report for one (workspace, object type) batch.
#[derive(Debug, Clone, Serialize)]
pub struct FillReport {
    pub workspace: String,
    pub object_type: String,
    pub status: FillStatus,
    pub items_processed: u64,
    pub items_updated: u64,
    pub items_failed: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FillStatus {
    Success,
    PartialFailure,
    Failed,
}

impl FillReport {
    /// Derive the status from counts: any failure alongside progress is a
    /// partial failure; failures with nothing processed is a failed batch.
    pub fn from_counts(
        workspace: String,
        object_type: String,
        items_processed: u64,
        items_updated: u64,
        items_failed: u64,
    ) -> Self {
        let status = if items_failed == 0 {
            FillStatus::Success
        } else if items_processed > 0 {
            FillStatus::PartialFailure
        } else {
            FillStatus::Failed
        };
        let error = if items_failed > 0 {
            Some(format!("{items_failed} items failed"))
        } else {
            None
        };
        Self {
            workspace,
            object_type,
            status,
            items_processed,
            items_updated,
            items_failed,
            error,
        }
    }
}

/// Per-item progress hooks for console reporting. All methods default to
/// no-ops so callers implement only what they display.
pub trait FillProgress {
    fn on_item_start(&self, _formatted_id: &str, _index: usize, _total: usize) {}
    fn on_item_metrics(&self, _formatted_id: &str, _metrics: &TimeMetrics) {}
    fn on_item_update(&self, _formatted_id: &str, _fields: &str, _dry_run: bool) {}
    fn on_item_no_update(&self, _formatted_id: &str) {}
    fn on_item_error(&self, _formatted_id: &str, _error: &Error) {}
    fn on_type_complete(&self, _report: &FillReport) {}
}

/// Progress reporter that discards everything (tests, embedding).
pub struct NoopProgress;

impl FillProgress for NoopProgress {}

/// Run the fill across every configured workspace and object type.
/// Workspace-level client construction or listing failures abort the run
/// (batch-level fault); item-level faults are absorbed into the reports.
pub async fn run(
    config: &Config,
    options: &FillOptions,
    progress: &dyn FillProgress,
) -> Result<Vec<FillReport>> {
    log::info!("fill run started at {}", Utc::now().to_rfc3339());

    let mut reports = Vec::new();
    for (name, ws) in &config.workspaces {
        let lookback = LookbackClient::new(DEFAULT_BASE_URL, ws.id, &ws.user, &ws.pass);
        let store = StoreClient::new(
            DEFAULT_BASE_URL,
            &format!("/workspace/{}", ws.id),
            &ws.user,
            &ws.pass,
        );

        for object_type in &ws.objects {
            let report =
                fill_object_type(&lookback, &store, name, ws, object_type, options, progress)
                    .await?;
            progress.on_type_complete(&report);
            reports.push(report);
        }
    }

    log::info!("fill run completed at {}", Utc::now().to_rfc3339());
    Ok(reports)
}

/// Fill one object type in one workspace: list the working set, then resolve
/// each item fully (read, history, metrics, write-back) before the next.
///
/// One item's failure never aborts the batch; the listing failing before any
/// item is processed does.
#[allow(clippy::too_many_arguments)]
pub async fn fill_object_type(
    lookback: &LookbackClient,
    store: &StoreClient,
    workspace: &str,
    ws: &WorkspaceConfig,
    object_type: &str,
    options: &FillOptions,
    progress: &dyn FillProgress,
) -> Result<FillReport> {
    let window = ws.effective_window(options.days, options.full);
    let query = window.map(|days| accepted_since_query(Utc::now() - Duration::days(days as i64)));
    match &query {
        Some(q) => log::debug!("{workspace}/{object_type}: query {q}"),
        None => log::debug!("{workspace}/{object_type}: full refresh"),
    }

    // Listing failure here is batch-level: nothing processed yet.
    let summaries = store
        .find(object_type, query.as_deref(), ws.filters.project.as_deref())
        .await?;

    let total = summaries.len();
    let mut items_processed = 0u64;
    let mut items_updated = 0u64;
    let mut items_failed = 0u64;

    for (index, summary) in summaries.iter().enumerate() {
        progress.on_item_start(&summary.formatted_id, index, total);
        match process_item(lookback, store, ws, object_type, summary, options, progress).await {
            Ok(updated) => {
                items_processed += 1;
                if updated {
                    items_updated += 1;
                }
            }
            Err(e) => {
                log::error!("failed to process {}: {e}", summary.formatted_id);
                progress.on_item_error(&summary.formatted_id, &e);
                items_failed += 1;
            }
        }
    }

    Ok(FillReport::from_counts(
        workspace.to_string(),
        object_type.to_string(),
        items_processed,
        items_updated,
        items_failed,
    ))
}

/// Resolve a single item end to end. Returns whether a write was committed.
async fn process_item(
    lookback: &LookbackClient,
    store: &StoreClient,
    ws: &WorkspaceConfig,
    object_type: &str,
    summary: &ArtifactSummary,
    options: &FillOptions,
    progress: &dyn FillProgress,
) -> Result<bool> {
    let artifact = store.read(object_type, summary.object_id).await?;
    let formatted_id = artifact.formatted_id().to_string();

    let history = lookback.fetch_snapshots(summary.object_id).await?;
    if !history.complete {
        log::warn!(
            "{formatted_id}: snapshot history incomplete ({} of {} records); metrics may undercount",
            history.snapshots.len(),
            history.total
        );
    }

    let dates = ReferenceDates {
        created_at: artifact.date("CreationDate"),
        defined_at: lookback.defined_at(summary.object_id).await?,
        accepted_at: artifact.date("AcceptedDate"),
        in_progress_at: artifact.date("InProgressDate"),
    };
    let is_resolved = artifact.schedule_state() == Some(ACCEPTED_STATE);

    let now = Utc::now();
    let toggles = extract_toggles(&history.snapshots, ACTIVE_STATE);
    let active = active_duration(
        &toggles,
        is_resolved,
        FallbackDates {
            in_progress_at: dates.in_progress_at,
            resolved_at: dates.accepted_at,
        },
        now,
    );
    let metrics = derive_metrics(&dates, active, is_resolved, now);
    progress.on_item_metrics(&formatted_id, &metrics);

    let update = changed_fields(&metrics, &ws.fields, &ws.enable, |field| {
        artifact.integer(field)
    });
    let dry_run = options.dry_run || ws.dryrun;
    match write_decision(update.is_empty(), dry_run) {
        WriteDecision::Skip => {
            progress.on_item_no_update(&formatted_id);
            Ok(false)
        }
        WriteDecision::Report => {
            progress.on_item_update(&formatted_id, &render_update(&update), true);
            Ok(false)
        }
        WriteDecision::Commit => {
            progress.on_item_update(&formatted_id, &render_update(&update), false);
            store.update(object_type, summary.object_id, &update).await?;
            Ok(true)
        }
    }
}

/// What to do with a computed change-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteDecision {
    /// Nothing changed; no write and no dry-run report.
    Skip,
    /// Report the change-set but commit nothing.
    Report,
    Commit,
}

/// The commit gate: an empty change-set is never written, and dry-run mode
/// never commits no matter what the change-set contains.
fn write_decision(update_is_empty: bool, dry_run: bool) -> WriteDecision {
    if update_is_empty {
        WriteDecision::Skip
    } else if dry_run {
        WriteDecision::Report
    } else {
        WriteDecision::Commit
    }
}

fn render_update(update: &std::collections::BTreeMap<String, i64>) -> String {
    update
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}
