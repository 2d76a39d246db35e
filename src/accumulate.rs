use chrono::{DateTime, Duration, Utc};

use crate::toggles::Toggle;

/// Inputs for the degraded estimate used when an item carries no toggles at
/// all (typically accepted straight from the backlog, or history predating
/// Lookback retention).
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackDates {
    pub in_progress_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Total wall-clock time the item spent in the active state.
///
/// Completed (enter, exit) pairs contribute exactly `exit - enter`. A
/// trailing unmatched enter means the item is mid-interval: for an
/// unresolved item the open tail counts up to `now`; for a resolved item it
/// is a data anomaly and ignored. The toggle sequence may be built from a
/// partial history scan; that is the caller's data-quality condition, not a
/// fault here.
pub fn active_duration(
    toggles: &[Toggle],
    is_resolved: bool,
    fallback: FallbackDates,
    now: DateTime<Utc>,
) -> Duration {
    if toggles.is_empty() {
        return empty_history_estimate(is_resolved, fallback);
    }

    let mut total = Duration::zero();
    let mut pairs = toggles.chunks_exact(2);
    for pair in &mut pairs {
        total += pair[1].at - pair[0].at;
    }
    if let [open] = pairs.remainder() {
        if is_resolved {
            log::debug!(
                "ignoring unmatched active interval opened at {} on a resolved item",
                open.at
            );
        } else {
            total += now - open.at;
        }
    }
    total
}

/// A resolved item with no recorded active interval is defined to have spent
/// at least one day active when we know when work started; without an
/// in-progress date there is nothing to estimate from.
fn empty_history_estimate(is_resolved: bool, fallback: FallbackDates) -> Duration {
    if !is_resolved {
        return Duration::zero();
    }
    match (fallback.in_progress_at, fallback.resolved_at) {
        (Some(started), Some(resolved)) => (resolved - started).max(Duration::days(1)),
        (Some(_), None) => Duration::days(1),
        _ => Duration::zero(),
    }
}
