use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::date_util::{duration_days, whole_days_between};

/// Reference dates for one work item. Each is optional: a predicate the item
/// never satisfied, or a field that failed lenient parsing, simply leaves the
/// date absent and degrades the affected metric to zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceDates {
    pub created_at: Option<DateTime<Utc>>,
    /// First time the item reached the "ready for work" state.
    pub defined_at: Option<DateTime<Utc>>,
    /// Terminal-state entry time.
    pub accepted_at: Option<DateTime<Utc>>,
    /// First active-state entry, as cached on the work item itself.
    pub in_progress_at: Option<DateTime<Utc>>,
}

/// The computed triple, in whole days. Overwritten on every run; no history
/// of past values is kept beyond what the tracker stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeMetrics {
    pub cycle_time: i64,
    pub lead_time: i64,
    pub queue_time: i64,
}

/// Derive cycle/lead/queue time from the accumulated active duration and the
/// item's reference dates.
///
/// Lead and queue time measure to `now` while the item is open and to
/// `accepted_at` once resolved. Lead time is measured from `created_at`
/// (the earlier revision measured from the estimation date; that formula is
/// superseded and intentionally not implemented here).
pub fn derive_metrics(
    dates: &ReferenceDates,
    active: Duration,
    is_resolved: bool,
    now: DateTime<Utc>,
) -> TimeMetrics {
    let cycle_time = duration_days(active);

    if is_resolved {
        let lead_time = match (dates.created_at, dates.accepted_at) {
            (Some(created), Some(accepted)) => days_or_zero(created, accepted),
            _ => 0,
        };
        let queue_time = match dates.defined_at {
            Some(defined) => match (dates.in_progress_at, dates.accepted_at) {
                (Some(in_progress), _) => days_or_zero(defined, in_progress),
                (None, Some(accepted)) => days_or_zero(defined, accepted),
                (None, None) => 0,
            },
            None => 0,
        };
        TimeMetrics {
            cycle_time,
            lead_time,
            queue_time,
        }
    } else {
        let lead_time = dates
            .created_at
            .map(|created| days_or_zero(created, now))
            .unwrap_or(0);
        let queue_time = dates
            .defined_at
            .map(|defined| days_or_zero(defined, now))
            .unwrap_or(0);
        TimeMetrics {
            cycle_time,
            lead_time,
            queue_time,
        }
    }
}

fn days_or_zero(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    whole_days_between(from, to).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulate::{active_duration, FallbackDates};
    use crate::toggles::Toggle;

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    fn day(d: &str) -> DateTime<Utc> {
        at(&format!("{d}T00:00:00Z"))
    }

    // Shared scenario: created 01-01, defined 01-03, active 01-05.
    fn scenario_dates(accepted: Option<&str>) -> ReferenceDates {
        ReferenceDates {
            created_at: Some(day("2024-01-01")),
            defined_at: Some(day("2024-01-03")),
            accepted_at: accepted.map(day),
            in_progress_at: Some(day("2024-01-05")),
        }
    }

    #[test]
    fn test_resolved_scenario() {
        // Single enter/exit pair 01-05 → 01-10, accepted 01-10.
        let toggles = vec![
            Toggle::enter(day("2024-01-05")),
            Toggle::exit(day("2024-01-10")),
        ];
        let active = active_duration(&toggles, true, FallbackDates::default(), day("2024-01-10"));
        let m = derive_metrics(
            &scenario_dates(Some("2024-01-10")),
            active,
            true,
            day("2024-01-10"),
        );
        assert_eq!(
            m,
            TimeMetrics {
                cycle_time: 5,
                lead_time: 9,
                queue_time: 2,
            }
        );
    }

    #[test]
    fn test_unresolved_scenario_still_active() {
        // Same item, never accepted, observed 01-15 with the interval open.
        let now = day("2024-01-15");
        let toggles = vec![Toggle::enter(day("2024-01-05"))];
        let active = active_duration(&toggles, false, FallbackDates::default(), now);
        let m = derive_metrics(&scenario_dates(None), active, false, now);
        assert_eq!(
            m,
            TimeMetrics {
                cycle_time: 10,
                lead_time: 14,
                queue_time: 12,
            }
        );
    }

    #[test]
    fn test_unresolved_never_active() {
        let now = day("2024-01-15");
        let active = active_duration(&[], false, FallbackDates::default(), now);
        let m = derive_metrics(&scenario_dates(None), active, false, now);
        assert_eq!(m.cycle_time, 0);
        assert_eq!(m.queue_time, 12);

        let mut dates = scenario_dates(None);
        dates.defined_at = None;
        let m = derive_metrics(&dates, active, false, now);
        assert_eq!(m.queue_time, 0);
    }

    #[test]
    fn test_resolved_queue_falls_back_to_accepted() {
        let mut dates = scenario_dates(Some("2024-01-10"));
        dates.in_progress_at = None;
        let m = derive_metrics(&dates, Duration::days(1), true, day("2024-01-10"));
        // defined 01-03 → accepted 01-10.
        assert_eq!(m.queue_time, 7);
    }

    #[test]
    fn test_missing_dates_degrade_to_zero() {
        let m = derive_metrics(
            &ReferenceDates::default(),
            Duration::days(3),
            true,
            day("2024-01-10"),
        );
        assert_eq!(
            m,
            TimeMetrics {
                cycle_time: 3,
                lead_time: 0,
                queue_time: 0,
            }
        );
    }

    #[test]
    fn test_deriver_is_idempotent() {
        let dates = scenario_dates(Some("2024-01-10"));
        let now = day("2024-01-10");
        let first = derive_metrics(&dates, Duration::days(5), true, now);
        let second = derive_metrics(&dates, Duration::days(5), true, now);
        assert_eq!(first, second);
    }
}
