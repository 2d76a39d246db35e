use std::collections::BTreeMap;

use crate::config::FieldNames;
use crate::metrics::TimeMetrics;

/// Compute the write-back change-set: enabled metrics whose computed value
/// differs from what the tracker currently stores. Returns only the delta;
/// the caller performs the write (or logs it under dry-run). An unset stored
/// field never equals a computed value, so first runs write every enabled
/// metric.
pub fn changed_fields(
    metrics: &TimeMetrics,
    fields: &FieldNames,
    enabled: &[String],
    stored: impl Fn(&str) -> Option<i64>,
) -> BTreeMap<String, i64> {
    let mut update = BTreeMap::new();
    let candidates = [
        ("cycle_time", &fields.cycle_time, metrics.cycle_time),
        ("lead_time", &fields.lead_time, metrics.lead_time),
        ("queue_time", &fields.queue_time, metrics.queue_time),
    ];
    for (metric, field_name, computed) in candidates {
        if !enabled.iter().any(|m| m == metric) {
            continue;
        }
        if stored(field_name) != Some(computed) {
            update.insert(field_name.clone(), computed);
        }
    }
    update
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_enabled() -> Vec<String> {
        vec![
            "cycle_time".to_string(),
            "lead_time".to_string(),
            "queue_time".to_string(),
        ]
    }

    fn metrics() -> TimeMetrics {
        TimeMetrics {
            cycle_time: 5,
            lead_time: 9,
            queue_time: 2,
        }
    }

    #[test]
    fn test_all_differ() {
        let update = changed_fields(&metrics(), &FieldNames::default(), &all_enabled(), |_| None);
        assert_eq!(update.len(), 3);
        assert_eq!(update["c_CycleTime"], 5);
        assert_eq!(update["c_LeadTime"], 9);
        assert_eq!(update["c_QueueTime"], 2);
    }

    #[test]
    fn test_matching_values_emit_nothing() {
        let update = changed_fields(
            &metrics(),
            &FieldNames::default(),
            &all_enabled(),
            |field| match field {
                "c_CycleTime" => Some(5),
                "c_LeadTime" => Some(9),
                "c_QueueTime" => Some(2),
                _ => None,
            },
        );
        assert!(update.is_empty());
    }

    #[test]
    fn test_only_changed_subset() {
        let update = changed_fields(
            &metrics(),
            &FieldNames::default(),
            &all_enabled(),
            |field| match field {
                "c_CycleTime" => Some(5),
                "c_LeadTime" => Some(3),
                _ => None,
            },
        );
        assert_eq!(update.len(), 2);
        assert!(!update.contains_key("c_CycleTime"));
        assert_eq!(update["c_LeadTime"], 9);
    }

    #[test]
    fn test_disabled_metrics_never_emitted() {
        let enabled = vec!["cycle_time".to_string()];
        let update = changed_fields(&metrics(), &FieldNames::default(), &enabled, |_| None);
        assert_eq!(update.len(), 1);
        assert!(update.contains_key("c_CycleTime"));

        let update = changed_fields(&metrics(), &FieldNames::default(), &[], |_| None);
        assert!(update.is_empty());
    }

    #[test]
    fn test_custom_field_names() {
        let fields = FieldNames {
            cycle_time: "c_Cycle".to_string(),
            lead_time: "c_Lead".to_string(),
            queue_time: "c_Queue".to_string(),
        };
        let enabled = vec!["queue_time".to_string()];
        let update = changed_fields(&metrics(), &fields, &enabled, |_| Some(99));
        assert_eq!(update.len(), 1);
        assert_eq!(update["c_Queue"], 2);
    }

    #[test]
    fn test_second_run_is_empty() {
        // Idempotence: apply the first change-set as stored state, rerun.
        let first = changed_fields(&metrics(), &FieldNames::default(), &all_enabled(), |_| None);
        let second = changed_fields(
            &metrics(),
            &FieldNames::default(),
            &all_enabled(),
            |field| first.get(field).copied(),
        );
        assert!(second.is_empty());
    }
}
