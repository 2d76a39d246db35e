use chrono::{DateTime, Utc};

/// One Lookback observation of an item's schedule state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub state_label: String,
    pub valid_from: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleKind {
    Enter,
    Exit,
}

/// The instant an item crossed the active-state boundary. A toggle sequence
/// strictly alternates enter/exit and always starts with an enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toggle {
    pub kind: ToggleKind,
    pub at: DateTime<Utc>,
}

impl Toggle {
    pub fn enter(at: DateTime<Utc>) -> Self {
        Self {
            kind: ToggleKind::Enter,
            at,
        }
    }

    pub fn exit(at: DateTime<Utc>) -> Self {
        Self {
            kind: ToggleKind::Exit,
            at,
        }
    }
}

/// Condense an ordered snapshot sequence into active-state boundary
/// crossings. Consecutive snapshots on the same side of the boundary (for
/// example sub-state churn while active) produce no toggle, so repeated
/// active snapshots collapse into a single interval. Output order equals
/// input order; never re-sorts.
pub fn extract_toggles(snapshots: &[Snapshot], active_label: &str) -> Vec<Toggle> {
    let mut toggles = Vec::new();
    let mut currently_active = false;
    for snapshot in snapshots {
        let is_active = snapshot.state_label == active_label;
        if is_active && !currently_active {
            toggles.push(Toggle::enter(snapshot.valid_from));
            currently_active = true;
        } else if !is_active && currently_active {
            toggles.push(Toggle::exit(snapshot.valid_from));
            currently_active = false;
        }
    }
    toggles
}
