pub mod accumulate;
pub mod config;
pub mod date_util;
pub mod error;
pub mod fill;
pub mod lookback;
pub mod metrics;
pub mod reconcile;
pub mod toggles;
pub mod wsapi;

pub use accumulate::{active_duration, FallbackDates};
pub use config::{Config, FieldNames, WorkspaceConfig};
pub use error::{Error, Result};
pub use fill::{FillOptions, FillProgress, FillReport, FillStatus, NoopProgress};
pub use lookback::{LookbackClient, SnapshotHistory};
pub use metrics::{derive_metrics, ReferenceDates, TimeMetrics};
pub use reconcile::changed_fields;
pub use toggles::{extract_toggles, Snapshot, Toggle, ToggleKind};
pub use wsapi::{Artifact, ArtifactSummary, StoreClient};
