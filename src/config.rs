use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default custom field names, matching the stock Rally workspace setup.
pub const DEFAULT_CYCLE_TIME_FIELD: &str = "c_CycleTime";
pub const DEFAULT_LEAD_TIME_FIELD: &str = "c_LeadTime";
pub const DEFAULT_QUEUE_TIME_FIELD: &str = "c_QueueTime";

/// Backtrack window applied when neither the config nor the CLI gives one.
pub const DEFAULT_BACKTRACK_DAYS: u32 = 2;

/// Top-level configuration: one entry per Rally workspace.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub workspaces: BTreeMap<String, WorkspaceConfig>,
}

/// Per-workspace settings. Credentials and filters live here because field
/// names and enabled metrics can differ between workspaces.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceConfig {
    /// Numeric workspace object ID used in Lookback URLs.
    pub id: u64,
    pub user: String,
    pub pass: String,
    /// Artifact types to fill. Defaults to user stories.
    #[serde(default = "default_objects")]
    pub objects: Vec<String>,
    #[serde(default)]
    pub dryrun: bool,
    /// Reprocess everything instead of the backtrack window.
    #[serde(default)]
    pub update_all: bool,
    /// Days of already-accepted items to reprocess. 0 means full refresh.
    #[serde(default)]
    pub backtrack_days: Option<u32>,
    #[serde(default)]
    pub fields: FieldNames,
    /// Which metrics get written back. Empty means compute-and-log only.
    #[serde(default)]
    pub enable: Vec<String>,
    #[serde(default)]
    pub filters: Filters,
}

/// Custom field name overrides for the three metrics.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldNames {
    #[serde(default = "default_cycle_time_field")]
    pub cycle_time: String,
    #[serde(default = "default_lead_time_field")]
    pub lead_time: String,
    #[serde(default = "default_queue_time_field")]
    pub queue_time: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Filters {
    /// Optional `Project/<oid>` ref to restrict the working set.
    pub project: Option<String>,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            cycle_time: DEFAULT_CYCLE_TIME_FIELD.to_string(),
            lead_time: DEFAULT_LEAD_TIME_FIELD.to_string(),
            queue_time: DEFAULT_QUEUE_TIME_FIELD.to_string(),
        }
    }
}

fn default_objects() -> Vec<String> {
    vec!["HierarchicalRequirement".to_string()]
}

fn default_cycle_time_field() -> String {
    DEFAULT_CYCLE_TIME_FIELD.to_string()
}

fn default_lead_time_field() -> String {
    DEFAULT_LEAD_TIME_FIELD.to_string()
}

fn default_queue_time_field() -> String {
    DEFAULT_QUEUE_TIME_FIELD.to_string()
}

impl Config {
    /// Load and validate configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Config = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Default config location (`~/.config/rallytime/rallytime.yml`).
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("cannot determine config directory".into()))?;
        Ok(dir.join("rallytime").join("rallytime.yml"))
    }

    fn validate(&self) -> Result<()> {
        if self.workspaces.is_empty() {
            return Err(Error::Config("no workspaces specified".into()));
        }
        for (name, ws) in &self.workspaces {
            if ws.user.trim().is_empty() || ws.pass.trim().is_empty() {
                return Err(Error::Config(format!(
                    "workspace {name} is missing credentials"
                )));
            }
            for metric in &ws.enable {
                if !matches!(metric.as_str(), "cycle_time" | "lead_time" | "queue_time") {
                    return Err(Error::Config(format!(
                        "workspace {name} enables unknown metric {metric}"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl WorkspaceConfig {
    /// Resolve the effective backtrack window. A CLI override wins; `Some(0)`
    /// or `update_all` means full refresh (`None`).
    pub fn effective_window(&self, override_days: Option<u32>, full: bool) -> Option<u32> {
        if full || self.update_all {
            return None;
        }
        match override_days.or(self.backtrack_days) {
            Some(0) => None,
            Some(days) => Some(days),
            None => Some(DEFAULT_BACKTRACK_DAYS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(yaml: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(yaml.as_bytes()).unwrap();
        f
    }

    const MINIMAL: &str = r#"
workspaces:
  myspace:
    id: 12345
    user: someone@example.com
    pass: hunter2
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let f = write_config(MINIMAL);
        let config = Config::load(f.path()).unwrap();
        let ws = &config.workspaces["myspace"];
        assert_eq!(ws.id, 12345);
        assert_eq!(ws.objects, vec!["HierarchicalRequirement"]);
        assert_eq!(ws.fields.cycle_time, "c_CycleTime");
        assert_eq!(ws.fields.lead_time, "c_LeadTime");
        assert_eq!(ws.fields.queue_time, "c_QueueTime");
        assert!(!ws.dryrun);
        assert!(ws.enable.is_empty());
        assert_eq!(ws.backtrack_days, None);
    }

    #[test]
    fn test_full_config() {
        let f = write_config(
            r#"
workspaces:
  myspace:
    id: 12345
    user: someone@example.com
    pass: hunter2
    objects: [HierarchicalRequirement, Defect]
    dryrun: true
    backtrack_days: 7
    fields:
      cycle_time: c_MyCycle
    enable: [cycle_time, lead_time]
    filters:
      project: Project/678
"#,
        );
        let config = Config::load(f.path()).unwrap();
        let ws = &config.workspaces["myspace"];
        assert_eq!(ws.objects.len(), 2);
        assert!(ws.dryrun);
        assert_eq!(ws.backtrack_days, Some(7));
        assert_eq!(ws.fields.cycle_time, "c_MyCycle");
        // Unspecified fields keep their defaults.
        assert_eq!(ws.fields.lead_time, "c_LeadTime");
        assert_eq!(ws.enable, vec!["cycle_time", "lead_time"]);
        assert_eq!(ws.filters.project.as_deref(), Some("Project/678"));
    }

    #[test]
    fn test_no_workspaces_is_fatal() {
        let f = write_config("workspaces: {}\n");
        assert!(matches!(Config::load(f.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_credentials_is_fatal() {
        let f = write_config(
            r#"
workspaces:
  myspace:
    id: 12345
    user: someone@example.com
    pass: ""
"#,
        );
        assert!(matches!(Config::load(f.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_metric_is_fatal() {
        let f = write_config(
            r#"
workspaces:
  myspace:
    id: 12345
    user: u
    pass: p
    enable: [burn_rate]
"#,
        );
        assert!(matches!(Config::load(f.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_effective_window() {
        let f = write_config(MINIMAL);
        let config = Config::load(f.path()).unwrap();
        let ws = &config.workspaces["myspace"];

        assert_eq!(ws.effective_window(None, false), Some(2));
        assert_eq!(ws.effective_window(Some(10), false), Some(10));
        // Zero means full refresh, as does --full.
        assert_eq!(ws.effective_window(Some(0), false), None);
        assert_eq!(ws.effective_window(Some(10), true), None);

        let mut ws = ws.clone();
        ws.backtrack_days = Some(5);
        assert_eq!(ws.effective_window(None, false), Some(5));
        ws.update_all = true;
        assert_eq!(ws.effective_window(None, false), None);
    }
}
