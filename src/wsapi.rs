use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::date_util::parse_date;
use crate::error::{Error, Result};

const DEFAULT_PAGE_SIZE: u64 = 20;

/// Client for the WSAPI work-item store: find / read / update.
pub struct StoreClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    pass: String,
    workspace: String,
    page_size: u64,
}

/// Summary row from a `find` query. Detail fields come from `read`.
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactSummary {
    #[serde(rename = "ObjectID")]
    pub object_id: u64,
    #[serde(rename = "FormattedID", default)]
    pub formatted_id: String,
}

/// Full artifact as returned by `read`. A thin wrapper over the raw JSON
/// object so configurable custom fields can be read without a schema.
#[derive(Debug, Clone)]
pub struct Artifact(serde_json::Value);

impl Artifact {
    pub fn formatted_id(&self) -> &str {
        self.0
            .get("FormattedID")
            .and_then(|v| v.as_str())
            .unwrap_or("?")
    }

    pub fn schedule_state(&self) -> Option<&str> {
        self.0.get("ScheduleState").and_then(|v| v.as_str())
    }

    /// Lenient date accessor; malformed fields read as absent.
    pub fn date(&self, field: &str) -> Option<DateTime<Utc>> {
        parse_date(self.0.get(field).and_then(|v| v.as_str()))
    }

    /// Stored metric values. Rally numeric custom fields come back as JSON
    /// numbers (sometimes floats), null when never set.
    pub fn integer(&self, field: &str) -> Option<i64> {
        let value = self.0.get(field)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f.trunc() as i64))
    }

    #[cfg(test)]
    pub fn from_value(value: serde_json::Value) -> Self {
        Self(value)
    }
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(rename = "TotalResultCount")]
    total_result_count: u64,
    #[serde(rename = "Results", default)]
    results: Vec<serde_json::Value>,
    #[serde(rename = "Errors", default)]
    errors: Vec<String>,
}

impl StoreClient {
    /// `workspace` is the workspace ref path, e.g. `/workspace/12345`.
    pub fn new(base_url: &str, workspace: &str, user: &str, pass: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("{}/slm/webservice/v2.0", base_url.trim_end_matches('/')),
            user: user.to_string(),
            pass: pass.to_string(),
            workspace: workspace.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Find artifacts of one type, optionally restricted by a query
    /// expression and a project ref. Pages through the whole result set
    /// (WSAPI offsets are 1-based).
    pub async fn find(
        &self,
        object_type: &str,
        query: Option<&str>,
        project: Option<&str>,
    ) -> Result<Vec<ArtifactSummary>> {
        let url = format!("{}/{}", self.base_url, object_type.to_lowercase());
        let mut summaries = Vec::new();
        let mut start = 1u64;

        loop {
            let page_size = self.page_size.to_string();
            let start_str = start.to_string();
            let mut params: Vec<(&str, &str)> = vec![
                ("workspace", &self.workspace),
                ("fetch", "ObjectID,FormattedID"),
                ("pagesize", &page_size),
                ("start", &start_str),
            ];
            if let Some(q) = query {
                params.push(("query", q));
            }
            if let Some(p) = project {
                params.push(("project", p));
            }

            let response = self
                .http
                .get(&url)
                .basic_auth(&self.user, Some(&self.pass))
                .query(&params)
                .send()
                .await?
                .error_for_status()?;
            let envelope: serde_json::Value = response.json().await?;
            let result: QueryResult = serde_json::from_value(
                envelope
                    .get("QueryResult")
                    .cloned()
                    .ok_or_else(|| Error::Store("response missing QueryResult".into()))?,
            )?;
            if !result.errors.is_empty() {
                return Err(Error::Store(result.errors.join("; ")));
            }

            let returned = result.results.len() as u64;
            for row in result.results {
                if let Ok(summary) = serde_json::from_value::<ArtifactSummary>(row) {
                    summaries.push(summary);
                }
            }

            if returned == 0 || start + returned > result.total_result_count {
                break;
            }
            start += returned;
        }

        Ok(summaries)
    }

    /// Read one artifact in full.
    pub async fn read(&self, object_type: &str, object_id: u64) -> Result<Artifact> {
        let url = format!(
            "{}/{}/{}",
            self.base_url,
            object_type.to_lowercase(),
            object_id
        );
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.user, Some(&self.pass))
            .query(&[("workspace", self.workspace.as_str())])
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("{object_type}/{object_id}")));
        }
        let envelope: serde_json::Value = response.error_for_status()?.json().await?;
        // The object is keyed by its element name, e.g. "HierarchicalRequirement".
        let object = envelope
            .get(object_type)
            .or_else(|| {
                envelope
                    .as_object()
                    .and_then(|map| map.values().find(|v| v.is_object()))
            })
            .cloned()
            .ok_or_else(|| Error::Store(format!("empty read response for {object_id}")))?;
        Ok(Artifact(object))
    }

    /// Write the change-set back as a single batched field update.
    pub async fn update(
        &self,
        object_type: &str,
        object_id: u64,
        fields: &BTreeMap<String, i64>,
    ) -> Result<()> {
        let url = format!(
            "{}/{}/{}",
            self.base_url,
            object_type.to_lowercase(),
            object_id
        );
        // The payload is keyed by the element name, mirroring read responses.
        let mut body = serde_json::Map::new();
        body.insert(object_type.to_string(), serde_json::to_value(fields)?);
        let body = serde_json::Value::Object(body);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.user, Some(&self.pass))
            .query(&[("workspace", self.workspace.as_str())])
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let envelope: serde_json::Value = response.json().await?;
        if let Some(errors) = envelope
            .pointer("/OperationResult/Errors")
            .and_then(|v| v.as_array())
        {
            if !errors.is_empty() {
                let messages: Vec<String> = errors
                    .iter()
                    .filter_map(|e| e.as_str().map(ToString::to_string))
                    .collect();
                return Err(Error::Store(messages.join("; ")));
            }
        }
        Ok(())
    }
}

/// Query expression bounding the working set to items accepted within the
/// backtrack window or never accepted at all.
pub fn accepted_since_query(cutoff: DateTime<Utc>) -> String {
    format!(
        "((AcceptedDate >= {}) OR (AcceptedDate = null))",
        cutoff.format("%Y-%m-%dT%H:%M:%SZ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepted_since_query() {
        let cutoff = DateTime::parse_from_rfc3339("2024-01-13T06:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            accepted_since_query(cutoff),
            "((AcceptedDate >= 2024-01-13T06:30:00Z) OR (AcceptedDate = null))"
        );
    }

    #[test]
    fn test_artifact_accessors() {
        let artifact = Artifact::from_value(json!({
            "FormattedID": "US1234",
            "ScheduleState": "Accepted",
            "CreationDate": "2024-01-01T00:00:00.000Z",
            "AcceptedDate": "2024-01-10T00:00:00.000Z",
            "InProgressDate": null,
            "c_CycleTime": 5.0,
            "c_LeadTime": 9,
            "c_QueueTime": null
        }));
        assert_eq!(artifact.formatted_id(), "US1234");
        assert_eq!(artifact.schedule_state(), Some("Accepted"));
        assert!(artifact.date("CreationDate").is_some());
        assert!(artifact.date("InProgressDate").is_none());
        assert_eq!(artifact.integer("c_CycleTime"), Some(5));
        assert_eq!(artifact.integer("c_LeadTime"), Some(9));
        assert_eq!(artifact.integer("c_QueueTime"), None);
        assert_eq!(artifact.integer("c_Missing"), None);
    }

    #[test]
    fn test_artifact_malformed_date_reads_absent() {
        let artifact = Artifact::from_value(json!({"AcceptedDate": "last tuesday"}));
        assert!(artifact.date("AcceptedDate").is_none());
    }

    #[test]
    fn test_query_result_envelope() {
        let raw = json!({
            "QueryResult": {
                "TotalResultCount": 1,
                "Results": [{"ObjectID": 42, "FormattedID": "US42"}],
                "Errors": [],
                "Warnings": []
            }
        });
        let result: QueryResult =
            serde_json::from_value(raw.get("QueryResult").cloned().unwrap()).unwrap();
        assert_eq!(result.total_result_count, 1);
        let summary: ArtifactSummary =
            serde_json::from_value(result.results[0].clone()).unwrap();
        assert_eq!(summary.object_id, 42);
        assert_eq!(summary.formatted_id, "US42");
    }
}
