use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use crate::domain::connector::{ConnectorError, ConnectorResult};

/// Half-open time interval `[start, end)` in epoch milliseconds.
/// A missing bound means the window is unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl TimeWindow {
    pub fn new(start: Option<i64>, end: Option<i64>) -> Self {
        Self { start, end }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Check whether a timestamp falls inside the window.
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start.map_or(true, |start| timestamp >= start)
            && self.end.map_or(true, |end| timestamp < end)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.end) {
            (Some(s), Some(e)) => write!(f, "[{}, {})", s, e),
            (Some(s), None) => write!(f, "[{}, ..)", s),
            (None, Some(e)) => write!(f, "[.., {})", e),
            (None, None) => write!(f, "[.., ..)"),
        }
    }
}

/// A (name, value) filter applied when seeding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FindCriterion {
    pub name: String,
    pub value: String,
}

impl FindCriterion {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Metadata toggle as submitted by job configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataToggle {
    pub name: String,
    #[serde(default = "default_included")]
    pub included: bool,
}

fn default_included() -> bool {
    true
}

/// Raw job specification, as it arrives over the API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecificationConfig {
    #[serde(default)]
    pub find_criteria: Vec<FindCriterion>,
    #[serde(default)]
    pub metadata: Vec<MetadataToggle>,
}

/// Typed document specification, parsed once from [`SpecificationConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentSpecification {
    pub find_criteria: Vec<FindCriterion>,
    pub metadata: BTreeSet<String>,
}

impl DocumentSpecification {
    pub fn new(find_criteria: Vec<FindCriterion>, metadata: BTreeSet<String>) -> Self {
        Self {
            find_criteria,
            metadata,
        }
    }

    /// Validate and normalize a raw specification.
    pub fn from_config(config: SpecificationConfig) -> ConnectorResult<Self> {
        if let Some(bad) = config.find_criteria.iter().find(|c| c.name.trim().is_empty()) {
            return Err(ConnectorError::Configuration(format!(
                "find criterion with value '{}' has an empty name",
                bad.value
            )));
        }
        if config.metadata.iter().any(|m| m.name.trim().is_empty()) {
            return Err(ConnectorError::Configuration(
                "metadata selection contains an empty field name".to_string(),
            ));
        }

        let metadata = config
            .metadata
            .into_iter()
            .filter(|m| m.included)
            .map(|m| m.name)
            .collect();

        Ok(Self {
            find_criteria: config.find_criteria,
            metadata,
        })
    }

    /// Stable key identifying this specification. Seeding restarts from
    /// zero whenever the key changes.
    pub fn key(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Document composed by the fetch pipeline and handed to the ingestion sink.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComposedDocument {
    #[serde(skip)]
    pub content: Vec<u8>,
    pub declared_length: u64,
    pub mime_type: Option<String>,
    pub fields: BTreeMap<String, Vec<String>>,
    pub allow_tokens: Vec<String>,
    pub deny_tokens: Vec<String>,
}

/// Terminal status of a fetch activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActivityStatus {
    Ok,
    Error,
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityStatus::Ok => write!(f, "OK"),
            ActivityStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// A fetch activity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchActivity {
    pub id: Uuid,
    pub activity: String,
    pub started_at: i64,
    pub bytes: u64,
    pub document_id: String,
    pub status: ActivityStatus,
    pub message: Option<String>,
}

impl FetchActivity {
    pub fn new(
        activity: &str,
        started_at: i64,
        bytes: u64,
        document_id: &str,
        status: ActivityStatus,
        message: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            activity: activity.to_string(),
            started_at,
            bytes,
            document_id: document_id.to_string(),
            status,
            message,
        }
    }
}

/// A document held by the local ingestion store.
#[derive(Debug, Clone, Serialize)]
pub struct IngestedDocument {
    pub id: String,
    pub version: String,
    pub url: String,
    pub document: ComposedDocument,
    pub ingested_at: DateTime<Utc>,
}

/// Status of a crawl job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    Pending,
    Running,
    Completed,
    Deferred,
    Cancelled,
    Failed,
}

/// A crawl job run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    pub id: Uuid,
    pub spec_key: String,
    pub requested_by: Option<Uuid>,
    pub status: CrawlStatus,
    pub window: TimeWindow,
    pub seeds: usize,
    pub ingested: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub error: Option<String>,
    pub retry_after_secs: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CrawlJob {
    pub fn new(spec_key: String, requested_by: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            spec_key,
            requested_by,
            status: CrawlStatus::Pending,
            window: TimeWindow::default(),
            seeds: 0,
            ingested: 0,
            deleted: 0,
            unchanged: 0,
            failed: 0,
            error: None,
            retry_after_secs: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_half_open() {
        let window = TimeWindow::new(Some(0), Some(1000));
        assert!(window.contains(0));
        assert!(window.contains(999));
        assert!(!window.contains(1000));
        assert!(TimeWindow::unbounded().contains(i64::MIN));
    }

    #[test]
    fn specification_keeps_only_included_fields() {
        let config: SpecificationConfig = serde_json::from_value(serde_json::json!({
            "find_criteria": [{"name": "author", "value": "alice"}],
            "metadata": [
                {"name": "title", "included": true},
                {"name": "author"},
                {"name": "secret", "included": false}
            ]
        }))
        .unwrap();

        let spec = DocumentSpecification::from_config(config).unwrap();
        assert_eq!(spec.find_criteria, vec![FindCriterion::new("author", "alice")]);
        assert_eq!(
            spec.metadata.iter().cloned().collect::<Vec<_>>(),
            vec!["author".to_string(), "title".to_string()]
        );
    }

    #[test]
    fn empty_criterion_name_is_a_configuration_error() {
        let config = SpecificationConfig {
            find_criteria: vec![FindCriterion::new(" ", "x")],
            metadata: Vec::new(),
        };
        assert!(matches!(
            DocumentSpecification::from_config(config),
            Err(ConnectorError::Configuration(_))
        ));
    }

    #[test]
    fn key_changes_with_metadata_selection() {
        let a = DocumentSpecification::new(Vec::new(), ["title".to_string()].into());
        let b = DocumentSpecification::new(Vec::new(), ["author".to_string()].into());
        assert_ne!(a.key(), b.key());
        assert_eq!(a.key(), a.clone().key());
    }
}
