//! Finished analysis record

use crate::analysis::AnalysisResult;
use crate::chart::Chart;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Name used when the caller gives none.
pub const DEFAULT_NAME: &str = "未命名";

/// Chart plus analysis, ready to be stored or returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    /// `<millis>_<name>`, or `<millis>_unknown` when no name was given
    pub id: String,
    /// Creation time, milliseconds since the epoch
    pub timestamp: i64,
    pub name: String,
    pub parsed_data: Chart,
    pub analysis: AnalysisResult,
    /// RFC 3339, UTC
    pub created_at: String,
}

impl AnalysisRecord {
    pub fn new(name: Option<&str>, chart: Chart, analysis: AnalysisResult) -> Self {
        Self::at(Utc::now(), name, chart, analysis)
    }

    /// Build a record stamped with `now`.
    pub fn at(
        now: DateTime<Utc>,
        name: Option<&str>,
        chart: Chart,
        analysis: AnalysisResult,
    ) -> Self {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let timestamp = now.timestamp_millis();
        Self {
            id: format!("{}_{}", timestamp, name.unwrap_or("unknown")),
            timestamp,
            name: name.unwrap_or(DEFAULT_NAME).to_string(),
            parsed_data: chart,
            analysis,
            created_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}
