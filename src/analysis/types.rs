//! Core types for the chart analysis pipeline

use crate::chart::PalaceName;
use crate::llm::GenerationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Configuration for one analysis run
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Maximum generation calls in flight at once (1 = strictly sequential)
    pub max_concurrency: usize,
    /// Timeout for a single generation call in seconds
    pub unit_timeout_seconds: u64,
    /// Ages covered by one yearly-fortune unit
    pub yearly_chunk_size: u32,
    /// Birth year assumed when the chart carries no parseable timestamp
    pub fallback_birth_year: i32,
    /// Calendar year to compute ages against; `None` uses the local clock
    pub current_year: Option<i32>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            unit_timeout_seconds: 300,
            yearly_chunk_size: 5,
            fallback_birth_year: 1980,
            current_year: None,
        }
    }
}

impl AnalysisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    pub fn with_unit_timeout(mut self, seconds: u64) -> Self {
        self.unit_timeout_seconds = seconds;
        self
    }

    pub fn with_yearly_chunk_size(mut self, ages: u32) -> Self {
        self.yearly_chunk_size = ages.max(1);
        self
    }

    pub fn with_fallback_birth_year(mut self, year: i32) -> Self {
        self.fallback_birth_year = year;
        self
    }

    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = Some(year);
        self
    }
}

/// Special-analysis topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Career,
    Study,
    Marriage,
    Health,
    Relationship,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::Career,
        Topic::Study,
        Topic::Marriage,
        Topic::Health,
        Topic::Relationship,
    ];

    /// Key under `specialAnalysis`; derived fields append `Plain`, `Basis`, `Solutions`.
    pub fn key(self) -> &'static str {
        match self {
            Topic::Career => "career",
            Topic::Study => "study",
            Topic::Marriage => "marriage",
            Topic::Health => "health",
            Topic::Relationship => "relationship",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Topic::Career => "事业财运",
            Topic::Study => "学业进修",
            Topic::Marriage => "婚姻感情",
            Topic::Health => "健康疾厄",
            Topic::Relationship => "人际交往",
        }
    }

    /// What the narrative field of this topic should cover.
    pub fn brief(self) -> &'static str {
        match self {
            Topic::Career => "事业财运深度分析（300字，职业方向、财富规模、投资建议）",
            Topic::Study => "学业进修深度分析（200字，学习能力、考试运、适合方向）",
            Topic::Marriage => "婚姻感情深度分析（300字，配偶特征、相处模式、婚姻危机）",
            Topic::Health => "健康疾厄深度分析（200字，体质强弱、易患疾病、养生建议）",
            Topic::Relationship => "人际交往深度分析（200字，贵人运、小人防范）",
        }
    }

    /// Whether `key` is this topic's narrative key or one of its derived keys.
    pub fn owns_key(self, key: &str) -> bool {
        matches!(
            key.strip_prefix(self.key()),
            Some("" | "Plain" | "Basis" | "Solutions")
        )
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One year of the yearly-fortune sequence.
///
/// `year` and `age` are normalized to integers; every other field the
/// generation service returned is kept as-is in `details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyFortuneEntry {
    pub year: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<i32>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl YearlyFortuneEntry {
    /// Normalize one raw array element. Returns `None` when the element is
    /// not an object or has no usable year.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut details) = value else {
            return None;
        };
        let year = details.remove("year").as_ref().and_then(leading_integer)?;
        let age = details.remove("age").as_ref().and_then(leading_integer);
        Some(Self { year, age, details })
    }
}

/// Integer value of a JSON number, or of the leading digits of a string
/// (`"38岁"` -> 38).
fn leading_integer(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => {
            let trimmed = s.trim();
            let (sign, digits) = match trimmed.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, trimmed),
            };
            let run: String = digits.chars().take_while(|c| c.is_ascii_digit()).collect();
            run.parse::<i32>().ok().map(|n| sign * n)
        }
        _ => None,
    }
}

/// Final analysis object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub overall: Map<String, Value>,
    pub palaces: BTreeMap<PalaceName, Value>,
    pub yearly_fortune: Vec<YearlyFortuneEntry>,
    pub special_analysis: Map<String, Value>,
    pub suggestions: Map<String, Value>,
    pub key_events: Vec<Value>,
    pub birth_year: i32,
    /// Set when `birth_year` is the configured fallback rather than read from the chart
    pub birth_year_estimated: bool,
    pub current_age: i32,
    pub start_luck_age: Option<i32>,
    pub start_luck_year: Option<i32>,
    /// Non-fatal problems (decode fallbacks, sections still missing after retry)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl AnalysisResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn has_topic(&self, topic: Topic) -> bool {
        self.special_analysis
            .get(topic.key())
            .is_some_and(|v| !v.is_null())
    }

    /// Palace names without an analysis entry, in vocabulary order.
    pub fn missing_palaces(&self) -> Vec<PalaceName> {
        PalaceName::ALL
            .into_iter()
            .filter(|p| !self.palaces.contains_key(p))
            .collect()
    }
}

/// Error types for analysis
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    #[error("chart analysis failed: generation client '{0}' is not available")]
    Unavailable(String),

    #[error("chart analysis failed during {unit}: {source}")]
    Generation {
        unit: String,
        #[source]
        source: GenerationError,
    },

    #[error("chart analysis failed during {unit}: timed out after {seconds} seconds")]
    Timeout { unit: String, seconds: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}
