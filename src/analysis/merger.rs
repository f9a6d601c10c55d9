//! Result merger for combining per-unit outputs
//!
//! Folds the decoded responses of individual generation units into the
//! aggregate, deduplicates the yearly series, and derives the age fields.

use super::types::{AnalysisResult, Topic, YearlyFortuneEntry};
use super::unit::Timeline;
use crate::chart::{BasicInfo, Chart, PalaceName};
use chrono::Datelike;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

/// Merges unit responses and enriches the final result
#[derive(Debug, Clone)]
pub struct ResultMerger {
    current_year: i32,
    fallback_birth_year: i32,
}

impl Default for ResultMerger {
    fn default() -> Self {
        Self::new(chrono::Local::now().year())
    }
}

impl ResultMerger {
    /// Create a merger computing ages against `current_year`
    pub fn new(current_year: i32) -> Self {
        Self {
            current_year,
            fallback_birth_year: 1980,
        }
    }

    pub fn with_fallback_birth_year(mut self, year: i32) -> Self {
        self.fallback_birth_year = year;
        self
    }

    /// Birth year from the clock time, else the true-solar time.
    ///
    /// The year is the first run of exactly four ASCII digits, so both
    /// `1990-05-01` and `05/01/1990` resolve to 1990. Returns the configured
    /// fallback and `true` when neither timestamp carries one.
    pub fn birth_year(&self, info: &BasicInfo) -> (i32, bool) {
        let year = [&info.clock_time, &info.solar_time]
            .into_iter()
            .flatten()
            .find_map(|stamp| year_token(stamp));
        match year {
            Some(year) => (year, false),
            None => (self.fallback_birth_year, true),
        }
    }

    /// Smallest first-integer across the palaces' major-period labels.
    pub fn start_luck_age(&self, chart: &Chart) -> Option<i32> {
        chart
            .palaces
            .values()
            .filter_map(|p| p.ages.major_start_age())
            .min()
    }

    pub fn timeline(&self, chart: &Chart) -> Timeline {
        let (birth_year, birth_year_estimated) = self.birth_year(&chart.basic_info);
        let start_luck_age = self.start_luck_age(chart);
        Timeline {
            birth_year,
            birth_year_estimated,
            current_year: self.current_year,
            current_age: self.current_year.saturating_sub(birth_year).saturating_add(1),
            start_luck_age,
            start_luck_year: start_luck_age
                .map(|age| birth_year.saturating_add(age).saturating_sub(1)),
        }
    }

    /// Partition `[start, end]` into inclusive chunks of `chunk` ages.
    pub fn age_ranges(start: i32, end: i32, chunk: u32) -> Vec<(i32, i32)> {
        let step = i32::try_from(chunk.max(1)).unwrap_or(i32::MAX);
        let mut ranges = Vec::new();
        let mut age = start;
        while age <= end {
            let range_end = age.saturating_add(step - 1).min(end);
            ranges.push((age, range_end));
            age = match range_end.checked_add(1) {
                Some(next) => next,
                None => break,
            };
        }
        ranges
    }

    /// Copy the requested palaces out of a `palaces` response.
    ///
    /// Names outside `requested`, unknown names and null values are ignored.
    pub fn merge_palaces(
        &self,
        target: &mut BTreeMap<PalaceName, Value>,
        response: &Map<String, Value>,
        requested: &[PalaceName],
    ) {
        let Some(Value::Object(palaces)) = response.get("palaces") else {
            return;
        };
        for (label, analysis) in palaces {
            if analysis.is_null() {
                continue;
            }
            match PalaceName::from_label(label) {
                Some(name) if requested.contains(&name) => {
                    target.insert(name, analysis.clone());
                }
                _ => tracing::debug!(label = %label, "ignoring unrequested palace key"),
            }
        }
    }

    /// Copy the requested topics (and their derived keys) out of a
    /// `specialAnalysis` response.
    pub fn merge_topics(
        &self,
        target: &mut Map<String, Value>,
        response: &Map<String, Value>,
        requested: &[Topic],
    ) {
        let Some(Value::Object(topics)) = response.get("specialAnalysis") else {
            return;
        };
        for (key, analysis) in topics {
            if analysis.is_null() {
                continue;
            }
            if requested.iter().any(|t| t.owns_key(key)) {
                target.insert(key.clone(), analysis.clone());
            } else {
                tracing::debug!(key = %key, "ignoring unrequested topic key");
            }
        }
    }

    /// Normalized `yearlyFortune` entries whose year lies in `[start_year, end_year]`.
    pub fn yearly_entries(
        &self,
        response: &Map<String, Value>,
        start_year: i32,
        end_year: i32,
    ) -> Vec<YearlyFortuneEntry> {
        let Some(Value::Array(items)) = response.get("yearlyFortune") else {
            return Vec::new();
        };
        items
            .iter()
            .cloned()
            .filter_map(YearlyFortuneEntry::from_value)
            .filter(|e| (start_year..=end_year).contains(&e.year))
            .collect()
    }

    /// Concatenate chunks in order, sort by year, keep the first entry per year.
    pub fn merge_yearly(
        &self,
        chunks: impl IntoIterator<Item = Vec<YearlyFortuneEntry>>,
    ) -> Vec<YearlyFortuneEntry> {
        let mut all: Vec<YearlyFortuneEntry> = chunks.into_iter().flatten().collect();
        // Stable, so earlier chunks win ties.
        all.sort_by_key(|e| e.year);
        let mut seen = HashSet::new();
        all.retain(|e| seen.insert(e.year));
        all
    }

    /// Derive `birthYear`, `currentAge`, `startLuckAge`, `startLuckYear` and
    /// back-fill missing yearly ages. Idempotent.
    pub fn enrich(&self, mut result: AnalysisResult, chart: &Chart) -> AnalysisResult {
        let timeline = self.timeline(chart);

        for entry in &mut result.yearly_fortune {
            if matches!(entry.age, None | Some(0)) {
                let age = entry.year.saturating_sub(timeline.birth_year);
                entry.age = Some(age.saturating_add(1));
            }
        }

        result.birth_year = timeline.birth_year;
        result.birth_year_estimated = timeline.birth_year_estimated;
        result.current_age = timeline.current_age;
        result.start_luck_age = timeline.start_luck_age;
        result.start_luck_year = timeline.start_luck_year;
        result
    }
}

/// First run of exactly four ASCII digits in `text`.
fn year_token(text: &str) -> Option<i32> {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|run| run.len() == 4)
        .and_then(|run| run.parse().ok())
}
