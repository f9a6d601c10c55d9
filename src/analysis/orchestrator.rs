//! Stage orchestrator for driving a full chart analysis
//!
//! Runs the stages in fixed order: overview, palace batches, yearly chunks,
//! topic batches, suggestions. With `max_concurrency = 1` batches run one
//! after another, each followed by its own gap-filling retries. Higher
//! settings drive the batches of a stage together, bounded by a shared
//! semaphore. Batch outputs are merged in batch order either way.

use super::merger::ResultMerger;
use super::types::{AnalysisConfig, AnalysisError, AnalysisResult, Topic, YearlyFortuneEntry};
use super::unit::{GenerationUnit, Timeline};
use crate::chart::{Chart, PalaceName};
use crate::json_recovery::{parse_lenient, LenientParse};
use crate::llm::GenerationClient;
use chrono::Datelike;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Palace batches, grouped by life-domain proximity.
pub const PALACE_BATCHES: [[PalaceName; 3]; 4] = [
    [PalaceName::Life, PalaceName::Siblings, PalaceName::Spouse],
    [PalaceName::Children, PalaceName::Wealth, PalaceName::Health],
    [PalaceName::Travel, PalaceName::Friends, PalaceName::Career],
    [PalaceName::Property, PalaceName::Fortune, PalaceName::Parents],
];

/// Special-topic batches.
pub const TOPIC_BATCHES: [&[Topic]; 2] = [
    &[Topic::Career, Topic::Study],
    &[Topic::Marriage, Topic::Health, Topic::Relationship],
];

/// Decoded response of one unit plus any non-fatal problem it hit.
struct UnitOutput {
    object: Option<Map<String, Value>>,
    warning: Option<String>,
}

/// Result of one batch, gap-filling included.
struct BatchOutput<T> {
    merged: T,
    warnings: Vec<String>,
}

/// Drives a chart through every analysis stage
pub struct StageOrchestrator {
    client: Arc<dyn GenerationClient>,
    config: AnalysisConfig,
    /// Semaphore to limit concurrent generation calls
    permits: Arc<Semaphore>,
    merger: ResultMerger,
}

impl StageOrchestrator {
    pub fn new(client: Arc<dyn GenerationClient>, config: AnalysisConfig) -> Self {
        let current_year = config
            .current_year
            .unwrap_or_else(|| chrono::Local::now().year());
        let merger =
            ResultMerger::new(current_year).with_fallback_birth_year(config.fallback_birth_year);
        Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            config,
            merger,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run the full analysis for `chart`.
    ///
    /// Any generation call failure or timeout aborts the run. Decode
    /// failures and sections still missing after their retry only add
    /// warnings.
    pub async fn analyze(&self, chart: &Chart) -> Result<AnalysisResult, AnalysisError> {
        if !self.client.is_available().await {
            return Err(AnalysisError::Unavailable(self.client.name().to_string()));
        }

        let timeline = self.merger.timeline(chart);
        let mut result = AnalysisResult::new();
        if timeline.birth_year_estimated {
            warn!(
                birth_year = timeline.birth_year,
                "no birth timestamp in chart, using fallback birth year"
            );
            result.add_warning(format!(
                "birth year not found in chart; assumed {}",
                timeline.birth_year
            ));
        }

        info!(client = self.client.name(), palaces = chart.palaces.len(), "stage 1: overview");
        let overview = self.run_unit(GenerationUnit::overview(chart)).await?;
        result.warnings.extend(overview.warning);
        result.overall = take_object(overview.object.as_ref(), "overall");

        info!("stage 2: palaces");
        let batches = self
            .join_batches(
                PALACE_BATCHES
                    .iter()
                    .map(|batch| self.palace_batch(chart, batch)),
            )
            .await?;
        for batch in batches {
            result.palaces.extend(batch.merged);
            result.warnings.extend(batch.warnings);
        }

        info!(
            current_age = timeline.current_age,
            chunk = self.config.yearly_chunk_size,
            "stage 3: yearly fortune"
        );
        result.yearly_fortune = self.yearly_fortune(chart, &timeline, &mut result.warnings).await?;

        info!("stage 4: special topics");
        let batches = self
            .join_batches(
                TOPIC_BATCHES
                    .iter()
                    .map(|batch| self.topic_batch(chart, &timeline, batch)),
            )
            .await?;
        for batch in batches {
            result.special_analysis.extend(batch.merged);
            result.warnings.extend(batch.warnings);
        }

        info!("stage 5: suggestions and key events");
        let suggestions = self
            .run_unit(GenerationUnit::suggestions(chart, &timeline))
            .await?;
        result.warnings.extend(suggestions.warning);
        result.suggestions = take_object(suggestions.object.as_ref(), "suggestions");
        result.key_events = suggestions
            .object
            .as_ref()
            .and_then(|o| o.get("keyEvents"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let result = self.merger.enrich(result, chart);
        info!(
            palaces = result.palaces.len(),
            years = result.yearly_fortune.len(),
            warnings = result.warnings.len(),
            "analysis complete"
        );
        Ok(result)
    }

    /// One palace batch followed by a single retry per missing palace.
    async fn palace_batch(
        &self,
        chart: &Chart,
        names: &[PalaceName],
    ) -> Result<BatchOutput<BTreeMap<PalaceName, Value>>, AnalysisError> {
        let mut merged = BTreeMap::new();
        let mut warnings = Vec::new();

        let output = self.run_unit(GenerationUnit::palaces(chart, names)).await?;
        warnings.extend(output.warning);
        if let Some(object) = &output.object {
            self.merger.merge_palaces(&mut merged, object, names);
        }

        for name in names {
            if merged.contains_key(name) {
                continue;
            }
            warn!(palace = %name, "palace missing from batch response, retrying alone");
            let retry = self.run_unit(GenerationUnit::palaces(chart, &[*name])).await?;
            warnings.extend(retry.warning);
            if let Some(object) = &retry.object {
                self.merger.merge_palaces(&mut merged, object, &[*name]);
            }
            if !merged.contains_key(name) {
                warn!(palace = %name, "palace still missing after retry");
                warnings.push(format!("palace {} missing after retry", name));
            }
        }

        Ok(BatchOutput { merged, warnings })
    }

    /// One topic batch followed by a single retry per missing topic.
    async fn topic_batch(
        &self,
        chart: &Chart,
        timeline: &Timeline,
        topics: &[Topic],
    ) -> Result<BatchOutput<Map<String, Value>>, AnalysisError> {
        let mut merged = Map::new();
        let mut warnings = Vec::new();
        let present = |merged: &Map<String, Value>, topic: Topic| merged.contains_key(topic.key());

        let output = self
            .run_unit(GenerationUnit::special(chart, timeline, topics))
            .await?;
        warnings.extend(output.warning);
        if let Some(object) = &output.object {
            self.merger.merge_topics(&mut merged, object, topics);
        }

        for topic in topics {
            if present(&merged, *topic) {
                continue;
            }
            warn!(topic = %topic, "topic missing from batch response, retrying alone");
            let retry = self
                .run_unit(GenerationUnit::special(chart, timeline, &[*topic]))
                .await?;
            warnings.extend(retry.warning);
            if let Some(object) = &retry.object {
                self.merger.merge_topics(&mut merged, object, &[*topic]);
            }
            if !present(&merged, *topic) {
                warn!(topic = %topic, "topic still missing after retry");
                warnings.push(format!("topic {} missing after retry", topic));
            }
        }

        Ok(BatchOutput { merged, warnings })
    }

    /// One unit per age chunk over `[1, current_age]`.
    async fn yearly_fortune(
        &self,
        chart: &Chart,
        timeline: &Timeline,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<YearlyFortuneEntry>, AnalysisError> {
        let ranges = ResultMerger::age_ranges(1, timeline.current_age, self.config.yearly_chunk_size);
        let outputs = self
            .join_batches(ranges.iter().map(|(start_age, end_age)| {
                self.run_unit(GenerationUnit::yearly_fortune(
                    chart, timeline, *start_age, *end_age,
                ))
            }))
            .await?;

        let chunks = ranges.iter().zip(outputs).map(|((start_age, end_age), output)| {
            warnings.extend(output.warning);
            let (start_year, end_year) =
                (timeline.year_of_age(*start_age), timeline.year_of_age(*end_age));
            output
                .object
                .map(|object| self.merger.yearly_entries(&object, start_year, end_year))
                .unwrap_or_default()
        });
        Ok(self.merger.merge_yearly(chunks.collect::<Vec<_>>()))
    }

    /// Await `batches` in order when calls are sequential, otherwise
    /// together. Outputs keep input order; the first error aborts.
    async fn join_batches<I, F, T>(&self, batches: I) -> Result<Vec<T>, AnalysisError>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, AnalysisError>>,
    {
        if self.config.max_concurrency > 1 {
            return try_join_all(batches).await;
        }
        let mut outputs = Vec::new();
        for batch in batches {
            outputs.push(batch.await?);
        }
        Ok(outputs)
    }

    /// Send one unit and decode its response leniently.
    async fn run_unit(&self, unit: GenerationUnit) -> Result<UnitOutput, AnalysisError> {
        let label = unit.label();

        // Acquire semaphore permit for rate limiting
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| AnalysisError::Internal(format!("Semaphore error: {}", e)))?;

        debug!(unit = %label, prompt_chars = unit.prompt.chars().count(), "generating");
        let timeout = tokio::time::Duration::from_secs(self.config.unit_timeout_seconds);
        let text = match tokio::time::timeout(timeout, self.client.generate(&unit.prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(source)) => {
                return Err(AnalysisError::Generation {
                    unit: label,
                    source,
                })
            }
            Err(_) => {
                return Err(AnalysisError::Timeout {
                    unit: label,
                    seconds: self.config.unit_timeout_seconds,
                })
            }
        };

        match parse_lenient(&text) {
            LenientParse::Parsed(object) => {
                let missing: Vec<&str> = unit
                    .kind
                    .response_keys()
                    .iter()
                    .copied()
                    .filter(|k| !object.contains_key(*k))
                    .collect();
                if !missing.is_empty() {
                    debug!(unit = %label, ?missing, "response lacks expected keys");
                }
                Ok(UnitOutput {
                    object: Some(object),
                    warning: None,
                })
            }
            LenientParse::Fallback(fallback) => {
                warn!(unit = %label, raw_chars = fallback.raw_analysis.chars().count(), "{}", fallback.error);
                Ok(UnitOutput {
                    object: None,
                    warning: Some(format!("{}: {}", label, fallback.error)),
                })
            }
        }
    }
}

fn take_object(object: Option<&Map<String, Value>>, key: &str) -> Map<String, Value> {
    object
        .and_then(|o| o.get(key))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}
