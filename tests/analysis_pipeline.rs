//! End-to-end analysis pipeline against a scripted generation client
//!
//! Run with: `cargo test --test analysis_pipeline`

mod common;

use async_trait::async_trait;
use common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use ziwei::analysis::{AnalysisConfig, AnalysisError, StageOrchestrator, Topic, PALACE_BATCHES};
use ziwei::llm::{GenerationClient, GenerationError, MockClient};
use ziwei::{AnalysisRecord, Chart, PalaceName};

fn chart() -> Chart {
    ziwei::parse(SAMPLE_REPORT)
}

fn config() -> AnalysisConfig {
    AnalysisConfig::new().with_current_year(CURRENT_YEAR)
}

fn run_with(client: MockClient, config: AnalysisConfig) -> (Arc<MockClient>, StageOrchestrator) {
    let client = Arc::new(client);
    let orchestrator = StageOrchestrator::new(client.clone(), config);
    (client, orchestrator)
}

#[tokio::test]
async fn test_end_to_end_derived_fields() {
    let (client, orchestrator) =
        run_with(MockClient::available().with_default(universal_response()), config());
    let result = orchestrator.analyze(&chart()).await.unwrap();

    assert_eq!(result.birth_year, 1990);
    assert!(!result.birth_year_estimated);
    assert_eq!(result.current_age, 35);
    assert_eq!(result.start_luck_age, Some(6));
    assert_eq!(result.start_luck_year, Some(1995));

    // 1 overview + 4 palace batches + 7 yearly chunks + 2 topic batches + 1 suggestions
    assert_eq!(client.prompts().len(), 15);
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
}

#[tokio::test]
async fn test_end_to_end_sections() {
    let (_, orchestrator) =
        run_with(MockClient::available().with_default(universal_response()), config());
    let result = orchestrator.analyze(&chart()).await.unwrap();

    assert_eq!(result.overall["pattern"], json!("紫府同宫格"));
    assert_eq!(result.palaces.len(), 12);
    assert!(result.missing_palaces().is_empty());
    assert_eq!(result.special_analysis.len(), 20);
    assert!(result.suggestions.contains_key("luckyElements"));
    assert_eq!(result.key_events.len(), 1);

    let years: Vec<i32> = result.yearly_fortune.iter().map(|e| e.year).collect();
    assert_eq!(years, (1990..=2024).collect::<Vec<_>>());
    assert!(result
        .yearly_fortune
        .iter()
        .all(|e| e.age == Some(e.year - 1989)));
}

#[tokio::test]
async fn test_palace_gap_filled_by_single_retry() {
    let batch = &PALACE_BATCHES[0];
    let retry_needle = palace_needle(&[PalaceName::Spouse]);
    let client = MockClient::available()
        .with_response(
            palace_needle(batch),
            palaces_response(&[PalaceName::Life, PalaceName::Siblings]),
        )
        .with_response(retry_needle.clone(), palaces_response(&[PalaceName::Spouse]))
        .with_default(universal_response());
    let (client, orchestrator) = run_with(client, config());

    let result = orchestrator.analyze(&chart()).await.unwrap();
    assert_eq!(client.calls_containing(&retry_needle), 1);
    for name in batch {
        assert!(result.palaces.contains_key(name), "missing {}", name);
    }
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn test_palace_still_missing_after_retry_is_omitted() {
    let batch = &PALACE_BATCHES[0];
    let retry_needle = palace_needle(&[PalaceName::Spouse]);
    let client = MockClient::available()
        .with_response(
            palace_needle(batch),
            palaces_response(&[PalaceName::Life, PalaceName::Siblings]),
        )
        .with_response(retry_needle.clone(), r#"{"palaces": {}}"#)
        .with_default(universal_response());
    let (client, orchestrator) = run_with(client, config());

    let result = orchestrator.analyze(&chart()).await.unwrap();
    assert_eq!(client.calls_containing(&retry_needle), 1);
    assert_eq!(result.palaces.len(), 11);
    assert!(result.palaces.contains_key(&PalaceName::Life));
    assert!(result.palaces.contains_key(&PalaceName::Siblings));
    assert_eq!(result.missing_palaces(), vec![PalaceName::Spouse]);
    assert_eq!(result.warnings, vec!["palace 夫妻宫 missing after retry".to_string()]);
}

#[tokio::test]
async fn test_topic_gap_filled_by_single_retry() {
    let client = MockClient::available()
        .with_response(
            "仅分析以下主题：事业财运、学业进修。",
            json!({"specialAnalysis": {"career": "c", "careerPlain": "p"}}).to_string(),
        )
        .with_response(
            "仅分析以下主题：学业进修。",
            json!({"specialAnalysis": {"study": "s"}}).to_string(),
        )
        .with_default(universal_response());
    let (client, orchestrator) = run_with(client, config());

    let result = orchestrator.analyze(&chart()).await.unwrap();
    assert_eq!(client.calls_containing("仅分析以下主题：学业进修。"), 1);
    assert_eq!(result.special_analysis["career"], json!("c"));
    assert_eq!(result.special_analysis["study"], json!("s"));
    assert!(result.has_topic(Topic::Study));
    assert!(!result.special_analysis.contains_key("studyPlain"));
}

#[tokio::test]
async fn test_topic_still_missing_after_retry_is_omitted() {
    let client = MockClient::available()
        .with_response(
            "仅分析以下主题：事业财运、学业进修。",
            json!({"specialAnalysis": {"career": "c"}}).to_string(),
        )
        .with_response(
            "仅分析以下主题：学业进修。",
            json!({"specialAnalysis": {}}).to_string(),
        )
        .with_default(universal_response());
    let (client, orchestrator) = run_with(client, config());

    let result = orchestrator.analyze(&chart()).await.unwrap();
    assert_eq!(client.calls_containing("仅分析以下主题：学业进修。"), 1);
    assert!(result.has_topic(Topic::Career));
    assert!(!result.has_topic(Topic::Study));
    assert!(result.has_topic(Topic::Marriage));
    assert_eq!(result.warnings, vec!["topic study missing after retry".to_string()]);
}

#[tokio::test]
async fn test_yearly_duplicates_and_out_of_range_years() {
    let first_chunk = json!({"yearlyFortune": [
        yearly_entry(1992, "first"),
        yearly_entry(1990, "a"),
        yearly_entry(1992, "second"),
        yearly_entry(2030, "out of range"),
        {"year": "1991", "age": "2", "fortune": "string year"}
    ]});
    let client = MockClient::available()
        .with_response(yearly_needle(1990, 1994), first_chunk.to_string())
        .with_default(universal_response());
    let (_, orchestrator) = run_with(client, config());

    let result = orchestrator.analyze(&chart()).await.unwrap();
    let early: Vec<_> = result
        .yearly_fortune
        .iter()
        .filter(|e| e.year < 1995)
        .collect();

    assert_eq!(early.len(), 3);
    assert_eq!(early[0].year, 1990);
    assert_eq!(early[1].year, 1991);
    assert_eq!(early[1].age, Some(2));
    assert_eq!(early[2].details["fortune"], json!("first"));
    assert!(result.yearly_fortune.iter().all(|e| e.year <= CURRENT_YEAR));
}

#[tokio::test]
async fn test_wrapped_and_truncated_responses_are_recovered() {
    let client = MockClient::available()
        .with_response(
            OVERVIEW_NEEDLE,
            "好的，以下是分析：\n```json\n{\"overall\": {\"pattern\": \"紫府同宫",
        )
        .with_response(
            SUGGESTIONS_NEEDLE,
            "结果如下 {\"suggestions\": {\"solutions\": [\"静心\"]}, \"keyEvents\": []} 完毕",
        )
        .with_default(universal_response());
    let (_, orchestrator) = run_with(client, config());

    let result = orchestrator.analyze(&chart()).await.unwrap();
    assert_eq!(result.overall["pattern"], json!("紫府同宫"));
    assert_eq!(result.suggestions["solutions"], json!(["静心"]));
    assert!(result.key_events.is_empty());
}

#[tokio::test]
async fn test_generation_failure_in_later_stage_is_fatal() {
    let client = MockClient::available()
        .with_failure(
            palace_needle(&PALACE_BATCHES[2]),
            GenerationError::Status {
                status: 429,
                body: "quota exceeded".into(),
            },
        )
        .with_default(universal_response());
    let (_, orchestrator) = run_with(client, config());

    let err = orchestrator.analyze(&chart()).await.unwrap_err();
    match &err {
        AnalysisError::Generation { unit, source } => {
            assert_eq!(unit, "palaces 迁移宫、交友宫、官禄宫");
            assert!(matches!(source, GenerationError::Status { status: 429, .. }));
        }
        other => panic!("expected generation error, got {:?}", other),
    }
    assert!(err.to_string().contains("quota exceeded"));
}

#[tokio::test]
async fn test_concurrency_does_not_change_result() {
    let script = || {
        MockClient::available()
            .with_response(
                palace_needle(&PALACE_BATCHES[1]),
                palaces_response(&[PalaceName::Children]),
            )
            .with_default(universal_response())
    };

    let (_, sequential) = run_with(script(), config());
    let (_, parallel) = run_with(script(), config().with_max_concurrency(4));

    let a = sequential.analyze(&chart()).await.unwrap();
    let b = parallel.analyze(&chart()).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_missing_birth_time_uses_flagged_fallback() {
    let (_, orchestrator) = run_with(
        MockClient::available().with_default(universal_response()),
        config().with_fallback_birth_year(2020),
    );
    let result = orchestrator.analyze(&Chart::default()).await.unwrap();

    assert_eq!(result.birth_year, 2020);
    assert!(result.birth_year_estimated);
    assert_eq!(result.current_age, 5);
    assert_eq!(result.start_luck_age, None);
    assert!(result.warnings[0].contains("birth year"));
    // Empty chart still runs every stage; palaces come from the response.
    assert_eq!(result.palaces.len(), 12);
}

/// Client that yields before answering, so queued calls can interleave.
struct SlowClient {
    inner: MockClient,
}

#[async_trait]
impl GenerationClient for SlowClient {
    fn name(&self) -> &str {
        "slow"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.inner.generate(prompt).await
    }
}

#[tokio::test]
async fn test_sequential_retries_follow_their_batch() {
    let palace_retry = palace_needle(&[PalaceName::Spouse]);
    let topic_retry = "仅分析以下主题：学业进修。";
    let client = Arc::new(SlowClient {
        inner: MockClient::available()
            .with_response(
                palace_needle(&PALACE_BATCHES[0]),
                palaces_response(&[PalaceName::Life, PalaceName::Siblings]),
            )
            .with_response(
                "仅分析以下主题：事业财运、学业进修。",
                json!({"specialAnalysis": {"career": "c"}}).to_string(),
            )
            .with_default(universal_response()),
    });
    let orchestrator = StageOrchestrator::new(client.clone(), config());
    orchestrator.analyze(&chart()).await.unwrap();

    let prompts = client.inner.prompts();
    let at = |needle: &str| {
        prompts
            .iter()
            .position(|p| p.contains(needle))
            .unwrap_or_else(|| panic!("no prompt containing {}", needle))
    };
    assert_eq!(
        at(&palace_retry),
        at(&palace_needle(&PALACE_BATCHES[0])) + 1
    );
    assert_eq!(at(&palace_needle(&PALACE_BATCHES[1])), at(&palace_retry) + 1);
    assert_eq!(at(topic_retry), at("仅分析以下主题：事业财运、学业进修。") + 1);
    assert_eq!(
        at("仅分析以下主题：婚姻感情、健康疾厄、人际交往。"),
        at(topic_retry) + 1
    );
}

/// Client that never answers within the unit timeout.
struct StalledClient;

#[async_trait]
impl GenerationClient for StalledClient {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok("{}".to_string())
    }
}

#[tokio::test]
async fn test_unit_timeout_is_fatal() {
    let orchestrator =
        StageOrchestrator::new(Arc::new(StalledClient), config().with_unit_timeout(1));
    let err = orchestrator.analyze(&chart()).await.unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::Timeout { ref unit, seconds: 1 } if unit == "overview"
    ));
}

#[tokio::test]
async fn test_record_wraps_chart_and_analysis() {
    let (_, orchestrator) =
        run_with(MockClient::available().with_default(universal_response()), config());
    let chart = chart();
    let analysis = orchestrator.analyze(&chart).await.unwrap();

    let record = AnalysisRecord::new(Some("测试"), chart, analysis);
    assert!(record.id.ends_with("_测试"));
    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(value["parsedData"]["palaces"]["命宫"]["position"], "甲申");
    assert_eq!(value["analysis"]["startLuckYear"], 1995);
    assert_eq!(value["analysis"]["yearlyFortune"][0]["age"], 1);
}
