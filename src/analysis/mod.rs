//! Chart analysis pipeline
//!
//! Turns a parsed [`Chart`](crate::chart::Chart) into an [`AnalysisResult`]
//! by driving many small requests against a
//! [`GenerationClient`](crate::llm::GenerationClient).
//!
//! # Architecture
//!
//! - **GenerationUnit**: one prompt built from the chart, one expected JSON key
//! - **StageOrchestrator**: runs the stages in order with bounded concurrency,
//!   per-call timeouts and a single gap-filling retry per missing palace/topic
//! - **ResultMerger**: folds unit responses into the aggregate, deduplicates the
//!   yearly series, derives birth year / age / start-of-luck fields
//!
//! # Stages
//!
//! 1. overview (`overall`)
//! 2. four palace batches of three (`palaces`)
//! 3. yearly fortune in age chunks from 1 to the current age (`yearlyFortune`)
//! 4. two topic batches (`specialAnalysis`)
//! 5. suggestions and key events (`suggestions`, `keyEvents`)
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ziwei::analysis::{AnalysisConfig, StageOrchestrator};
//! use ziwei::llm::GeminiClient;
//!
//! let chart = ziwei::chart::parse(&report_text);
//! let client = Arc::new(GeminiClient::from_env()?);
//! let orchestrator = StageOrchestrator::new(client, AnalysisConfig::default());
//! let analysis = orchestrator.analyze(&chart).await?;
//! ```

mod merger;
mod orchestrator;
mod types;
mod unit;

pub use merger::ResultMerger;
pub use orchestrator::{StageOrchestrator, PALACE_BATCHES, TOPIC_BATCHES};
pub use types::{AnalysisConfig, AnalysisError, AnalysisResult, Topic, YearlyFortuneEntry};
pub use unit::{GenerationUnit, Timeline, UnitKind};
