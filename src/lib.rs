//! Ziwei: Zi Wei Dou Shu chart report parser and staged analysis engine
//!
//! Reads the plain-text outline report of a computed chart, turns it into a
//! typed [`Chart`], and drives a text generation service through a series of
//! small, independently recoverable requests to build an [`AnalysisResult`].
//!
//! # Core Concepts
//!
//! - **Chart**: twelve palaces, each with stars, indicator lines and period labels
//! - **Generation unit**: one prompt and the JSON key it should answer with
//! - **Lenient decoding**: fenced, prose-wrapped or truncated JSON is recovered
//!   where possible and degrades to a raw-text fallback otherwise
//!
//! # Example
//!
//! ```
//! let chart = ziwei::chart::parse("├命宫[甲子]\n│ ├主星 : 紫微[旺]\n");
//! assert_eq!(chart.palaces.len(), 1);
//! ```

pub mod analysis;
pub mod chart;
pub mod json_recovery;
pub mod llm;
pub mod record;

pub use analysis::{AnalysisConfig, AnalysisError, AnalysisResult, StageOrchestrator};
pub use chart::{parse, Chart, PalaceName};
pub use json_recovery::{parse_lenient, LenientParse};
pub use llm::{GeminiClient, GenerationClient, GenerationError, MockClient};
pub use record::AnalysisRecord;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
