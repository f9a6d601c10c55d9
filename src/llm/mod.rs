//! Generation service client
//!
//! The analysis pipeline talks to the text generation service only through
//! [`GenerationClient`]: a prompt goes in, free-form text comes out. The
//! text is usually a JSON object but nothing here assumes so.
//!
//! Two implementations:
//! - [`GeminiClient`]: HTTPS client for the Gemini `generateContent` API (production)
//! - [`MockClient`]: returns scripted responses (testing, offline runs)

mod gemini;

pub use gemini::{GeminiClient, GenerationConfig, ModelInfo, DEFAULT_API_BASE, DEFAULT_MODEL};

use async_trait::async_trait;
use std::sync::Mutex;

/// Errors from generation client operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("generation service not available: {0}")]
    Unavailable(String),
    #[error("request failed: {0}")]
    Http(String),
    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response contained no text")]
    EmptyResponse,
    #[error("response blocked: {0}")]
    Blocked(String),
    #[error("no scripted response for prompt: {0}")]
    NoScriptedResponse(String),
}

/// Client trait for the text generation service.
///
/// Abstracts over transport (HTTPS, mock) so the orchestrator doesn't
/// depend on how the service is reached. Constructed once and shared as
/// `Arc<dyn GenerationClient>`.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    /// Whether the client is configured well enough to attempt a call.
    async fn is_available(&self) -> bool;

    /// Send one prompt and return the raw response text.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Mock client for testing. Answers from ordered substring rules.
///
/// The first rule whose needle occurs in the prompt decides the response.
/// Prompts matching no rule get the default response, or
/// [`GenerationError::NoScriptedResponse`] when there is none. Every prompt
/// received is recorded.
pub struct MockClient {
    available: bool,
    rules: Vec<(String, Result<String, GenerationError>)>,
    default: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockClient {
    /// Create a mock client that reports as available.
    pub fn available() -> Self {
        Self {
            available: true,
            rules: Vec::new(),
            default: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock client that reports as unavailable and fails every call.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::available()
        }
    }

    /// Answer prompts containing `needle` with `response`.
    pub fn with_response(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Ok(response.into())));
        self
    }

    /// Fail prompts containing `needle` with `error`.
    pub fn with_failure(mut self, needle: impl Into<String>, error: GenerationError) -> Self {
        self.rules.push((needle.into(), Err(error)));
        self
    }

    /// Response for prompts that match no rule.
    pub fn with_default(mut self, response: impl Into<String>) -> Self {
        self.default = Some(response.into());
        self
    }

    /// Every prompt received so far, in arrival order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Number of prompts received that contain `needle`.
    pub fn calls_containing(&self, needle: &str) -> usize {
        self.prompts().iter().filter(|p| p.contains(needle)).count()
    }
}

#[async_trait]
impl GenerationClient for MockClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        if !self.available {
            return Err(GenerationError::Unavailable(
                "mock client configured as unavailable".to_string(),
            ));
        }

        let scripted = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, response)| response.clone());

        match scripted {
            Some(response) => response,
            None => self.default.clone().ok_or_else(|| {
                let head: String = prompt.chars().take(60).collect();
                GenerationError::NoScriptedResponse(head)
            }),
        }
    }
}
