//! Gemini `generateContent` client

use super::{GenerationClient, GenerationError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";

/// Sampling and transport settings sent with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    pub response_mime_type: String,
    /// HTTP request timeout, seconds.
    pub timeout_seconds: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            temperature: 0.8,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 8192,
            response_mime_type: "application/json".to_string(),
            timeout_seconds: 300,
        }
    }
}

impl GenerationConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Read `GEMINI_MODEL` / `GEMINI_API_BASE` over the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            if !model.trim().is_empty() {
                config.model = model.trim().to_string();
            }
        }
        if let Ok(base) = std::env::var("GEMINI_API_BASE") {
            if !base.trim().is_empty() {
                config.api_base = base.trim().to_string();
            }
        }
        config
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "contents": [
                {
                    "parts": [
                        {"text": prompt}
                    ]
                }
            ],
            "generationConfig": {
                "temperature": self.temperature,
                "topK": self.top_k,
                "topP": self.top_p,
                "maxOutputTokens": self.max_output_tokens,
                "responseMimeType": self.response_mime_type,
            }
        })
    }
}

/// Entry from the model listing endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    pub fn supports_generate_content(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == "generateContent")
    }
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

/// HTTPS client for the Gemini API.
pub struct GeminiClient {
    http: Client,
    api_key: Option<String>,
    config: GenerationConfig,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, config: GenerationConfig) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| GenerationError::Http(e.to_string()))?;
        let api_key = api_key.filter(|k| !k.trim().is_empty());
        Ok(Self {
            http,
            api_key,
            config,
        })
    }

    /// Key from `GEMINI_API_KEY`, settings from [`GenerationConfig::from_env`].
    pub fn from_env() -> Result<Self, GenerationError> {
        Self::new(std::env::var("GEMINI_API_KEY").ok(), GenerationConfig::from_env())
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    fn key(&self) -> Result<&str, GenerationError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| GenerationError::Unavailable("GEMINI_API_KEY is not set".to_string()))
    }

    fn base(&self) -> &str {
        self.config.api_base.trim_end_matches('/')
    }

    /// List the models visible to the configured key.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, GenerationError> {
        let url = format!("{}/models?key={}", self.base(), self.key()?);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;
        Ok(list.models)
    }
}

/// Concatenated text parts of the first candidate.
fn response_text(body: &Value) -> Result<String, GenerationError> {
    let candidate = body
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first());

    let Some(candidate) = candidate else {
        if let Some(reason) = body
            .get("promptFeedback")
            .and_then(|f| f.get("blockReason"))
            .and_then(Value::as_str)
        {
            return Err(GenerationError::Blocked(reason.to_string()));
        }
        return Err(GenerationError::EmptyResponse);
    };

    let text: String = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str) {
            if reason == "SAFETY" || reason == "PROHIBITED_CONTENT" {
                return Err(GenerationError::Blocked(reason.to_string()));
            }
        }
        return Err(GenerationError::EmptyResponse);
    }
    Ok(text)
}

#[async_trait]
impl GenerationClient for GeminiClient {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base(),
            self.config.model,
            self.key()?
        );

        tracing::debug!(model = %self.config.model, prompt_chars = prompt.chars().count(), "sending generation request");

        let response = self
            .http
            .post(&url)
            .json(&self.config.request_body(prompt))
            .send()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;
        response_text(&body)
    }
}
