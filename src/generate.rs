//! Text-generation backends.
//!
//! [`Generator`] is the boundary to the language-model service. Backends
//! are selected once, at construction time, by [`create_generator`] —
//! explicit configuration, never environment sniffing at call time. The
//! crate ships:
//!
//! - **[`OpenAiCompatibleGenerator`]** — POSTs to any chat-completions
//!   endpoint (OpenAI, a local server, a proxy) chosen by `base_url`.
//! - **[`MockGenerator`]** — deterministic canned responses for tests and
//!   offline runs; scriptable per call.
//!
//! Provider failures are typed [`GenerationError`]s so the retry
//! orchestrator can surface them instead of mistaking them for quality
//! failures.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::GenerationError;

/// One request to the generation service.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// The service's reply.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub content: String,
    pub tokens_used: u32,
    pub finish_reason: String,
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Backend name for logs and diagnostics.
    fn name(&self) -> &str;

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError>;
}

/// Construct the backend named by the configuration.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>, GenerationError> {
    match config.provider.as_str() {
        "mock" => Ok(Arc::new(MockGenerator::echo())),
        "openai" => Ok(Arc::new(OpenAiCompatibleGenerator::new(config)?)),
        other => Err(GenerationError::ServiceUnavailable(format!(
            "unknown generation provider: {other}"
        ))),
    }
}

// ============ OpenAI-compatible backend ============

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct OpenAiCompatibleGenerator {
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleGenerator {
    /// Reads `OPENAI_API_KEY` once here, at construction.
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let model = config.model.clone().ok_or_else(|| {
            GenerationError::ServiceUnavailable("generation.model required".into())
        })?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            GenerationError::ServiceUnavailable("OPENAI_API_KEY not set".into())
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::ServiceUnavailable(e.to_string()))?;
        Ok(Self {
            model,
            base_url,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl Generator for OpenAiCompatibleGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.prompt },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::ServiceUnavailable(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(GenerationError::QuotaExhausted(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(GenerationError::ServiceUnavailable(format!(
                "HTTP {status} from {url}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

        let choice = payload["choices"]
            .get(0)
            .ok_or_else(|| GenerationError::MalformedResponse("no choices in response".into()))?;
        let content = choice["message"]["content"]
            .as_str()
            .ok_or_else(|| GenerationError::MalformedResponse("missing message content".into()))?
            .to_string();
        let finish_reason = choice["finish_reason"].as_str().unwrap_or("stop").to_string();
        let tokens_used = payload["usage"]["total_tokens"].as_u64().unwrap_or(0) as u32;

        Ok(GenerationResponse {
            content,
            tokens_used,
            finish_reason,
        })
    }
}

// ============ Mock backend ============

/// Deterministic generator for tests and offline runs.
///
/// With scripted responses it returns them in order (repeating the last
/// one when the script runs out); otherwise it echoes a canned rendering
/// of the prompt. Every received prompt is recorded so tests can assert
/// what callers actually sent.
pub struct MockGenerator {
    responses: Vec<Result<String, String>>,
    call_count: AtomicUsize,
    received: Mutex<Vec<String>>,
}

impl MockGenerator {
    /// Echo mode: render a draft-shaped response derived from the prompt.
    pub fn echo() -> Self {
        Self {
            responses: Vec::new(),
            call_count: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Scripted mode: return the given responses in call order. An `Err`
    /// entry simulates a service failure for that call.
    pub fn scripted(responses: Vec<Result<String, String>>) -> Self {
        Self {
            responses,
            call_count: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Number of `generate` calls made so far.
    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order.
    pub fn received_prompts(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst);
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.prompt.clone());

        if !self.responses.is_empty() {
            let index = call.min(self.responses.len() - 1);
            return match &self.responses[index] {
                Ok(content) => Ok(GenerationResponse {
                    content: content.clone(),
                    tokens_used: content.split_whitespace().count() as u32,
                    finish_reason: "stop".to_string(),
                }),
                Err(message) => Err(GenerationError::ServiceUnavailable(message.clone())),
            };
        }

        let first_line = request.prompt.lines().next().unwrap_or("").to_string();
        let content = format!("Draft responding to: {first_line}\n\nPlain prose follows.");
        Ok(GenerationResponse {
            tokens_used: content.split_whitespace().count() as u32,
            content,
            finish_reason: "stop".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            system_prompt: String::new(),
            temperature: 0.0,
            max_tokens: 128,
        }
    }

    #[tokio::test]
    async fn scripted_mock_returns_in_order() {
        let mock = MockGenerator::scripted(vec![
            Ok("first".to_string()),
            Ok("second".to_string()),
        ]);
        assert_eq!(mock.generate(request("a")).await.unwrap().content, "first");
        assert_eq!(mock.generate(request("b")).await.unwrap().content, "second");
        // Script exhausted: repeats the last entry.
        assert_eq!(mock.generate(request("c")).await.unwrap().content, "second");
        assert_eq!(mock.calls(), 3);
        assert_eq!(mock.received_prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn scripted_error_surfaces_as_service_failure() {
        let mock = MockGenerator::scripted(vec![Err("socket closed".to_string())]);
        let err = mock.generate(request("a")).await.unwrap_err();
        assert!(matches!(err, GenerationError::ServiceUnavailable(_)));
    }

    #[test]
    fn factory_rejects_unknown_provider() {
        let config = GenerationConfig {
            provider: "telegraph".to_string(),
            ..Default::default()
        };
        assert!(create_generator(&config).is_err());
    }

    #[test]
    fn factory_builds_mock() {
        let config = GenerationConfig::default();
        let generator = create_generator(&config).unwrap();
        assert_eq!(generator.name(), "mock");
    }
}
