use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::Value;

use crate::config::{GenerationConfig, StageSettings};
use crate::error::GenerationFailure;

/// Prefixed to every prompt when the JSON format hint is on.
pub const JSON_PREAMBLE: &str =
    "Respond only with well-formed JSON. Do not add explanations or markdown. ";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub json_format: bool,
}

impl GenerationOptions {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature: temperature.clamp(0.0, 1.0),
            max_tokens: max_tokens.max(1),
            json_format: false,
        }
    }

    pub fn for_stage(stage: StageSettings, json_format: bool) -> Self {
        Self {
            json_format,
            ..Self::new(stage.temperature, stage.max_tokens)
        }
    }
}

/// One blocking request, one answer or one typed failure.
pub trait GenerationClient {
    fn generate(
        &self,
        prompt: &str,
        model: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationFailure>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

/// Client for an Ollama-style `/api/generate` endpoint.
pub struct OllamaClient {
    http: Client,
    endpoint: String,
}

impl OllamaClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, GenerationFailure> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationFailure::Transport {
                status: None,
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationFailure> {
        Self::new(&config.endpoint, Duration::from_secs(config.timeout_secs))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl GenerationClient for OllamaClient {
    fn generate(
        &self,
        prompt: &str,
        model: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationFailure> {
        let prompt = if options.json_format {
            format!("{}{}", JSON_PREAMBLE, prompt)
        } else {
            prompt.to_string()
        };

        let req = GenerateRequest {
            model,
            prompt: &prompt,
            format: options.json_format.then_some("json"),
            stream: false,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        tracing::debug!(
            endpoint = %self.endpoint,
            model,
            prompt_len = prompt.len(),
            max_tokens = options.max_tokens,
            "sending generation request"
        );

        let resp = self
            .http
            .post(&self.endpoint)
            .json(&req)
            .send()
            .map_err(|e| {
                tracing::warn!(endpoint = %self.endpoint, error = %e, "generation endpoint unreachable");
                GenerationFailure::Transport {
                    status: None,
                    message: e.to_string(),
                }
            })?;

        let status = resp.status();
        let body = resp.text().map_err(|e| GenerationFailure::Transport {
            status: Some(status.as_u16()),
            message: format!("failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            let detail = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(body);
            tracing::warn!(status = status.as_u16(), %detail, "generation endpoint returned an error status");
            return Err(GenerationFailure::Transport {
                status: Some(status.as_u16()),
                message: format!("HTTP {}: {}", status, detail),
            });
        }

        let envelope: Value = serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(error = %e, "generation response is not JSON");
            GenerationFailure::Envelope(e.to_string())
        })?;

        read_envelope(&envelope)
    }
}

/// `{"response": text}` is success; `{"error": text}` is an upstream error.
fn read_envelope(envelope: &Value) -> Result<String, GenerationFailure> {
    if let Some(text) = envelope.get("response").and_then(Value::as_str) {
        return Ok(text.to_string());
    }

    match envelope.get("error") {
        Some(Value::String(message)) => Err(GenerationFailure::Upstream(message.clone())),
        Some(other) => Err(GenerationFailure::Upstream(other.to_string())),
        None => Err(GenerationFailure::ContentMissing),
    }
}
