use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::schema::StructuredOutput;
use crate::util::{json_object_slice, strip_code_blocks};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Deterministic sampling for structured extraction.
#[derive(Debug, Serialize)]
struct SamplingOptions {
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: serde_json::Value,
    options: SamplingOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Non-streaming client for Ollama's `/api/generate`.
#[derive(Clone)]
pub struct Ollama {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl Ollama {
    pub fn new(base_url: &str, model: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to build Ollama HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Completion constrained to `T`'s JSON schema, parsed into `T`.
    ///
    /// Models sometimes wrap the object in prose or code fences even with a
    /// schema attached, so the outermost `{...}` slice is parsed.
    pub async fn extract<T: StructuredOutput>(&self, prompt: &str) -> Result<T> {
        let raw = self.send(prompt, <T as StructuredOutput>::json_schema()).await?;
        let cleaned = strip_code_blocks(&raw);
        let slice = json_object_slice(cleaned)
            .ok_or_else(|| anyhow!("Model did not return a JSON object for {}", T::type_name()))?;

        serde_json::from_str(slice)
            .with_context(|| format!("Failed to parse {} from model output", T::type_name()))
    }

    async fn send(&self, prompt: &str, format: serde_json::Value) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        debug!(model = %self.model, prompt_bytes = prompt.len(), "Ollama generate request");

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format,
            options: SamplingOptions { temperature: 0.0 },
        };

        let response = self.http.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Ollama API error ({}): {}", status, error_text));
        }

        let body: GenerateResponse = response.json().await?;
        Ok(body.response.trim().to_string())
    }
}
