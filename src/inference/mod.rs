//! Client seam for the external generative inference service.
//!
//! The stages depend on the [`GenerativeClient`] trait so tests can substitute
//! a scripted client; [`GeminiClient`] is the production implementation and
//! speaks the `generateContent` REST contract. When a project id is configured
//! it targets the regional `aiplatform` endpoint with a bearer token,
//! otherwise the public endpoint with an API key.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::InferenceConfig;
use crate::error::StageError;
use crate::models::PhotoPayload;

/// One inference call: a prompt, optional inline images, and the reply-shape
/// switches the stages care about.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub images: Vec<PhotoPayload>,
    /// Ask the service for a pure-JSON reply.
    pub force_json: bool,
    /// Enable the web-search grounding tool (price lookups).
    pub web_grounded: bool,
}

#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Identifier of the underlying model, stamped into extraction metadata.
    fn model_id(&self) -> &str;

    /// Performs one inference call and returns the raw reply text.
    /// No retry at this seam: a failure is terminal for the calling stage.
    async fn generate(&self, request: GenerateRequest) -> Result<String, StageError>;
}

pub struct GeminiClient {
    client: Client,
    config: InferenceConfig,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(config: InferenceConfig, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            config,
            timeout,
        }
    }

    fn endpoint(&self) -> String {
        match &self.config.project_id {
            Some(project) => format!(
                "https://{location}-aiplatform.googleapis.com/v1/projects/{project}/locations/{location}/publishers/google/models/{model}:generateContent",
                location = self.config.location,
                model = self.config.model,
            ),
            None => format!(
                "{}/models/{}:generateContent",
                self.config.base_url, self.config.model
            ),
        }
    }

    fn body(request: &GenerateRequest) -> Value {
        let mut parts = vec![json!({ "text": request.prompt })];
        for image in &request.images {
            parts.push(json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": image.data,
                }
            }));
        }

        let mut body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": { "temperature": 0.1 },
        });
        if request.force_json && !request.web_grounded {
            body["generationConfig"]["responseMimeType"] = json!("application/json");
        }
        if request.web_grounded {
            body["tools"] = json!([{ "google_search": {} }]);
        }
        body
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    fn model_id(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String, StageError> {
        let body = Self::body(&request);

        let mut builder = self
            .client
            .post(self.endpoint())
            .timeout(self.timeout)
            .json(&body);

        if let Some(token) = &self.config.access_token {
            builder = builder.bearer_auth(token);
        } else if let Some(key) = &self.config.api_key {
            builder = builder.query(&[("key", key.as_str())]);
        }

        debug!(model = %self.config.model, images = request.images.len(), "Calling inference service");

        let response = builder
            .send()
            .await
            .map_err(|e| StageError::Inference(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(StageError::Inference(format!(
                "status {status}: {}",
                detail.chars().take(300).collect::<String>()
            )));
        }

        let reply: GenerateResponse = response
            .json()
            .await
            .map_err(|e| StageError::Inference(e.to_string()))?;

        let text = reply
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .map(|parts| {
                parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(StageError::Inference(
                "resposta sem candidatos de texto".to_string(),
            ));
        }

        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Strips common markdown code-fence wrapping from a service reply so the
/// fenced and unfenced forms of the same JSON parse identically.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}
