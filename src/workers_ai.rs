//! Workers AI REST client, optionally routed through an AI gateway.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::RelayConfig;
use crate::model::{ChatMessage, ModelError, ModelRequest, VisionModel};

const SKIP_CACHE_HEADER: &str = "cf-aig-skip-cache";
const CACHE_TTL_HEADER: &str = "cf-aig-cache-ttl";
const LOGGED_BODY_CHARS: usize = 500;

#[derive(Serialize)]
struct RunPayload<'a> {
    messages: &'a [ChatMessage],
    image: &'a [u8],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct RunEnvelope {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    result: Option<RunResult>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct RunResult {
    response: Option<String>,
}

fn default_success() -> bool {
    true
}

pub struct WorkersAiClient {
    http: reqwest::Client,
    url: String,
    api_token: String,
    model: String,
}

impl WorkersAiClient {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: run_url(config),
            api_token: config.api_token.clone(),
            model: config.model.clone(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Direct account URL, or the gateway URL when a gateway is configured.
pub fn run_url(config: &RelayConfig) -> String {
    let model = config.model.trim_start_matches('/');
    match config.gateway_id.as_deref().filter(|id| !id.is_empty()) {
        Some(gateway) => format!(
            "{}/{}/{}/workers-ai/{}",
            config.gateway_base.trim_end_matches('/'),
            config.account_id,
            gateway,
            model
        ),
        None => format!(
            "{}/accounts/{}/ai/run/{}",
            config.api_base.trim_end_matches('/'),
            config.account_id,
            model
        ),
    }
}

/// At most `max` chars of `body`, cut on a char boundary.
fn excerpt(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

fn extract_text(body: &str) -> Result<String, ModelError> {
    let envelope: RunEnvelope = serde_json::from_str(body)
        .map_err(|e| ModelError::MalformedResponse(e.to_string()))?;

    if !envelope.success {
        let errors = serde_json::to_string(&envelope.errors).unwrap_or_default();
        return Err(ModelError::MalformedResponse(format!(
            "success=false errors={errors}"
        )));
    }

    envelope
        .result
        .and_then(|r| r.response)
        .ok_or_else(|| ModelError::MalformedResponse("no result.response field".to_string()))
}

#[async_trait]
impl VisionModel for WorkersAiClient {
    fn name(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, request), fields(model = %self.model, image_bytes = request.image.len()))]
    async fn run(&self, request: ModelRequest) -> Result<String, ModelError> {
        let payload = RunPayload {
            messages: &request.messages,
            image: &request.image,
            max_tokens: request.decoding.max_tokens,
            temperature: request.decoding.temperature,
        };

        let mut builder = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_token)
            .json(&payload);

        builder = if request.cache.enabled {
            builder.header(CACHE_TTL_HEADER, request.cache.ttl.as_secs().to_string())
        } else {
            builder.header(SKIP_CACHE_HEADER, "true")
        };

        debug!("Sending request to {}", self.url);
        let response = builder.send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!("Model returned {}: {}", status, excerpt(&body, LOGGED_BODY_CHARS));
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = extract_text(&body)?;
        info!("Model returned {} chars", text.len());
        Ok(text)
    }
}
