//! Provider gateways: one review contract over several AI backends.
//!
//! ```text
//!             ┌───────────────────────────┐
//!  Chunk ───▶ │ ProviderGateway::review   │──▶ Result<Vec<Finding>, ChunkError>
//!             │   prompts::review_prompt  │
//!             │   complete()  (variant)   │
//!             │   parse::parse_findings   │
//!             └───────────────────────────┘
//! ```
//!
//! The variant is chosen once, by [`build_gateway`], from the resolved
//! [`ProviderKind`]. Variants only implement [`ProviderGateway::complete`]:
//! send two messages, return the model's text. Prompt construction and
//! parsing are shared, so every backend sees the same prompt and is held to
//! the same output contract.
//!
//! Failures are values ([`ChunkError`]), never panics. Timeouts and retries
//! are applied by the orchestrator around `review`, not here.

pub mod anthropic;
pub mod edgequake;
pub mod gemini;
pub mod openai;
pub mod parse;

pub use parse::parse_findings;

use crate::catalog::ProviderKind;
use crate::error::{ChunkError, ReviewError};
use crate::model::{Chunk, Finding};
use crate::profile::ToleranceProfile;
use crate::prompts::{review_prompt, ReviewPrompt};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A backend able to review one chunk.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Short provider name used in logs and skipped-chunk records.
    fn provider(&self) -> &str;

    fn model(&self) -> &str;

    /// System prompt override, if the gateway was configured with one.
    fn system_prompt(&self) -> Option<&str> {
        None
    }

    /// Send the prompt and return the model's raw text.
    async fn complete(&self, prompt: &ReviewPrompt) -> Result<String, ChunkError>;

    /// Build the prompt, call the backend and parse the findings.
    async fn review(
        &self,
        chunk: &Chunk,
        profile: &ToleranceProfile,
    ) -> Result<Vec<Finding>, ChunkError> {
        let prompt = review_prompt(chunk, profile, self.system_prompt());
        let raw = self.complete(&prompt).await?;
        debug!(
            "Chunk {}: {} bytes of response from {}",
            chunk.index + 1,
            raw.len(),
            self.provider()
        );
        parse_findings(&raw)
    }
}

/// Everything a gateway needs besides its variant.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub model: String,
    pub api_key: Option<String>,
    /// Base URL override (proxies, self-hosted compatibles, tests).
    pub endpoint: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: usize,
    pub system_prompt: Option<String>,
    /// Transport-level timeout; the orchestrator's per-call timeout is
    /// the one that decides skips.
    pub request_timeout: Duration,
}

impl GatewaySettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: None,
            endpoint: None,
            temperature: 0.0,
            max_output_tokens: 4096,
            system_prompt: None,
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Explicit key first, then the provider's conventional variable.
    fn resolve_key(&self, kind: &ProviderKind) -> Result<String, ReviewError> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.trim().to_string());
        }
        if let Some(var) = kind.api_key_env() {
            if let Ok(key) = std::env::var(var) {
                if !key.trim().is_empty() {
                    return Ok(key.trim().to_string());
                }
            }
            return Err(ReviewError::ProviderNotConfigured {
                provider: kind.name().to_string(),
                hint: format!("pass an API key or set {var}"),
            });
        }
        Err(ReviewError::ProviderNotConfigured {
            provider: kind.name().to_string(),
            hint: "no API key".into(),
        })
    }

    fn base_url(&self, default: &str) -> String {
        self.endpoint
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    fn http_client(&self) -> Result<reqwest::Client, ReviewError> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .pool_max_idle_per_host(16)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ReviewError::Internal(format!("Failed to create HTTP client: {e}")))
    }
}

/// Construct the gateway for `kind`.
pub fn build_gateway(
    kind: &ProviderKind,
    settings: GatewaySettings,
) -> Result<Arc<dyn ProviderGateway>, ReviewError> {
    let gateway: Arc<dyn ProviderGateway> = match kind {
        ProviderKind::OpenAi => Arc::new(openai::OpenAiGateway::openai(settings)?),
        ProviderKind::Grok => Arc::new(openai::OpenAiGateway::grok(settings)?),
        ProviderKind::Anthropic => Arc::new(anthropic::AnthropicGateway::new(settings)?),
        ProviderKind::Gemini => Arc::new(gemini::GeminiGateway::new(settings)?),
        ProviderKind::Other(name) => Arc::new(edgequake::EdgeQuakeGateway::new(name, settings)?),
    };
    debug!(
        "Using {} gateway for model {}",
        gateway.provider(),
        gateway.model()
    );
    Ok(gateway)
}

/// POST `body` and decode the JSON reply, mapping HTTP failures to
/// [`ChunkError`] variants.
pub(crate) async fn post_json(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &Value,
) -> Result<Value, ChunkError> {
    let response = request.json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = response.text().await.unwrap_or_default();
        return Err(ChunkError::from_status(
            provider,
            status.as_u16(),
            &text,
            retry_after,
        ));
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| ChunkError::MalformedResponse {
        detail: format!("{provider} reply is not JSON: {e}"),
    })
}

/// Fail with `MalformedResponse` when an expected field is missing.
pub(crate) fn missing(provider: &str, what: &str) -> ChunkError {
    ChunkError::MalformedResponse {
        detail: format!("{provider} reply has no {what}"),
    }
}
