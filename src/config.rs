//! Configuration for a review run.
//!
//! Every knob lives in [`ReviewConfig`], built through
//! [`ReviewConfigBuilder`]. Setters clamp obviously out-of-range values;
//! [`ReviewConfigBuilder::build`] rejects the ones that cannot be clamped
//! meaningfully.

use crate::catalog::{ModelCatalog, ModelSpec, ProviderKind};
use crate::chunk::DEFAULT_CHUNK_RATIO;
use crate::error::ReviewError;
use crate::progress::ProgressCallback;
use crate::provider::{GatewaySettings, ProviderGateway};
use crate::review::CancelToken;
use crate::tokens::{ByteRatioCounter, TokenCounter};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for one review run.
///
/// # Example
/// ```rust
/// use tabreview::ReviewConfig;
///
/// let config = ReviewConfig::builder()
///     .model("claude-3-opus-20240229")
///     .concurrency(2)
///     .chunk_ratio(0.75)
///     .build()
///     .unwrap();
/// assert_eq!(config.model_spec().context_window, 200_000);
/// ```
#[derive(Clone)]
pub struct ReviewConfig {
    /// Model identifier. Default: "gpt-4o".
    pub model: String,

    /// Provider override. If None, taken from the catalog or inferred from
    /// the model name.
    pub provider: Option<ProviderKind>,

    /// Credential for the provider. If None, the provider's usual
    /// environment variable is read.
    pub api_key: Option<String>,

    /// Base URL override for the provider endpoint.
    pub endpoint: Option<String>,

    /// Share of the context window available to report content. Range: (0, 1].
    /// Default: 0.85.
    pub chunk_ratio: f64,

    /// Number of chunks reviewed at once. Default: 4.
    ///
    /// Lower it when the provider answers with 429s.
    pub concurrency: usize,

    /// Per-call timeout in seconds. A call that runs longer is a transient
    /// failure. Default: 60.
    pub api_timeout_secs: u64,

    /// Retries after the first attempt for transient failures. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per retry. Default: 500.
    pub retry_backoff_ms: u64,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Response token cap per call. Default: 4096.
    pub max_output_tokens: usize,

    /// Custom system prompt. If None, uses [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Write `<stem>_review.pdf` for PDF inputs. Default: true.
    pub annotate: bool,

    /// Model → context window table.
    pub catalog: ModelCatalog,

    /// Pre-built gateway. Takes precedence over `model`/`provider`.
    pub gateway: Option<Arc<dyn ProviderGateway>>,

    /// Token estimator used by the chunker.
    pub token_counter: Arc<dyn TokenCounter>,

    pub progress_callback: Option<ProgressCallback>,

    /// Checked before each chunk is sent.
    pub cancel: CancelToken,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            provider: None,
            api_key: None,
            endpoint: None,
            chunk_ratio: DEFAULT_CHUNK_RATIO,
            concurrency: 4,
            api_timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 500,
            temperature: 0.0,
            max_output_tokens: 4096,
            system_prompt: None,
            annotate: true,
            catalog: ModelCatalog::default(),
            gateway: None,
            token_counter: Arc::new(ByteRatioCounter::default()),
            progress_callback: None,
            cancel: CancelToken::new(),
        }
    }
}

impl fmt::Debug for ReviewConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReviewConfig")
            .field("model", &self.model)
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("chunk_ratio", &self.chunk_ratio)
            .field("concurrency", &self.concurrency)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("annotate", &self.annotate)
            .field("gateway", &self.gateway.as_ref().map(|g| g.provider().to_string()))
            .finish()
    }
}

impl ReviewConfig {
    pub fn builder() -> ReviewConfigBuilder {
        ReviewConfigBuilder {
            config: Self::default(),
        }
    }

    /// Context window and provider for the configured model.
    pub fn model_spec(&self) -> ModelSpec {
        self.catalog.resolve(&self.model, self.provider.as_ref())
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Settings handed to [`crate::provider::build_gateway`].
    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            endpoint: self.endpoint.clone(),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            system_prompt: self.system_prompt.clone(),
            // Leave room for the orchestrator's own timeout to fire first.
            request_timeout: self.api_timeout() + Duration::from_secs(5),
        }
    }
}

/// Builder for [`ReviewConfig`].
pub struct ReviewConfigBuilder {
    config: ReviewConfig,
}

impl fmt::Debug for ReviewConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReviewConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ReviewConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider(mut self, provider: ProviderKind) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = Some(url.into());
        self
    }

    /// Not clamped; validated by `build`.
    pub fn chunk_ratio(mut self, ratio: f64) -> Self {
        self.config.chunk_ratio = ratio;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(10);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: usize) -> Self {
        self.config.max_output_tokens = n.max(1);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn annotate(mut self, v: bool) -> Self {
        self.config.annotate = v;
        self
    }

    pub fn catalog(mut self, catalog: ModelCatalog) -> Self {
        self.config.catalog = catalog;
        self
    }

    pub fn gateway(mut self, gateway: Arc<dyn ProviderGateway>) -> Self {
        self.config.gateway = Some(gateway);
        self
    }

    pub fn token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.config.token_counter = counter;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.config.cancel = token;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ReviewConfig, ReviewError> {
        let c = &self.config;
        if !(c.chunk_ratio > 0.0 && c.chunk_ratio <= 1.0) {
            return Err(ReviewError::InvalidConfig(format!(
                "chunk ratio must be in (0, 1], got {}",
                c.chunk_ratio
            )));
        }
        if c.model.trim().is_empty() {
            return Err(ReviewError::InvalidConfig("model must not be empty".into()));
        }
        if c.concurrency == 0 {
            return Err(ReviewError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ReviewConfig::default();
        assert_eq!(c.model, "gpt-4o");
        assert_eq!(c.chunk_ratio, 0.85);
        assert_eq!(c.concurrency, 4);
        assert_eq!(c.max_retries, 2);
        assert!(c.annotate);
        assert_eq!(c.model_spec().context_window, 128_000);
    }

    #[test]
    fn setters_clamp() {
        let c = ReviewConfig::builder()
            .concurrency(0)
            .temperature(9.0)
            .max_retries(1000)
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.max_retries, 10);
    }

    #[test]
    fn ratio_is_validated() {
        for bad in [0.0, -0.5, 1.01, f64::NAN] {
            let err = ReviewConfig::builder().chunk_ratio(bad).build().unwrap_err();
            assert_eq!(err.reason(), "invalid configuration", "ratio {bad}");
        }
        assert!(ReviewConfig::builder().chunk_ratio(1.0).build().is_ok());
    }

    #[test]
    fn empty_model_is_rejected() {
        assert!(ReviewConfig::builder().model("  ").build().is_err());
    }

    #[test]
    fn provider_override_reaches_spec() {
        let c = ReviewConfig::builder()
            .model("llama3.1")
            .provider("ollama".parse().unwrap())
            .build()
            .unwrap();
        let spec = c.model_spec();
        assert_eq!(spec.provider, ProviderKind::Other("ollama".into()));
        assert_eq!(spec.context_window, crate::catalog::DEFAULT_CONTEXT_WINDOW);
    }

    #[test]
    fn debug_redacts_key() {
        let c = ReviewConfig::builder().api_key("sk-secret").build().unwrap();
        let s = format!("{c:?}");
        assert!(!s.contains("sk-secret"));
        assert!(s.contains("<redacted>"));
    }
}
