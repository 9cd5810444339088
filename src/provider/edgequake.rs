//! Any backend `edgequake-llm` knows how to build (ollama, azure, mistral,
//! openrouter, …).
//!
//! Without an explicit key or endpoint the backend is configured from its
//! usual environment variables. An explicit key or endpoint is applied
//! directly for the backends that accept one; for the rest it is an error
//! rather than being dropped.

use super::{GatewaySettings, ProviderGateway};
use crate::error::{ChunkError, ReviewError};
use crate::prompts::ReviewPrompt;
use async_trait::async_trait;
use edgequake_llm::{
    ChatMessage, CompletionOptions, LLMProvider, LMStudioProvider, LlmError, MistralProvider,
    OllamaProvider, OpenRouterProvider, ProviderFactory, ProviderType,
};
use std::sync::Arc;

const MISTRAL_EMBEDDING_MODEL: &str = "mistral-embed";

pub struct EdgeQuakeGateway {
    name: String,
    inner: Arc<dyn LLMProvider>,
    settings: GatewaySettings,
}

impl EdgeQuakeGateway {
    /// Build provider `name` serving `settings.model`.
    pub fn new(name: &str, settings: GatewaySettings) -> Result<Self, ReviewError> {
        let not_configured = |hint: String| ReviewError::ProviderNotConfigured {
            provider: name.to_string(),
            hint,
        };

        let api_key = explicit(&settings.api_key);
        let endpoint = explicit(&settings.endpoint);
        let inner = if api_key.is_none() && endpoint.is_none() {
            ProviderFactory::create_llm_provider(name, &settings.model)
                .map_err(|e| not_configured(e.to_string()))?
        } else {
            let kind = ProviderType::from_str(name)
                .ok_or_else(|| not_configured(format!("unknown edgequake-llm provider '{name}'")))?;
            with_explicit(kind, name, &settings.model, api_key, endpoint)?
        };
        Ok(Self::from_provider(name, inner, settings))
    }

    /// Wrap an already-built provider.
    pub fn from_provider(
        name: impl Into<String>,
        inner: Arc<dyn LLMProvider>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            name: name.into(),
            inner,
            settings,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.settings.temperature),
            max_tokens: Some(self.settings.max_output_tokens),
            ..Default::default()
        }
    }
}

fn explicit(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Construct the backend with the caller's key and endpoint.
fn with_explicit(
    kind: ProviderType,
    name: &str,
    model: &str,
    api_key: Option<String>,
    endpoint: Option<String>,
) -> Result<Arc<dyn LLMProvider>, ReviewError> {
    let not_configured = |hint: String| ReviewError::ProviderNotConfigured {
        provider: name.to_string(),
        hint,
    };

    match (kind, api_key) {
        (ProviderType::OpenRouter, Some(key)) => {
            let mut provider = OpenRouterProvider::new(key).with_model(model);
            if let Some(url) = endpoint {
                provider = provider.with_base_url(url);
            }
            Ok(Arc::new(provider))
        }
        (ProviderType::Mistral, Some(key)) => {
            let provider =
                MistralProvider::new(key, model.to_string(), MISTRAL_EMBEDDING_MODEL.into(), endpoint)
                    .map_err(|e| not_configured(e.to_string()))?;
            Ok(Arc::new(provider))
        }
        (ProviderType::Ollama, None) => {
            let mut builder = OllamaProvider::builder().model(model);
            if let Some(url) = endpoint {
                builder = builder.host(url);
            }
            let provider = builder.build().map_err(|e| not_configured(e.to_string()))?;
            Ok(Arc::new(provider))
        }
        (ProviderType::LMStudio, None) => {
            let mut builder = LMStudioProvider::builder().model(model);
            if let Some(url) = endpoint {
                builder = builder.host(url);
            }
            let provider = builder.build().map_err(|e| not_configured(e.to_string()))?;
            Ok(Arc::new(provider))
        }
        (ProviderType::Ollama | ProviderType::LMStudio, Some(_)) => Err(not_configured(
            "this local backend takes no API key; the key was not applied".into(),
        )),
        (_, Some(_)) => Err(not_configured(
            "an explicit API key cannot be applied to this backend; \
             set its environment variable instead"
                .into(),
        )),
        (_, None) => Err(not_configured(
            "an explicit endpoint cannot be applied to this backend; \
             set its environment variable instead"
                .into(),
        )),
    }
}

/// Map an `edgequake-llm` failure onto the retry classes of [`ChunkError`].
fn chunk_error(provider: &str, e: LlmError) -> ChunkError {
    let provider = provider.to_string();
    match e {
        LlmError::AuthError(detail) => ChunkError::Auth { provider, detail },
        LlmError::RateLimited(_) => ChunkError::RateLimited {
            provider,
            retry_after_secs: None,
        },
        LlmError::Timeout => ChunkError::Timeout { ms: 0 },
        LlmError::NetworkError(detail) => ChunkError::Transport { detail },
        LlmError::SerializationError(e) => ChunkError::MalformedResponse {
            detail: e.to_string(),
        },
        LlmError::ModelNotFound(detail) => ChunkError::Status {
            provider,
            status: 404,
            detail,
        },
        LlmError::TokenLimitExceeded { .. } => ChunkError::Status {
            provider,
            status: 413,
            detail: e.to_string(),
        },
        LlmError::InvalidRequest(_) | LlmError::ConfigError(_) | LlmError::NotSupported(_) => {
            ChunkError::Status {
                provider,
                status: 400,
                detail: e.to_string(),
            }
        }
        // Server-side or unclassified failures stay retryable.
        LlmError::ApiError(_) | LlmError::ProviderError(_) | LlmError::Unknown(_) => {
            ChunkError::Status {
                provider,
                status: 502,
                detail: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl ProviderGateway for EdgeQuakeGateway {
    fn provider(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    fn system_prompt(&self) -> Option<&str> {
        self.settings.system_prompt.as_deref()
    }

    async fn complete(&self, prompt: &ReviewPrompt) -> Result<String, ChunkError> {
        let messages = vec![
            ChatMessage::system(prompt.system.as_str()),
            ChatMessage::user(prompt.user.as_str()),
        ];
        let response = self
            .inner
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| chunk_error(&self.name, e))?;
        Ok(response.content)
    }
}
