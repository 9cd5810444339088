//! Model catalog: model name → context window and provider variant.
//!
//! The catalog is plain data passed into the chunker and the gateway
//! factory; nothing reads a process-wide table. Unknown models fall back to
//! [`DEFAULT_CONTEXT_WINDOW`] and a provider inferred from the name prefix.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Context size assumed for models the catalog does not list.
pub const DEFAULT_CONTEXT_WINDOW: usize = 8192;

/// Which wire protocol reviews a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
    Grok,
    /// Any other backend `edgequake-llm` can build from the environment
    /// (ollama, azure, mistral, …), identified by its factory name.
    Other(String),
}

impl ProviderKind {
    /// Guess the provider from a model name.
    pub fn infer(model: &str) -> Self {
        let m = model.to_ascii_lowercase();
        if m.starts_with("claude") {
            ProviderKind::Anthropic
        } else if m.starts_with("gemini") {
            ProviderKind::Gemini
        } else if m.starts_with("grok") {
            ProviderKind::Grok
        } else {
            ProviderKind::OpenAi
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Grok => "xai",
            ProviderKind::Other(name) => name,
        }
    }

    /// Environment variable holding this provider's key, if it has one.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::Gemini => Some("GEMINI_API_KEY"),
            ProviderKind::Grok => Some("XAI_API_KEY"),
            ProviderKind::Other(_) => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "openai" => ProviderKind::OpenAi,
            "anthropic" | "claude" => ProviderKind::Anthropic,
            "gemini" | "google" => ProviderKind::Gemini,
            "xai" | "grok" => ProviderKind::Grok,
            other => ProviderKind::Other(other.to_string()),
        })
    }
}

/// What the pipeline needs to know about one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSpec {
    pub name: String,
    pub context_window: usize,
    pub provider: ProviderKind,
}

/// Model name → [`ModelSpec`] table.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: BTreeMap<String, (usize, ProviderKind)>,
    fallback_context: usize,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        use ProviderKind::*;
        let entries: &[(&str, usize, ProviderKind)] = &[
            ("gpt-4o", 128_000, OpenAi),
            ("gpt-4o-mini", 128_000, OpenAi),
            ("gpt-4.1", 1_047_576, OpenAi),
            ("gpt-4.1-mini", 1_047_576, OpenAi),
            ("gpt-4", 8192, OpenAi),
            ("gpt-3.5-turbo", 16_385, OpenAi),
            ("claude-3-opus-20240229", 200_000, Anthropic),
            ("claude-3-sonnet-20240229", 200_000, Anthropic),
            ("claude-3-5-sonnet-latest", 200_000, Anthropic),
            ("claude-sonnet-4-20250514", 200_000, Anthropic),
            ("gemini-1.5-pro-latest", 1_048_576, Gemini),
            ("gemini-2.0-flash", 1_048_576, Gemini),
            ("gemini-2.5-pro", 1_048_576, Gemini),
            ("grok-1", 8192, Grok),
            ("grok-2-latest", 131_072, Grok),
            ("grok-3", 131_072, Grok),
        ];
        let mut catalog = Self::empty();
        for (name, ctx, provider) in entries {
            catalog = catalog.with_model(*name, *ctx, provider.clone());
        }
        catalog
    }
}

impl ModelCatalog {
    /// A catalog with no entries; every lookup hits the fallback.
    pub fn empty() -> Self {
        Self {
            models: BTreeMap::new(),
            fallback_context: DEFAULT_CONTEXT_WINDOW,
        }
    }

    pub fn with_model(
        mut self,
        name: impl Into<String>,
        context_window: usize,
        provider: ProviderKind,
    ) -> Self {
        self.models.insert(name.into(), (context_window, provider));
        self
    }

    pub fn with_fallback_context(mut self, tokens: usize) -> Self {
        self.fallback_context = tokens.max(1);
        self
    }

    /// Look `model` up; `provider` overrides the listed or inferred variant.
    pub fn resolve(&self, model: &str, provider: Option<&ProviderKind>) -> ModelSpec {
        let (context_window, listed) = match self.models.get(model) {
            Some((ctx, p)) => (*ctx, p.clone()),
            None => (self.fallback_context, ProviderKind::infer(model)),
        };
        ModelSpec {
            name: model.to_string(),
            context_window,
            provider: provider.cloned().unwrap_or(listed),
        }
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    /// All listed models, sorted by name.
    pub fn specs(&self) -> Vec<ModelSpec> {
        self.models
            .iter()
            .map(|(name, (ctx, provider))| ModelSpec {
                name: name.clone(),
                context_window: *ctx,
                provider: provider.clone(),
            })
            .collect()
    }
}
