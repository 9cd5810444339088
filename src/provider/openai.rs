//! OpenAI chat completions, and the xAI Grok endpoint that speaks the same
//! protocol.

use super::{missing, post_json, GatewaySettings, ProviderGateway};
use crate::catalog::ProviderKind;
use crate::error::{ChunkError, ReviewError};
use crate::prompts::ReviewPrompt;
use async_trait::async_trait;
use serde_json::{json, Value};

const OPENAI_BASE: &str = "https://api.openai.com/v1";
const XAI_BASE: &str = "https://api.x.ai/v1";

pub struct OpenAiGateway {
    provider: &'static str,
    client: reqwest::Client,
    url: String,
    api_key: String,
    settings: GatewaySettings,
    /// OpenAI renamed `max_tokens`; compatibles still expect the old name.
    max_tokens_field: &'static str,
}

impl OpenAiGateway {
    pub fn openai(settings: GatewaySettings) -> Result<Self, ReviewError> {
        Self::build(ProviderKind::OpenAi, OPENAI_BASE, "max_completion_tokens", settings)
    }

    pub fn grok(settings: GatewaySettings) -> Result<Self, ReviewError> {
        Self::build(ProviderKind::Grok, XAI_BASE, "max_tokens", settings)
    }

    fn build(
        kind: ProviderKind,
        default_base: &str,
        max_tokens_field: &'static str,
        settings: GatewaySettings,
    ) -> Result<Self, ReviewError> {
        let api_key = settings.resolve_key(&kind)?;
        let url = format!("{}/chat/completions", settings.base_url(default_base));
        Ok(Self {
            provider: if kind == ProviderKind::Grok { "xai" } else { "openai" },
            client: settings.http_client()?,
            url,
            api_key,
            settings,
            max_tokens_field,
        })
    }

    fn body(&self, prompt: &ReviewPrompt) -> Value {
        let mut body = json!({
            "model": self.settings.model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
            "temperature": self.settings.temperature,
            "response_format": {"type": "json_object"},
        });
        body[self.max_tokens_field] = json!(self.settings.max_output_tokens);
        body
    }
}

#[async_trait]
impl ProviderGateway for OpenAiGateway {
    fn provider(&self) -> &str {
        self.provider
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    fn system_prompt(&self) -> Option<&str> {
        self.settings.system_prompt.as_deref()
    }

    async fn complete(&self, prompt: &ReviewPrompt) -> Result<String, ChunkError> {
        let request = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key);
        let reply = post_json(self.provider, request, &self.body(prompt)).await?;

        reply["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| missing(self.provider, "choices[0].message.content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn prompt() -> ReviewPrompt {
        ReviewPrompt {
            chunk_index: 0,
            system: "sys".into(),
            user: "review this".into(),
        }
    }

    fn settings(url: &str) -> GatewaySettings {
        let mut s = GatewaySettings::new("gpt-4o");
        s.api_key = Some("sk-test".into());
        s.endpoint = Some(url.to_string());
        s
    }

    #[tokio::test]
    async fn returns_message_content() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-4o",
                "response_format": {"type": "json_object"},
                "max_completion_tokens": 4096,
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "chatcmpl-1",
                    "choices": [{
                        "index": 0,
                        "message": {"role": "assistant", "content": "{\"findings\":[]}"},
                        "finish_reason": "stop"
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let gw = OpenAiGateway::openai(settings(&server.url())).unwrap();
        assert_eq!(gw.complete(&prompt()).await.unwrap(), "{\"findings\":[]}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn grok_uses_max_tokens() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({"max_tokens": 4096})))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"{}"}}]}"#)
            .create_async()
            .await;

        let mut s = settings(&server.url());
        s.model = "grok-3".into();
        let gw = OpenAiGateway::grok(s).unwrap();
        assert_eq!(gw.provider(), "xai");
        assert_eq!(gw.complete(&prompt()).await.unwrap(), "{}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_key_is_auth_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Incorrect API key"}}"#)
            .create_async()
            .await;

        let gw = OpenAiGateway::openai(settings(&server.url())).unwrap();
        let err = gw.complete(&prompt()).await.unwrap_err();
        assert!(matches!(err, ChunkError::Auth { .. }), "got {err:?}");
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let gw = OpenAiGateway::openai(settings(&server.url())).unwrap();
        let err = gw.complete(&prompt()).await.unwrap_err();
        assert!(err.is_transient(), "got {err:?}");
    }

    #[tokio::test]
    async fn missing_content_is_malformed() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let gw = OpenAiGateway::openai(settings(&server.url())).unwrap();
        assert!(matches!(
            gw.complete(&prompt()).await,
            Err(ChunkError::MalformedResponse { .. })
        ));
    }
}
