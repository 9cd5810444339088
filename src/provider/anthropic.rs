//! Anthropic messages API.

use super::{missing, post_json, GatewaySettings, ProviderGateway};
use crate::catalog::ProviderKind;
use crate::error::{ChunkError, ReviewError};
use crate::prompts::ReviewPrompt;
use async_trait::async_trait;
use serde_json::json;

const ANTHROPIC_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicGateway {
    client: reqwest::Client,
    url: String,
    api_key: String,
    settings: GatewaySettings,
}

impl AnthropicGateway {
    pub fn new(settings: GatewaySettings) -> Result<Self, ReviewError> {
        let api_key = settings.resolve_key(&ProviderKind::Anthropic)?;
        let url = format!("{}/v1/messages", settings.base_url(ANTHROPIC_BASE));
        Ok(Self {
            client: settings.http_client()?,
            url,
            api_key,
            settings,
        })
    }
}

#[async_trait]
impl ProviderGateway for AnthropicGateway {
    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    fn system_prompt(&self) -> Option<&str> {
        self.settings.system_prompt.as_deref()
    }

    async fn complete(&self, prompt: &ReviewPrompt) -> Result<String, ChunkError> {
        let body = json!({
            "model": self.settings.model,
            "system": prompt.system,
            "messages": [{"role": "user", "content": prompt.user}],
            "max_tokens": self.settings.max_output_tokens,
            "temperature": self.settings.temperature,
        });
        let request = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        let reply = post_json("anthropic", request, &body).await?;

        // Concatenate every text block; tool/thinking blocks are ignored.
        let text: String = reply["content"]
            .as_array()
            .ok_or_else(|| missing("anthropic", "content"))?
            .iter()
            .filter(|block| block["type"] == "text")
            .filter_map(|block| block["text"].as_str())
            .collect();
        if text.is_empty() {
            return Err(missing("anthropic", "text content block"));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn gateway(url: &str) -> AnthropicGateway {
        let mut s = GatewaySettings::new("claude-3-opus-20240229");
        s.api_key = Some("sk-ant-test".into());
        s.endpoint = Some(url.to_string());
        AnthropicGateway::new(s).unwrap()
    }

    fn prompt() -> ReviewPrompt {
        ReviewPrompt {
            chunk_index: 3,
            system: "sys".into(),
            user: "review".into(),
        }
    }

    #[tokio::test]
    async fn joins_text_blocks() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "sk-ant-test")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .match_body(Matcher::PartialJson(json!({"system": "sys", "max_tokens": 4096})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "content": [
                        {"type": "text", "text": "{\"findings\":"},
                        {"type": "text", "text": "[]}"}
                    ],
                    "stop_reason": "end_turn"
                })
                .to_string(),
            )
            .create_async()
            .await;

        assert_eq!(
            gateway(&server.url()).complete(&prompt()).await.unwrap(),
            "{\"findings\":[]}"
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(429)
            .with_header("retry-after", "7")
            .with_body("slow down")
            .create_async()
            .await;

        match gateway(&server.url()).complete(&prompt()).await {
            Err(ChunkError::RateLimited {
                retry_after_secs, ..
            }) => assert_eq!(retry_after_secs, Some(7)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_content_is_malformed() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body(r#"{"content":[]}"#)
            .create_async()
            .await;

        assert!(matches!(
            gateway(&server.url()).complete(&prompt()).await,
            Err(ChunkError::MalformedResponse { .. })
        ));
    }
}
