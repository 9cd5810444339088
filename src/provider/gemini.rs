//! Google Gemini `generateContent`.

use super::{missing, post_json, GatewaySettings, ProviderGateway};
use crate::catalog::ProviderKind;
use crate::error::{ChunkError, ReviewError};
use crate::prompts::ReviewPrompt;
use async_trait::async_trait;
use serde_json::json;

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiGateway {
    client: reqwest::Client,
    url: String,
    api_key: String,
    settings: GatewaySettings,
}

impl GeminiGateway {
    pub fn new(settings: GatewaySettings) -> Result<Self, ReviewError> {
        let api_key = settings.resolve_key(&ProviderKind::Gemini)?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            settings.base_url(GEMINI_BASE),
            settings.model
        );
        Ok(Self {
            client: settings.http_client()?,
            url,
            api_key,
            settings,
        })
    }
}

#[async_trait]
impl ProviderGateway for GeminiGateway {
    fn provider(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    fn system_prompt(&self) -> Option<&str> {
        self.settings.system_prompt.as_deref()
    }

    async fn complete(&self, prompt: &ReviewPrompt) -> Result<String, ChunkError> {
        let body = json!({
            "systemInstruction": {"parts": [{"text": prompt.system}]},
            "contents": [{"role": "user", "parts": [{"text": prompt.user}]}],
            "generationConfig": {
                "temperature": self.settings.temperature,
                "maxOutputTokens": self.settings.max_output_tokens,
                "responseMimeType": "application/json",
            },
        });
        let request = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key);
        let reply = post_json("gemini", request, &body).await?;

        let text: String = reply["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| missing("gemini", "candidates[0].content.parts"))?
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect();
        if text.is_empty() {
            return Err(missing("gemini", "text part"));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn reads_candidate_text() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-1.5-pro-latest:generateContent")
            .match_header("x-goog-api-key", "g-test")
            .match_body(Matcher::PartialJson(json!({
                "generationConfig": {"responseMimeType": "application/json"}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "candidates": [{
                        "content": {"role": "model", "parts": [{"text": "{\"findings\":[]}"}]},
                        "finishReason": "STOP"
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let mut s = GatewaySettings::new("gemini-1.5-pro-latest");
        s.api_key = Some("g-test".into());
        s.endpoint = Some(server.url());
        let gw = GeminiGateway::new(s).unwrap();

        let prompt = ReviewPrompt {
            chunk_index: 0,
            system: "sys".into(),
            user: "review".into(),
        };
        assert_eq!(gw.complete(&prompt).await.unwrap(), "{\"findings\":[]}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn blocked_prompt_is_malformed() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", Matcher::Any)
            .with_status(200)
            .with_body(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#)
            .create_async()
            .await;

        let mut s = GatewaySettings::new("gemini-2.0-flash");
        s.api_key = Some("g-test".into());
        s.endpoint = Some(server.url());
        let gw = GeminiGateway::new(s).unwrap();
        let prompt = ReviewPrompt {
            chunk_index: 0,
            system: String::new(),
            user: String::new(),
        };
        assert!(matches!(
            gw.complete(&prompt).await,
            Err(ChunkError::MalformedResponse { .. })
        ));
    }
}
