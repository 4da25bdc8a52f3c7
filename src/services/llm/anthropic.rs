/// Anthropic Messages API client
///
/// POST {api_url}/v1/messages with the prompt as a single user turn; the
/// reply text is the concatenation of the `text` content blocks.
use crate::{
    error::{AppError, AppResult},
    models::LlmVendor,
    services::llm::CompletionClient,
};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct AnthropicClient {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicClient {
    pub fn new(http_client: HttpClient, api_key: String, api_url: String, model: String) -> Self {
        Self {
            http_client,
            api_key,
            api_url,
            model,
        }
    }
}

#[async_trait::async_trait]
impl CompletionClient for AnthropicClient {
    fn vendor(&self) -> LlmVendor {
        LlmVendor::Anthropic
    }

    async fn complete(&self, prompt: &str, max_tokens: u32) -> AppResult<String> {
        let url = format!("{}/v1/messages", self.api_url);

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&json!({
                "model": self.model,
                "max_tokens": max_tokens,
                "messages": [{ "role": "user", "content": prompt }]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Anthropic API returned status {}: {}",
                status, body
            )));
        }

        let reply: MessagesResponse = response.json().await?;
        let text: String = reply.content.into_iter().filter_map(|b| b.text).collect();

        if text.trim().is_empty() {
            return Err(AppError::MalformedResponse(
                "Anthropic reply contained no text".to_string(),
            ));
        }

        tracing::debug!(model = %self.model, chars = text.len(), "Anthropic completion received");
        Ok(text)
    }
}
