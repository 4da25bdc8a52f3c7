//! LLM-backed opinion sources.
//!
//! Every vendor shares one prompt and one response contract; only the
//! transport differs, behind [`CompletionClient`].

use std::sync::Arc;

use reqwest::Client as HttpClient;

use crate::{
    config::Config,
    error::AppResult,
    models::{LlmVendor, Proposal, SourceId, TasteContext},
    services::sources::OpinionSource,
};

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod prompt;
pub mod response;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

const ADVISOR_MAX_TOKENS: u32 = 2000;
const FILL_MAX_TOKENS: u32 = 1500;

/// Vendor transport: one prompt in, raw reply text out
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    fn vendor(&self) -> LlmVendor;

    async fn complete(&self, prompt: &str, max_tokens: u32) -> AppResult<String>;
}

/// An opinion source that asks a language model for picks
pub struct LlmAdvisor {
    id: SourceId,
    client: Arc<dyn CompletionClient>,
    max_tokens: u32,
}

impl LlmAdvisor {
    /// General advisor taking part in the fan-out
    pub fn advisor(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            id: SourceId::Advisor(client.vendor()),
            client,
            max_tokens: ADVISOR_MAX_TOKENS,
        }
    }

    /// Category backfill source used by the diversity pass
    pub fn genre_fill(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            id: SourceId::GenreFill(client.vendor()),
            client,
            max_tokens: FILL_MAX_TOKENS,
        }
    }
}

#[async_trait::async_trait]
impl OpinionSource for LlmAdvisor {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn try_propose(&self, context: &TasteContext, count: usize) -> AppResult<Vec<Proposal>> {
        let prompt = prompt::build(context, count);
        let raw = self.client.complete(&prompt, self.max_tokens).await?;
        let picks = response::parse_picks(&raw)?;

        let proposals = picks
            .into_iter()
            .take(count)
            .map(|pick| {
                let mut proposal = Proposal::new(self.id, pick.title.trim(), pick.year)
                    .with_rationale(pick.reasoning.unwrap_or_default())
                    .with_categories(pick.genres);
                proposal.streaming_hint = pick.streaming.filter(|s| !s.trim().is_empty());
                proposal
            })
            .collect();

        Ok(proposals)
    }
}

/// Builds one advisor per vendor whose credential is configured
pub fn advisors_from_config(config: &Config, http_client: &HttpClient) -> Vec<Arc<dyn OpinionSource>> {
    let mut advisors: Vec<Arc<dyn OpinionSource>> = Vec::new();

    if let Some(key) = &config.anthropic_api_key {
        advisors.push(Arc::new(LlmAdvisor::advisor(Arc::new(AnthropicClient::new(
            http_client.clone(),
            key.clone(),
            config.anthropic_api_url.clone(),
            config.anthropic_model.clone(),
        )))));
    }
    if let Some(key) = &config.openai_api_key {
        advisors.push(Arc::new(LlmAdvisor::advisor(Arc::new(OpenAiClient::new(
            http_client.clone(),
            key.clone(),
            config.openai_api_url.clone(),
            config.openai_model.clone(),
        )))));
    }
    if let Some(key) = &config.google_api_key {
        advisors.push(Arc::new(LlmAdvisor::advisor(Arc::new(GeminiClient::new(
            http_client.clone(),
            key.clone(),
            config.google_api_url.clone(),
            config.google_model.clone(),
        )))));
    }

    if advisors.is_empty() {
        tracing::warn!("No LLM credentials configured; generation will rely on collaborative filtering only");
    } else {
        let ids: Vec<String> = advisors.iter().map(|a| a.id().to_string()).collect();
        tracing::info!(advisors = ?ids, "LLM advisors configured");
    }

    advisors
}

/// The category backfill source, available when an Anthropic key is set
pub fn fill_source_from_config(
    config: &Config,
    http_client: &HttpClient,
) -> Option<Arc<dyn OpinionSource>> {
    let key = config.anthropic_api_key.as_ref()?;
    Some(Arc::new(LlmAdvisor::genre_fill(Arc::new(AnthropicClient::new(
        http_client.clone(),
        key.clone(),
        config.anthropic_api_url.clone(),
        config.fill_model.clone(),
    )))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::test_support::empty_context;

    fn mock_client(reply: &'static str) -> MockCompletionClient {
        let mut client = MockCompletionClient::new();
        client.expect_vendor().return_const(LlmVendor::OpenAi);
        client
            .expect_complete()
            .returning(move |_, _| Ok(reply.to_string()));
        client
    }

    #[tokio::test]
    async fn test_advisor_maps_picks_to_proposals() {
        let client = mock_client(
            r#"[{"title": " Heat ", "year": 1995, "reasoning": "Crime epic.", "streaming": "", "genres": ["Crime"]},
                {"title": "Ronin", "year": 1998, "streaming": "Max"}]"#,
        );
        let advisor = LlmAdvisor::advisor(Arc::new(client));

        let proposals = advisor.try_propose(&empty_context(), 10).await.unwrap();

        assert_eq!(advisor.id(), SourceId::Advisor(LlmVendor::OpenAi));
        assert_eq!(proposals.len(), 2);
        assert_eq!(proposals[0].title, "Heat");
        assert_eq!(proposals[0].rationale, "Crime epic.");
        assert_eq!(proposals[0].categories, vec!["Crime"]);
        assert_eq!(proposals[0].streaming_hint, None);
        assert_eq!(proposals[1].streaming_hint.as_deref(), Some("Max"));
    }

    #[tokio::test]
    async fn test_advisor_truncates_to_requested_count() {
        let client = mock_client(r#"[{"title": "A"}, {"title": "B"}, {"title": "C"}]"#);
        let advisor = LlmAdvisor::advisor(Arc::new(client));

        let proposals = advisor.try_propose(&empty_context(), 2).await.unwrap();
        assert_eq!(proposals.len(), 2);
    }

    #[tokio::test]
    async fn test_advisor_surfaces_malformed_reply() {
        let client = mock_client("I cannot help with that.");
        let advisor = LlmAdvisor::advisor(Arc::new(client));

        let result = advisor.try_propose(&empty_context(), 5).await;
        assert!(matches!(result, Err(AppError::MalformedResponse(_))));
    }

    #[test]
    fn test_genre_fill_identity() {
        let mut client = MockCompletionClient::new();
        client.expect_vendor().return_const(LlmVendor::Anthropic);

        let source = LlmAdvisor::genre_fill(Arc::new(client));
        assert_eq!(source.id().to_string(), "claude-genre-fill");
    }

    #[test]
    fn test_advisors_only_for_configured_keys() {
        let config: Config = envy::from_iter(vec![
            ("TMDB_API_KEY".to_string(), "tmdb".to_string()),
            ("OPENAI_API_KEY".to_string(), "sk".to_string()),
        ])
        .unwrap();

        let http = HttpClient::new();
        let advisors = advisors_from_config(&config, &http);
        assert_eq!(advisors.len(), 1);
        assert_eq!(advisors[0].id(), SourceId::Advisor(LlmVendor::OpenAi));
        assert!(fill_source_from_config(&config, &http).is_none());
    }
}
