use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::TitleId;

/// Vendor behind an LLM-backed advisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmVendor {
    Anthropic,
    OpenAi,
    Google,
}

impl LlmVendor {
    /// Short name used in source identifiers and persisted rows
    pub fn label(&self) -> &'static str {
        match self {
            LlmVendor::Anthropic => "claude",
            LlmVendor::OpenAi => "chatgpt",
            LlmVendor::Google => "gemini",
        }
    }
}

/// Identifies which opinion source produced a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceId {
    /// General-purpose LLM advisor
    Advisor(LlmVendor),
    /// Latent-factor model over the owner's rating history
    Collaborative,
    /// LLM advisor used to backfill an under-represented category
    GenreFill(LlmVendor),
}

impl SourceId {
    pub fn is_advisor(&self) -> bool {
        matches!(self, SourceId::Advisor(_))
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceId::Advisor(vendor) => write!(f, "{}", vendor.label()),
            SourceId::Collaborative => write!(f, "cf"),
            SourceId::GenreFill(vendor) => write!(f, "{}-genre-fill", vendor.label()),
        }
    }
}

/// One source's unscored suggestion for a single generation run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Proposal {
    pub title: String,
    pub year: Option<i32>,
    pub external_id: Option<TitleId>,
    pub categories: Vec<String>,
    pub rationale: String,
    pub streaming_hint: Option<String>,
    pub source: SourceId,
}

impl Proposal {
    pub fn new(source: SourceId, title: impl Into<String>, year: Option<i32>) -> Self {
        Self {
            title: title.into(),
            year,
            external_id: None,
            categories: Vec::new(),
            rationale: String::new(),
            streaming_hint: None,
            source,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn with_external_id(mut self, id: TitleId) -> Self {
        self.external_id = Some(id);
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }
}
