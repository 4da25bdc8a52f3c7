//! Strict parsing of advisor replies.
//!
//! A reply must be a JSON array of picks, optionally wrapped in a single
//! markdown code fence. Anything else, including one bad entry, rejects the
//! whole reply as [`AppError::MalformedResponse`].

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};

/// One entry of the advisor response contract
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AdvisorPick {
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub streaming: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
}

fn pick_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "array",
        "items": {
            "type": "object",
            "required": ["title"],
            "properties": {
                "title": { "type": "string", "minLength": 1 },
                "year": { "type": ["integer", "null"], "minimum": 1870, "maximum": 2100 },
                "reasoning": { "type": ["string", "null"] },
                "streaming": { "type": ["string", "null"] },
                "genres": { "type": "array", "items": { "type": "string" } }
            }
        }
    })
}

/// Removes one surrounding ```/```json fence if present
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Skip the info string ("json") on the opening fence line
    match body.split_once('\n') {
        Some((_, inner)) => inner.trim(),
        None => body.trim(),
    }
}

pub fn parse_picks(raw: &str) -> AppResult<Vec<AdvisorPick>> {
    let body = strip_code_fence(raw);

    let value: Value = serde_json::from_str(body).map_err(|e| {
        AppError::MalformedResponse(format!("reply is not a JSON document: {}", e))
    })?;

    let validator = jsonschema::validator_for(&pick_schema())
        .map_err(|e| AppError::Internal(format!("Schema compilation error: {}", e)))?;
    if !validator.is_valid(&value) {
        return Err(AppError::MalformedResponse(
            "reply does not match the recommendation schema".to_string(),
        ));
    }

    Ok(serde_json::from_value(value)?)
}
