//! Vision model integration for tags and descriptions.
//!
//! Providers send the image plus a prompt asking for a JSON object and hand
//! the model's raw text to [`parse_analysis`]. Transport failures surface as
//! `AiService`; text that is not the requested JSON surfaces as
//! `AiResponseParse`.

mod anthropic;
mod openai;

pub use anthropic::AnthropicVision;
pub use openai::OpenAiVision;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

use crate::config::{resolve_env_var, VisionConfig};
use crate::error::{ConfigError, PipelineError, PipelineResult};
use crate::types::VisionAnalysis;

/// System instruction shared by all providers.
pub(crate) const SYSTEM_PROMPT: &str =
    "You are a world-class visual analyst. Always respond with valid JSON only.";

/// Base64-encoded image ready to send to a vision API.
#[derive(Debug, Clone)]
pub struct ImageInput {
    /// Base64-encoded image bytes
    pub data: String,
    /// MIME type (e.g., "image/jpeg", "image/png")
    pub media_type: String,
}

impl ImageInput {
    pub fn from_bytes(bytes: &[u8], media_type: &str) -> Self {
        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            media_type: media_type.to_string(),
        }
    }

    /// Return a data URL suitable for OpenAI-style APIs.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

/// A service that describes and tags images.
#[async_trait]
pub trait VisionService: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Ask for at most `tag_count` tags and a one-sentence description.
    async fn analyze(&self, image: &ImageInput, tag_count: usize) -> PipelineResult<VisionAnalysis>;
}

/// The user prompt asking for `tag_count` tags.
pub fn analysis_prompt(tag_count: usize) -> String {
    format!(
        "You are assisting with an AI-powered photo gallery. \
         Describe the image in one concise, vivid sentence (max 35 words). \
         Return at most {tag_count} short keyword tags (single or double words) \
         describing the most important concepts. \
         Respond strictly as valid JSON with keys: \
         description (string) and tags (array of strings)."
    )
}

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Option<Vec<serde_json::Value>>,
}

/// Parse the model's text into an analysis.
///
/// Markdown code fences around the JSON are tolerated; non-string tags are
/// dropped. Anything else that is not a JSON object is a parse error.
pub fn parse_analysis(text: &str) -> PipelineResult<VisionAnalysis> {
    let body = strip_code_fence(text);
    let raw: RawAnalysis = serde_json::from_str(body).map_err(|e| PipelineError::AiResponseParse {
        message: e.to_string(),
        excerpt: text.chars().take(200).collect(),
    })?;

    let tags: Vec<String> = raw
        .tags
        .unwrap_or_default()
        .into_iter()
        .filter_map(|tag| match tag {
            serde_json::Value::String(s) => Some(s),
            _ => None,
        })
        .collect();
    let description = raw.description.unwrap_or_default().trim().to_string();

    if tags.is_empty() {
        tracing::warn!("Vision response returned no tags");
    }
    if description.is_empty() {
        tracing::warn!("Vision response returned no description");
    }

    Ok(VisionAnalysis { tags, description })
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence.
    let rest = rest
        .trim_start_matches(|c: char| c.is_ascii_alphanumeric())
        .trim();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Trim, drop empties, deduplicate case-insensitively (first spelling wins)
/// and cap at `max` tags.
pub fn normalize_tags(tags: Vec<String>, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_lowercase()))
        .take(max)
        .collect()
}

/// Map a reqwest transport failure to a pipeline error.
pub(crate) fn transport_error(
    provider: &str,
    timeout: Duration,
    e: reqwest::Error,
) -> PipelineError {
    if e.is_timeout() {
        PipelineError::Timeout {
            stage: "analysis".to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        PipelineError::AiService {
            message: format!("{provider} request failed: {e}"),
            status_code: None,
        }
    }
}

/// Factory that creates the configured provider.
pub struct VisionProviderFactory;

impl VisionProviderFactory {
    /// Create the provider named by `config.provider`.
    pub fn create(
        config: &VisionConfig,
        timeout: Duration,
    ) -> Result<Box<dyn VisionService>, ConfigError> {
        match config.provider.as_str() {
            "openai" => {
                let cfg = &config.openai;
                let api_key = resolve_env_var(&cfg.api_key)
                    .ok_or_else(|| ConfigError::Missing(vec!["OPENAI_API_KEY".to_string()]))?;
                Ok(Box::new(
                    OpenAiVision::new(&api_key, &cfg.model, timeout)
                        .with_endpoint(&cfg.endpoint)
                        .with_max_tokens(config.max_tokens),
                ))
            }
            "anthropic" => {
                let cfg = &config.anthropic;
                let api_key = resolve_env_var(&cfg.api_key)
                    .ok_or_else(|| ConfigError::Missing(vec!["ANTHROPIC_API_KEY".to_string()]))?;
                Ok(Box::new(
                    AnthropicVision::new(&api_key, &cfg.model, timeout)
                        .with_max_tokens(config.max_tokens),
                ))
            }
            other => Err(ConfigError::ValidationError(format!(
                "Unknown vision provider: {other}"
            ))),
        }
    }
}
