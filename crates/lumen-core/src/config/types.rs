//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Maximum accepted request body in kilobytes
    pub body_limit_kb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            body_limit_kb: 64,
        }
    }
}

/// Supabase project settings (storage, PostgREST and auth share one URL).
///
/// Secret values support `${ENV_VAR}` syntax.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://abc.supabase.co`
    pub url: String,

    /// Service-role key used for storage and database access
    pub service_key: String,

    /// Anon key used when verifying user tokens
    pub anon_key: String,

    /// Storage bucket holding originals and thumbnails
    pub bucket: String,

    /// Table holding one metadata row per image
    pub metadata_table: String,

    /// Table holding image ownership
    pub images_table: String,
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: "${SUPABASE_URL}".to_string(),
            service_key: "${SUPABASE_SERVICE_ROLE_KEY}".to_string(),
            anon_key: "${SUPABASE_ANON_KEY}".to_string(),
            bucket: "images".to_string(),
            metadata_table: "image_metadata".to_string(),
            images_table: "images".to_string(),
        }
    }
}

/// How an image is fitted into the square thumbnail box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResizePolicy {
    /// Preserve aspect ratio, longest edge equals the box size
    #[default]
    Fit,
    /// Scale to fill the box, then center-crop to exactly size x size
    Crop,
}

/// Thumbnail generation settings. Output is always JPEG.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Bounding box edge in pixels
    pub size: u32,

    /// JPEG quality (1-100)
    pub quality: u8,

    /// Fit or crop
    pub policy: ResizePolicy,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            size: 300,
            quality: 90,
            policy: ResizePolicy::Fit,
        }
    }
}

/// Dominant color extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    /// Number of colors to return
    pub count: usize,

    /// Width of each per-channel quantization bucket (1 = exact colors)
    pub bucket_size: u8,

    /// Downsample to this longest edge before counting (0 = full image)
    pub sample_size: u32,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            count: 3,
            bucket_size: 32,
            sample_size: 200,
        }
    }
}

/// Vision (captioning/tagging) provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Provider identifier: "openai" or "anthropic"
    pub provider: String,

    /// Maximum number of tags kept per image
    pub tag_count: usize,

    /// Completion token budget
    pub max_tokens: u32,

    /// OpenAI settings
    pub openai: OpenAiConfig,

    /// Anthropic settings
    pub anthropic: AnthropicConfig,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            tag_count: 8,
            max_tokens: 300,
            openai: OpenAiConfig::default(),
            anthropic: AnthropicConfig::default(),
        }
    }
}

/// OpenAI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// API key (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// Vision-capable model name
    pub model: String,

    /// Chat Completions endpoint
    pub endpoint: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: "${OPENAI_API_KEY}".to_string(),
            model: "gpt-4o-mini".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
        }
    }
}

/// Anthropic configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicConfig {
    /// API key (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// Model name
    pub model: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: "${ANTHROPIC_API_KEY}".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
        }
    }
}

/// Timeouts and input limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Storage download timeout in milliseconds
    pub download_timeout_ms: u64,

    /// Storage upload timeout in milliseconds
    pub upload_timeout_ms: u64,

    /// Vision call timeout in milliseconds
    pub llm_timeout_ms: u64,

    /// Decode + thumbnail + color extraction timeout in milliseconds
    pub decode_timeout_ms: u64,

    /// Metadata store call timeout in milliseconds
    pub store_timeout_ms: u64,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            download_timeout_ms: 30_000,
            upload_timeout_ms: 30_000,
            llm_timeout_ms: 60_000,
            decode_timeout_ms: 10_000,
            store_timeout_ms: 10_000,
            max_image_dimension: 10_000,
        }
    }
}

/// Background queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Max requests waiting for a worker
    pub buffer_size: usize,

    /// Max pipeline runs in flight at once
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            buffer_size: 100,
            workers: 4,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
