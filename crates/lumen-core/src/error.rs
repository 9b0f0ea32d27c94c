//! Error types for the Lumen image processing backend.
//!
//! Errors are organized by concern so that a failed pipeline run can be
//! logged with enough context (path, stage, HTTP status) to debug it later.

use thiserror::Error;

/// Top-level error type for Lumen operations.
#[derive(Error, Debug)]
pub enum LumenError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors. Fatal at startup, never raised mid-pipeline.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Required values (credentials, endpoints) are absent
    #[error("Missing required configuration: {}", .0.join(", "))]
    Missing(Vec<String>),
}

/// Errors raised by the pipeline and its collaborators.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Referenced metadata record or storage object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage failure (transient or permanent)
    #[error("Storage error for {path}: {message}")]
    StorageIo { path: String, message: String },

    /// Metadata store (database) failure
    #[error("Metadata store error: {message}")]
    Store { message: String },

    /// Network, auth or quota failure calling the vision service
    #[error("AI service error: {message}")]
    AiService {
        message: String,
        status_code: Option<u16>,
    },

    /// Vision service answered, but with content we cannot parse
    #[error("AI response could not be parsed: {message}")]
    AiResponseParse { message: String, excerpt: String },

    /// Image decoding failed
    #[error("Decode error for {path}: {message}")]
    Decode { path: String, message: String },

    /// Thumbnail encoding failed
    #[error("Encode error for {path}: {message}")]
    Encode { path: String, message: String },

    /// Image dimensions exceed limit
    #[error("Image too large: {path} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        path: String,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// Operation timed out
    #[error("Timeout in {stage} stage after {timeout_ms}ms")]
    Timeout { stage: String, timeout_ms: u64 },
}

impl PipelineError {
    /// Stable snake_case label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::NotFound(_) => "not_found",
            PipelineError::StorageIo { .. } => "storage_io",
            PipelineError::Store { .. } => "store",
            PipelineError::AiService { .. } => "ai_service",
            PipelineError::AiResponseParse { .. } => "ai_response_parse",
            PipelineError::Decode { .. } => "decode",
            PipelineError::Encode { .. } => "encode",
            PipelineError::ImageTooLarge { .. } => "image_too_large",
            PipelineError::Timeout { .. } => "timeout",
        }
    }
}

/// Convenience type alias for Lumen results.
pub type Result<T> = std::result::Result<T, LumenError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
