//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.thumbnail.size == 0 {
            return Err(ConfigError::ValidationError(
                "thumbnail.size must be > 0".into(),
            ));
        }
        if !(1..=100).contains(&self.thumbnail.quality) {
            return Err(ConfigError::ValidationError(
                "thumbnail.quality must be between 1 and 100".into(),
            ));
        }
        if self.colors.count == 0 {
            return Err(ConfigError::ValidationError(
                "colors.count must be > 0".into(),
            ));
        }
        if self.colors.bucket_size == 0 {
            return Err(ConfigError::ValidationError(
                "colors.bucket_size must be > 0".into(),
            ));
        }
        if self.vision.tag_count == 0 {
            return Err(ConfigError::ValidationError(
                "vision.tag_count must be > 0".into(),
            ));
        }
        if !matches!(self.vision.provider.as_str(), "openai" | "anthropic") {
            return Err(ConfigError::ValidationError(format!(
                "vision.provider must be \"openai\" or \"anthropic\", got \"{}\"",
                self.vision.provider
            )));
        }
        if self.queue.workers == 0 {
            return Err(ConfigError::ValidationError(
                "queue.workers must be > 0".into(),
            ));
        }
        if self.queue.buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "queue.buffer_size must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        let timeouts = [
            ("limits.download_timeout_ms", self.limits.download_timeout_ms),
            ("limits.upload_timeout_ms", self.limits.upload_timeout_ms),
            ("limits.llm_timeout_ms", self.limits.llm_timeout_ms),
            ("limits.decode_timeout_ms", self.limits.decode_timeout_ms),
            ("limits.store_timeout_ms", self.limits.store_timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!("{name} must be > 0")));
            }
        }
        Ok(())
    }
}
