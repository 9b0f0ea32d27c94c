//! Environment overrides and credential resolution.

use crate::error::ConfigError;

use super::Config;

/// Resolve `${ENV_VAR}` references in config strings.
///
/// Plain values pass through; empty values and unset variables are `None`.
pub fn resolve_env_var(value: &str) -> Option<String> {
    let resolved = if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).ok()?
    } else {
        value.to_string()
    };

    if resolved.trim().is_empty() {
        None
    } else {
        Some(resolved)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} must be a number, got '{value}'")))
}

impl Config {
    /// Apply the deployment environment variables on top of file values.
    ///
    /// `lookup` abstracts `std::env::var` so overrides can be tested without
    /// touching the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SUPABASE_URL") {
            self.supabase.url = v;
        }
        if let Some(v) = get("SUPABASE_SERVICE_ROLE_KEY") {
            self.supabase.service_key = v;
        }
        if let Some(v) = get("SUPABASE_ANON_KEY") {
            self.supabase.anon_key = v;
        }
        if let Some(v) = get("SUPABASE_STORAGE_BUCKET") {
            self.supabase.bucket = v;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.vision.openai.api_key = v;
        }
        if let Some(v) = get("OPENAI_IMAGE_MODEL") {
            self.vision.openai.model = v;
        }
        if let Some(v) = get("ANTHROPIC_API_KEY") {
            self.vision.anthropic.api_key = v;
        }
        if let Some(v) = get("VISION_PROVIDER") {
            self.vision.provider = v.trim().to_lowercase();
        }
        if let Some(v) = get("THUMBNAIL_SIZE") {
            self.thumbnail.size = parse_number("THUMBNAIL_SIZE", &v)?;
        }
        if let Some(v) = get("AI_TAG_COUNT") {
            self.vision.tag_count = parse_number("AI_TAG_COUNT", &v)?;
        }
        if let Some(v) = get("LUMEN_HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("LUMEN_PORT") {
            self.server.port = parse_number("LUMEN_PORT", &v)?;
        }
        if let Some(v) = get("LUMEN_LOG_LEVEL") {
            self.logging.level = v;
        }
        Ok(())
    }

    /// Fail fast unless every credential the service needs is present.
    ///
    /// Reports all missing values at once, by environment variable name.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();

        if resolve_env_var(&self.supabase.url).is_none() {
            missing.push("SUPABASE_URL".to_string());
        }
        if resolve_env_var(&self.supabase.service_key).is_none() {
            missing.push("SUPABASE_SERVICE_ROLE_KEY".to_string());
        }
        if resolve_env_var(&self.supabase.anon_key).is_none() {
            missing.push("SUPABASE_ANON_KEY".to_string());
        }
        match self.vision.provider.as_str() {
            "anthropic" => {
                if resolve_env_var(&self.vision.anthropic.api_key).is_none() {
                    missing.push("ANTHROPIC_API_KEY".to_string());
                }
            }
            _ => {
                if resolve_env_var(&self.vision.openai.api_key).is_none() {
                    missing.push("OPENAI_API_KEY".to_string());
                }
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResizePolicy;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_resolve_env_var() {
        assert_eq!(resolve_env_var("plain-key"), Some("plain-key".to_string()));
        assert_eq!(resolve_env_var(""), None);
        assert_eq!(resolve_env_var("   "), None);
        assert_eq!(resolve_env_var("${DEFINITELY_NOT_SET_LUMEN_123}"), None);
    }

    #[test]
    fn test_apply_env_overrides_file_values() {
        let mut config = Config::default();
        config
            .apply_env(lookup_from(&[
                ("SUPABASE_URL", "https://demo.supabase.co"),
                ("SUPABASE_STORAGE_BUCKET", "photos"),
                ("OPENAI_IMAGE_MODEL", "gpt-4o"),
                ("THUMBNAIL_SIZE", "256"),
                ("AI_TAG_COUNT", "5"),
                ("VISION_PROVIDER", "Anthropic"),
            ]))
            .unwrap();

        assert_eq!(config.supabase.url, "https://demo.supabase.co");
        assert_eq!(config.supabase.bucket, "photos");
        assert_eq!(config.vision.openai.model, "gpt-4o");
        assert_eq!(config.thumbnail.size, 256);
        assert_eq!(config.thumbnail.policy, ResizePolicy::Fit);
        assert_eq!(config.vision.tag_count, 5);
        assert_eq!(config.vision.provider, "anthropic");
    }

    #[test]
    fn test_apply_env_ignores_blank_values() {
        let mut config = Config::default();
        config
            .apply_env(lookup_from(&[("SUPABASE_STORAGE_BUCKET", "  ")]))
            .unwrap();
        assert_eq!(config.supabase.bucket, "images");
    }

    #[test]
    fn test_apply_env_rejects_non_numeric() {
        let mut config = Config::default();
        let err = config
            .apply_env(lookup_from(&[("THUMBNAIL_SIZE", "large")]))
            .unwrap_err();
        assert!(err.to_string().contains("THUMBNAIL_SIZE"));
    }

    #[test]
    fn test_require_credentials_lists_all_missing() {
        let mut config = Config::default();
        config.supabase.url = String::new();
        config.supabase.service_key = String::new();
        config.supabase.anon_key = "anon".to_string();
        config.vision.openai.api_key = String::new();

        match config.require_credentials().unwrap_err() {
            ConfigError::Missing(names) => assert_eq!(
                names,
                vec!["SUPABASE_URL", "SUPABASE_SERVICE_ROLE_KEY", "OPENAI_API_KEY"]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_require_credentials_follows_provider() {
        let mut config = Config::default();
        config.supabase.url = "https://demo.supabase.co".to_string();
        config.supabase.service_key = "service".to_string();
        config.supabase.anon_key = "anon".to_string();
        config.vision.provider = "anthropic".to_string();
        config.vision.openai.api_key = String::new();
        config.vision.anthropic.api_key = "sk-ant".to_string();

        assert!(config.require_credentials().is_ok());
    }
}
