//! Shared HTTP plumbing for the Supabase REST surfaces (storage, PostgREST).

use reqwest::{RequestBuilder, Url};

use crate::config::{resolve_env_var, SupabaseConfig};
use crate::error::ConfigError;

/// Service-role client for one Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    base_url: Url,
    service_key: String,
    http: reqwest::Client,
}

impl SupabaseClient {
    /// Build a client from config, resolving `${ENV_VAR}` values.
    pub fn from_config(config: &SupabaseConfig) -> Result<Self, ConfigError> {
        let url = resolve_env_var(&config.url)
            .ok_or_else(|| ConfigError::Missing(vec!["SUPABASE_URL".to_string()]))?;
        let service_key = resolve_env_var(&config.service_key)
            .ok_or_else(|| ConfigError::Missing(vec!["SUPABASE_SERVICE_ROLE_KEY".to_string()]))?;
        Self::new(&url, &service_key)
    }

    pub fn new(url: &str, service_key: &str) -> Result<Self, ConfigError> {
        let base_url = Url::parse(url.trim())
            .map_err(|e| ConfigError::ValidationError(format!("supabase.url is invalid: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::ValidationError(format!(
                "supabase.url is not an http(s) URL: {url}"
            )));
        }
        Ok(Self {
            base_url,
            service_key: service_key.to_string(),
            http: reqwest::Client::new(),
        })
    }

    /// Join path segments onto the project URL, percent-encoding each one.
    ///
    /// Segments containing `/` are split, so storage keys can be passed whole.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(
                segments
                    .iter()
                    .flat_map(|s| s.split('/'))
                    .filter(|s| !s.is_empty()),
            );
        }
        url
    }

    /// Attach service-role credentials to a request.
    pub fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }
}
