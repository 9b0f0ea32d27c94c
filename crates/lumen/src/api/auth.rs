//! Bearer token authentication.
//!
//! Tokens are verified against Supabase Auth (`GET /auth/v1/user`); the
//! resolved user id is attached to the request as an [`AuthUser`]
//! extension for handlers.

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::time::Duration;

use lumen_core::config::{resolve_env_var, SupabaseConfig};
use lumen_core::ConfigError;

use super::error::ApiError;
use super::state::AppState;

/// Authenticated caller, inserted by [`require_auth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub String);

/// Why a token was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The token is missing, invalid or expired.
    Invalid(String),
    /// The identity provider could not be reached.
    Unavailable(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Invalid(msg) => ApiError::Unauthorized(msg),
            AuthError::Unavailable(msg) => ApiError::ServiceUnavailable(msg),
        }
    }
}

/// Resolves a bearer token to a user id.
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<String, AuthError>;
}

/// Verifies tokens with Supabase Auth using the anon key.
pub struct SupabaseAuth {
    user_url: String,
    anon_key: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SupabaseUser {
    #[serde(default)]
    id: Option<String>,
}

impl SupabaseAuth {
    pub fn from_config(config: &SupabaseConfig) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let url = resolve_env_var(&config.url);
        let anon_key = resolve_env_var(&config.anon_key);
        if url.is_none() {
            missing.push("SUPABASE_URL".to_string());
        }
        if anon_key.is_none() {
            missing.push("SUPABASE_ANON_KEY".to_string());
        }
        match (url, anon_key) {
            (Some(url), Some(anon_key)) => Ok(Self {
                user_url: format!("{}/auth/v1/user", url.trim_end_matches('/')),
                anon_key,
                client: reqwest::Client::new(),
            }),
            _ => Err(ConfigError::Missing(missing)),
        }
    }
}

#[async_trait]
impl AuthVerifier for SupabaseAuth {
    async fn verify(&self, token: &str) -> Result<String, AuthError> {
        let resp = self
            .client
            .get(&self.user_url)
            .bearer_auth(token)
            .header("apikey", &self.anon_key)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Supabase Auth request failed: {e}");
                AuthError::Unavailable("Authentication service unavailable".to_string())
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AuthError::Invalid(
                "Invalid or expired authentication token".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(AuthError::Invalid(format!("Authentication failed: {status}")));
        }

        let user: SupabaseUser = resp
            .json()
            .await
            .map_err(|e| AuthError::Invalid(format!("Authentication failed: {e}")))?;
        user.id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::Invalid("Token does not contain a user id".to_string()))
    }
}

/// Fixed token-to-user table for tests.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct StaticTokens {
    tokens: std::collections::HashMap<String, String>,
}

#[cfg(test)]
impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, token: &str, user_id: &str) -> Self {
        self.tokens.insert(token.to_string(), user_id.to_string());
        self
    }
}

#[cfg(test)]
#[async_trait]
impl AuthVerifier for StaticTokens {
    async fn verify(&self, token: &str) -> Result<String, AuthError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| {
                AuthError::Invalid("Invalid or expired authentication token".to_string())
            })
    }
}

/// Middleware that validates `Authorization: Bearer <token>`.
///
/// Returns 401 if the header is missing or the token is rejected, 503 if
/// the identity provider is unreachable.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let token = match bearer_token(&req) {
        Ok(token) => token.to_string(),
        Err(e) => return e.into_response(),
    };

    match state.auth.verify(&token).await {
        Ok(user_id) => {
            req.extensions_mut().insert(AuthUser(user_id));
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!("Rejected bearer token: {e:?}");
            ApiError::from(e).into_response()
        }
    }
}

fn bearer_token(req: &Request) -> Result<&str, ApiError> {
    let value = req
        .headers()
        .get("authorization")
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;
    let value = value
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Invalid Authorization header encoding".to_string()))?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Expected a bearer token".to_string()))
}
