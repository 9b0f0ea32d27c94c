//! Route handler functions.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use lumen_core::ProcessingRequest;

use super::auth::AuthUser;
use super::error::ApiError;
use super::state::AppState;

/// Body of `POST /api/v1/images/process`.
#[derive(Debug, Deserialize)]
pub struct ProcessImageRequest {
    pub image_id: i64,
    /// Optional; must match the authenticated caller when present.
    #[serde(default)]
    pub user_id: Option<String>,
    pub original_path: String,
    pub filename: String,
}

impl ProcessImageRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.image_id <= 0 {
            return Err(ApiError::UnprocessableEntity(
                "image_id must be a positive integer".to_string(),
            ));
        }
        if self.original_path.trim().is_empty() {
            return Err(ApiError::UnprocessableEntity(
                "original_path must not be empty".to_string(),
            ));
        }
        if self.filename.trim().is_empty() {
            return Err(ApiError::UnprocessableEntity(
                "filename must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessImageResponse {
    pub status: String,
    pub image_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
}

/// `GET /health` and `GET /api/v1/health`.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// `GET /`.
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Lumen image processing API".to_string(),
        version: lumen_core::VERSION.to_string(),
    })
}

/// `POST /api/v1/images/process` - verify ownership and enqueue.
pub async fn process_image(
    State(state): State<AppState>,
    Extension(AuthUser(caller)): Extension<AuthUser>,
    body: Result<Json<ProcessImageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ProcessImageResponse>), ApiError> {
    let Json(body) = body?;
    body.validate()?;

    if body.user_id.as_deref().is_some_and(|user_id| user_id != caller) {
        return Err(ApiError::Forbidden(
            "user_id does not match the authenticated user".to_string(),
        ));
    }

    let owned = state
        .store
        .verify_ownership(body.image_id, &caller)
        .await
        .map_err(|e| {
            tracing::error!(
                image_id = body.image_id,
                error_kind = e.kind(),
                "Ownership check failed: {e}"
            );
            ApiError::ServiceUnavailable("Metadata store unavailable".to_string())
        })?;
    if !owned {
        return Err(ApiError::Forbidden(
            "You do not have permission to process this image".to_string(),
        ));
    }

    state.queue.submit(ProcessingRequest::new(
        body.image_id,
        caller.as_str(),
        body.original_path,
        body.filename,
    ))?;

    tracing::info!(image_id = body.image_id, user_id = %caller, "Enqueued image processing");

    Ok((
        StatusCode::ACCEPTED,
        Json(ProcessImageResponse {
            status: "queued".to_string(),
            image_id: body.image_id,
        }),
    ))
}
