//! Application state shared across all route handlers.

use std::sync::Arc;

use lumen_core::{MetadataStore, QueueHandle};

use super::auth::AuthVerifier;

/// Shared application state.
///
/// All fields are cheap to clone; axum clones the state per request.
#[derive(Clone)]
pub struct AppState {
    /// Submits accepted requests to the background queue.
    pub queue: QueueHandle,
    /// Used for ownership checks before enqueueing.
    pub store: Arc<dyn MetadataStore>,
    /// Resolves bearer tokens to user ids.
    pub auth: Arc<dyn AuthVerifier>,
}

impl AppState {
    pub fn new(
        queue: QueueHandle,
        store: Arc<dyn MetadataStore>,
        auth: Arc<dyn AuthVerifier>,
    ) -> Self {
        Self { queue, store, auth }
    }
}
