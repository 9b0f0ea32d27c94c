//! HTTP API: one protected endpoint that enqueues processing, plus health
//! checks.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
