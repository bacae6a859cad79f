//! Axum HTTP/WS API server.
//!
//! This crate provides:
//! - Multipart upload accept with 202 semantics
//! - Owner-scoped job document reads and listing
//! - WebSocket progress streaming
//! - Prometheus metrics and security headers

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod ws;

pub use auth::{AuthUser, TokenVerifier};
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
