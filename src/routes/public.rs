use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that need no bearer token. Registration always creates a regular account;
/// admin rights are never granted through this surface.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /
        .route("/", get(handlers::root))
        // GET /health
        // Liveness check for load balancers. Does not touch the store.
        .route("/health", get(|| async { "ok" }))
        // POST /api/auth/register
        // JSON {email, password} -> {id, email}; 409 on a duplicate email.
        .route("/api/auth/register", post(handlers::register_user))
        // POST /api/auth/login
        // Form-encoded username/password -> {access_token, token_type: "bearer"}.
        .route("/api/auth/login", post(handlers::login))
}
