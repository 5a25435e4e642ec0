use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Catalog operations open to every authenticated account regardless of role. The router is
/// wrapped in the authentication route layer in `create_router`, and each handler also takes
/// the `AuthUser` extractor.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/auth/me
        .route("/api/auth/me", get(handlers::get_me))
        // GET/POST /api/sweets
        // Full listing (ordered by id) and creation.
        .route(
            "/api/sweets",
            get(handlers::list_sweets).post(handlers::create_sweet),
        )
        // GET /api/sweets/search?name=&category=&min_price=&max_price=
        .route("/api/sweets/search", get(handlers::search_sweets))
        // PUT /api/sweets/{id}
        // Full replace of the mutable fields.
        .route("/api/sweets/{id}", put(handlers::update_sweet))
        // POST /api/sweets/{id}/purchase
        // Atomic decrement; fails with insufficient_stock rather than going negative.
        .route("/api/sweets/{id}/purchase", post(handlers::purchase_sweet))
}
