use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, post},
};

/// Admin Router Module
///
/// Destructive and stock-increasing operations. `create_router` wraps this router in the
/// admin route layer; the handlers additionally take the `AdminUser` extractor, so a
/// non-admin identity gets 403 and an unauthenticated one 401.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // DELETE /api/sweets/{id}
        // Shares its path with the authenticated PUT; the method routers are merged.
        .route("/api/sweets/{id}", delete(handlers::delete_sweet))
        // POST /api/sweets/{id}/restock
        // Atomic increment with no upper bound.
        .route("/api/sweets/{id}/restock", post(handlers::restock_sweet))
}
