use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;

use crate::server::handlers::{
    check_handler, health_handler, issue_handler, list_handler, revoke_handler, AppState,
};
use crate::server::logging::request_logging_middleware;

/// Build the application router for the Keyward server.
///
/// This is a convenience helper so `main.rs` or tests can
/// construct the router in a single call.
///
/// # Routes
///
/// ## Client endpoints
/// - `POST /check` - Validate a license, binding it on first use
///
/// ## Admin endpoints (`Authorization: Bearer <admin secret>`)
/// - `POST /admin/licenses` - Issue or re-issue a license
/// - `GET /admin/licenses` - List licenses, latest expiry first
/// - `DELETE /admin/licenses/{key}` - Revoke a license
///
/// ## Operational
/// - `GET /health` - Service and store health
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/check", post(check_handler))
        .route("/admin/licenses", post(issue_handler).get(list_handler))
        .route("/admin/licenses/:key", delete(revoke_handler))
        .route("/health", get(health_handler))
        .layer(ServiceBuilder::new().layer(middleware::from_fn(request_logging_middleware)))
        .with_state(state)
}
