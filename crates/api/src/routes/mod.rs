pub mod health;
pub mod push;
pub mod reports;

use axum::Router;
use axum::extract::DefaultBodyLimit;

use crate::state::AppState;

/// Build the complete router with all routes.
pub fn create_router(state: AppState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;

    // Over-limit bodies reach the handler as a rejection and are acknowledged there.
    let push = push::router().layer(DefaultBodyLimit::max(max_body_bytes));

    Router::new()
        .merge(health::router())
        .merge(push)
        .merge(reports::router())
        .with_state(state)
}
