//! HTTP surface.
//!
//! - `POST /invocations` — submit a prompt, stream the turn's events (SSE);
//!   `/invocation` is kept as an alias. Reconnects resume via
//!   `Last-Event-ID`.
//! - `GET /ping` — health probe (public, no auth).

pub mod auth;
pub mod invocations;
pub mod ping;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the API router. Routes are split into **public** (no auth) and
/// **protected** (gated behind the bearer-token middleware when a token
/// is configured).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/ping", get(ping::ping));

    let protected = Router::new()
        .route("/invocations", post(invocations::invoke))
        // Singular alias kept for clients of the older path.
        .route("/invocation", post(invocations::invoke))
        .layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
