//! Health probe.

use axum::extract::State;
use axum::response::Json;

use crate::state::AppState;

/// `GET /ping` — `Healthy` when idle, `HealthyBusy` while any turn is
/// active, plus the unix-ms timestamp of the last emitted event.
pub async fn ping(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = if state.coordinator.is_busy() {
        "HealthyBusy"
    } else {
        "Healthy"
    };
    Json(serde_json::json!({
        "status": status,
        "time_of_last_update": state.coordinator.last_update_ms(),
    }))
}
