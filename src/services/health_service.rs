use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report coordinator liveness and the number of open connections.
pub fn health_status(state: &SharedState) -> HealthResponse {
    let connections = state.connections().len();
    if state.coordinator().is_running() {
        HealthResponse::ok(connections)
    } else {
        warn!("game coordinator is not running (degraded mode)");
        HealthResponse::degraded(connections)
    }
}
