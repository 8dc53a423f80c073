//! Live channel endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;

use super::registry::Targets;
use crate::state::AppState;

/// Open a live channel and send it the current state.
pub(crate) async fn live_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (sender, stream) = state.live.subscribe();
    state.live.send_change(Targets::One(&sender));
    tracing::debug!(
        id = sender.id(),
        subscribers = state.live.subscribers().len(),
        "Live channel connected"
    );
    stream
}
