use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;

use crate::state::AppState;

/// `GET /api/llms` - the configured model catalog, verbatim
///
/// Read on every request so hot-reloaded edits show up without a restart.
pub async fn list_llms(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let config = state.config.get();
    let llms = config.read().await.llms.clone();
    Json(llms)
}
