use axum::extract::State;
use axum::response::{IntoResponse, Response};

use crate::routes::AppState;
use crate::utils::response::success;

/// Operational view of the lifecycle scheduler: whether it runs, what the
/// last tick did, and whether the database carries its own sweep job.
pub async fn lifecycle_status(State(state): State<AppState>) -> Response {
    let status = state.lifecycle.status().await;
    success(status, "Lifecycle status retrieved").into_response()
}
