use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{admin, events, health_check};
use crate::lifecycle::LifecycleScheduler;
use crate::moderation::ModerationWorker;
use crate::store::PgEventStore;

#[derive(Clone)]
pub struct AppState {
    pub store: PgEventStore,
    pub moderation: Arc<ModerationWorker>,
    pub lifecycle: Arc<LifecycleScheduler>,
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/events", post(events::submit_event).get(events::list_events))
        .route("/events/:id", get(events::get_event))
        .route("/admin/lifecycle", get(admin::lifecycle_status))
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer())
        .layer(create_cors_layer())
        .with_state(state)
}
