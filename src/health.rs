use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::embedded::{EmbeddedMongo, InstanceStatus, LifecycleState};

#[derive(Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub connection_string: Option<String>,
    pub instance: InstanceStatus,
}

pub async fn health_check(State(mongo): State<Arc<EmbeddedMongo>>) -> Json<HealthCheckResponse> {
    let instance = mongo.status().await;
    let healthy = instance.state == LifecycleState::Running
        && matches!(instance.process, Some(crate::process::ProcessState::Running));

    let response = HealthCheckResponse {
        status: if healthy { "ok" } else { "unavailable" }.to_string(),
        connection_string: mongo.connection_string().await,
        instance,
    };
    Json(response)
}

pub fn router(mongo: Arc<EmbeddedMongo>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(mongo)
}
