use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthInfo {
    pub status: &'static str,
    pub version: &'static str,
    pub platform: String,
    pub remote_configured: bool,
    pub metadata_configured: bool,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthInfo> {
    Json(HealthInfo {
        status: "OK",
        version: env!("CARGO_PKG_VERSION"),
        platform: state.config.platform.to_string(),
        remote_configured: state.config.remote_configured(),
        metadata_configured: state.metadata_configured,
    })
}
