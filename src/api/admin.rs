use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{require_admin, ApiError, ApiResult};
use crate::models::Outcome;
use crate::services::seeder::{SeedStatus, SEED_COUNT_CHOICES};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/seed",
        get(seed_status).post(start_seed).delete(cancel_seed),
    )
}

#[derive(Debug, Deserialize)]
pub struct SeedRequest {
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedStarted {
    pub count: usize,
    pub choices: [usize; 5],
}

#[derive(Debug, Serialize)]
pub struct SeedCancelled {
    pub cancelled: bool,
}

async fn start_seed(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SeedRequest>,
) -> Result<(StatusCode, Json<Outcome<SeedStarted>>), ApiError> {
    let admin = require_admin(&state).await?;

    state
        .seeder
        .start(state.catalog.clone(), state.metadata.clone(), req.count)
        .await?;

    tracing::info!("{} started seeding {} movies", admin.email, req.count);
    Ok((
        StatusCode::ACCEPTED,
        Json(Outcome::ok(SeedStarted {
            count: req.count,
            choices: SEED_COUNT_CHOICES,
        })),
    ))
}

async fn seed_status(State(state): State<Arc<AppState>>) -> ApiResult<SeedStatus> {
    require_admin(&state).await?;
    Ok(Json(state.seeder.status().await))
}

async fn cancel_seed(State(state): State<Arc<AppState>>) -> ApiResult<Outcome<SeedCancelled>> {
    require_admin(&state).await?;
    let cancelled = state.seeder.cancel().await;
    Ok(Json(Outcome::ok(SeedCancelled { cancelled })))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    use crate::api::test_support::{send, sign_in_admin, test_app};

    #[tokio::test]
    async fn test_seed_runs_in_background() {
        let (app, state) = test_app().await;
        sign_in_admin(&app).await;

        let (status, body) = send(&app, Method::POST, "/admin/seed", Some(json!({"count": 10}))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["count"], 10);

        let mut status = Value::Null;
        for _ in 0..200 {
            let (_, body) = send(&app, Method::GET, "/admin/seed", None).await;
            if body["running"] == false {
                status = body;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(status["lastReport"]["added"], 10);
        assert_eq!(status["progress"]["added"], 10);
        assert_eq!(status["message"], "Added 10 movies.");
        assert_eq!(state.catalog.get_movies().await.len(), 10);

        let (_, body) = send(&app, Method::DELETE, "/admin/seed", None).await;
        assert_eq!(body["cancelled"], false);
    }

    #[tokio::test]
    async fn test_seed_rejects_bad_requests() {
        let (app, _) = test_app().await;

        let (status, _) = send(&app, Method::GET, "/admin/seed", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        sign_in_admin(&app).await;
        let (status, body) = send(&app, Method::POST, "/admin/seed", Some(json!({"count": 7}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Seed count 7 is not one of 10, 25, 50, 100, 200");
    }
}
