use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::ApiResult;
use crate::models::{Outcome, User};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/signup", post(sign_up))
        .route("/signin", post(sign_in))
        .route("/signout", post(sign_out))
        .route("/session", get(session))
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionBody {
    pub user: Option<User>,
}

async fn sign_up(
    State(state): State<Arc<AppState>>,
    Json(req): Json<Credentials>,
) -> ApiResult<Outcome<SessionBody>> {
    let user = state.identity.sign_up(&req.email, &req.password).await?;
    Ok(Json(Outcome::ok(SessionBody { user: Some(user) })))
}

async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(req): Json<Credentials>,
) -> ApiResult<Outcome<SessionBody>> {
    let user = state.identity.sign_in(&req.email, &req.password).await?;
    Ok(Json(Outcome::ok(SessionBody { user: Some(user) })))
}

async fn sign_out(State(state): State<Arc<AppState>>) -> ApiResult<Outcome<()>> {
    state.identity.sign_out().await?;
    Ok(Json(Outcome::done()))
}

async fn session(State(state): State<Arc<AppState>>) -> Json<SessionBody> {
    Json(SessionBody {
        user: state.identity.current_user().await,
    })
}
