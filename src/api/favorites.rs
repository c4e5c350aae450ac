use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use super::ApiResult;
use crate::models::{FavoriteMovie, Outcome};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_favorites)).route(
        "/:movie_id",
        get(is_favorite).post(add_favorite).delete(remove_favorite),
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteState {
    pub is_favorite: bool,
}

async fn list_favorites(State(state): State<Arc<AppState>>) -> Json<Vec<FavoriteMovie>> {
    Json(state.favorites.get_favorites().await)
}

async fn is_favorite(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<String>,
) -> Json<FavoriteState> {
    Json(FavoriteState {
        is_favorite: state.favorites.is_favorite(&movie_id).await,
    })
}

async fn add_favorite(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<String>,
) -> ApiResult<Outcome<()>> {
    state.favorites.add_favorite(&movie_id).await?;
    Ok(Json(Outcome::done()))
}

async fn remove_favorite(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<String>,
) -> ApiResult<Outcome<()>> {
    state.favorites.remove_favorite(&movie_id).await?;
    Ok(Json(Outcome::done()))
}
