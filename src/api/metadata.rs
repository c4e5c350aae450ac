use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use super::{require_admin, ApiError, ApiResult};
use crate::models::Trailer;
use crate::services::draft::parse_external_id;
use crate::services::tmdb::ProviderMovie;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/movies/:tmdb_id", get(lookup_movie))
        .route("/movies/:tmdb_id/trailer", get(lookup_trailer))
}

/// Provider details to prefill the admin form
async fn lookup_movie(
    State(state): State<Arc<AppState>>,
    Path(tmdb_id): Path<String>,
) -> ApiResult<ProviderMovie> {
    require_admin(&state).await?;
    let tmdb_id = parse_external_id(&tmdb_id)?;

    let movie = state
        .metadata
        .movie_details(tmdb_id)
        .await
        .map_err(ApiError::provider)?;
    Ok(Json(movie))
}

async fn lookup_trailer(
    State(state): State<Arc<AppState>>,
    Path(tmdb_id): Path<String>,
) -> ApiResult<Trailer> {
    require_admin(&state).await?;
    let tmdb_id = parse_external_id(&tmdb_id)?;

    let trailer = state
        .metadata
        .movie_trailer(tmdb_id)
        .await
        .map_err(ApiError::provider)?;
    Ok(Json(trailer))
}
