use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use super::{require_admin, ApiError, ApiResult};
use crate::models::{Movie, Outcome, Trailer};
use crate::services::draft::MovieDraft;
use crate::services::trailers::find_best_trailer_url;
use crate::storage::StoreError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(list_movies).post(add_movie).delete(delete_all_movies),
        )
        .route(
            "/:id",
            get(get_movie)
                .put(edit_movie)
                .patch(update_movie)
                .delete(delete_movie),
        )
        .route("/:id/trailer", get(get_trailer))
}

#[derive(Debug, Serialize)]
pub struct MovieBody {
    pub movie: Movie,
}

async fn list_movies(State(state): State<Arc<AppState>>) -> Json<Vec<Movie>> {
    Json(state.catalog.get_movies().await)
}

async fn get_movie(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Movie> {
    state
        .catalog
        .get_movie(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::from(StoreError::NotFound("movie")))
}

async fn get_trailer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<Option<Trailer>> {
    Json(state.catalog.stored_trailer(&id).await)
}

/// Manual add. Without a typed trailer URL one is looked up by provider id,
/// then by title and year.
async fn add_movie(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<MovieDraft>,
) -> ApiResult<Outcome<MovieBody>> {
    require_admin(&state).await?;
    let mut movie = draft.validate()?;

    if movie.trailer_url.is_none() {
        movie.trailer_url = find_best_trailer_url(
            state.metadata.as_ref(),
            state.youtube.as_ref(),
            movie.tmdb_id,
            &movie.title,
            movie.year,
        )
        .await;
    }

    let movie = state.catalog.add_movie(&movie).await?;
    Ok(Json(Outcome::ok(MovieBody { movie })))
}

/// Edit replaces the row: the old id is deleted and the movie reinserted
async fn edit_movie(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(draft): Json<MovieDraft>,
) -> ApiResult<Outcome<MovieBody>> {
    require_admin(&state).await?;
    let movie = draft.validate()?;
    let movie = state.catalog.edit_movie(&id, &movie).await?;
    Ok(Json(Outcome::ok(MovieBody { movie })))
}

/// In-place update that keeps the id and its favorites
async fn update_movie(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(draft): Json<MovieDraft>,
) -> ApiResult<Outcome<MovieBody>> {
    require_admin(&state).await?;
    let patch = draft.validate()?;
    let movie = state.catalog.update_movie(&id, &patch).await?;
    Ok(Json(Outcome::ok(MovieBody { movie })))
}

async fn delete_movie(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Outcome<()>> {
    require_admin(&state).await?;
    state.catalog.delete_movie(&id).await?;
    Ok(Json(Outcome::done()))
}

async fn delete_all_movies(State(state): State<Arc<AppState>>) -> ApiResult<Outcome<()>> {
    let admin = require_admin(&state).await?;
    tracing::info!("{} is wiping the catalog", admin.email);
    state.catalog.delete_all_movies().await?;
    Ok(Json(Outcome::done()))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::api::test_support::{send, sign_in_admin, test_app};

    #[tokio::test]
    async fn test_admin_add_resolves_trailer() {
        let (app, _) = test_app().await;
        sign_in_admin(&app).await;

        let draft = json!({"title": "  Heat ", "year": "1995", "rating": "8.3", "tmdbId": 949});
        let (status, body) = send(&app, Method::POST, "/movies", Some(draft)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["movie"]["title"], "Heat");
        assert_eq!(body["movie"]["genre"], "Unknown");
        assert_eq!(
            body["movie"]["trailerUrl"],
            "https://www.youtube.com/watch?v=00000000949"
        );

        let id = body["movie"]["id"].as_str().unwrap().to_string();
        let (status, trailer) = send(&app, Method::GET, &format!("/movies/{}/trailer", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(trailer["key"], "00000000949");
        assert_eq!(trailer["site"], "YouTube");

        let (_, list) = send(&app, Method::GET, "/movies", None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_writes_need_admin() {
        let (app, _) = test_app().await;
        let draft = json!({"title": "Heat"});

        let (status, _) = send(&app, Method::POST, "/movies", Some(draft.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let creds = json!({"email": "ann@example.com", "password": "pw"});
        send(&app, Method::POST, "/auth/signup", Some(creds)).await;
        let (status, body) = send(&app, Method::POST, "/movies", Some(draft)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);

        let (status, _) = send(&app, Method::DELETE, "/movies", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_validation_and_missing_rows() {
        let (app, _) = test_app().await;
        sign_in_admin(&app).await;

        let (status, body) = send(&app, Method::POST, "/movies", Some(json!({"title": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Title is required");

        let bad_trailer = json!({"title": "Heat", "trailerUrl": "https://vimeo.com/1"});
        let (status, _) = send(&app, Method::POST, "/movies", Some(bad_trailer)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::GET, "/movies/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, trailer) = send(&app, Method::GET, "/movies/missing/trailer", None).await;
        assert!(trailer.is_null());
    }

    #[tokio::test]
    async fn test_edit_replaces_and_delete() {
        let (app, _) = test_app().await;
        sign_in_admin(&app).await;

        let (_, body) = send(&app, Method::POST, "/movies", Some(json!({"title": "Heat"}))).await;
        let old_id = body["movie"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/movies/{}", old_id),
            Some(json!({"title": "Heat", "year": "1995"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let new_id = body["movie"]["id"].as_str().unwrap().to_string();
        assert_ne!(new_id, old_id);
        assert_eq!(body["movie"]["year"], 1995);

        let (status, _) = send(&app, Method::GET, &format!("/movies/{}", old_id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            Method::PATCH,
            &format!("/movies/{}", new_id),
            Some(json!({"title": "Heat", "rating": "8.3"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["movie"]["id"], new_id.as_str());
        assert_eq!(body["movie"]["rating"], 8.3);

        let (status, _) = send(&app, Method::PATCH, "/movies/missing", Some(json!({"title": "X"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::DELETE, &format!("/movies/{}", new_id), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, list) = send(&app, Method::GET, "/movies", None).await;
        assert!(list.as_array().unwrap().is_empty());
    }
}
