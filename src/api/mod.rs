use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use std::sync::Arc;

use crate::models::{Outcome, User};
use crate::services::draft::ValidationError;
use crate::services::seeder::SeedError;
use crate::storage::StoreError;
use crate::AppState;

mod admin;
mod auth;
mod favorites;
mod metadata;
mod movies;
mod system;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(system::routes())
        .nest("/auth", auth::routes())
        .nest("/movies", movies::routes())
        .nest("/favorites", favorites::routes())
        .nest("/metadata", metadata::routes()) // Admin provider lookups
        .nest("/admin", admin::routes()) // Library seeding job
}

/// Error answer of every handler: a status code and a failed `Outcome` body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Metadata provider failures are upstream errors
    pub fn provider(error: anyhow::Error) -> Self {
        tracing::warn!("Metadata provider request failed: {:#}", error);
        Self::new(StatusCode::BAD_GATEWAY, format!("{:#}", error))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(Outcome::<()>::failed(self.message))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        let status = match &error {
            StoreError::Conflict(_) => StatusCode::CONFLICT,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::UnknownAccount
            | StoreError::WrongPassword
            | StoreError::InvalidCredentials
            | StoreError::NotSignedIn => StatusCode::UNAUTHORIZED,
            StoreError::EmailNotConfirmed => StatusCode::FORBIDDEN,
            StoreError::Validation(_) => StatusCode::BAD_REQUEST,
            StoreError::Unavailable(_) | StoreError::NoBackend => StatusCode::SERVICE_UNAVAILABLE,
            StoreError::Remote(_) => StatusCode::BAD_GATEWAY,
            StoreError::Database(_) | StoreError::Serialization(_) => {
                tracing::error!("Storage error: {}", error);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, error.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error.to_string())
    }
}

impl From<SeedError> for ApiError {
    fn from(error: SeedError) -> Self {
        let status = match error {
            SeedError::AlreadyRunning => StatusCode::CONFLICT,
            SeedError::InvalidCount(_) => StatusCode::BAD_REQUEST,
        };
        Self::new(status, error.to_string())
    }
}

/// The signed-in user, who must be an administrator
pub async fn require_admin(state: &AppState) -> Result<User, ApiError> {
    let user = state
        .identity
        .current_user()
        .await
        .ok_or_else(|| ApiError::from(StoreError::NotSignedIn))?;

    if !user.is_admin() {
        tracing::warn!("Non-admin {} tried an admin operation", user.email);
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "Administrator access required",
        ));
    }
    Ok(user)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::db::test_pool;
    use crate::models::Trailer;
    use crate::services::auth::IdentityStore;
    use crate::services::catalog::CatalogStore;
    use crate::services::favorites::FavoritesStore;
    use crate::services::seeder::SeedRunner;
    use crate::services::tmdb::{MetadataSource, ProviderMovie};
    use crate::storage::{Backend, BackendResolver, MemoryKeyValueStore, SqliteBackend};
    use crate::AppState;

    pub const ADMIN_EMAIL: &str = "boss@cinevia.app";

    /// Provider that knows every id and names the movie after it
    pub struct StubProvider;

    #[async_trait]
    impl MetadataSource for StubProvider {
        async fn movie_details(&self, tmdb_id: i64) -> Result<ProviderMovie> {
            if tmdb_id == 404 {
                anyhow::bail!("TMDB request failed with status: 404 Not Found");
            }
            Ok(ProviderMovie {
                title: Some(format!("Movie {}", tmdb_id)),
                year: Some(2000),
                rating: 7.5,
                genre: "Drama".into(),
                director: "Someone".into(),
                description: String::new(),
                image: String::new(),
                tmdb_id,
            })
        }

        async fn movie_trailer(&self, tmdb_id: i64) -> Result<Trailer> {
            let key = format!("{:0>11}", tmdb_id);
            Ok(Trailer {
                url: format!("https://www.youtube.com/watch?v={}", key),
                key: Some(key),
                name: "Official Trailer".into(),
                site: "YouTube".into(),
            })
        }
    }

    pub async fn test_app() -> (Router, Arc<AppState>) {
        let local: Arc<dyn Backend> = Arc::new(SqliteBackend::new(test_pool().await));
        let resolver = Arc::new(BackendResolver::local_only(local));
        let identity = Arc::new(IdentityStore::new(
            resolver.clone(),
            Arc::new(MemoryKeyValueStore::new()),
            ADMIN_EMAIL,
        ));

        let state = Arc::new(AppState {
            config: AppConfig::for_tests(),
            identity: identity.clone(),
            catalog: Arc::new(CatalogStore::new(resolver.clone())),
            favorites: FavoritesStore::new(resolver, identity),
            metadata: Arc::new(StubProvider),
            metadata_configured: true,
            youtube: None,
            seeder: SeedRunner::new(CancellationToken::new()),
        });

        (super::routes().with_state(state.clone()), state)
    }

    pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    pub async fn sign_in_admin(app: &Router) {
        let (status, _) = send(
            app,
            Method::POST,
            "/auth/signup",
            Some(serde_json::json!({"email": ADMIN_EMAIL, "password": "pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}
