use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::{Backend, BackendKind, StoreError, ALREADY_FAVORITE, EMAIL_TAKEN};
use crate::config::RemoteConfig;
use crate::models::{
    normalize_favorite, normalize_movie, FavoriteRow, MovieRow, NewMovie, Role, User, UserRecord,
};

/// Primary tier: a hosted auth service plus a PostgREST-style table API
pub struct RemoteBackend {
    client: Client,
    url: String,
    key: String,
    session: Mutex<Option<RemoteSession>>,
    down_until: Mutex<Option<Instant>>,
    retry_after: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: AuthUser,
}

/// Sign-up answers with a session, or with the bare user when email
/// confirmation is required first
#[derive(Debug, Deserialize)]
struct SignUpResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<AuthUser>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<Value>,
}

impl ErrorBody {
    fn text(&self) -> String {
        self.message
            .as_ref()
            .or(self.msg.as_ref())
            .or(self.error_description.as_ref())
            .or(self.error.as_ref())
            .cloned()
            .unwrap_or_default()
    }

    fn code(&self) -> Option<String> {
        match &self.code {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct UserProfile<'a> {
    id: &'a str,
    email: &'a str,
    role: &'a str,
}

fn unavailable(err: reqwest::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

/// `eq.` filter value for a query string
fn eq(value: &str) -> String {
    format!("eq.{}", urlencoding::encode(value))
}

impl RemoteBackend {
    pub fn new(url: &str, key: &str, timeout: Duration, retry_after: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });

        Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            session: Mutex::new(None),
            down_until: Mutex::new(None),
            retry_after,
        }
    }

    /// Build from configuration; `None` when URL or key is missing
    pub fn from_config(config: &RemoteConfig) -> Option<Self> {
        let url = config.url.as_deref().filter(|u| !u.trim().is_empty())?;
        let key = config.anon_key.as_deref().filter(|k| !k.trim().is_empty())?;
        Some(Self::new(
            url,
            key,
            Duration::from_secs(config.timeout_secs),
            Duration::from_secs(config.retry_after_secs),
        ))
    }

    /// False while a recent transport failure is cooling down
    pub async fn is_available(&self) -> bool {
        match *self.down_until.lock().await {
            Some(until) => Instant::now() >= until,
            None => true,
        }
    }

    pub async fn mark_unreachable(&self) {
        tracing::warn!(
            "Remote backend unreachable, skipping it for {}s",
            self.retry_after.as_secs()
        );
        *self.down_until.lock().await = Some(Instant::now() + self.retry_after);
    }

    pub async fn session(&self) -> Option<RemoteSession> {
        self.session.lock().await.clone()
    }

    async fn bearer(&self) -> String {
        match &*self.session.lock().await {
            Some(session) => session.access_token.clone(),
            None => self.key.clone(),
        }
    }

    fn request(&self, method: Method, url: String, token: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.key)
            .header("X-Client-Info", "cinevia")
            .bearer_auth(token)
    }

    async fn rest(&self, method: Method, table: &str, query: &str) -> RequestBuilder {
        let token = self.bearer().await;
        let url = if query.is_empty() {
            format!("{}/rest/v1/{}", self.url, table)
        } else {
            format!("{}/rest/v1/{}?{}", self.url, table, query)
        };
        self.request(method, url, &token)
    }

    /// Send and turn failures into store errors. Transport failures and
    /// server-side outages mean the tier is unavailable; other non-2xx
    /// answers are definitive.
    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request.send().await.map_err(unavailable)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
        let message = match error.text() {
            m if m.is_empty() => format!("{} {}", status, body),
            m => m,
        };

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(StoreError::Unavailable(message));
        }
        // Foreign key violations also arrive as 409
        if error.code().as_deref() == Some("23503") {
            return Err(StoreError::NotFound("referenced row"));
        }
        if error.code().as_deref() == Some("23505") || status == StatusCode::CONFLICT {
            return Err(StoreError::Conflict(message));
        }
        Err(StoreError::Remote(message))
    }

    async fn rows(&self, request: RequestBuilder) -> Result<Vec<Value>, StoreError> {
        let response = self.send(request).await?;
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| StoreError::Unavailable(format!("unreadable response: {}", e)))
    }

    async fn select(&self, table: &str, query: &str) -> Result<Vec<Value>, StoreError> {
        let request = self.rest(Method::GET, table, query).await;
        self.rows(request).await
    }

    async fn insert<T: Serialize + Sync>(&self, table: &str, body: &T) -> Result<Vec<Value>, StoreError> {
        let request = self
            .rest(Method::POST, table, "")
            .await
            .header("Prefer", "return=representation")
            .json(body);
        self.rows(request).await
    }

    async fn delete(&self, table: &str, query: &str) -> Result<Vec<Value>, StoreError> {
        let request = self
            .rest(Method::DELETE, table, query)
            .await
            .header("Prefer", "return=representation");
        self.rows(request).await
    }

    fn movie_from(value: Value) -> Result<MovieRow, StoreError> {
        normalize_movie(value).map_err(|e| StoreError::Unavailable(format!("unreadable movie: {}", e)))
    }

    // Auth service

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, StoreError> {
        let request = self
            .request(
                Method::POST,
                format!("{}/auth/v1/signup", self.url),
                &self.key,
            )
            .json(&json!({ "email": email, "password": password }));

        let response = match self.send(request).await {
            Ok(response) => response,
            Err(StoreError::Remote(m)) | Err(StoreError::Conflict(m))
                if m.to_lowercase().contains("already registered") =>
            {
                return Err(StoreError::Conflict(EMAIL_TAKEN.to_string()));
            }
            Err(e) => return Err(e),
        };

        let body: SignUpResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(format!("unreadable sign-up response: {}", e)))?;

        let user = match (body.user, body.id) {
            (Some(user), _) => user,
            (None, Some(id)) => AuthUser {
                id,
                email: body.email,
            },
            (None, None) => return Err(StoreError::Remote("sign-up returned no user".into())),
        };

        if let Some(access_token) = body.access_token {
            *self.session.lock().await = Some(RemoteSession {
                access_token,
                refresh_token: body.refresh_token,
                user: user.clone(),
            });
        }

        Ok(user)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, StoreError> {
        let request = self
            .request(
                Method::POST,
                format!("{}/auth/v1/token?grant_type=password", self.url),
                &self.key,
            )
            .json(&json!({ "email": email, "password": password }));

        let response = match self.send(request).await {
            Ok(response) => response,
            Err(StoreError::Remote(m)) => {
                let lower = m.to_lowercase();
                return Err(if lower.contains("invalid login credentials") {
                    StoreError::InvalidCredentials
                } else if lower.contains("email not confirmed") {
                    StoreError::EmailNotConfirmed
                } else if lower.contains("user not found") {
                    StoreError::UnknownAccount
                } else {
                    StoreError::Remote(m)
                });
            }
            Err(e) => return Err(e),
        };

        let session: RemoteSession = response
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(format!("unreadable session: {}", e)))?;
        let user = session.user.clone();
        *self.session.lock().await = Some(session);
        Ok(user)
    }

    /// End the remote session. The local session is dropped even when the
    /// service cannot be told.
    pub async fn sign_out(&self) -> Result<(), StoreError> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };

        let request = self.request(
            Method::POST,
            format!("{}/auth/v1/logout", self.url),
            &session.access_token,
        );
        self.send(request).await?;
        Ok(())
    }

    /// User behind the stored session, `None` when there is no session or
    /// the service no longer accepts it
    pub async fn current_user(&self) -> Result<Option<AuthUser>, StoreError> {
        let Some(session) = self.session().await else {
            return Ok(None);
        };

        let request = self.request(
            Method::GET,
            format!("{}/auth/v1/user", self.url),
            &session.access_token,
        );
        match self.send(request).await {
            Ok(response) => response
                .json::<AuthUser>()
                .await
                .map(Some)
                .map_err(|e| StoreError::Unavailable(format!("unreadable user: {}", e))),
            Err(StoreError::Remote(_)) => {
                *self.session.lock().await = None;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn upsert_profile(&self, id: &str, email: &str, role: Role) -> Result<(), StoreError> {
        let request = self
            .rest(Method::POST, "users", "")
            .await
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&UserProfile {
                id,
                email,
                role: role.as_str(),
            });
        self.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let rows = self
            .select("users", &format!("email={}&select=id,email,role", eq(email)))
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| serde_json::from_value(row).ok()))
    }

    async fn insert_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        self.upsert_profile(&user.id, &user.email, user.role).await
    }

    async fn role_of(&self, user_id: &str) -> Result<Option<Role>, StoreError> {
        let rows = self
            .select("users", &format!("id={}&select=role", eq(user_id)))
            .await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("role"))
            .and_then(Value::as_str)
            .map(|role| Role::from(role.to_string())))
    }

    async fn register(&self, email: &str, password: &str, role: Role) -> Result<User, StoreError> {
        let auth_user = self.sign_up(email, password).await?;

        // The profile row only carries the role; the account exists without it
        if let Err(e) = self.upsert_profile(&auth_user.id, email, role).await {
            tracing::warn!("Failed to store profile for {}: {}", email, e);
        }

        Ok(User {
            id: auth_user.id,
            email: auth_user.email.unwrap_or_else(|| email.to_string()),
            role,
        })
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<User, StoreError> {
        let auth_user = self.sign_in(email, password).await?;

        let role = match self.role_of(&auth_user.id).await {
            Ok(role) => role.unwrap_or_default(),
            Err(e) => {
                tracing::debug!("No stored role for {}: {}", email, e);
                Role::User
            }
        };

        Ok(User {
            id: auth_user.id,
            email: auth_user.email.unwrap_or_else(|| email.to_string()),
            role,
        })
    }

    async fn list_movies(&self) -> Result<Vec<MovieRow>, StoreError> {
        self.select("movies", "select=*&order=created_at.desc")
            .await?
            .into_iter()
            .map(Self::movie_from)
            .collect()
    }

    async fn get_movie(&self, id: &str) -> Result<Option<MovieRow>, StoreError> {
        let rows = self
            .select("movies", &format!("id={}&select=*", eq(id)))
            .await?;
        rows.into_iter().next().map(Self::movie_from).transpose()
    }

    async fn insert_movie(&self, row: &MovieRow) -> Result<MovieRow, StoreError> {
        let rows = self.insert("movies", row).await?;
        match rows.into_iter().next() {
            Some(stored) => Self::movie_from(stored),
            None => Ok(row.clone()),
        }
    }

    async fn update_movie(&self, id: &str, patch: &NewMovie) -> Result<MovieRow, StoreError> {
        let fields = MovieRow::from_fields(id.to_string(), patch);
        let body = json!({
            "title": fields.title,
            "year": fields.year,
            "rating": fields.rating,
            "genre": fields.genre,
            "director": fields.director,
            "description": fields.description,
            "image": fields.image,
            "tmdb_id": fields.tmdb_id,
            "trailer_url": fields.trailer_url,
        });
        let request = self
            .rest(Method::PATCH, "movies", &format!("id={}", eq(id)))
            .await
            .header("Prefer", "return=representation")
            .json(&body);

        match self.rows(request).await?.into_iter().next() {
            Some(stored) => Self::movie_from(stored),
            None => Err(StoreError::NotFound("movie")),
        }
    }

    async fn delete_movie(&self, id: &str) -> Result<(), StoreError> {
        self.delete("movies", &format!("id={}", eq(id))).await?;
        Ok(())
    }

    async fn delete_all_movies(&self) -> Result<(), StoreError> {
        // Unfiltered deletes are refused by the table API
        self.delete("movies", "id=neq.00000000-0000-0000-0000-000000000000")
            .await?;
        Ok(())
    }

    async fn find_favorite(
        &self,
        user_id: &str,
        movie_id: &str,
    ) -> Result<Option<FavoriteRow>, StoreError> {
        let rows = self
            .select(
                "favorites",
                &format!("user_id={}&movie_id={}&select=*", eq(user_id), eq(movie_id)),
            )
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| normalize_favorite(row).ok()))
    }

    async fn insert_favorite(&self, row: &FavoriteRow) -> Result<(), StoreError> {
        match self.insert("favorites", row).await {
            Ok(_) => Ok(()),
            Err(StoreError::Conflict(_)) => Err(StoreError::Conflict(ALREADY_FAVORITE.to_string())),
            Err(StoreError::NotFound(_)) => Err(StoreError::NotFound("movie")),
            Err(e) => Err(e),
        }
    }

    async fn delete_favorite(&self, user_id: &str, movie_id: &str) -> Result<bool, StoreError> {
        let rows = self
            .delete(
                "favorites",
                &format!("user_id={}&movie_id={}", eq(user_id), eq(movie_id)),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn list_favorites(&self, user_id: &str) -> Result<Vec<(MovieRow, String)>, StoreError> {
        let rows = self
            .select(
                "favorites",
                &format!(
                    "select=created_at,movies(*)&user_id={}&order=created_at.desc",
                    eq(user_id)
                ),
            )
            .await?;

        let mut favorites = Vec::with_capacity(rows.len());
        for mut row in rows {
            let liked_at = row
                .get("created_at")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match row.get_mut("movies").map(Value::take) {
                Some(movie) if !movie.is_null() => favorites.push((Self::movie_from(movie)?, liked_at)),
                _ => {}
            }
        }
        Ok(favorites)
    }
}
