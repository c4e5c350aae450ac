// Storage tiers: remote service, embedded SQLite database, browser-style local storage.
// Every store talks to a `BackendResolver`, which tries the tiers in priority order.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{FavoriteRow, MovieRow, NewMovie, Role, User, UserRecord};
use crate::services::auth::hash_password;

pub mod kv;
pub mod local;
pub mod remote;
pub mod resolver;
pub mod sqlite;

#[cfg(test)]
pub use kv::MemoryKeyValueStore;
pub use kv::{FileKeyValueStore, KeyValueStore};
pub use local::LocalBackend;
pub use remote::RemoteBackend;
pub use resolver::BackendResolver;
pub use sqlite::SqliteBackend;

pub const EMAIL_TAKEN: &str = "An account with this email already exists. Try signing in.";
pub const ALREADY_FAVORITE: &str = "This movie is already a favorite";

#[derive(Debug, Error)]
pub enum StoreError {
    /// The tier could not be reached; the resolver moves on to the next one
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("no storage backend is available")]
    NoBackend,

    #[error("{0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("An account with this email does not exist. Please sign up.")]
    UnknownAccount,

    #[error("Incorrect password. Try again.")]
    WrongPassword,

    #[error("Incorrect email or password. Try again.")]
    InvalidCredentials,

    #[error("Email is not confirmed. Check your inbox and confirm it first.")]
    EmailNotConfirmed,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("{0}")]
    Validation(String),

    /// Definitive rejection reported by the remote service
    #[error("remote backend error: {0}")]
    Remote(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("malformed stored data: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the next tier should be tried
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                StoreError::NotFound("referenced row")
            }
            other => StoreError::Database(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Remote,
    Sqlite,
    Local,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Remote => write!(f, "remote"),
            BackendKind::Sqlite => write!(f, "sqlite"),
            BackendKind::Local => write!(f, "local-storage"),
        }
    }
}

/// One storage tier. All tiers must answer the same way for the same data;
/// rows come back in the backend-native shape and are normalized by callers.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    // Users

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn insert_user(&self, user: &UserRecord) -> Result<(), StoreError>;

    async fn role_of(&self, user_id: &str) -> Result<Option<Role>, StoreError>;

    /// Create an account. Local tiers store an unsalted digest of the
    /// password; the remote tier overrides this with its own auth service.
    async fn register(&self, email: &str, password: &str, role: Role) -> Result<User, StoreError> {
        if self.find_user_by_email(email).await?.is_some() {
            return Err(StoreError::Conflict(EMAIL_TAKEN.to_string()));
        }

        let record = UserRecord {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            password: Some(hash_password(password)),
            role,
            created_at: Some(crate::models::timestamp()),
        };

        match self.insert_user(&record).await {
            Ok(()) => Ok(record.into()),
            Err(StoreError::Conflict(_)) => Err(StoreError::Conflict(EMAIL_TAKEN.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Check credentials. Unknown email and wrong password are reported apart.
    async fn authenticate(&self, email: &str, password: &str) -> Result<User, StoreError> {
        let record = self
            .find_user_by_email(email)
            .await?
            .ok_or(StoreError::UnknownAccount)?;

        if record.password.as_deref() != Some(hash_password(password).as_str()) {
            return Err(StoreError::WrongPassword);
        }

        Ok(record.into())
    }

    // Movies

    /// All movies, most recently created first
    async fn list_movies(&self) -> Result<Vec<MovieRow>, StoreError>;

    async fn get_movie(&self, id: &str) -> Result<Option<MovieRow>, StoreError>;

    /// Insert and return the stored row
    async fn insert_movie(&self, row: &MovieRow) -> Result<MovieRow, StoreError>;

    /// Update in place; `NotFound` when the id does not exist
    async fn update_movie(&self, id: &str, patch: &NewMovie) -> Result<MovieRow, StoreError>;

    async fn delete_movie(&self, id: &str) -> Result<(), StoreError>;

    async fn delete_all_movies(&self) -> Result<(), StoreError>;

    // Favorites

    async fn find_favorite(
        &self,
        user_id: &str,
        movie_id: &str,
    ) -> Result<Option<FavoriteRow>, StoreError>;

    async fn insert_favorite(&self, row: &FavoriteRow) -> Result<(), StoreError>;

    /// Returns whether a row was removed
    async fn delete_favorite(&self, user_id: &str, movie_id: &str) -> Result<bool, StoreError>;

    /// Favorited movies of a user with the time they were liked, newest first.
    /// Favorites pointing at missing movies are left out.
    async fn list_favorites(&self, user_id: &str) -> Result<Vec<(MovieRow, String)>, StoreError>;
}

/// Sort rows newest first; rows without a timestamp go last
pub(crate) fn sort_newest_first<T>(rows: &mut [T], created_at: impl Fn(&T) -> Option<&str>) {
    rows.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
}
