use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Poster used when a movie has no image of its own
pub const PLACEHOLDER_IMAGE: &str = "https://images.unsplash.com/photo-1489599849927-2ee91cede3ba?ixlib=rb-4.0.3&auto=format&fit=crop&w=2070&q=80";

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Default role for a fresh account. The configured admin email is always
    /// an administrator, everybody else starts as a plain user.
    pub fn for_email(email: &str, admin_email: &str) -> Self {
        if email == admin_email {
            Role::Admin
        } else {
            Role::User
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public view of an account, the shape cached as the current session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Stored account row for the local tiers. `password` holds the digest.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
    #[sqlx(try_from = "String")]
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            role: record.role,
        }
    }
}

/// Movie as every backend stores it (snake_case column names)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MovieRow {
    pub id: String,
    pub title: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    #[sqlx(default)]
    pub year: Option<i64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    #[sqlx(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub director: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    #[sqlx(default)]
    pub tmdb_id: Option<i64>,
    #[serde(default)]
    #[sqlx(default)]
    pub trailer_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl MovieRow {
    /// Build the row for a fresh insert. The primary key is always generated
    /// here, never taken from the metadata provider.
    pub fn for_insert(movie: &NewMovie) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Some(timestamp()),
            ..Self::from_fields(String::new(), movie)
        }
    }

    /// Row carrying `movie`'s fields under an existing id
    pub fn from_fields(id: String, movie: &NewMovie) -> Self {
        Self {
            id,
            title: movie.title.trim().to_string(),
            year: movie.year,
            rating: movie.rating,
            genre: movie.genre.clone(),
            director: movie.director.clone(),
            description: Some(movie.description.clone().unwrap_or_default()),
            image: movie.image.clone(),
            tmdb_id: movie.tmdb_id,
            trailer_url: movie.trailer_url.clone(),
            created_at: None,
        }
    }

    /// Overwrite the editable fields, keeping id and creation time
    pub fn apply(&mut self, patch: &NewMovie) {
        let id = std::mem::take(&mut self.id);
        let created_at = self.created_at.take();
        *self = Self {
            created_at,
            ..Self::from_fields(id, patch)
        };
    }
}

/// Movie fields supplied by callers on insert and update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMovie {
    pub title: String,
    pub year: Option<i64>,
    pub rating: Option<f64>,
    pub genre: Option<String>,
    pub director: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub tmdb_id: Option<i64>,
    pub trailer_url: Option<String>,
}

/// Movie in the application shape. Serializes both the camelCase keys and
/// the backend-native snake_case keys so callers never care which tier
/// served the row.
#[derive(Debug, Clone, PartialEq)]
pub struct Movie {
    pub id: String,
    pub title: String,
    pub year: Option<i64>,
    pub rating: f64,
    pub genre: String,
    pub director: String,
    pub description: String,
    pub image: String,
    pub tmdb_id: Option<i64>,
    pub trailer_url: Option<String>,
    pub created_at: Option<String>,
}

impl From<MovieRow> for Movie {
    fn from(row: MovieRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            year: row.year,
            rating: valid_rating(row.rating),
            genre: non_blank(row.genre).unwrap_or_else(|| UNKNOWN.to_string()),
            director: non_blank(row.director).unwrap_or_else(|| UNKNOWN.to_string()),
            description: row.description.unwrap_or_default(),
            image: non_blank(row.image).unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string()),
            tmdb_id: row.tmdb_id,
            trailer_url: non_blank(row.trailer_url),
            created_at: row.created_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MovieWire<'a> {
    id: &'a str,
    title: &'a str,
    year: Option<i64>,
    rating: f64,
    genre: &'a str,
    director: &'a str,
    description: &'a str,
    image: &'a str,
    tmdb_id: Option<i64>,
    trailer_url: Option<&'a str>,
    #[serde(rename = "tmdb_id")]
    tmdb_id_native: Option<i64>,
    #[serde(rename = "trailer_url")]
    trailer_url_native: Option<&'a str>,
    created_at: Option<&'a str>,
}

impl Serialize for Movie {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        MovieWire {
            id: &self.id,
            title: &self.title,
            year: self.year,
            rating: self.rating,
            genre: &self.genre,
            director: &self.director,
            description: &self.description,
            image: &self.image,
            tmdb_id: self.tmdb_id,
            trailer_url: self.trailer_url.as_deref(),
            tmdb_id_native: self.tmdb_id,
            trailer_url_native: self.trailer_url.as_deref(),
            created_at: self.created_at.as_deref(),
        }
        .serialize(serializer)
    }
}

/// Join-table row: one per (user, movie)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FavoriteRow {
    pub id: String,
    pub user_id: String,
    pub movie_id: String,
    pub created_at: String,
}

impl FavoriteRow {
    pub fn new(user_id: &str, movie_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            movie_id: movie_id.to_string(),
            created_at: timestamp(),
        }
    }
}

/// A favorited movie together with the time it was liked
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteMovie {
    #[serde(flatten)]
    pub movie: Movie,
    pub liked_at: String,
}

/// Stored trailer of a catalog row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trailer {
    pub key: Option<String>,
    pub name: String,
    pub site: String,
    pub url: String,
}

/// Structured write result handed to the UI: `{ success, error?, ...data }`
#[derive(Debug, Serialize)]
pub struct Outcome<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T> Outcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn done() -> Self {
        Self {
            success: true,
            error: None,
            data: None,
        }
    }

    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            data: None,
        }
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for Outcome<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Outcome::ok(data),
            Err(e) => Outcome::failed(e),
        }
    }
}

/// Normalize a movie object read from a JSON-backed tier. Accepts the
/// camelCase aliases (`tmdbId`, `trailerUrl`) next to or instead of the
/// native keys; a non-null camelCase value wins.
pub fn normalize_movie(value: Value) -> Result<MovieRow, serde_json::Error> {
    let mut value = value;
    if let Value::Object(map) = &mut value {
        for (alias, native) in [("tmdbId", "tmdb_id"), ("trailerUrl", "trailer_url"), ("createdAt", "created_at")] {
            if let Some(aliased) = map.remove(alias) {
                if !aliased.is_null() {
                    map.insert(native.to_string(), aliased);
                }
            }
        }
    }
    serde_json::from_value(value)
}

/// Normalize a user row read from a JSON-backed tier
pub fn normalize_user(value: Value) -> Result<UserRecord, serde_json::Error> {
    serde_json::from_value(value)
}

/// Normalize a favorite row read from a JSON-backed tier
pub fn normalize_favorite(value: Value) -> Result<FavoriteRow, serde_json::Error> {
    let mut value = value;
    if let Value::Object(map) = &mut value {
        for (alias, native) in [("userId", "user_id"), ("movieId", "movie_id"), ("createdAt", "created_at")] {
            if let Some(aliased) = map.remove(alias) {
                if !aliased.is_null() {
                    map.insert(native.to_string(), aliased);
                }
            }
        }
    }
    serde_json::from_value(value)
}

/// RFC 3339 timestamp with microseconds, sortable as a string
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn valid_rating(rating: Option<f64>) -> f64 {
    match rating {
        Some(r) if r.is_finite() && (0.0..=10.0).contains(&r) => r,
        _ => 0.0,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Accepts numbers, numeric strings, empty strings and null
fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
