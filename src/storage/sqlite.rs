use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{sort_newest_first, Backend, BackendKind, StoreError, ALREADY_FAVORITE};
use crate::models::{FavoriteRow, MovieRow, NewMovie, Role, UserRecord};

/// Embedded database tier for native targets
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct FavoriteMovieRow {
    #[sqlx(flatten)]
    movie: MovieRow,
    liked_at: String,
}

const MOVIE_COLUMNS: &str =
    "id, title, year, rating, genre, director, description, image, tmdb_id, trailer_url, created_at";

#[async_trait]
impl Backend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, password, role, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn insert_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (id, email, password, role, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(user.password.as_deref().unwrap_or_default())
        .bind(user.role.as_str())
        .bind(&user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn role_of(&self, user_id: &str) -> Result<Option<Role>, StoreError> {
        let role: Option<(String,)> = sqlx::query_as("SELECT role FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role.map(|(role,)| Role::from(role)))
    }

    async fn list_movies(&self) -> Result<Vec<MovieRow>, StoreError> {
        let mut movies = sqlx::query_as::<_, MovieRow>(&format!(
            "SELECT {} FROM movies ORDER BY created_at DESC",
            MOVIE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        // NULL sorts last regardless of how the row was written
        sort_newest_first(&mut movies, |m| m.created_at.as_deref());
        Ok(movies)
    }

    async fn get_movie(&self, id: &str) -> Result<Option<MovieRow>, StoreError> {
        let movie = sqlx::query_as::<_, MovieRow>(&format!(
            "SELECT {} FROM movies WHERE id = ?",
            MOVIE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(movie)
    }

    async fn insert_movie(&self, row: &MovieRow) -> Result<MovieRow, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO movies (id, title, year, rating, genre, director, description, image, tmdb_id, trailer_url, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.title)
        .bind(row.year)
        .bind(row.rating)
        .bind(&row.genre)
        .bind(&row.director)
        .bind(&row.description)
        .bind(&row.image)
        .bind(row.tmdb_id)
        .bind(&row.trailer_url)
        .bind(&row.created_at)
        .execute(&self.pool)
        .await?;

        self.get_movie(&row.id)
            .await?
            .ok_or(StoreError::NotFound("movie"))
    }

    async fn update_movie(&self, id: &str, patch: &NewMovie) -> Result<MovieRow, StoreError> {
        let fields = MovieRow::from_fields(id.to_string(), patch);
        let result = sqlx::query(
            r#"
            UPDATE movies
            SET title = ?, year = ?, rating = ?, genre = ?, director = ?, description = ?,
                image = ?, tmdb_id = ?, trailer_url = ?
            WHERE id = ?
            "#,
        )
        .bind(&fields.title)
        .bind(fields.year)
        .bind(fields.rating)
        .bind(&fields.genre)
        .bind(&fields.director)
        .bind(&fields.description)
        .bind(&fields.image)
        .bind(fields.tmdb_id)
        .bind(&fields.trailer_url)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("movie"));
        }

        self.get_movie(id).await?.ok_or(StoreError::NotFound("movie"))
    }

    async fn delete_movie(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM movies WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_all_movies(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM movies").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_favorite(
        &self,
        user_id: &str,
        movie_id: &str,
    ) -> Result<Option<FavoriteRow>, StoreError> {
        let favorite = sqlx::query_as::<_, FavoriteRow>(
            "SELECT id, user_id, movie_id, created_at FROM favorites WHERE user_id = ? AND movie_id = ?",
        )
        .bind(user_id)
        .bind(movie_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(favorite)
    }

    async fn insert_favorite(&self, row: &FavoriteRow) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO favorites (id, user_id, movie_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.user_id)
        .bind(&row.movie_id)
        .bind(&row.created_at)
        .execute(&self.pool)
        .await;

        match result.map_err(StoreError::from) {
            Ok(_) => Ok(()),
            Err(StoreError::Conflict(_)) => Err(StoreError::Conflict(ALREADY_FAVORITE.to_string())),
            Err(StoreError::NotFound(_)) => Err(StoreError::NotFound("movie")),
            Err(e) => Err(e),
        }
    }

    async fn delete_favorite(&self, user_id: &str, movie_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM favorites WHERE user_id = ? AND movie_id = ?")
            .bind(user_id)
            .bind(movie_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_favorites(&self, user_id: &str) -> Result<Vec<(MovieRow, String)>, StoreError> {
        let rows = sqlx::query_as::<_, FavoriteMovieRow>(
            r#"
            SELECT m.id, m.title, m.year, m.rating, m.genre, m.director, m.description, m.image,
                   m.tmdb_id, m.trailer_url, m.created_at, f.created_at AS liked_at
            FROM favorites f
            INNER JOIN movies m ON f.movie_id = m.id
            WHERE f.user_id = ?
            ORDER BY f.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| (r.movie, r.liked_at)).collect())
    }
}
