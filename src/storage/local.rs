use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{sort_newest_first, Backend, BackendKind, KeyValueStore, StoreError, ALREADY_FAVORITE};
use crate::models::{
    normalize_favorite, normalize_movie, normalize_user, FavoriteRow, MovieRow, NewMovie, Role,
    UserRecord,
};

/// Local-storage tier for web targets. Each table is one JSON array stored
/// under `{namespace}_{table}`; every write is read, modify, write back.
pub struct LocalBackend {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    // Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

const USERS: &str = "users";
const MOVIES: &str = "movies";
const FAVORITES: &str = "favorites";

/// A row as stored and, when it parses, its typed form
struct Stored<T> {
    raw: Value,
    row: Option<T>,
}

impl<T: Serialize> Stored<T> {
    fn new(row: T) -> Result<Self, StoreError> {
        Ok(Self {
            raw: serde_json::to_value(&row)?,
            row: Some(row),
        })
    }
}

fn raw_id(raw: &Value) -> Option<&str> {
    raw.get("id").and_then(Value::as_str)
}

impl LocalBackend {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn key(&self, table: &str) -> String {
        format!("{}_{}", self.namespace, table)
    }

    /// Seed empty tables on first use
    pub async fn init(&self) -> Result<(), StoreError> {
        let marker = self.key("initialized");
        if self.store.get(&marker).await?.is_some() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        for table in [USERS, MOVIES, FAVORITES] {
            let key = self.key(table);
            if self.store.get(&key).await?.is_none() {
                self.store.set(&key, "[]").await?;
            }
        }
        self.store.set(&marker, "true").await?;
        tracing::debug!("Initialized local storage tables under '{}'", self.namespace);
        Ok(())
    }

    async fn read_raw(&self, table: &str) -> Result<Vec<Value>, StoreError> {
        match self.store.get(&self.key(table)).await? {
            Some(json) if !json.trim().is_empty() => Ok(serde_json::from_str(&json)?),
            _ => Ok(Vec::new()),
        }
    }

    /// Every stored row of a table next to its parsed form. Rows that no
    /// longer parse are kept as stored, so writes carry them through.
    async fn stored_rows<T>(
        &self,
        table: &str,
        normalize: fn(Value) -> Result<T, serde_json::Error>,
    ) -> Result<Vec<Stored<T>>, StoreError> {
        let rows = self.read_raw(table).await?;
        Ok(rows
            .into_iter()
            .map(|raw| {
                let row = match normalize(raw.clone()) {
                    Ok(row) => Some(row),
                    Err(e) => {
                        tracing::warn!("Skipping malformed {} row: {}", table, e);
                        None
                    }
                };
                Stored { raw, row }
            })
            .collect())
    }

    /// Parsed rows of a table, skipping rows that no longer parse
    async fn read_table<T>(
        &self,
        table: &str,
        normalize: fn(Value) -> Result<T, serde_json::Error>,
    ) -> Result<Vec<T>, StoreError> {
        Ok(self
            .stored_rows(table, normalize)
            .await?
            .into_iter()
            .filter_map(|stored| stored.row)
            .collect())
    }

    async fn write_table<T>(&self, table: &str, rows: Vec<Stored<T>>) -> Result<(), StoreError> {
        let raw: Vec<Value> = rows.into_iter().map(|stored| stored.raw).collect();
        let json = serde_json::to_string(&raw)?;
        self.store.set(&self.key(table), &json).await
    }

    async fn movies(&self) -> Result<Vec<MovieRow>, StoreError> {
        self.read_table(MOVIES, normalize_movie).await
    }

    async fn favorites(&self) -> Result<Vec<FavoriteRow>, StoreError> {
        self.read_table(FAVORITES, normalize_favorite).await
    }

    async fn users(&self) -> Result<Vec<UserRecord>, StoreError> {
        self.read_table(USERS, normalize_user).await
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users().await?.into_iter().find(|u| u.email == email))
    }

    async fn insert_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut users = self.stored_rows(USERS, normalize_user).await?;
        if users
            .iter()
            .filter_map(|u| u.row.as_ref())
            .any(|u| u.email == user.email)
        {
            return Err(StoreError::Conflict(super::EMAIL_TAKEN.to_string()));
        }
        users.push(Stored::new(user.clone())?);
        self.write_table(USERS, users).await
    }

    async fn role_of(&self, user_id: &str) -> Result<Option<Role>, StoreError> {
        Ok(self
            .users()
            .await?
            .into_iter()
            .find(|u| u.id == user_id)
            .map(|u| u.role))
    }

    async fn list_movies(&self) -> Result<Vec<MovieRow>, StoreError> {
        let mut movies = self.movies().await?;
        sort_newest_first(&mut movies, |m| m.created_at.as_deref());
        Ok(movies)
    }

    async fn get_movie(&self, id: &str) -> Result<Option<MovieRow>, StoreError> {
        Ok(self.movies().await?.into_iter().find(|m| m.id == id))
    }

    async fn insert_movie(&self, row: &MovieRow) -> Result<MovieRow, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut movies = self.stored_rows(MOVIES, normalize_movie).await?;
        if movies.iter().any(|m| raw_id(&m.raw) == Some(row.id.as_str())) {
            return Err(StoreError::Conflict(format!("movie {} already exists", row.id)));
        }
        movies.push(Stored::new(row.clone())?);
        self.write_table(MOVIES, movies).await?;
        Ok(row.clone())
    }

    async fn update_movie(&self, id: &str, patch: &NewMovie) -> Result<MovieRow, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut movies = self.stored_rows(MOVIES, normalize_movie).await?;
        let slot = movies
            .iter_mut()
            .find(|m| m.row.as_ref().is_some_and(|m| m.id == id))
            .ok_or(StoreError::NotFound("movie"))?;

        let updated = match slot.row.as_mut() {
            Some(movie) => {
                movie.apply(patch);
                movie.clone()
            }
            None => return Err(StoreError::NotFound("movie")),
        };
        // Rewritten whole so stale camelCase aliases cannot shadow the update
        slot.raw = serde_json::to_value(&updated)?;
        self.write_table(MOVIES, movies).await?;
        Ok(updated)
    }

    async fn delete_movie(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut movies = self.stored_rows(MOVIES, normalize_movie).await?;
        movies.retain(|m| raw_id(&m.raw) != Some(id));
        self.write_table(MOVIES, movies).await
    }

    async fn delete_all_movies(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write_table::<MovieRow>(MOVIES, Vec::new()).await
    }

    async fn find_favorite(
        &self,
        user_id: &str,
        movie_id: &str,
    ) -> Result<Option<FavoriteRow>, StoreError> {
        Ok(self
            .favorites()
            .await?
            .into_iter()
            .find(|f| f.user_id == user_id && f.movie_id == movie_id))
    }

    async fn insert_favorite(&self, row: &FavoriteRow) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let movie_exists = self
            .read_raw(MOVIES)
            .await?
            .iter()
            .any(|m| raw_id(m) == Some(row.movie_id.as_str()));
        if !movie_exists {
            return Err(StoreError::NotFound("movie"));
        }

        let mut favorites = self.stored_rows(FAVORITES, normalize_favorite).await?;
        if favorites
            .iter()
            .filter_map(|f| f.row.as_ref())
            .any(|f| f.user_id == row.user_id && f.movie_id == row.movie_id)
        {
            return Err(StoreError::Conflict(ALREADY_FAVORITE.to_string()));
        }
        favorites.push(Stored::new(row.clone())?);
        self.write_table(FAVORITES, favorites).await
    }

    async fn delete_favorite(&self, user_id: &str, movie_id: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut favorites = self.stored_rows(FAVORITES, normalize_favorite).await?;
        let before = favorites.len();
        favorites.retain(|f| {
            !f.row
                .as_ref()
                .is_some_and(|f| f.user_id == user_id && f.movie_id == movie_id)
        });
        if favorites.len() == before {
            return Ok(false);
        }
        self.write_table(FAVORITES, favorites).await?;
        Ok(true)
    }

    async fn list_favorites(&self, user_id: &str) -> Result<Vec<(MovieRow, String)>, StoreError> {
        let movies = self.movies().await?;
        let mut favorites: Vec<FavoriteRow> = self
            .favorites()
            .await?
            .into_iter()
            .filter(|f| f.user_id == user_id)
            .collect();
        sort_newest_first(&mut favorites, |f| Some(f.created_at.as_str()));

        Ok(favorites
            .into_iter()
            .filter_map(|f| {
                movies
                    .iter()
                    .find(|m| m.id == f.movie_id)
                    .map(|m| (m.clone(), f.created_at))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKeyValueStore;
    use serde_json::json;

    async fn backend() -> (LocalBackend, Arc<MemoryKeyValueStore>) {
        let store = Arc::new(MemoryKeyValueStore::new());
        let backend = LocalBackend::new(store.clone(), "cinevia");
        backend.init().await.unwrap();
        (backend, store)
    }

    #[tokio::test]
    async fn test_init_creates_empty_tables_once() {
        let (backend, store) = backend().await;
        assert_eq!(store.get("cinevia_movies").await.unwrap().as_deref(), Some("[]"));

        store
            .set("cinevia_movies", &json!([{"id": "m1", "title": "Heat"}]).to_string())
            .await
            .unwrap();
        backend.init().await.unwrap();
        assert_eq!(backend.list_movies().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reads_camel_case_rows() {
        let (backend, store) = backend().await;
        store
            .set(
                "cinevia_movies",
                &json!([
                    {"id": "m1", "title": "Heat", "tmdbId": 949, "trailerUrl": "https://youtu.be/abcdefghijk", "createdAt": "2024-01-01T00:00:00Z"},
                    {"id": "m2", "title": "Ronin", "tmdb_id": 8195, "created_at": "2024-02-01T00:00:00Z"},
                    {"title": "no id"}
                ])
                .to_string(),
            )
            .await
            .unwrap();

        let movies = backend.list_movies().await.unwrap();
        assert_eq!(movies.len(), 2);
        assert_eq!(movies[0].id, "m2");
        assert_eq!(movies[1].tmdb_id, Some(949));
        assert_eq!(
            movies[1].trailer_url.as_deref(),
            Some("https://youtu.be/abcdefghijk")
        );
    }

    #[tokio::test]
    async fn test_malformed_table_is_an_error() {
        let (backend, store) = backend().await;
        store.set("cinevia_movies", "{not json").await.unwrap();
        assert!(matches!(
            backend.list_movies().await,
            Err(StoreError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_accounts_and_favorites() {
        let (backend, _) = backend().await;
        let user = backend
            .register("petr@example.com", "heslo", Role::User)
            .await
            .unwrap();
        assert!(matches!(
            backend.register("petr@example.com", "heslo", Role::User).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            backend.authenticate("petr@example.com", "nope").await,
            Err(StoreError::WrongPassword)
        ));

        let heat = backend
            .insert_movie(&MovieRow::for_insert(&NewMovie {
                title: "Heat".into(),
                ..Default::default()
            }))
            .await
            .unwrap();
        backend
            .insert_favorite(&FavoriteRow::new(&user.id, &heat.id))
            .await
            .unwrap();
        assert!(matches!(
            backend.insert_favorite(&FavoriteRow::new(&user.id, &heat.id)).await,
            Err(StoreError::Conflict(_))
        ));

        // No referential rules here: a dangling favorite is simply not listed
        backend.delete_movie(&heat.id).await.unwrap();
        assert!(backend.list_favorites(&user.id).await.unwrap().is_empty());
        assert!(backend.delete_favorite(&user.id, &heat.id).await.unwrap());
    }

    async fn stored_movie_ids(store: &MemoryKeyValueStore) -> Vec<String> {
        let json = store.get("cinevia_movies").await.unwrap().unwrap();
        let rows: Vec<Value> = serde_json::from_str(&json).unwrap();
        rows.iter()
            .filter_map(|m| m["id"].as_str().map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn test_unparsed_rows_survive_writes() {
        let (backend, store) = backend().await;
        store
            .set(
                "cinevia_movies",
                &json!([
                    {"id": "m1", "title": "Heat", "created_at": "2024-01-01T00:00:00Z"},
                    {"id": "m2", "title": null, "tmdb_id": 5}
                ])
                .to_string(),
            )
            .await
            .unwrap();

        let ronin = backend
            .insert_movie(&MovieRow::for_insert(&NewMovie {
                title: "Ronin".into(),
                ..Default::default()
            }))
            .await
            .unwrap();
        backend
            .update_movie(
                "m1",
                &NewMovie {
                    title: "Heat (1995)".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        backend.delete_movie(&ronin.id).await.unwrap();

        assert_eq!(stored_movie_ids(&store).await, vec!["m1", "m2"]);
        assert_eq!(backend.list_movies().await.unwrap().len(), 1);
        assert!(matches!(
            backend.update_movie("m2", &NewMovie::default()).await,
            Err(StoreError::NotFound("movie"))
        ));
    }

    #[tokio::test]
    async fn test_favorite_of_unknown_movie_is_not_found() {
        let (backend, store) = backend().await;
        let user = backend
            .register("petr@example.com", "heslo", Role::User)
            .await
            .unwrap();

        assert!(matches!(
            backend
                .insert_favorite(&FavoriteRow::new(&user.id, "no-such-movie"))
                .await,
            Err(StoreError::NotFound("movie"))
        ));
        assert_eq!(
            store.get("cinevia_favorites").await.unwrap().as_deref(),
            Some("[]")
        );
    }
}
