use std::sync::Arc;

use crate::models::{Movie, MovieRow, NewMovie, Trailer};
use crate::storage::{BackendResolver, StoreError};

/// Movie catalog on top of whichever storage tier is reachable
pub struct CatalogStore {
    resolver: Arc<BackendResolver>,
}

impl CatalogStore {
    pub fn new(resolver: Arc<BackendResolver>) -> Self {
        Self { resolver }
    }

    /// Every movie, most recently created first. Failures degrade to an
    /// empty list.
    pub async fn get_movies(&self) -> Vec<Movie> {
        match self
            .resolver
            .run("list movies", |b| async move { b.list_movies().await })
            .await
        {
            Ok(rows) => rows.into_iter().map(Movie::from).collect(),
            Err(e) => {
                tracing::error!("Failed to load movies: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn get_movie(&self, id: &str) -> Option<Movie> {
        match self
            .resolver
            .run("get movie", |b| async move { b.get_movie(id).await })
            .await
        {
            Ok(row) => row.map(Movie::from),
            Err(e) => {
                tracing::error!("Failed to load movie {}: {}", id, e);
                None
            }
        }
    }

    /// Insert under a freshly generated id
    pub async fn add_movie(&self, movie: &NewMovie) -> Result<Movie, StoreError> {
        if movie.title.trim().is_empty() {
            return Err(StoreError::Validation("Title is required".to_string()));
        }

        let row = MovieRow::for_insert(movie);
        let stored = self
            .resolver
            .run("add movie", |b| {
                let row = &row;
                async move { b.insert_movie(row).await }
            })
            .await?;

        tracing::debug!("Added movie '{}' ({})", stored.title, stored.id);
        Ok(stored.into())
    }

    /// Update the editable fields of an existing movie, keeping its id
    pub async fn update_movie(&self, id: &str, patch: &NewMovie) -> Result<Movie, StoreError> {
        if patch.title.trim().is_empty() {
            return Err(StoreError::Validation("Title is required".to_string()));
        }

        let stored = self
            .resolver
            .run("update movie", |b| async move { b.update_movie(id, patch).await })
            .await?;
        Ok(stored.into())
    }

    /// Replace a movie by deleting it and inserting the new version under a
    /// new id. Favorites of the old id go with it.
    pub async fn edit_movie(&self, id: &str, movie: &NewMovie) -> Result<Movie, StoreError> {
        if movie.title.trim().is_empty() {
            return Err(StoreError::Validation("Title is required".to_string()));
        }
        self.delete_movie(id).await?;
        self.add_movie(movie).await
    }

    pub async fn delete_movie(&self, id: &str) -> Result<(), StoreError> {
        self.resolver
            .run("delete movie", |b| async move { b.delete_movie(id).await })
            .await?;
        tracing::debug!("Deleted movie {}", id);
        Ok(())
    }

    pub async fn delete_all_movies(&self) -> Result<(), StoreError> {
        self.resolver
            .run("delete all movies", |b| async move {
                b.delete_all_movies().await
            })
            .await?;
        tracing::info!("Deleted all movies");
        Ok(())
    }

    /// Trailer stored on a catalog row, if any
    pub async fn stored_trailer(&self, id: &str) -> Option<Trailer> {
        let movie = self.get_movie(id).await?;
        let url = movie.trailer_url?;
        Some(Trailer {
            key: youtube_key(&url),
            name: "Trailer".to_string(),
            site: "YouTube".to_string(),
            url,
        })
    }
}

/// Video id of a YouTube watch, short or embed link
fn youtube_key(url: &str) -> Option<String> {
    let rest = url
        .split_once("watch?v=")
        .or_else(|| url.split_once("youtu.be/"))
        .or_else(|| url.split_once("/embed/"))
        .map(|(_, rest)| rest)?;
    let key: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    (!key.is_empty()).then_some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::storage::{Backend, LocalBackend, MemoryKeyValueStore, RemoteBackend, SqliteBackend};
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    async fn sqlite_catalog() -> CatalogStore {
        let local: Arc<dyn Backend> = Arc::new(SqliteBackend::new(test_pool().await));
        CatalogStore::new(Arc::new(BackendResolver::local_only(local)))
    }

    /// Table API double that keeps inserted movie rows in memory
    async fn movies_table_server() -> MockServer {
        let server = MockServer::start().await;
        let rows = Arc::new(Mutex::new(Vec::<Value>::new()));

        let inserted = rows.clone();
        Mock::given(method("POST"))
            .and(path("/rest/v1/movies"))
            .respond_with(move |request: &Request| {
                let row: Value = serde_json::from_slice(&request.body).unwrap();
                inserted.lock().unwrap().push(row.clone());
                ResponseTemplate::new(201).set_body_json(json!([row]))
            })
            .mount(&server)
            .await;

        let listed = rows.clone();
        Mock::given(method("GET"))
            .and(path("/rest/v1/movies"))
            .respond_with(move |_: &Request| {
                ResponseTemplate::new(200).set_body_json(Value::Array(listed.lock().unwrap().clone()))
            })
            .mount(&server)
            .await;

        let deleted = rows;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/movies"))
            .and(query_param("id", "neq.00000000-0000-0000-0000-000000000000"))
            .respond_with(move |_: &Request| {
                let removed: Vec<Value> = deleted.lock().unwrap().drain(..).collect();
                ResponseTemplate::new(200).set_body_json(Value::Array(removed))
            })
            .mount(&server)
            .await;

        server
    }

    /// One catalog per storage tier. The mock server must outlive the
    /// remote catalog.
    async fn catalogs_on_every_tier() -> (Vec<(&'static str, CatalogStore)>, MockServer) {
        let server = movies_table_server().await;
        let remote = Arc::new(RemoteBackend::new(
            &server.uri(),
            "anon-key",
            Duration::from_secs(5),
            Duration::from_secs(30),
        ));
        let web = Arc::new(LocalBackend::new(Arc::new(MemoryKeyValueStore::new()), "cinevia"));
        web.init().await.unwrap();

        let catalogs = vec![
            ("sqlite", sqlite_catalog().await),
            ("local storage", CatalogStore::new(Arc::new(BackendResolver::local_only(web)))),
            ("remote", CatalogStore::new(Arc::new(BackendResolver::new(Some(remote), None)))),
        ];
        (catalogs, server)
    }

    fn new_movie(title: &str) -> NewMovie {
        NewMovie {
            title: title.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_add_and_list_newest_first() {
        let catalog = sqlite_catalog().await;
        catalog.add_movie(&new_movie("Alien")).await.unwrap();
        let second = catalog.add_movie(&new_movie("Aliens")).await.unwrap();

        let movies = catalog.get_movies().await;
        assert_eq!(movies.len(), 2);
        assert_eq!(movies[0].id, second.id);
    }

    #[tokio::test]
    async fn test_add_requires_title() {
        let catalog = sqlite_catalog().await;
        assert!(matches!(
            catalog.add_movie(&new_movie("  ")).await,
            Err(StoreError::Validation(_))
        ));
        assert!(catalog.get_movies().await.is_empty());
    }

    #[tokio::test]
    async fn test_edit_replaces_id() {
        let catalog = sqlite_catalog().await;
        let old = catalog.add_movie(&new_movie("Heat")).await.unwrap();
        let edited = catalog
            .edit_movie(&old.id, &new_movie("Heat (1995)"))
            .await
            .unwrap();

        assert_ne!(edited.id, old.id);
        assert!(catalog.get_movie(&old.id).await.is_none());
        let movies = catalog.get_movies().await;
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Heat (1995)");
    }

    #[tokio::test]
    async fn test_update_keeps_id() {
        let catalog = sqlite_catalog().await;
        let movie = catalog.add_movie(&new_movie("Heat")).await.unwrap();
        let updated = catalog
            .update_movie(
                &movie.id,
                &NewMovie {
                    title: "Heat".into(),
                    rating: Some(8.3),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.id, movie.id);
        assert_eq!(updated.rating, 8.3);
    }

    #[tokio::test]
    async fn test_delete_all_empties_every_tier() {
        let (catalogs, _server) = catalogs_on_every_tier().await;
        for (tier, catalog) in catalogs {
            catalog.add_movie(&new_movie("Heat")).await.unwrap();
            catalog.add_movie(&new_movie("Ronin")).await.unwrap();
            assert_eq!(catalog.get_movies().await.len(), 2, "{}", tier);

            catalog.delete_all_movies().await.unwrap();
            assert!(catalog.get_movies().await.is_empty(), "{}", tier);
        }
    }

    #[tokio::test]
    async fn test_provider_id_and_trailer_survive_every_tier() {
        let (catalogs, _server) = catalogs_on_every_tier().await;
        let trailer = "https://www.youtube.com/watch?v=0xbBLJ1WGwQ";
        for (tier, catalog) in catalogs {
            catalog
                .add_movie(&NewMovie {
                    title: "Heat".into(),
                    tmdb_id: Some(949),
                    trailer_url: Some(trailer.into()),
                    ..Default::default()
                })
                .await
                .unwrap();

            let movies = catalog.get_movies().await;
            assert_eq!(movies.len(), 1, "{}", tier);
            let value = serde_json::to_value(&movies[0]).unwrap();
            assert_eq!(value["tmdbId"], 949, "{}", tier);
            assert_eq!(value["trailerUrl"], trailer, "{}", tier);
        }
    }

    #[tokio::test]
    async fn test_no_backend_degrades_reads() {
        let catalog = CatalogStore::new(Arc::new(BackendResolver::new(None, None)));
        assert!(catalog.get_movies().await.is_empty());
        assert!(catalog.get_movie("x").await.is_none());
        assert!(matches!(
            catalog.add_movie(&new_movie("Heat")).await,
            Err(StoreError::NoBackend)
        ));
    }

    #[tokio::test]
    async fn test_stored_trailer_on_web_tier() {
        let local = Arc::new(LocalBackend::new(Arc::new(MemoryKeyValueStore::new()), "cinevia"));
        let catalog = CatalogStore::new(Arc::new(BackendResolver::local_only(local)));
        let movie = catalog
            .add_movie(&NewMovie {
                title: "Heat".into(),
                trailer_url: Some("https://www.youtube.com/watch?v=0xbBLJ1WGwQ".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let plain = catalog.add_movie(&new_movie("Ronin")).await.unwrap();

        let trailer = catalog.stored_trailer(&movie.id).await.unwrap();
        assert_eq!(trailer.key.as_deref(), Some("0xbBLJ1WGwQ"));
        assert_eq!(trailer.site, "YouTube");
        assert!(catalog.stored_trailer(&plain.id).await.is_none());
    }

    #[test]
    fn test_youtube_key() {
        assert_eq!(youtube_key("youtu.be/abcdefghijk?t=3").as_deref(), Some("abcdefghijk"));
        assert_eq!(youtube_key("https://vimeo.com/1"), None);
    }
}
