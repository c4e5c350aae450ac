use std::sync::Arc;

use crate::models::{FavoriteMovie, FavoriteRow, Movie};
use crate::services::auth::IdentityStore;
use crate::storage::{BackendResolver, StoreError, ALREADY_FAVORITE};

/// Favorites of the signed-in user
pub struct FavoritesStore {
    resolver: Arc<BackendResolver>,
    identity: Arc<IdentityStore>,
}

impl FavoritesStore {
    pub fn new(resolver: Arc<BackendResolver>, identity: Arc<IdentityStore>) -> Self {
        Self { resolver, identity }
    }

    async fn user_id(&self) -> Result<String, StoreError> {
        self.identity
            .current_user()
            .await
            .map(|user| user.id)
            .ok_or(StoreError::NotSignedIn)
    }

    fn check_movie_id(movie_id: &str) -> Result<(), StoreError> {
        if movie_id.trim().is_empty() {
            return Err(StoreError::Validation("Movie id is required".to_string()));
        }
        Ok(())
    }

    /// Favorited movies, most recently liked first. Empty when signed out
    /// or when no tier answers.
    pub async fn get_favorites(&self) -> Vec<FavoriteMovie> {
        let Ok(user_id) = self.user_id().await else {
            return Vec::new();
        };
        let user_id = user_id.as_str();

        match self
            .resolver
            .run("list favorites", |b| async move { b.list_favorites(user_id).await })
            .await
        {
            Ok(rows) => rows
                .into_iter()
                .map(|(movie, liked_at)| FavoriteMovie {
                    movie: Movie::from(movie),
                    liked_at,
                })
                .collect(),
            Err(e) => {
                tracing::error!("Failed to load favorites: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn is_favorite(&self, movie_id: &str) -> bool {
        let Ok(user_id) = self.user_id().await else {
            return false;
        };
        let user_id = user_id.as_str();

        self.resolver
            .run("check favorite", |b| async move {
                b.find_favorite(user_id, movie_id).await
            })
            .await
            .map(|found| found.is_some())
            .unwrap_or(false)
    }

    /// Mark a movie as favorite. A second add of the same movie, or an add
    /// for a movie that is not in the catalog, is refused without writing
    /// anything.
    pub async fn add_favorite(&self, movie_id: &str) -> Result<(), StoreError> {
        let user_id = self.user_id().await?;
        Self::check_movie_id(movie_id)?;

        let row = FavoriteRow::new(&user_id, movie_id);
        self.resolver
            .run("add favorite", |b| {
                let row = &row;
                async move {
                    if b.get_movie(&row.movie_id).await?.is_none() {
                        return Err(StoreError::NotFound("movie"));
                    }
                    if b.find_favorite(&row.user_id, &row.movie_id).await?.is_some() {
                        return Err(StoreError::Conflict(ALREADY_FAVORITE.to_string()));
                    }
                    b.insert_favorite(row).await
                }
            })
            .await?;

        tracing::debug!("User {} liked movie {}", user_id, movie_id);
        Ok(())
    }

    pub async fn remove_favorite(&self, movie_id: &str) -> Result<(), StoreError> {
        let user_id = self.user_id().await?;
        Self::check_movie_id(movie_id)?;
        let user_id = user_id.as_str();

        let removed = self
            .resolver
            .run("remove favorite", |b| async move {
                b.delete_favorite(user_id, movie_id).await
            })
            .await?;

        if !removed {
            return Err(StoreError::NotFound("favorite"));
        }
        Ok(())
    }
}
