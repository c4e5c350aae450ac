use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::models::{Role, User};
use crate::storage::{BackendResolver, KeyValueStore, StoreError};

/// Key of the cached session in the key-value store
pub const SESSION_KEY: &str = "@current_user";

/// Hex SHA-256 digest of a password, as stored by the local tiers.
///
/// This is unsalted and fast: it only keeps plain text out of the local
/// tables. Accounts on the remote tier never go through it.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Sign-up, sign-in and the cached session
pub struct IdentityStore {
    resolver: Arc<BackendResolver>,
    sessions: Arc<dyn KeyValueStore>,
    admin_email: String,
}

impl IdentityStore {
    pub fn new(
        resolver: Arc<BackendResolver>,
        sessions: Arc<dyn KeyValueStore>,
        admin_email: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            sessions,
            admin_email: admin_email.into(),
        }
    }

    fn check_input(email: &str, password: &str) -> Result<(), StoreError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(StoreError::Validation(
                "Email and password are required".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured admin email is always an administrator
    fn promote(&self, mut user: User) -> User {
        if user.email == self.admin_email {
            user.role = Role::Admin;
        }
        user
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<User, StoreError> {
        let email = email.trim();
        Self::check_input(email, password)?;
        let role = Role::for_email(email, &self.admin_email);

        let user = self
            .resolver
            .run("sign up", |backend| async move {
                backend.register(email, password, role).await
            })
            .await?;

        tracing::info!("Registered {} as {}", user.email, user.role);
        let user = self.promote(user);
        self.cache(&user).await;
        Ok(user)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, StoreError> {
        let email = email.trim();
        Self::check_input(email, password)?;

        let user = self
            .resolver
            .run("sign in", |backend| async move {
                backend.authenticate(email, password).await
            })
            .await?;

        tracing::debug!("Signed in {}", user.email);
        let user = self.promote(user);
        self.cache(&user).await;
        Ok(user)
    }

    /// End the remote session when there is one and forget the cached user
    pub async fn sign_out(&self) -> Result<(), StoreError> {
        if let Some(remote) = self.resolver.remote() {
            if let Err(e) = remote.sign_out().await {
                tracing::warn!("Remote sign-out failed: {}", e);
            }
        }
        self.sessions.remove(SESSION_KEY).await
    }

    /// Current user: the live remote session when available, otherwise the
    /// cached one
    pub async fn current_user(&self) -> Option<User> {
        if let Some(user) = self.remote_user().await {
            self.cache(&user).await;
            return Some(user);
        }

        match self.sessions.get(SESSION_KEY).await {
            Ok(Some(json)) => match serde_json::from_str::<User>(&json) {
                Ok(user) => Some(self.promote(user)),
                Err(e) => {
                    tracing::warn!("Dropping unreadable cached session: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to read cached session: {}", e);
                None
            }
        }
    }

    async fn remote_user(&self) -> Option<User> {
        let remote = self.resolver.remote()?;
        if !remote.is_available().await {
            return None;
        }

        let auth_user = match remote.current_user().await {
            Ok(user) => user?,
            Err(e) => {
                tracing::debug!("Remote session check failed: {}", e);
                return None;
            }
        };

        let role = match crate::storage::Backend::role_of(remote.as_ref(), &auth_user.id).await {
            Ok(role) => role.unwrap_or_default(),
            Err(_) => Role::User,
        };

        Some(self.promote(User {
            id: auth_user.id,
            email: auth_user.email.unwrap_or_default(),
            role,
        }))
    }

    async fn cache(&self, user: &User) {
        let json = match serde_json::to_string(user) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to serialize session: {}", e);
                return;
            }
        };
        if let Err(e) = self.sessions.set(SESSION_KEY, &json).await {
            tracing::warn!("Failed to cache session: {}", e);
        }
    }
}
