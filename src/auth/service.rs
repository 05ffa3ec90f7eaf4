use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use super::password::{Hasher, PasswordError};
use crate::users::{StoreError, User, UserStore};

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("user not found")]
    UserNotFound,
    #[error("user already exists")]
    UserAlreadyExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<StoreError> for IdentityError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => IdentityError::UserNotFound,
            StoreError::AlreadyExists => IdentityError::UserAlreadyExists,
            StoreError::Database(e) => IdentityError::Database(e),
        }
    }
}

/// Account lifecycle on top of a user store and a password hasher.
/// Credentials are always checked before anything is written.
#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn Hasher>,
}

impl IdentityService {
    pub fn new(store: Arc<dyn UserStore>, hasher: Arc<dyn Hasher>) -> Self {
        Self { store, hasher }
    }

    // Argon2 is deliberately slow; keep it off the async workers.
    async fn hash(&self, plain: &str) -> Result<String, IdentityError> {
        let hasher = Arc::clone(&self.hasher);
        let plain = plain.to_owned();
        Ok(tokio::task::spawn_blocking(move || hasher.hash(&plain)).await??)
    }

    async fn verify(&self, plain: &str, hash: &str) -> Result<bool, IdentityError> {
        let hasher = Arc::clone(&self.hasher);
        let (plain, hash) = (plain.to_owned(), hash.to_owned());
        Ok(tokio::task::spawn_blocking(move || hasher.verify(&plain, &hash)).await??)
    }

    /// Finds `email` and checks `password` against it. A wrong password
    /// maps to `InvalidCredentials`; a missing user stays `UserNotFound`.
    async fn verified_user(&self, email: &str, password: &str) -> Result<User, IdentityError> {
        let user = self.store.find_by_email(email).await?;
        if !self.verify(password, &user.hashed_password).await? {
            warn!(user_id = %user.id, "password verification failed");
            return Err(IdentityError::InvalidCredentials);
        }
        Ok(user)
    }

    #[instrument(skip(self, first_name, last_name, password))]
    pub async fn register(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        password: &str,
    ) -> Result<User, IdentityError> {
        let hashed = self.hash(password).await?;
        let user = self
            .store
            .create(email.trim(), first_name.trim(), last_name.trim(), &hashed)
            .await?;
        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Unknown email and wrong password are indistinguishable to the caller.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, IdentityError> {
        match self.verified_user(email, password).await {
            Ok(user) => {
                info!(user_id = %user.id, "user authenticated");
                Ok(user)
            }
            Err(IdentityError::UserNotFound) => {
                warn!("login for unknown email");
                Err(IdentityError::InvalidCredentials)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    pub async fn profile(&self, email: &str) -> Result<User, IdentityError> {
        Ok(self.store.find_by_email(email).await?)
    }

    #[instrument(skip(self, old_password, new_password))]
    pub async fn change_password(
        &self,
        email: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<User, IdentityError> {
        self.verified_user(email, old_password).await?;
        let hashed = self.hash(new_password).await?;
        let user = self.store.update_password(email, &hashed).await?;
        info!(user_id = %user.id, "password changed");
        Ok(user)
    }

    /// The availability of `new_email` is only revealed to a caller who
    /// already proved the password.
    #[instrument(skip(self, password))]
    pub async fn change_email(
        &self,
        old_email: &str,
        new_email: &str,
        password: &str,
    ) -> Result<User, IdentityError> {
        self.verified_user(old_email, password).await?;
        if self.store.exists(new_email).await? {
            warn!(new_email = %new_email, "email change rejected: address taken");
            return Err(IdentityError::UserAlreadyExists);
        }
        let user = self.store.update_email(old_email, new_email).await?;
        info!(user_id = %user.id, "email changed");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn delete_by_email(&self, email: &str) -> Result<User, IdentityError> {
        let user = self.store.delete_by_email(email).await?;
        info!(user_id = %user.id, "user deleted");
        Ok(user)
    }
}
