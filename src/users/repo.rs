use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::users::repo_types::User;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found")]
    NotFound,
    #[error("user already exists")]
    AlreadyExists,
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e.as_database_error() {
            Some(db) if db.is_unique_violation() => StoreError::AlreadyExists,
            _ => StoreError::Database(e),
        }
    }
}

/// Transactional access to the persisted users. Every call either fully
/// applies or has no effect.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn all(&self) -> Result<Vec<User>, StoreError>;

    async fn exists(&self, email: &str) -> Result<bool, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<User, StoreError>;

    /// Fails with `AlreadyExists` if `email` is taken. The check and the
    /// insert are one atomic step.
    async fn create(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        hashed_password: &str,
    ) -> Result<User, StoreError>;

    async fn update_password(&self, email: &str, hashed_password: &str)
        -> Result<User, StoreError>;

    /// Uniqueness of `new_email` is the caller's job.
    async fn update_email(&self, old_email: &str, new_email: &str) -> Result<User, StoreError>;

    /// Returns the row as it was before deletion.
    async fn delete_by_email(&self, email: &str) -> Result<User, StoreError>;
}

const USER_COLUMNS: &str =
    "id, first_name, last_name, email, hashed_password, created_at, updated_at";

/// Postgres-backed store. Each operation runs in its own repeatable-read
/// transaction; the `users_email_key` constraint backs up the create check.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.db.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn all(&self) -> Result<Vec<User>, StoreError> {
        let mut tx = self.begin().await?;
        let users = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users"))
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;
        debug!(count = users.len(), "fetched all users");
        Ok(users)
    }

    async fn exists(&self, email: &str) -> Result<bool, StoreError> {
        let mut tx = self.begin().await?;
        let exists = sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)"#,
        )
        .bind(email)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(exists)
    }

    async fn find_by_email(&self, email: &str) -> Result<User, StoreError> {
        let mut tx = self.begin().await?;
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        user.ok_or_else(|| {
            debug!(email = %email, "user not found");
            StoreError::NotFound
        })
    }

    async fn create(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        hashed_password: &str,
    ) -> Result<User, StoreError> {
        let mut tx = self.begin().await?;

        let taken = sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)"#,
        )
        .bind(email)
        .fetch_one(&mut *tx)
        .await?;
        if taken {
            warn!(email = %email, "create rejected: email already registered");
            return Err(StoreError::AlreadyExists);
        }

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, first_name, last_name, email, hashed_password)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(user_id = %user.id, email = %user.email, "user created");
        Ok(user)
    }

    async fn update_password(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> Result<User, StoreError> {
        let mut tx = self.begin().await?;
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET hashed_password = $2, updated_at = now()
             WHERE email = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(hashed_password)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;
        tx.commit().await?;

        info!(user_id = %user.id, "password updated");
        Ok(user)
    }

    async fn update_email(&self, old_email: &str, new_email: &str) -> Result<User, StoreError> {
        let mut tx = self.begin().await?;
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET email = $2, updated_at = now()
             WHERE email = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(old_email)
        .bind(new_email)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;
        tx.commit().await?;

        info!(user_id = %user.id, old_email = %old_email, new_email = %new_email, "email updated");
        Ok(user)
    }

    async fn delete_by_email(&self, email: &str) -> Result<User, StoreError> {
        let mut tx = self.begin().await?;
        let user = sqlx::query_as::<_, User>(&format!(
            "DELETE FROM users WHERE email = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;
        tx.commit().await?;

        info!(user_id = %user.id, email = %email, "user deleted");
        Ok(user)
    }
}

// These run against a live Postgres with migrations applied:
// DATABASE_URL=postgres://... cargo test -- --ignored
#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    async fn store() -> PgUserStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let db = PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .expect("connect to test database");
        sqlx::migrate!("./migrations").run(&db).await.expect("migrations");
        PgUserStore::new(db)
    }

    fn unique_email(tag: &str) -> String {
        format!("{tag}-{}@example.com", Uuid::new_v4())
    }

    #[tokio::test]
    #[ignore = "requires postgres"]
    async fn create_then_duplicate_is_rejected() {
        let store = store().await;
        let email = unique_email("dup");
        let user = store.create(&email, "Ann", "Lee", "hash").await.expect("create");
        assert_eq!(user.email, email);
        assert!(store.exists(&email).await.unwrap());

        let err = store.create(&email, "Ann", "Lee", "hash").await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));

        store.delete_by_email(&email).await.expect("cleanup");
    }

    #[tokio::test]
    #[ignore = "requires postgres"]
    async fn concurrent_creates_yield_one_success() {
        let store = store().await;
        let email = unique_email("race");
        let (a, b) = tokio::join!(
            store.create(&email, "A", "A", "hash"),
            store.create(&email, "B", "B", "hash"),
        );
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        let failure = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
        assert!(matches!(failure, StoreError::AlreadyExists));

        store.delete_by_email(&email).await.expect("cleanup");
    }

    #[tokio::test]
    #[ignore = "requires postgres"]
    async fn update_and_delete_round_trip() {
        let store = store().await;
        let email = unique_email("life");
        let created = store.create(&email, "C", "D", "old-hash").await.unwrap();

        let updated = store.update_password(&email, "new-hash").await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.hashed_password, "new-hash");
        assert!(updated.updated_at >= created.updated_at);

        let new_email = unique_email("moved");
        let moved = store.update_email(&email, &new_email).await.unwrap();
        assert_eq!(moved.id, created.id);
        assert!(matches!(store.find_by_email(&email).await, Err(StoreError::NotFound)));

        let deleted = store.delete_by_email(&new_email).await.unwrap();
        assert_eq!(deleted.id, created.id);
        assert!(matches!(
            store.delete_by_email(&new_email).await,
            Err(StoreError::NotFound)
        ));
    }
}
