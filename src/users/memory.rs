use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::{StoreError, UserStore};
use super::repo_types::User;

/// In-process store keyed by email. The mutex is the transaction boundary:
/// each operation takes it once and never holds it across an await.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, User>> {
        self.users.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn all(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.lock().values().cloned().collect())
    }

    async fn exists(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self.lock().contains_key(email))
    }

    async fn find_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.lock().get(email).cloned().ok_or(StoreError::NotFound)
    }

    async fn create(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        hashed_password: &str,
    ) -> Result<User, StoreError> {
        let mut users = self.lock();
        if users.contains_key(email) {
            return Err(StoreError::AlreadyExists);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            first_name: first_name.to_owned(),
            last_name: last_name.to_owned(),
            email: email.to_owned(),
            hashed_password: hashed_password.to_owned(),
            created_at: now,
            updated_at: now,
        };
        users.insert(email.to_owned(), user.clone());
        Ok(user)
    }

    async fn update_password(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> Result<User, StoreError> {
        let mut users = self.lock();
        let user = users.get_mut(email).ok_or(StoreError::NotFound)?;
        user.hashed_password = hashed_password.to_owned();
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn update_email(&self, old_email: &str, new_email: &str) -> Result<User, StoreError> {
        let mut users = self.lock();
        if !users.contains_key(old_email) {
            return Err(StoreError::NotFound);
        }
        // mirrors the unique index: never silently overwrite another row
        if old_email != new_email && users.contains_key(new_email) {
            return Err(StoreError::AlreadyExists);
        }
        let mut user = users.remove(old_email).ok_or(StoreError::NotFound)?;
        user.email = new_email.to_owned();
        user.updated_at = OffsetDateTime::now_utc();
        users.insert(new_email.to_owned(), user.clone());
        Ok(user)
    }

    async fn delete_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.lock().remove(email).ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn create_rejects_duplicate_email() {
        let store = MemoryUserStore::new();
        store.create("a@example.com", "A", "B", "h1").await.unwrap();
        let err = store.create("a@example.com", "C", "D", "h2").await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));
        assert_eq!(store.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn email_lookup_is_case_sensitive() {
        let store = MemoryUserStore::new();
        store.create("Bob@example.com", "B", "B", "h").await.unwrap();
        assert!(store.exists("Bob@example.com").await.unwrap());
        assert!(!store.exists("bob@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_creates_yield_exactly_one_success() {
        let store = Arc::new(MemoryUserStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .create("race@example.com", &format!("U{i}"), "X", "h")
                        .await
                })
            })
            .collect();

        let mut ok = 0;
        let mut dup = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(StoreError::AlreadyExists) => dup += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(dup, 7);
    }

    #[tokio::test]
    async fn updates_keep_id_and_bump_updated_at() {
        let store = MemoryUserStore::new();
        let created = store.create("c@example.com", "C", "C", "old").await.unwrap();

        let updated = store.update_password("c@example.com", "new").await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.hashed_password, "new");
        assert!(updated.updated_at >= created.updated_at);

        let moved = store.update_email("c@example.com", "d@example.com").await.unwrap();
        assert_eq!(moved.id, created.id);
        assert_eq!(moved.email, "d@example.com");
        assert!(matches!(
            store.find_by_email("c@example.com").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn missing_rows_report_not_found() {
        let store = MemoryUserStore::new();
        assert!(matches!(store.find_by_email("x").await, Err(StoreError::NotFound)));
        assert!(matches!(store.update_password("x", "h").await, Err(StoreError::NotFound)));
        assert!(matches!(store.update_email("x", "y").await, Err(StoreError::NotFound)));
        assert!(matches!(store.delete_by_email("x").await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn delete_returns_previous_row() {
        let store = MemoryUserStore::new();
        let created = store.create("e@example.com", "E", "E", "h").await.unwrap();
        let deleted = store.delete_by_email("e@example.com").await.unwrap();
        assert_eq!(deleted, created);
        assert!(store.all().await.unwrap().is_empty());
    }
}
