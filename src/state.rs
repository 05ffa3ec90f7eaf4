use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::auth::{Argon2Hasher, Hasher, IdentityService, JwtKeys};
use crate::config::AppConfig;
use crate::users::{MemoryUserStore, PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub identity: IdentityService,
    pub keys: JwtKeys,
}

impl AppState {
    /// Wires the Postgres store, the configured hasher and the token keys.
    pub fn init(config: &AppConfig, db: PgPool) -> anyhow::Result<Self> {
        let keys = JwtKeys::from_config(&config.jwt)?;
        let hasher = Arc::new(Argon2Hasher::new(config.hasher)?) as Arc<dyn Hasher>;
        let store = Arc::new(PgUserStore::new(db)) as Arc<dyn UserStore>;
        Ok(Self::from_parts(IdentityService::new(store, hasher), keys))
    }

    pub fn from_parts(identity: IdentityService, keys: JwtKeys) -> Self {
        Self { identity, keys }
    }

    /// State backed by an empty in-memory store.
    pub fn in_memory(keys: JwtKeys, hasher: Arc<dyn Hasher>) -> Self {
        let store = Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>;
        Self::from_parts(IdentityService::new(store, hasher), keys)
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}
