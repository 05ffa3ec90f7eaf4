use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::DatabaseConfig;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("invalid database url: {0}")]
    InvalidUrl(#[source] sqlx::Error),
    #[error("database connection failed: {0}")]
    Connect(#[source] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connected,
    Closed,
}

enum PoolState {
    Unconnected,
    Connected(PgPool),
    Closed,
}

/// Owns the process-wide connection pool. `connect` and `disconnect` are
/// idempotent; the lock only guards these transitions, queries go through
/// the cloned `PgPool`.
pub struct Database {
    options: PgConnectOptions,
    max_connections: u32,
    lazy: bool,
    state: Mutex<PoolState>,
}

impl Database {
    pub fn new(cfg: &DatabaseConfig) -> Result<Self, DbError> {
        let options = cfg
            .url
            .parse::<PgConnectOptions>()
            .map_err(DbError::InvalidUrl)?
            .username(&cfg.user)
            .password(&cfg.password);
        debug!(
            user = %cfg.user,
            max_connections = cfg.max_connections,
            "database configured"
        );
        Ok(Self {
            options,
            max_connections: cfg.max_connections,
            lazy: false,
            state: Mutex::new(PoolState::Unconnected),
        })
    }

    /// Defer opening connections until the pool is first used.
    #[cfg(test)]
    pub(crate) fn with_lazy_connect(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub async fn state(&self) -> ConnectionState {
        match *self.state.lock().await {
            PoolState::Unconnected => ConnectionState::Unconnected,
            PoolState::Connected(_) => ConnectionState::Connected,
            PoolState::Closed => ConnectionState::Closed,
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// Returns the pool, establishing it on the first call. A closed
    /// database may be connected again.
    pub async fn connect(&self) -> Result<PgPool, DbError> {
        let mut state = self.state.lock().await;
        if let PoolState::Connected(pool) = &*state {
            info!("database is already connected, skipping connection attempt");
            return Ok(pool.clone());
        }

        info!("establishing connection to database");
        let opts = PgPoolOptions::new().max_connections(self.max_connections);
        let pool = if self.lazy {
            opts.connect_lazy_with(self.options.clone())
        } else {
            opts.connect_with(self.options.clone()).await.map_err(|e| {
                error!(error = %e, "database connection failed");
                DbError::Connect(e)
            })?
        };
        *state = PoolState::Connected(pool.clone());
        info!("database connection established");
        Ok(pool)
    }

    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, PoolState::Closed) {
            PoolState::Connected(pool) => {
                info!("closing database connection");
                pool.close().await;
                info!("database connection closed");
            }
            previous => {
                info!("database is not connected, skipping disconnection attempt");
                *state = previous;
            }
        }
    }
}
