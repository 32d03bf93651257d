//! Application state shared across all request handlers.

use crate::config::SessionSettings;
use curio_core::config::ConfigStore;
use curio_core::orders::OrderEngine;
use sqlx::PgPool;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool, used directly only by the health check.
    pub db: PgPool,
    pub engine: OrderEngine,
    /// Session verification settings (can be reloaded via SIGHUP).
    pub session: ConfigStore<SessionSettings>,
}

impl AppState {
    pub fn new(db: PgPool, engine: OrderEngine, session: SessionSettings) -> Self {
        Self {
            db,
            engine,
            session: ConfigStore::new(session),
        }
    }
}
