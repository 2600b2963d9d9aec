//! Application state shared across handlers.

use crate::auth::AuthService;
use crate::config::{Config, SessionBackend};
use crate::db::Database;
use crate::session::{DatabaseSessionStore, MemorySessionStore, SessionManager, SessionStore};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: Database,
    /// Authentication service.
    pub auth: Arc<AuthService>,
    /// Session store and cookie settings.
    pub sessions: SessionManager,
}

impl AppState {
    /// Create application state, picking the configured session backend.
    pub fn new(config: &Config, db: Database) -> Self {
        let store: Arc<dyn SessionStore> = match config.auth.session_backend {
            SessionBackend::Memory => Arc::new(MemorySessionStore::new()),
            SessionBackend::Database => Arc::new(DatabaseSessionStore::new(db.clone())),
        };

        let sessions = SessionManager::new(
            store,
            config.auth.session_ttl_secs(),
            &config.auth.cookie_name,
        );
        let auth = AuthService::new(db.clone(), config.auth.registration_enabled());

        Self {
            db,
            auth: Arc::new(auth),
            sessions,
        }
    }
}
