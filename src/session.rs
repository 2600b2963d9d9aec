//! Server-side sessions keyed by an opaque cookie token.
//!
//! The session holds a snapshot of the user taken at login (and refreshed by
//! profile edits). It is not re-read from the `users` table afterwards.

use crate::auth::generate_token;
use crate::db::{Database, User, now_timestamp};
use crate::error::{AppError, Result};
use axum::http::{HeaderMap, header};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Identity stored in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// User ID.
    pub id: i64,
    /// Username.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Role at the time of the snapshot.
    pub role: String,
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
        }
    }
}

/// Session payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    /// Authenticated identity.
    pub user: SessionUser,
    /// Set once the login succeeded.
    pub is_login: bool,
    /// Expiration timestamp.
    pub expires_at: i64,
}

impl SessionData {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Storage backend for sessions.
///
/// Implementations must treat an expired session as absent.
pub trait SessionStore: Send + Sync {
    /// Store a new session under `token`.
    fn insert(&self, token: &str, data: &SessionData) -> Result<()>;
    /// Load a live session.
    fn get(&self, token: &str) -> Result<Option<SessionData>>;
    /// Replace the payload of an existing session.
    fn update(&self, token: &str, data: &SessionData) -> Result<()>;
    /// Remove a session.
    fn destroy(&self, token: &str) -> Result<()>;
    /// Drop every expired session, returning how many were removed.
    fn purge_expired(&self) -> Result<usize>;
}

/// Process-local session map.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionData>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, expired ones included.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn insert(&self, token: &str, data: &SessionData) -> Result<()> {
        self.sessions.write().insert(token.to_string(), data.clone());
        Ok(())
    }

    fn get(&self, token: &str) -> Result<Option<SessionData>> {
        let now = now_timestamp();
        let found = self.sessions.read().get(token).cloned();

        match found {
            Some(data) if data.is_expired(now) => {
                self.sessions.write().remove(token);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn update(&self, token: &str, data: &SessionData) -> Result<()> {
        match self.sessions.write().get_mut(token) {
            Some(slot) => {
                *slot = data.clone();
                Ok(())
            }
            None => Err(AppError::Unauthorized("Session expired".to_string())),
        }
    }

    fn destroy(&self, token: &str) -> Result<()> {
        self.sessions.write().remove(token);
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize> {
        let now = now_timestamp();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, data| !data.is_expired(now));
        Ok(before - sessions.len())
    }
}

/// Sessions kept in the `sessions` table so several instances can share them.
pub struct DatabaseSessionStore {
    db: Database,
}

impl DatabaseSessionStore {
    /// Create a store on top of the given database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn encode(data: &SessionData) -> Result<String> {
        serde_json::to_string(data)
            .map_err(|e| AppError::Internal(format!("Failed to encode session: {}", e)))
    }
}

impl SessionStore for DatabaseSessionStore {
    fn insert(&self, token: &str, data: &SessionData) -> Result<()> {
        self.db
            .save_session(token, &Self::encode(data)?, data.expires_at)
    }

    fn get(&self, token: &str) -> Result<Option<SessionData>> {
        let Some((raw, expires_at)) = self.db.get_session(token)? else {
            return Ok(None);
        };

        if expires_at <= now_timestamp() {
            self.db.delete_session(token)?;
            return Ok(None);
        }

        match serde_json::from_str(&raw) {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable session");
                self.db.delete_session(token)?;
                Ok(None)
            }
        }
    }

    fn update(&self, token: &str, data: &SessionData) -> Result<()> {
        self.db
            .save_session(token, &Self::encode(data)?, data.expires_at)
    }

    fn destroy(&self, token: &str) -> Result<()> {
        self.db.delete_session(token)
    }

    fn purge_expired(&self) -> Result<usize> {
        self.db.cleanup_expired_sessions()
    }
}

/// Session lifecycle on top of a [`SessionStore`].
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    ttl_secs: i64,
    cookie_name: String,
}

impl SessionManager {
    /// Create a manager issuing sessions valid for `ttl_secs`.
    pub fn new(store: Arc<dyn SessionStore>, ttl_secs: i64, cookie_name: &str) -> Self {
        Self {
            store,
            ttl_secs,
            cookie_name: cookie_name.to_string(),
        }
    }

    /// Open a logged-in session for `user`, returning its token.
    pub fn start(&self, user: SessionUser) -> Result<String> {
        let token = generate_token();
        let data = SessionData {
            user,
            is_login: true,
            expires_at: now_timestamp() + self.ttl_secs,
        };
        self.store.insert(&token, &data)?;
        Ok(token)
    }

    /// Load the session for `token`, if still live.
    pub fn load(&self, token: &str) -> Result<Option<SessionData>> {
        self.store.get(token)
    }

    /// Replace the username and email in a session snapshot. Role is kept.
    pub fn refresh_identity(
        &self,
        token: &str,
        mut data: SessionData,
        username: &str,
        email: &str,
    ) -> Result<SessionData> {
        data.user.username = username.to_string();
        data.user.email = email.to_string();
        self.store.update(token, &data)?;
        Ok(data)
    }

    /// End a session.
    pub fn destroy(&self, token: &str) -> Result<()> {
        self.store.destroy(token)
    }

    /// Drop expired sessions.
    pub fn purge_expired(&self) -> Result<usize> {
        self.store.purge_expired()
    }

    /// Read the session token from the request cookies.
    pub fn token_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        extract_cookie(headers, &self.cookie_name)
    }

    /// `Set-Cookie` value carrying a new session token.
    pub fn set_cookie(&self, token: &str) -> String {
        format!(
            "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
            self.cookie_name, token, self.ttl_secs
        )
    }

    /// `Set-Cookie` value clearing the session cookie.
    pub fn clear_cookie(&self) -> String {
        format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", self.cookie_name)
    }
}

/// Extract a cookie value from headers.
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|cookie| {
            let (key, value) = cookie.trim().split_once('=')?;
            (key == name && !value.is_empty()).then(|| value.to_string())
        })
}
