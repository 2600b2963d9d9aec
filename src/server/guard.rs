//! Request gates.
//!
//! `is_authenticated` and `has_admin_role` are plain predicates over the
//! loaded session; the extractors below combine them. Admin routes check
//! both conditions themselves instead of relying on an auth layer running
//! first.

use super::state::AppState;
use crate::db::Role;
use crate::error::AppError;
use crate::session::SessionData;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// A session carrying a logged-in user.
pub fn is_authenticated(session: Option<&SessionData>) -> bool {
    session.is_some_and(|s| s.is_login)
}

/// A session whose user snapshot has the admin role.
pub fn has_admin_role(session: Option<&SessionData>) -> bool {
    session.is_some_and(|s| s.user.role == Role::Admin.as_str())
}

/// Admin gate: both predicates must hold.
pub fn is_admin(session: Option<&SessionData>) -> bool {
    is_authenticated(session) && has_admin_role(session)
}

/// Session loaded from the request cookie.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    /// Cookie token.
    pub token: String,
    /// Stored payload.
    pub data: SessionData,
}

/// Session if the request carries a live one.
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<ActiveSession>);

impl MaybeSession {
    /// Payload of the session, if any.
    pub fn data(&self) -> Option<&SessionData> {
        self.0.as_ref().map(|s| &s.data)
    }
}

impl FromRequestParts<AppState> for MaybeSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = state.sessions.token_from_headers(&parts.headers) else {
            return Ok(MaybeSession(None));
        };

        let session = state
            .sessions
            .load(&token)?
            .map(|data| ActiveSession { token, data });

        Ok(MaybeSession(session))
    }
}

/// Passes only for a logged-in session; otherwise 401.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub ActiveSession);

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let MaybeSession(session) = MaybeSession::from_request_parts(parts, state).await?;

        match session {
            Some(session) if is_authenticated(Some(&session.data)) => Ok(RequireAuth(session)),
            _ => Err(AppError::Unauthorized("Please log in first".to_string())),
        }
    }
}

/// Passes only for a logged-in admin; otherwise 403.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub ActiveSession);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let MaybeSession(session) = MaybeSession::from_request_parts(parts, state).await?;

        match session {
            Some(session) if is_admin(Some(&session.data)) => Ok(RequireAdmin(session)),
            _ => Err(AppError::Forbidden(
                "Administrator privileges required".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionUser;

    fn session(role: &str, is_login: bool) -> SessionData {
        SessionData {
            user: SessionUser {
                id: 1,
                username: "alice".to_string(),
                email: "a@x.com".to_string(),
                role: role.to_string(),
            },
            is_login,
            expires_at: i64::MAX,
        }
    }

    #[test]
    fn no_session_fails_both_gates() {
        assert!(!is_authenticated(None));
        assert!(!is_admin(None));
    }

    #[test]
    fn user_session_is_authenticated_not_admin() {
        let s = session("user", true);
        assert!(is_authenticated(Some(&s)));
        assert!(!has_admin_role(Some(&s)));
        assert!(!is_admin(Some(&s)));
    }

    #[test]
    fn admin_role_without_login_is_not_admin() {
        let s = session("admin", false);
        assert!(has_admin_role(Some(&s)));
        assert!(!is_admin(Some(&s)));
    }

    #[test]
    fn logged_in_admin_passes() {
        let s = session("admin", true);
        assert!(is_admin(Some(&s)));
    }
}
