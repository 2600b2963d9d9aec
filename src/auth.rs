//! Authentication module.

use crate::db::{Database, Role, User, UserSummary};
use crate::error::{AppError, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

/// Same message for unknown users and wrong passwords.
const INVALID_CREDENTIALS: &str = "Invalid username or password";

/// Hash a password using Argon2.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Generate a secure random token.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Loose `local@domain.tld` shape check.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty() || domain.contains('@') {
        return false;
    }

    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

fn required(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Authentication service.
pub struct AuthService {
    db: Database,
    registration_enabled: bool,
}

impl AuthService {
    /// Create a new auth service.
    pub fn new(db: Database, registration_enabled: bool) -> Self {
        Self {
            db,
            registration_enabled,
        }
    }

    /// Register a new account with role "user", returning its ID.
    pub fn register(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        password: Option<&str>,
    ) -> Result<i64> {
        let (Some(username), Some(email), Some(password)) =
            (required(username), required(email), required(password))
        else {
            return Err(AppError::BadRequest("All fields are required".to_string()));
        };

        if !self.registration_enabled {
            return Err(AppError::BadRequest("Registration is disabled".to_string()));
        }

        let id = self.create_user(username, email, password, Role::User)?.id;
        tracing::info!(user_id = id, username, "User registered");
        Ok(id)
    }

    /// Create a new user with any role (CLI bootstrap).
    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User> {
        let password_hash = hash_password(password)?;
        let id = self.db.create_user(username, email, &password_hash, role)?;

        self.db
            .get_user_by_id(id)?
            .ok_or_else(|| AppError::Internal(format!("User {} vanished after insert", id)))
    }

    /// Check credentials and return the matching user.
    pub fn login(&self, username: Option<&str>, password: Option<&str>) -> Result<User> {
        let (Some(username), Some(password)) = (required(username), required(password)) else {
            return Err(AppError::BadRequest(
                "Username and password are required".to_string(),
            ));
        };

        let user = self
            .db
            .get_user_by_username(username)?
            .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        tracing::info!(user_id = user.id, "User logged in");
        Ok(user)
    }

    /// Change username and email of the given account.
    pub fn update_profile(
        &self,
        user_id: i64,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<(String, String)> {
        let (Some(username), Some(email)) = (required(username), required(email)) else {
            return Err(AppError::BadRequest(
                "Username and email are required".to_string(),
            ));
        };

        self.db.update_profile(user_id, username, email)?;
        Ok((username.to_string(), email.to_string()))
    }

    /// Set the role of a user. No guard against demoting the last admin.
    pub fn set_role(&self, user_id: i64, role: Option<&str>) -> Result<Role> {
        let role = role
            .and_then(Role::parse)
            .ok_or_else(|| AppError::BadRequest("Invalid role".to_string()))?;

        if !self.db.update_user_role(user_id, role)? {
            return Err(AppError::NotFound(format!("User not found: {}", user_id)));
        }

        tracing::info!(user_id, role = role.as_str(), "User role changed");
        Ok(role)
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<UserSummary>> {
        self.db.list_users()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_and_verify() {
        let password = "test_password_123";
        let hash = hash_password(password).unwrap();

        assert!(verify_password(password, &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        assert_ne!(hash_password("pw1").unwrap(), hash_password("pw1").unwrap());
    }

    #[test]
    fn test_generate_token() {
        let token1 = generate_token();
        let token2 = generate_token();

        assert_eq!(token1.len(), 43); // Base64 of 32 bytes
        assert_ne!(token1, token2);
    }

    #[test]
    fn test_email_shape() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last@mail.example.org"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("@x.com"));
        assert!(!is_valid_email("a@.com"));
        assert!(!is_valid_email("a@x."));
        assert!(!is_valid_email("a b@x.com"));
        assert!(!is_valid_email("a@b@x.com"));
    }
}
