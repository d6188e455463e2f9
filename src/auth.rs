use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::db::models::{Session, User};
use crate::db::{DatabaseError, UserStore};

pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_SESSION_TTL_HOURS: i64 = 24 * 365 * 10;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("email is already registered")]
    EmailTaken,
    #[error("{0}")]
    Validation(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(())
    } else {
        Err(AuthError::Validation("email is not valid".to_string()))
    }
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub async fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AuthError::Hash(e.to_string()))?
        .map_err(|e| AuthError::Hash(e.to_string()))
}

pub async fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AuthError::Hash(e.to_string()))?
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Password accounts with opaque, expiring session tokens.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, config: AuthConfig) -> Self {
        Self { users, config }
    }

    pub fn cookie_name(&self) -> &str {
        &self.config.cookie_name
    }

    pub fn secure_cookies(&self) -> bool {
        self.config.secure_cookies
    }

    pub fn session_ttl(&self) -> Duration {
        let hours = i64::try_from(self.config.session_ttl_hours)
            .unwrap_or(MAX_SESSION_TTL_HOURS)
            .min(MAX_SESSION_TTL_HOURS);
        Duration::hours(hours)
    }

    pub async fn register(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<(User, Session), AuthError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_password(password)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::Validation("name cannot be empty".to_string()));
        }

        if self.users.get_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            email,
            name: name.to_string(),
            password_hash: hash_password(password, self.config.bcrypt_cost).await?,
            created_at: now,
            updated_at: now,
        };
        self.users.create_user(&user).await?;
        info!(user_id = %user.id, "user registered");

        let session = self.start_session(&user.id).await?;
        Ok((user, session))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(User, Session), AuthError> {
        let email = normalize_email(email);
        let user = self
            .users
            .get_user_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash).await? {
            debug!(user_id = %user.id, "password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let session = self.start_session(&user.id).await?;
        Ok((user, session))
    }

    /// Resolves a token to its user; unknown or expired tokens yield `None`.
    pub async fn authenticate(&self, token: &str) -> Result<Option<User>, AuthError> {
        let Some(session) = self.users.get_session(token, Utc::now()).await? else {
            return Ok(None);
        };
        Ok(self.users.get_user(&session.user_id).await?)
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.users.delete_session(token).await?;
        Ok(())
    }

    /// Replaces the password and signs out every other session.
    pub async fn change_password(
        &self,
        user: &User,
        current: &str,
        new_password: &str,
    ) -> Result<Session, AuthError> {
        if !verify_password(current, &user.password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }
        validate_password(new_password)?;

        let hash = hash_password(new_password, self.config.bcrypt_cost).await?;
        self.users.update_password(&user.id, &hash).await?;
        self.users.delete_user_sessions(&user.id).await?;
        info!(user_id = %user.id, "password changed");
        self.start_session(&user.id).await
    }

    pub async fn purge_expired(&self) -> Result<usize, AuthError> {
        Ok(self.users.purge_expired_sessions(Utc::now()).await?)
    }

    async fn start_session(&self, user_id: &str) -> Result<Session, AuthError> {
        let now = Utc::now();
        let session = Session {
            token: Uuid::new_v4().simple().to_string(),
            user_id: user_id.to_string(),
            created_at: now,
            expires_at: now + self.session_ttl(),
        };
        self.users.create_session(&session).await?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::manager::temp_sqlite;

    fn service(manager: &crate::db::DatabaseManager) -> AuthService {
        AuthService::new(
            manager.user_store(),
            AuthConfig {
                bcrypt_cost: 4,
                ..AuthConfig::default()
            },
        )
    }

    #[test]
    fn email_is_normalised() {
        assert_eq!(normalize_email("  Ana@Example.ORG "), "ana@example.org");
        assert!(validate_email("ana@example.org").is_ok());
        assert!(validate_email("ana@localhost").is_err());
        assert!(validate_email("@example.org").is_err());
    }

    #[tokio::test]
    async fn register_login_and_logout() {
        let (_file, manager) = temp_sqlite().await;
        let auth = service(&manager);

        let (user, session) = auth
            .register("Ana@Example.org", "Ana", "correct horse")
            .await
            .unwrap();
        assert_eq!(user.email, "ana@example.org");
        assert_ne!(user.password_hash, "correct horse");

        let resolved = auth.authenticate(&session.token).await.unwrap().unwrap();
        assert_eq!(resolved.id, user.id);

        assert!(matches!(
            auth.register("ana@example.org", "Ana", "another pass").await,
            Err(AuthError::EmailTaken)
        ));
        assert!(matches!(
            auth.login("ana@example.org", "wrong password").await,
            Err(AuthError::InvalidCredentials)
        ));

        let (_, second) = auth.login(" ANA@example.org", "correct horse").await.unwrap();
        auth.logout(&second.token).await.unwrap();
        assert!(auth.authenticate(&second.token).await.unwrap().is_none());
        assert!(auth.authenticate(&session.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let (_file, manager) = temp_sqlite().await;
        let auth = service(&manager);
        assert!(matches!(
            auth.register("ana@example.org", "Ana", "short").await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn password_change_revokes_old_sessions() {
        let (_file, manager) = temp_sqlite().await;
        let auth = service(&manager);
        let (user, old) = auth
            .register("ana@example.org", "Ana", "first password")
            .await
            .unwrap();

        let fresh = auth
            .change_password(&user, "first password", "second password")
            .await
            .unwrap();
        assert!(auth.authenticate(&old.token).await.unwrap().is_none());
        assert!(auth.authenticate(&fresh.token).await.unwrap().is_some());
        assert!(auth.login("ana@example.org", "second password").await.is_ok());
    }
}
