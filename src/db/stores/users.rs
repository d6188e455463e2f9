use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::QueryableByName;
use diesel::sql_types::{Bool, Text};

use super::{UserStore, format_timestamp, parse_timestamp};
use crate::db::models::{Session, User, UserSettings};
use crate::db::{Database, DatabaseError};
use crate::params;

#[derive(QueryableByName)]
struct DbUser {
    #[diesel(sql_type = Text)]
    id: String,
    #[diesel(sql_type = Text)]
    email: String,
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Text)]
    password_hash: String,
    #[diesel(sql_type = Text)]
    created_at: String,
    #[diesel(sql_type = Text)]
    updated_at: String,
}

impl DbUser {
    fn to_user(&self) -> Result<User, DatabaseError> {
        Ok(User {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            password_hash: self.password_hash.clone(),
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

#[derive(QueryableByName)]
struct DbSession {
    #[diesel(sql_type = Text)]
    token: String,
    #[diesel(sql_type = Text)]
    user_id: String,
    #[diesel(sql_type = Text)]
    created_at: String,
    #[diesel(sql_type = Text)]
    expires_at: String,
}

impl DbSession {
    fn to_session(&self) -> Result<Session, DatabaseError> {
        Ok(Session {
            token: self.token.clone(),
            user_id: self.user_id.clone(),
            created_at: parse_timestamp(&self.created_at)?,
            expires_at: parse_timestamp(&self.expires_at)?,
        })
    }
}

#[derive(QueryableByName)]
struct DbSettings {
    #[diesel(sql_type = Text)]
    currency: String,
    #[diesel(sql_type = Text)]
    language: String,
    #[diesel(sql_type = Text)]
    rate_provider: String,
    #[diesel(sql_type = Text)]
    theme: String,
    #[diesel(sql_type = Bool)]
    notifications_enabled: bool,
}

impl From<DbSettings> for UserSettings {
    fn from(row: DbSettings) -> Self {
        UserSettings {
            currency: row.currency,
            language: row.language,
            rate_provider: row.rate_provider,
            theme: row.theme,
            notifications_enabled: row.notifications_enabled,
        }
    }
}

const USER_COLUMNS: &str = "id, email, name, password_hash, created_at, updated_at";

pub struct SqlUserStore {
    db: Database,
}

impl SqlUserStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for SqlUserStore {
    async fn create_user(&self, user: &User) -> Result<(), DatabaseError> {
        self.db
            .execute(
                "INSERT INTO users (id, email, name, password_hash, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                params![
                    &user.id,
                    &user.email,
                    &user.name,
                    &user.password_hash,
                    format_timestamp(&user.created_at),
                    format_timestamp(&user.updated_at),
                ],
            )
            .await?;
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, DatabaseError> {
        let row: Option<DbUser> = self
            .db
            .fetch_optional(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"),
                params![id],
            )
            .await?;
        row.map(|r| r.to_user()).transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let row: Option<DbUser> = self
            .db
            .fetch_optional(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"),
                params![email],
            )
            .await?;
        row.map(|r| r.to_user()).transpose()
    }

    async fn update_user_name(&self, id: &str, name: &str) -> Result<(), DatabaseError> {
        self.db
            .execute(
                "UPDATE users SET name = $1, updated_at = $2 WHERE id = $3",
                params![name, format_timestamp(&Utc::now()), id],
            )
            .await?;
        Ok(())
    }

    async fn update_password(&self, id: &str, password_hash: &str) -> Result<(), DatabaseError> {
        self.db
            .execute(
                "UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3",
                params![password_hash, format_timestamp(&Utc::now()), id],
            )
            .await?;
        Ok(())
    }

    async fn delete_user(&self, id: &str) -> Result<bool, DatabaseError> {
        let affected = self
            .db
            .execute("DELETE FROM users WHERE id = $1", params![id])
            .await?;
        Ok(affected > 0)
    }

    async fn create_session(&self, session: &Session) -> Result<(), DatabaseError> {
        self.db
            .execute(
                "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES ($1, $2, $3, $4)",
                params![
                    &session.token,
                    &session.user_id,
                    format_timestamp(&session.created_at),
                    format_timestamp(&session.expires_at),
                ],
            )
            .await?;
        Ok(())
    }

    async fn get_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, DatabaseError> {
        let row: Option<DbSession> = self
            .db
            .fetch_optional(
                "SELECT token, user_id, created_at, expires_at FROM sessions \
                 WHERE token = $1 AND expires_at > $2",
                params![token, format_timestamp(&now)],
            )
            .await?;
        row.map(|r| r.to_session()).transpose()
    }

    async fn delete_session(&self, token: &str) -> Result<(), DatabaseError> {
        self.db
            .execute("DELETE FROM sessions WHERE token = $1", params![token])
            .await?;
        Ok(())
    }

    async fn delete_user_sessions(&self, user_id: &str) -> Result<usize, DatabaseError> {
        self.db
            .execute("DELETE FROM sessions WHERE user_id = $1", params![user_id])
            .await
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError> {
        self.db
            .execute(
                "DELETE FROM sessions WHERE expires_at <= $1",
                params![format_timestamp(&now)],
            )
            .await
    }

    async fn get_settings(&self, user_id: &str) -> Result<UserSettings, DatabaseError> {
        let row: Option<DbSettings> = self
            .db
            .fetch_optional(
                "SELECT currency, language, rate_provider, theme, notifications_enabled \
                 FROM user_settings WHERE user_id = $1",
                params![user_id],
            )
            .await?;
        Ok(row.map(UserSettings::from).unwrap_or_default())
    }

    async fn upsert_settings(
        &self,
        user_id: &str,
        settings: &UserSettings,
    ) -> Result<(), DatabaseError> {
        self.db
            .execute(
                "INSERT INTO user_settings \
                 (user_id, currency, language, rate_provider, theme, notifications_enabled, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (user_id) DO UPDATE SET \
                 currency = EXCLUDED.currency, \
                 language = EXCLUDED.language, \
                 rate_provider = EXCLUDED.rate_provider, \
                 theme = EXCLUDED.theme, \
                 notifications_enabled = EXCLUDED.notifications_enabled, \
                 updated_at = EXCLUDED.updated_at",
                params![
                    user_id,
                    &settings.currency,
                    &settings.language,
                    &settings.rate_provider,
                    &settings.theme,
                    settings.notifications_enabled,
                    format_timestamp(&Utc::now()),
                ],
            )
            .await?;
        Ok(())
    }
}
