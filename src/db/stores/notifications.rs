use async_trait::async_trait;
use diesel::QueryableByName;
use diesel::sql_types::{Bool, Text};

use super::{CountRow, NotificationStore, format_timestamp, parse_timestamp};
use crate::db::models::{Notification, PushSubscription};
use crate::db::{Database, DatabaseError};
use crate::params;

#[derive(QueryableByName)]
struct DbNotification {
    #[diesel(sql_type = Text)]
    id: String,
    #[diesel(sql_type = Text)]
    user_id: String,
    #[diesel(sql_type = Text)]
    kind: String,
    #[diesel(sql_type = Text)]
    title: String,
    #[diesel(sql_type = Text)]
    message: String,
    #[diesel(sql_type = Bool)]
    is_read: bool,
    #[diesel(sql_type = Text)]
    created_at: String,
}

impl DbNotification {
    fn to_notification(&self) -> Result<Notification, DatabaseError> {
        Ok(Notification {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            kind: self.kind.clone(),
            title: self.title.clone(),
            message: self.message.clone(),
            read: self.is_read,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

#[derive(QueryableByName)]
struct DbSubscription {
    #[diesel(sql_type = Text)]
    id: String,
    #[diesel(sql_type = Text)]
    user_id: String,
    #[diesel(sql_type = Text)]
    endpoint: String,
    #[diesel(sql_type = Text)]
    p256dh: String,
    #[diesel(sql_type = Text)]
    auth_key: String,
    #[diesel(sql_type = Text)]
    created_at: String,
}

impl DbSubscription {
    fn to_subscription(&self) -> Result<PushSubscription, DatabaseError> {
        Ok(PushSubscription {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            endpoint: self.endpoint.clone(),
            p256dh: self.p256dh.clone(),
            auth_key: self.auth_key.clone(),
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub struct SqlNotificationStore {
    db: Database,
}

impl SqlNotificationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationStore for SqlNotificationStore {
    async fn create_notification(&self, notification: &Notification) -> Result<(), DatabaseError> {
        self.db
            .execute(
                "INSERT INTO notifications (id, user_id, kind, title, message, is_read, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                params![
                    &notification.id,
                    &notification.user_id,
                    &notification.kind,
                    &notification.title,
                    &notification.message,
                    notification.read,
                    format_timestamp(&notification.created_at),
                ],
            )
            .await?;
        Ok(())
    }

    async fn list_notifications(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>, DatabaseError> {
        let sql = if unread_only {
            "SELECT id, user_id, kind, title, message, is_read, created_at FROM notifications \
             WHERE user_id = $1 AND is_read = FALSE ORDER BY created_at DESC, id LIMIT $2"
        } else {
            "SELECT id, user_id, kind, title, message, is_read, created_at FROM notifications \
             WHERE user_id = $1 ORDER BY created_at DESC, id LIMIT $2"
        };
        let rows: Vec<DbNotification> = self.db.fetch_all(sql, params![user_id, limit]).await?;
        rows.iter().map(DbNotification::to_notification).collect()
    }

    async fn unread_count(&self, user_id: &str) -> Result<i64, DatabaseError> {
        let row: CountRow = self
            .db
            .fetch_one(
                "SELECT COUNT(*) AS count FROM notifications WHERE user_id = $1 AND is_read = FALSE",
                params![user_id],
            )
            .await?;
        Ok(row.count)
    }

    async fn mark_read(&self, user_id: &str, id: &str) -> Result<bool, DatabaseError> {
        let affected = self
            .db
            .execute(
                "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2",
                params![id, user_id],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<usize, DatabaseError> {
        self.db
            .execute(
                "UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND is_read = FALSE",
                params![user_id],
            )
            .await
    }

    async fn delete_notification(&self, user_id: &str, id: &str) -> Result<bool, DatabaseError> {
        let affected = self
            .db
            .execute(
                "DELETE FROM notifications WHERE id = $1 AND user_id = $2",
                params![id, user_id],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn subscribe(&self, subscription: &PushSubscription) -> Result<(), DatabaseError> {
        self.db
            .execute(
                "INSERT INTO push_subscriptions (id, user_id, endpoint, p256dh, auth_key, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (endpoint) DO UPDATE SET \
                 user_id = EXCLUDED.user_id, p256dh = EXCLUDED.p256dh, auth_key = EXCLUDED.auth_key",
                params![
                    &subscription.id,
                    &subscription.user_id,
                    &subscription.endpoint,
                    &subscription.p256dh,
                    &subscription.auth_key,
                    format_timestamp(&subscription.created_at),
                ],
            )
            .await?;
        Ok(())
    }

    async fn unsubscribe(&self, user_id: &str, endpoint: &str) -> Result<bool, DatabaseError> {
        let affected = self
            .db
            .execute(
                "DELETE FROM push_subscriptions WHERE user_id = $1 AND endpoint = $2",
                params![user_id, endpoint],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn list_subscriptions(
        &self,
        user_id: &str,
    ) -> Result<Vec<PushSubscription>, DatabaseError> {
        let rows: Vec<DbSubscription> = self
            .db
            .fetch_all(
                "SELECT id, user_id, endpoint, p256dh, auth_key, created_at \
                 FROM push_subscriptions WHERE user_id = $1 ORDER BY created_at",
                params![user_id],
            )
            .await?;
        rows.iter().map(DbSubscription::to_subscription).collect()
    }
}
