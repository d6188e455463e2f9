use async_trait::async_trait;
use chrono::Utc;
use diesel::QueryableByName;
use diesel::sql_types::{Double, Text};
use uuid::Uuid;

use super::{BudgetStore, format_timestamp, parse_timestamp};
use crate::db::models::{BudgetLimit, BudgetSnapshot};
use crate::db::{Database, DatabaseError};
use crate::params;

#[derive(QueryableByName)]
struct DbBudgetLimit {
    #[diesel(sql_type = Text)]
    id: String,
    #[diesel(sql_type = Text)]
    user_id: String,
    #[diesel(sql_type = Text)]
    category: String,
    #[diesel(sql_type = Double)]
    monthly_limit: f64,
    #[diesel(sql_type = Text)]
    created_at: String,
    #[diesel(sql_type = Text)]
    updated_at: String,
}

impl DbBudgetLimit {
    fn to_limit(&self) -> Result<BudgetLimit, DatabaseError> {
        Ok(BudgetLimit {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            category: self.category.clone(),
            monthly_limit: self.monthly_limit,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

#[derive(QueryableByName)]
struct DbSnapshot {
    #[diesel(sql_type = Text)]
    id: String,
    #[diesel(sql_type = Text)]
    user_id: String,
    #[diesel(sql_type = Text)]
    month: String,
    #[diesel(sql_type = Text)]
    category: String,
    #[diesel(sql_type = Double)]
    limit_amount: f64,
    #[diesel(sql_type = Double)]
    spent: f64,
    #[diesel(sql_type = Text)]
    created_at: String,
}

impl DbSnapshot {
    fn to_snapshot(&self) -> Result<BudgetSnapshot, DatabaseError> {
        Ok(BudgetSnapshot {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            month: self.month.clone(),
            category: self.category.clone(),
            limit_amount: self.limit_amount,
            spent: self.spent,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

#[derive(QueryableByName)]
struct DbUserId {
    #[diesel(sql_type = Text)]
    user_id: String,
}

#[derive(QueryableByName)]
struct DbCategory {
    #[diesel(sql_type = Text)]
    category: String,
}

const LIMIT_COLUMNS: &str = "id, user_id, category, monthly_limit, created_at, updated_at";

pub struct SqlBudgetStore {
    db: Database,
}

impl SqlBudgetStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BudgetStore for SqlBudgetStore {
    async fn upsert_limit(
        &self,
        user_id: &str,
        category: &str,
        monthly_limit: f64,
    ) -> Result<BudgetLimit, DatabaseError> {
        let now = format_timestamp(&Utc::now());
        self.db
            .execute(
                "INSERT INTO budget_limits (id, user_id, category, monthly_limit, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $5) \
                 ON CONFLICT (user_id, category) DO UPDATE SET \
                 monthly_limit = EXCLUDED.monthly_limit, updated_at = EXCLUDED.updated_at",
                params![Uuid::new_v4().to_string(), user_id, category, monthly_limit, now],
            )
            .await?;

        self.get_limit(user_id, category)
            .await?
            .ok_or(DatabaseError::NotFound("budget limit"))
    }

    async fn get_limit(
        &self,
        user_id: &str,
        category: &str,
    ) -> Result<Option<BudgetLimit>, DatabaseError> {
        let row: Option<DbBudgetLimit> = self
            .db
            .fetch_optional(
                &format!(
                    "SELECT {LIMIT_COLUMNS} FROM budget_limits WHERE user_id = $1 AND category = $2"
                ),
                params![user_id, category],
            )
            .await?;
        row.map(|r| r.to_limit()).transpose()
    }

    async fn delete_limit(&self, user_id: &str, category: &str) -> Result<bool, DatabaseError> {
        let affected = self
            .db
            .execute(
                "DELETE FROM budget_limits WHERE user_id = $1 AND category = $2",
                params![user_id, category],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn list_limits(&self, user_id: &str) -> Result<Vec<BudgetLimit>, DatabaseError> {
        let rows: Vec<DbBudgetLimit> = self
            .db
            .fetch_all(
                &format!(
                    "SELECT {LIMIT_COLUMNS} FROM budget_limits WHERE user_id = $1 ORDER BY category"
                ),
                params![user_id],
            )
            .await?;
        rows.iter().map(DbBudgetLimit::to_limit).collect()
    }

    async fn users_with_limits(&self) -> Result<Vec<String>, DatabaseError> {
        let rows: Vec<DbUserId> = self
            .db
            .fetch_all(
                "SELECT DISTINCT user_id FROM budget_limits ORDER BY user_id",
                params![],
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.user_id).collect())
    }

    async fn insert_snapshot(&self, snapshot: &BudgetSnapshot) -> Result<bool, DatabaseError> {
        let affected = self
            .db
            .execute(
                "INSERT INTO budget_history (id, user_id, month, category, limit_amount, spent, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (user_id, month, category) DO NOTHING",
                params![
                    &snapshot.id,
                    &snapshot.user_id,
                    &snapshot.month,
                    &snapshot.category,
                    snapshot.limit_amount,
                    snapshot.spent,
                    format_timestamp(&snapshot.created_at),
                ],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn history(
        &self,
        user_id: &str,
        since_month: &str,
    ) -> Result<Vec<BudgetSnapshot>, DatabaseError> {
        let rows: Vec<DbSnapshot> = self
            .db
            .fetch_all(
                "SELECT id, user_id, month, category, limit_amount, spent, created_at \
                 FROM budget_history WHERE user_id = $1 AND month >= $2 \
                 ORDER BY month DESC, category",
                params![user_id, since_month],
            )
            .await?;
        rows.iter().map(DbSnapshot::to_snapshot).collect()
    }

    async fn snapshot_categories(
        &self,
        user_id: &str,
        month: &str,
    ) -> Result<Vec<String>, DatabaseError> {
        let rows: Vec<DbCategory> = self
            .db
            .fetch_all(
                "SELECT category FROM budget_history WHERE user_id = $1 AND month = $2 \
                 ORDER BY category",
                params![user_id, month],
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.category).collect())
    }
}
