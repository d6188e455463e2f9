use async_trait::async_trait;
use chrono::Utc;
use diesel::QueryableByName;
use diesel::sql_types::{Double, Nullable, Text};

use super::{GoalStore, format_date, format_timestamp, parse_date, parse_enum, parse_timestamp};
use crate::db::models::{Goal, GoalEntry, GoalEntryKind};
use crate::db::{Database, DatabaseError, Statement};
use crate::params;

#[derive(QueryableByName)]
struct DbGoal {
    #[diesel(sql_type = Text)]
    id: String,
    #[diesel(sql_type = Text)]
    user_id: String,
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Double)]
    target_amount: f64,
    #[diesel(sql_type = Double)]
    current_amount: f64,
    #[diesel(sql_type = Nullable<Text>)]
    deadline: Option<String>,
    #[diesel(sql_type = Text)]
    status: String,
    #[diesel(sql_type = Text)]
    created_at: String,
    #[diesel(sql_type = Text)]
    updated_at: String,
}

impl DbGoal {
    fn to_goal(&self) -> Result<Goal, DatabaseError> {
        Ok(Goal {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            name: self.name.clone(),
            target_amount: self.target_amount,
            current_amount: self.current_amount,
            deadline: self.deadline.as_deref().map(parse_date).transpose()?,
            status: parse_enum(&self.status)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

#[derive(QueryableByName)]
struct DbGoalEntry {
    #[diesel(sql_type = Text)]
    id: String,
    #[diesel(sql_type = Text)]
    goal_id: String,
    #[diesel(sql_type = Text)]
    user_id: String,
    #[diesel(sql_type = Text)]
    kind: String,
    #[diesel(sql_type = Double)]
    amount: f64,
    #[diesel(sql_type = Text)]
    note: String,
    #[diesel(sql_type = Text)]
    created_at: String,
}

impl DbGoalEntry {
    fn to_entry(&self) -> Result<GoalEntry, DatabaseError> {
        Ok(GoalEntry {
            id: self.id.clone(),
            goal_id: self.goal_id.clone(),
            user_id: self.user_id.clone(),
            kind: parse_enum(&self.kind)?,
            amount: self.amount,
            note: self.note.clone(),
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

const GOAL_COLUMNS: &str =
    "id, user_id, name, target_amount, current_amount, deadline, status, created_at, updated_at";

const REFRESH_STATUS: &str = "UPDATE goals SET status = CASE \
     WHEN current_amount >= target_amount THEN 'completed' ELSE 'active' END \
     WHERE id = $1";

pub struct SqlGoalStore {
    db: Database,
}

impl SqlGoalStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GoalStore for SqlGoalStore {
    async fn create_goal(&self, goal: &Goal) -> Result<(), DatabaseError> {
        self.db
            .execute_batch(vec![
                Statement::new(
                    format!(
                        "INSERT INTO goals ({GOAL_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
                    ),
                    params![
                        &goal.id,
                        &goal.user_id,
                        &goal.name,
                        goal.target_amount,
                        goal.current_amount,
                        goal.deadline.map(format_date),
                        goal.status.as_str(),
                        format_timestamp(&goal.created_at),
                        format_timestamp(&goal.updated_at),
                    ],
                ),
                Statement::new(REFRESH_STATUS, params![&goal.id]),
            ])
            .await?;
        Ok(())
    }

    async fn get_goal(&self, user_id: &str, id: &str) -> Result<Option<Goal>, DatabaseError> {
        let row: Option<DbGoal> = self
            .db
            .fetch_optional(
                &format!("SELECT {GOAL_COLUMNS} FROM goals WHERE id = $1 AND user_id = $2"),
                params![id, user_id],
            )
            .await?;
        row.map(|r| r.to_goal()).transpose()
    }

    async fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>, DatabaseError> {
        let rows: Vec<DbGoal> = self
            .db
            .fetch_all(
                &format!(
                    "SELECT {GOAL_COLUMNS} FROM goals WHERE user_id = $1 ORDER BY created_at, id"
                ),
                params![user_id],
            )
            .await?;
        rows.iter().map(DbGoal::to_goal).collect()
    }

    async fn update_goal(&self, goal: &Goal) -> Result<bool, DatabaseError> {
        self.db
            .execute_batch(vec![
                Statement::guarded(
                    "UPDATE goals SET name = $1, target_amount = $2, deadline = $3, updated_at = $4 \
                     WHERE id = $5 AND user_id = $6",
                    params![
                        &goal.name,
                        goal.target_amount,
                        goal.deadline.map(format_date),
                        format_timestamp(&goal.updated_at),
                        &goal.id,
                        &goal.user_id,
                    ],
                ),
                Statement::new(REFRESH_STATUS, params![&goal.id]),
            ])
            .await
    }

    async fn delete_goal(&self, user_id: &str, id: &str) -> Result<bool, DatabaseError> {
        let affected = self
            .db
            .execute(
                "DELETE FROM goals WHERE id = $1 AND user_id = $2",
                params![id, user_id],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn add_entry(&self, entry: &GoalEntry) -> Result<bool, DatabaseError> {
        let now = format_timestamp(&Utc::now());
        let balance = match entry.kind {
            GoalEntryKind::Deposit => Statement::guarded(
                "UPDATE goals SET current_amount = current_amount + $1, updated_at = $2 \
                 WHERE id = $3 AND user_id = $4",
                params![entry.amount, now, &entry.goal_id, &entry.user_id],
            ),
            GoalEntryKind::Withdrawal => Statement::guarded(
                "UPDATE goals SET current_amount = current_amount - $1, updated_at = $2 \
                 WHERE id = $3 AND user_id = $4 AND current_amount >= $1",
                params![entry.amount, now, &entry.goal_id, &entry.user_id],
            ),
        };

        self.db
            .execute_batch(vec![
                balance,
                Statement::new(
                    "INSERT INTO goal_transactions (id, goal_id, user_id, kind, amount, note, created_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                    params![
                        &entry.id,
                        &entry.goal_id,
                        &entry.user_id,
                        entry.kind.as_str(),
                        entry.amount,
                        &entry.note,
                        format_timestamp(&entry.created_at),
                    ],
                ),
                Statement::new(REFRESH_STATUS, params![&entry.goal_id]),
            ])
            .await
    }

    async fn list_entries(&self, goal_id: &str) -> Result<Vec<GoalEntry>, DatabaseError> {
        let rows: Vec<DbGoalEntry> = self
            .db
            .fetch_all(
                "SELECT id, goal_id, user_id, kind, amount, note, created_at \
                 FROM goal_transactions WHERE goal_id = $1 ORDER BY created_at DESC, id",
                params![goal_id],
            )
            .await?;
        rows.iter().map(DbGoalEntry::to_entry).collect()
    }
}
