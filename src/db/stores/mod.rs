use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use diesel::QueryableByName;
use diesel::sql_types::{BigInt, Double};

use super::DatabaseError;
use super::models::{
    BudgetLimit, BudgetSnapshot, CategoryTotal, ExchangeRate, Family, FamilyMember, FamilyRole,
    Goal, GoalEntry, MonthlyTotals, Notification, PushSubscription, Session, Totals, Transaction,
    TransactionFilter, TransactionKind, User, UserSettings,
};

mod budgets;
mod families;
mod goals;
mod notifications;
mod reference;
mod transactions;
mod users;

pub use budgets::SqlBudgetStore;
pub use families::SqlFamilyStore;
pub use goals::SqlGoalStore;
pub use notifications::SqlNotificationStore;
pub use reference::SqlReferenceStore;
pub use transactions::SqlTransactionStore;
pub use users::SqlUserStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: &User) -> Result<(), DatabaseError>;
    async fn get_user(&self, id: &str) -> Result<Option<User>, DatabaseError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;
    async fn update_user_name(&self, id: &str, name: &str) -> Result<(), DatabaseError>;
    async fn update_password(&self, id: &str, password_hash: &str) -> Result<(), DatabaseError>;
    async fn delete_user(&self, id: &str) -> Result<bool, DatabaseError>;

    async fn create_session(&self, session: &Session) -> Result<(), DatabaseError>;
    /// Returns the session only while it has not expired at `now`.
    async fn get_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, DatabaseError>;
    async fn delete_session(&self, token: &str) -> Result<(), DatabaseError>;
    async fn delete_user_sessions(&self, user_id: &str) -> Result<usize, DatabaseError>;
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError>;

    /// Stored settings, or the defaults when the user never saved any.
    async fn get_settings(&self, user_id: &str) -> Result<UserSettings, DatabaseError>;
    async fn upsert_settings(
        &self,
        user_id: &str,
        settings: &UserSettings,
    ) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn create_transaction(&self, transaction: &Transaction) -> Result<(), DatabaseError>;
    async fn get_transaction(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<Transaction>, DatabaseError>;
    async fn update_transaction(&self, transaction: &Transaction) -> Result<bool, DatabaseError>;
    async fn delete_transaction(&self, user_id: &str, id: &str) -> Result<bool, DatabaseError>;
    async fn list_transactions(
        &self,
        user_id: &str,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, DatabaseError>;
    async fn list_categories(&self, user_id: &str) -> Result<Vec<String>, DatabaseError>;
    /// Per-category sums of one kind for `from <= occurred_on < until`.
    async fn category_totals(
        &self,
        user_id: &str,
        kind: TransactionKind,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<CategoryTotal>, DatabaseError>;
    async fn category_spent(
        &self,
        user_id: &str,
        category: &str,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<f64, DatabaseError>;
    async fn totals(
        &self,
        user_id: &str,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Totals, DatabaseError>;
    /// Income and expense grouped by `YYYY-MM`, oldest first.
    async fn monthly_totals(
        &self,
        user_id: &str,
        from: NaiveDate,
    ) -> Result<Vec<MonthlyTotals>, DatabaseError>;
    async fn list_family_transactions(
        &self,
        family_id: &str,
        limit: i64,
    ) -> Result<Vec<Transaction>, DatabaseError>;
}

#[async_trait]
pub trait BudgetStore: Send + Sync {
    async fn upsert_limit(
        &self,
        user_id: &str,
        category: &str,
        monthly_limit: f64,
    ) -> Result<BudgetLimit, DatabaseError>;
    async fn get_limit(
        &self,
        user_id: &str,
        category: &str,
    ) -> Result<Option<BudgetLimit>, DatabaseError>;
    async fn delete_limit(&self, user_id: &str, category: &str) -> Result<bool, DatabaseError>;
    async fn list_limits(&self, user_id: &str) -> Result<Vec<BudgetLimit>, DatabaseError>;
    async fn users_with_limits(&self) -> Result<Vec<String>, DatabaseError>;
    /// Inserts the snapshot unless one exists for the same user, month and
    /// category. Returns whether a row was written.
    async fn insert_snapshot(&self, snapshot: &BudgetSnapshot) -> Result<bool, DatabaseError>;
    /// Snapshots for months `>= since_month` (`YYYY-MM`), newest first.
    async fn history(
        &self,
        user_id: &str,
        since_month: &str,
    ) -> Result<Vec<BudgetSnapshot>, DatabaseError>;
    /// Categories already snapshotted for `month`.
    async fn snapshot_categories(
        &self,
        user_id: &str,
        month: &str,
    ) -> Result<Vec<String>, DatabaseError>;
}

#[async_trait]
pub trait GoalStore: Send + Sync {
    async fn create_goal(&self, goal: &Goal) -> Result<(), DatabaseError>;
    async fn get_goal(&self, user_id: &str, id: &str) -> Result<Option<Goal>, DatabaseError>;
    async fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>, DatabaseError>;
    /// Saves name, target and deadline; the status follows the new target.
    async fn update_goal(&self, goal: &Goal) -> Result<bool, DatabaseError>;
    async fn delete_goal(&self, user_id: &str, id: &str) -> Result<bool, DatabaseError>;
    /// Records a ledger entry and moves the goal balance in one transaction.
    /// Returns `false` when the goal is missing or a withdrawal exceeds the
    /// current amount; nothing is written in that case.
    async fn add_entry(&self, entry: &GoalEntry) -> Result<bool, DatabaseError>;
    async fn list_entries(&self, goal_id: &str) -> Result<Vec<GoalEntry>, DatabaseError>;
}

#[async_trait]
pub trait FamilyStore: Send + Sync {
    /// Creates the family with its owner as the first member.
    async fn create_family(&self, family: &Family) -> Result<(), DatabaseError>;
    async fn family_for_user(&self, user_id: &str) -> Result<Option<Family>, DatabaseError>;
    async fn list_members(&self, family_id: &str) -> Result<Vec<FamilyMember>, DatabaseError>;
    async fn add_member(
        &self,
        family_id: &str,
        user_id: &str,
        role: FamilyRole,
    ) -> Result<(), DatabaseError>;
    async fn remove_member(&self, family_id: &str, user_id: &str) -> Result<bool, DatabaseError>;
    async fn delete_family(&self, family_id: &str) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create_notification(&self, notification: &Notification) -> Result<(), DatabaseError>;
    async fn list_notifications(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>, DatabaseError>;
    async fn unread_count(&self, user_id: &str) -> Result<i64, DatabaseError>;
    async fn mark_read(&self, user_id: &str, id: &str) -> Result<bool, DatabaseError>;
    async fn mark_all_read(&self, user_id: &str) -> Result<usize, DatabaseError>;
    async fn delete_notification(&self, user_id: &str, id: &str) -> Result<bool, DatabaseError>;

    /// Registers the endpoint, moving it to this user if it was known.
    async fn subscribe(&self, subscription: &PushSubscription) -> Result<(), DatabaseError>;
    async fn unsubscribe(&self, user_id: &str, endpoint: &str) -> Result<bool, DatabaseError>;
    async fn list_subscriptions(
        &self,
        user_id: &str,
    ) -> Result<Vec<PushSubscription>, DatabaseError>;
}

#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn translations(&self, language: &str)
    -> Result<BTreeMap<String, String>, DatabaseError>;
    async fn upsert_translations(
        &self,
        language: &str,
        entries: &BTreeMap<String, String>,
    ) -> Result<(), DatabaseError>;
    async fn upsert_rates(&self, rates: &[ExchangeRate]) -> Result<(), DatabaseError>;
    async fn list_rates(&self, provider: &str) -> Result<Vec<ExchangeRate>, DatabaseError>;
}

pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Query(format!("invalid timestamp {s:?}: {e}")))
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(s: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DatabaseError::Query(format!("invalid date {s:?}: {e}")))
}

fn parse_enum<T: FromStr<Err = String>>(s: &str) -> Result<T, DatabaseError> {
    s.parse().map_err(DatabaseError::Query)
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

#[derive(QueryableByName)]
struct SumRow {
    #[diesel(sql_type = Double)]
    total: f64,
}
