use std::sync::Arc;

use tracing::info;

use super::migrations;
use super::stores::{
    SqlBudgetStore, SqlFamilyStore, SqlGoalStore, SqlNotificationStore, SqlReferenceStore,
    SqlTransactionStore, SqlUserStore,
};
use super::{
    BudgetStore, Database, DatabaseError, Dialect, FamilyStore, GoalStore, NotificationStore,
    ReferenceStore, TransactionStore, UserStore,
};
use crate::config::DatabaseConfig;

#[derive(Clone)]
pub struct DatabaseManager {
    db: Database,
    user_store: Arc<dyn UserStore>,
    transaction_store: Arc<dyn TransactionStore>,
    budget_store: Arc<dyn BudgetStore>,
    goal_store: Arc<dyn GoalStore>,
    family_store: Arc<dyn FamilyStore>,
    notification_store: Arc<dyn NotificationStore>,
    reference_store: Arc<dyn ReferenceStore>,
}

impl DatabaseManager {
    pub fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let db = Database::connect(config)?;
        info!(dialect = db.dialect().name(), "database pool ready");

        Ok(Self {
            user_store: Arc::new(SqlUserStore::new(db.clone())),
            transaction_store: Arc::new(SqlTransactionStore::new(db.clone())),
            budget_store: Arc::new(SqlBudgetStore::new(db.clone())),
            goal_store: Arc::new(SqlGoalStore::new(db.clone())),
            family_store: Arc::new(SqlFamilyStore::new(db.clone())),
            notification_store: Arc::new(SqlNotificationStore::new(db.clone())),
            reference_store: Arc::new(SqlReferenceStore::new(db.clone())),
            db,
        })
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        let statements = match self.db.dialect() {
            Dialect::Postgres => migrations::postgres(),
            Dialect::Sqlite => migrations::sqlite(),
            Dialect::Mysql => migrations::mysql(),
        };
        let count = statements.len();
        self.db.run_ddl(statements).await?;
        info!(dialect = self.db.dialect().name(), statements = count, "migrations applied");
        Ok(())
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn dialect(&self) -> Dialect {
        self.db.dialect()
    }

    pub fn user_store(&self) -> Arc<dyn UserStore> {
        self.user_store.clone()
    }

    pub fn transaction_store(&self) -> Arc<dyn TransactionStore> {
        self.transaction_store.clone()
    }

    pub fn budget_store(&self) -> Arc<dyn BudgetStore> {
        self.budget_store.clone()
    }

    pub fn goal_store(&self) -> Arc<dyn GoalStore> {
        self.goal_store.clone()
    }

    pub fn family_store(&self) -> Arc<dyn FamilyStore> {
        self.family_store.clone()
    }

    pub fn notification_store(&self) -> Arc<dyn NotificationStore> {
        self.notification_store.clone()
    }

    pub fn reference_store(&self) -> Arc<dyn ReferenceStore> {
        self.reference_store.clone()
    }
}

/// A migrated SQLite database in a temporary file. The file lives as long
/// as the returned handle.
#[cfg(test)]
pub(crate) async fn temp_sqlite() -> (tempfile::NamedTempFile, DatabaseManager) {
    let file = tempfile::NamedTempFile::new().expect("temp sqlite file");
    let config = DatabaseConfig {
        url: format!("sqlite://{}", file.path().to_string_lossy()),
        max_connections: Some(1),
        min_connections: Some(1),
    };
    let manager = DatabaseManager::new(&config).expect("db manager");
    manager.migrate().await.expect("migrate");
    (file, manager)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, NaiveDate, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::db::models::{
        BudgetSnapshot, ExchangeRate, Family, FamilyRole, Goal, GoalEntry, GoalEntryKind,
        GoalStatus, Session, Transaction, TransactionFilter, TransactionKind, User, UserSettings,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn user(manager: &DatabaseManager, email: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            name: email.split('@').next().unwrap().to_string(),
            password_hash: "hash".to_string(),
            created_at: now,
            updated_at: now,
        };
        manager.user_store().create_user(&user).await.unwrap();
        user
    }

    async fn spend(
        manager: &DatabaseManager,
        user_id: &str,
        kind: TransactionKind,
        amount: f64,
        category: &str,
        on: NaiveDate,
    ) -> Transaction {
        let now = Utc::now();
        let tx = Transaction {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind,
            amount,
            category: category.to_string(),
            description: format!("{category} purchase"),
            occurred_on: on,
            created_at: now,
            updated_at: now,
        };
        manager.transaction_store().create_transaction(&tx).await.unwrap();
        tx
    }

    #[tokio::test]
    async fn sqlite_reopen_keeps_data() {
        let (file, manager) = temp_sqlite().await;
        let created = user(&manager, "ana@example.org").await;

        let config = DatabaseConfig {
            url: format!("sqlite://{}", file.path().to_string_lossy()),
            max_connections: Some(1),
            min_connections: Some(1),
        };
        drop(manager);
        let reopened = DatabaseManager::new(&config).unwrap();
        reopened.migrate().await.unwrap();

        let loaded = reopened
            .user_store()
            .get_user_by_email("ana@example.org")
            .await
            .unwrap()
            .expect("user persisted");
        assert_eq!(loaded.id, created.id);
        assert_eq!(loaded.created_at.timestamp(), created.created_at.timestamp());
    }

    #[tokio::test]
    async fn sessions_expire_and_settings_default() {
        let (_file, manager) = temp_sqlite().await;
        let ana = user(&manager, "ana@example.org").await;
        let store = manager.user_store();

        let now = Utc::now();
        let session = Session {
            token: "token-1".to_string(),
            user_id: ana.id.clone(),
            created_at: now,
            expires_at: now + Duration::hours(1),
        };
        store.create_session(&session).await.unwrap();
        assert!(store.get_session("token-1", now).await.unwrap().is_some());
        assert!(
            store
                .get_session("token-1", now + Duration::hours(2))
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(
            store
                .purge_expired_sessions(now + Duration::hours(2))
                .await
                .unwrap(),
            1
        );

        assert_eq!(store.get_settings(&ana.id).await.unwrap(), UserSettings::default());
        let custom = UserSettings {
            currency: "EUR".to_string(),
            notifications_enabled: false,
            ..UserSettings::default()
        };
        store.upsert_settings(&ana.id, &custom).await.unwrap();
        store.upsert_settings(&ana.id, &custom).await.unwrap();
        assert_eq!(store.get_settings(&ana.id).await.unwrap(), custom);
    }

    #[tokio::test]
    async fn transaction_filters_and_aggregates() {
        let (_file, manager) = temp_sqlite().await;
        let ana = user(&manager, "ana@example.org").await;
        let store = manager.transaction_store();

        spend(&manager, &ana.id, TransactionKind::Income, 3000.0, "salary", date(2026, 9, 1)).await;
        spend(&manager, &ana.id, TransactionKind::Expense, 120.0, "Groceries", date(2026, 9, 3)).await;
        spend(&manager, &ana.id, TransactionKind::Expense, 80.0, "groceries", date(2026, 9, 20)).await;
        spend(&manager, &ana.id, TransactionKind::Expense, 50.0, "fuel", date(2026, 10, 2)).await;
        spend(&manager, &ana.id, TransactionKind::Expense, 10.0, "fuel", date(2025, 12, 30)).await;

        let all = store
            .list_transactions(
                &ana.id,
                &TransactionFilter {
                    limit: 100,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].occurred_on, date(2026, 10, 2));

        let searched = store
            .list_transactions(
                &ana.id,
                &TransactionFilter {
                    search: Some("GROCER".to_string()),
                    limit: 100,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(searched.len(), 2);

        let last_year = store
            .list_transactions(
                &ana.id,
                &TransactionFilter {
                    year: Some(2025),
                    limit: 100,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(last_year.len(), 1);

        let paged = store
            .list_transactions(
                &ana.id,
                &TransactionFilter {
                    kind: Some(TransactionKind::Expense),
                    limit: 2,
                    offset: 1,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(paged.len(), 2);
        assert_eq!(paged[0].occurred_on, date(2026, 9, 20));

        let totals = store
            .totals(&ana.id, date(2026, 9, 1), date(2026, 10, 1))
            .await
            .unwrap();
        assert_eq!(totals.income, 3000.0);
        assert_eq!(totals.expense, 200.0);

        let empty = store
            .totals(&ana.id, date(2020, 1, 1), date(2020, 2, 1))
            .await
            .unwrap();
        assert_eq!(empty.income, 0.0);

        let spent = store
            .category_spent(&ana.id, "fuel", date(2026, 10, 1), date(2026, 11, 1))
            .await
            .unwrap();
        assert_eq!(spent, 50.0);

        let trend = store.monthly_totals(&ana.id, date(2026, 1, 1)).await.unwrap();
        let months: Vec<&str> = trend.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, vec!["2026-09", "2026-10"]);
        assert_eq!(trend[0].expense, 200.0);

        let categories = store.list_categories(&ana.id).await.unwrap();
        assert_eq!(categories.len(), 4);
    }

    #[tokio::test]
    async fn budget_limits_upsert_and_snapshots_are_written_once() {
        let (_file, manager) = temp_sqlite().await;
        let ana = user(&manager, "ana@example.org").await;
        let store = manager.budget_store();

        let first = store.upsert_limit(&ana.id, "food", 300.0).await.unwrap();
        let second = store.upsert_limit(&ana.id, "food", 450.0).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.monthly_limit, 450.0);
        assert_eq!(store.users_with_limits().await.unwrap(), vec![ana.id.clone()]);

        let snapshot = BudgetSnapshot {
            id: Uuid::new_v4().to_string(),
            user_id: ana.id.clone(),
            month: "2026-09".to_string(),
            category: "food".to_string(),
            limit_amount: 450.0,
            spent: 320.0,
            created_at: Utc::now(),
        };
        assert!(store.insert_snapshot(&snapshot).await.unwrap());
        let duplicate = BudgetSnapshot {
            id: Uuid::new_v4().to_string(),
            spent: 999.0,
            ..snapshot.clone()
        };
        assert!(!store.insert_snapshot(&duplicate).await.unwrap());

        let history = store.history(&ana.id, "2026-01").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].spent, 320.0);
        assert_eq!(
            store.snapshot_categories(&ana.id, "2026-09").await.unwrap(),
            vec!["food".to_string()]
        );
        assert!(store.snapshot_categories(&ana.id, "2026-10").await.unwrap().is_empty());

        assert!(store.delete_limit(&ana.id, "food").await.unwrap());
        assert!(!store.delete_limit(&ana.id, "food").await.unwrap());
    }

    #[tokio::test]
    async fn goal_ledger_guards_withdrawals() {
        let (_file, manager) = temp_sqlite().await;
        let ana = user(&manager, "ana@example.org").await;
        let store = manager.goal_store();

        let now = Utc::now();
        let goal = Goal {
            id: Uuid::new_v4().to_string(),
            user_id: ana.id.clone(),
            name: "Holiday".to_string(),
            target_amount: 100.0,
            current_amount: 0.0,
            deadline: Some(date(2027, 6, 1)),
            status: GoalStatus::Active,
            created_at: now,
            updated_at: now,
        };
        store.create_goal(&goal).await.unwrap();

        let entry = |kind, amount| GoalEntry {
            id: Uuid::new_v4().to_string(),
            goal_id: goal.id.clone(),
            user_id: ana.id.clone(),
            kind,
            amount,
            note: String::new(),
            created_at: Utc::now(),
        };

        assert!(store.add_entry(&entry(GoalEntryKind::Deposit, 60.0)).await.unwrap());
        assert!(!store.add_entry(&entry(GoalEntryKind::Withdrawal, 61.0)).await.unwrap());
        assert_eq!(store.list_entries(&goal.id).await.unwrap().len(), 1);

        assert!(store.add_entry(&entry(GoalEntryKind::Deposit, 40.0)).await.unwrap());
        let reached = store.get_goal(&ana.id, &goal.id).await.unwrap().unwrap();
        assert_eq!(reached.current_amount, 100.0);
        assert_eq!(reached.status, GoalStatus::Completed);
        assert_eq!(reached.deadline, Some(date(2027, 6, 1)));

        assert!(store.add_entry(&entry(GoalEntryKind::Withdrawal, 30.0)).await.unwrap());
        let reopened = store.get_goal(&ana.id, &goal.id).await.unwrap().unwrap();
        assert_eq!(reopened.status, GoalStatus::Active);

        let mut other_owner = entry(GoalEntryKind::Deposit, 5.0);
        other_owner.user_id = Uuid::new_v4().to_string();
        assert!(!store.add_entry(&other_owner).await.unwrap());
    }

    #[tokio::test]
    async fn family_membership_is_exclusive() {
        let (_file, manager) = temp_sqlite().await;
        let ana = user(&manager, "ana@example.org").await;
        let ben = user(&manager, "ben@example.org").await;
        let store = manager.family_store();

        let family = Family {
            id: Uuid::new_v4().to_string(),
            name: "Home".to_string(),
            owner_id: ana.id.clone(),
            created_at: Utc::now(),
        };
        store.create_family(&family).await.unwrap();
        store
            .add_member(&family.id, &ben.id, FamilyRole::Member)
            .await
            .unwrap();
        assert!(
            store
                .add_member(&family.id, &ben.id, FamilyRole::Member)
                .await
                .is_err()
        );

        let members = store.list_members(&family.id).await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].role, FamilyRole::Owner);

        spend(&manager, &ben.id, TransactionKind::Expense, 12.0, "toys", date(2026, 10, 1)).await;
        let shared = manager
            .transaction_store()
            .list_family_transactions(&family.id, 50)
            .await
            .unwrap();
        assert_eq!(shared.len(), 1);

        assert!(store.delete_family(&family.id).await.unwrap());
        assert!(store.family_for_user(&ben.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn notifications_and_reference_data() {
        let (_file, manager) = temp_sqlite().await;
        let ana = user(&manager, "ana@example.org").await;
        let notifications = manager.notification_store();

        for title in ["first", "second"] {
            notifications
                .create_notification(&crate::db::models::Notification {
                    id: Uuid::new_v4().to_string(),
                    user_id: ana.id.clone(),
                    kind: "budget_exceeded".to_string(),
                    title: title.to_string(),
                    message: String::new(),
                    read: false,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        assert_eq!(notifications.unread_count(&ana.id).await.unwrap(), 2);
        assert_eq!(notifications.mark_all_read(&ana.id).await.unwrap(), 2);
        assert!(
            notifications
                .list_notifications(&ana.id, true, 10)
                .await
                .unwrap()
                .is_empty()
        );

        let reference = manager.reference_store();
        let entries = BTreeMap::from([
            ("budget.title".to_string(), "Budget".to_string()),
            ("goal.title".to_string(), "Goals".to_string()),
        ]);
        reference.upsert_translations("en", &entries).await.unwrap();
        reference
            .upsert_translations(
                "en",
                &BTreeMap::from([("goal.title".to_string(), "Savings goals".to_string())]),
            )
            .await
            .unwrap();
        let loaded = reference.translations("en").await.unwrap();
        assert_eq!(loaded["goal.title"], "Savings goals");
        assert_eq!(loaded.len(), 2);

        let now = Utc::now();
        let rate = |currency: &str, rate| ExchangeRate {
            provider: "official".to_string(),
            currency: currency.to_string(),
            rate,
            fetched_at: now,
        };
        reference
            .upsert_rates(&[rate("EUR", 0.9), rate("USD", 1.0)])
            .await
            .unwrap();
        reference.upsert_rates(&[rate("EUR", 0.95)]).await.unwrap();
        let rates = reference.list_rates("official").await.unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].rate, 0.95);
    }
}
