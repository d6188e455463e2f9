use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::AuthService;
use crate::config::SchedulerConfig;
use crate::db::models::{BudgetSnapshot, TransactionKind};
use crate::db::{BudgetStore, DatabaseError, TransactionStore};
use crate::months::Month;
use crate::rates::RateService;
use crate::web::metrics::Metrics;

/// Writes last month's limit-versus-spend rows into the budget history.
#[derive(Clone)]
pub struct BudgetHistoryJob {
    transactions: Arc<dyn TransactionStore>,
    budgets: Arc<dyn BudgetStore>,
}

impl BudgetHistoryJob {
    pub fn new(transactions: Arc<dyn TransactionStore>, budgets: Arc<dyn BudgetStore>) -> Self {
        Self {
            transactions,
            budgets,
        }
    }

    /// Snapshots the month before `today`. Categories already snapshotted
    /// for that month are left untouched. Returns the number of rows written.
    pub async fn run(&self, today: NaiveDate) -> Result<usize, DatabaseError> {
        let month = Month::containing(today).previous();
        let mut written = 0;

        for user_id in self.budgets.users_with_limits().await? {
            match self.snapshot_user(&user_id, month).await {
                Ok(count) => written += count,
                Err(e) => warn!(%user_id, %month, error = %e, "budget snapshot failed"),
            }
        }

        if written > 0 {
            info!(%month, rows = written, "budget history snapshot written");
        } else {
            debug!(%month, "budget history already up to date");
        }
        Metrics::budget_snapshots_written(written as u64);
        Ok(written)
    }

    async fn snapshot_user(&self, user_id: &str, month: Month) -> Result<usize, DatabaseError> {
        let done = self
            .budgets
            .snapshot_categories(user_id, &month.to_string())
            .await?;
        let pending: Vec<_> = self
            .budgets
            .list_limits(user_id)
            .await?
            .into_iter()
            .filter(|limit| !done.contains(&limit.category))
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let (from, until) = (month.first_day(), month.next().first_day());
        let spent = self
            .transactions
            .category_totals(user_id, TransactionKind::Expense, from, until)
            .await?;

        let mut written = 0;
        for limit in pending {
            let category_spent = spent
                .iter()
                .find(|c| c.category == limit.category)
                .map_or(0.0, |c| c.total);
            let snapshot = BudgetSnapshot {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                month: month.to_string(),
                category: limit.category,
                limit_amount: limit.monthly_limit,
                spent: category_spent,
                created_at: Utc::now(),
            };
            if self.budgets.insert_snapshot(&snapshot).await? {
                written += 1;
            }
        }
        Ok(written)
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    budget_history: BudgetHistoryJob,
    rates: RateService,
    auth: AuthService,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        budget_history: BudgetHistoryJob,
        rates: RateService,
        auth: AuthService,
    ) -> Self {
        Self {
            config,
            budget_history,
            rates,
            auth,
        }
    }

    /// Runs both tickers until the task is dropped. The first tick of each
    /// fires immediately.
    pub async fn start(self) -> Result<()> {
        if !self.config.enabled {
            info!("scheduler disabled");
            return std::future::pending().await;
        }
        info!(
            budget_history_secs = self.config.budget_history_interval_secs,
            rates_secs = self.config.rates_refresh_interval_secs,
            "scheduler started"
        );

        let mut history_ticker =
            tokio::time::interval(Duration::from_secs(self.config.budget_history_interval_secs));
        let mut rates_ticker =
            tokio::time::interval(Duration::from_secs(self.config.rates_refresh_interval_secs));
        let refresh_rates = !self.rates.configured().is_empty();

        loop {
            tokio::select! {
                _ = history_ticker.tick() => {
                    if let Err(e) = self.budget_history.run(Utc::now().date_naive()).await {
                        warn!(error = %e, "budget history job failed");
                    }
                    match self.auth.purge_expired().await {
                        Ok(0) => {}
                        Ok(count) => debug!(count, "expired sessions purged"),
                        Err(e) => warn!(error = %e, "session purge failed"),
                    }
                }
                _ = rates_ticker.tick(), if refresh_rates => {
                    self.rates.refresh_all().await;
                }
            }
        }
    }
}
