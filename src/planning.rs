//! Financial health score: a weighted blend of budget compliance, savings
//! rate and goal progress for the current month.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::db::models::{GoalStatus, TransactionKind};
use crate::db::{BudgetStore, DatabaseError, GoalStore, TransactionStore};
use crate::months::Month;
use crate::web::metrics::Metrics;

const BUDGET_WEIGHT: f64 = 0.40;
const SAVINGS_WEIGHT: f64 = 0.35;
const GOALS_WEIGHT: f64 = 0.25;
/// Saving this share of income earns the full savings score.
const TARGET_SAVINGS_RATE: f64 = 0.20;
const NEUTRAL_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl HealthGrade {
    pub fn from_score(score: u32) -> Self {
        match score {
            80.. => HealthGrade::Excellent,
            60..=79 => HealthGrade::Good,
            40..=59 => HealthGrade::Fair,
            _ => HealthGrade::Poor,
        }
    }
}

/// Month figures the score is computed from.
#[derive(Debug, Clone, Default)]
pub struct HealthInputs {
    /// `(limit, spent)` per limited category.
    pub budgets: Vec<(f64, f64)>,
    pub income: f64,
    pub expense: f64,
    /// `(current, target)` per active goal.
    pub goals: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthComponents {
    pub budget: f64,
    pub savings: f64,
    pub goals: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub score: u32,
    pub grade: HealthGrade,
    pub components: HealthComponents,
    pub savings_rate: f64,
    pub month: String,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

fn budget_score(budgets: &[(f64, f64)]) -> f64 {
    if budgets.is_empty() {
        return NEUTRAL_SCORE;
    }
    let within = budgets.iter().filter(|(limit, spent)| spent <= limit).count();
    within as f64 / budgets.len() as f64 * 100.0
}

fn savings_rate(income: f64, expense: f64) -> f64 {
    if income <= 0.0 {
        return 0.0;
    }
    (income - expense) / income
}

fn savings_score(rate: f64) -> f64 {
    (rate / TARGET_SAVINGS_RATE * 100.0).clamp(0.0, 100.0)
}

fn goals_score(goals: &[(f64, f64)]) -> f64 {
    let progress: Vec<f64> = goals
        .iter()
        .filter(|(_, target)| *target > 0.0)
        .map(|(current, target)| (current / target).clamp(0.0, 1.0))
        .collect();
    if progress.is_empty() {
        return NEUTRAL_SCORE;
    }
    progress.iter().sum::<f64>() / progress.len() as f64 * 100.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn compute(inputs: &HealthInputs, month: &str) -> HealthReport {
    let budget = budget_score(&inputs.budgets);
    let rate = savings_rate(inputs.income, inputs.expense);
    let savings = savings_score(rate);
    let goals = goals_score(&inputs.goals);

    let weighted = BUDGET_WEIGHT * budget + SAVINGS_WEIGHT * savings + GOALS_WEIGHT * goals;
    let score = weighted.round().clamp(0.0, 100.0) as u32;

    let mut recommendations = Vec::new();
    if budget < 100.0 && !inputs.budgets.is_empty() {
        let over = inputs.budgets.iter().filter(|(l, s)| s > l).count();
        recommendations.push(format!(
            "{over} budget categories are over their limit this month; review those expenses"
        ));
    }
    if inputs.budgets.is_empty() {
        recommendations.push("Set monthly limits for your main spending categories".to_string());
    }
    if inputs.income <= 0.0 {
        recommendations.push("Record your income to track your savings rate".to_string());
    } else if rate < TARGET_SAVINGS_RATE {
        recommendations.push(format!(
            "You are saving {:.0}% of your income; aim for at least {:.0}%",
            rate.max(0.0) * 100.0,
            TARGET_SAVINGS_RATE * 100.0
        ));
    }
    if inputs.goals.is_empty() {
        recommendations.push("Create a savings goal to plan ahead".to_string());
    } else if goals < NEUTRAL_SCORE {
        recommendations.push("Make regular contributions to your savings goals".to_string());
    }
    if recommendations.is_empty() {
        recommendations.push("Your finances are on track; keep it up".to_string());
    }

    HealthReport {
        score,
        grade: HealthGrade::from_score(score),
        components: HealthComponents {
            budget: round1(budget),
            savings: round1(savings),
            goals: round1(goals),
        },
        savings_rate: round1(rate * 100.0),
        month: month.to_string(),
        recommendations,
        generated_at: Utc::now(),
    }
}

struct CachedReport {
    computed_at: Instant,
    report: HealthReport,
}

/// Per-user health reports, cached until the ttl passes or the user's data
/// changes.
#[derive(Clone)]
pub struct HealthService {
    transactions: Arc<dyn TransactionStore>,
    budgets: Arc<dyn BudgetStore>,
    goals: Arc<dyn GoalStore>,
    ttl: Duration,
    cache: Arc<Mutex<HashMap<String, CachedReport>>>,
}

impl HealthService {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        budgets: Arc<dyn BudgetStore>,
        goals: Arc<dyn GoalStore>,
        ttl: Duration,
    ) -> Self {
        Self {
            transactions,
            budgets,
            goals,
            ttl,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn report(&self, user_id: &str, today: NaiveDate) -> Result<HealthReport, DatabaseError> {
        if let Some(cached) = self.cached(user_id) {
            debug!(user_id, "health report served from cache");
            Metrics::health_cache(true);
            return Ok(cached);
        }
        Metrics::health_cache(false);

        let month = Month::containing(today);
        let (from, until) = (month.first_day(), month.next().first_day());

        let spent: HashMap<String, f64> = self
            .transactions
            .category_totals(user_id, TransactionKind::Expense, from, until)
            .await?
            .into_iter()
            .map(|c| (c.category, c.total))
            .collect();
        let budgets = self
            .budgets
            .list_limits(user_id)
            .await?
            .into_iter()
            .map(|limit| {
                let used = spent.get(&limit.category).copied().unwrap_or(0.0);
                (limit.monthly_limit, used)
            })
            .collect();
        let totals = self.transactions.totals(user_id, from, until).await?;
        let goals = self
            .goals
            .list_goals(user_id)
            .await?
            .into_iter()
            .filter(|g| g.status == GoalStatus::Active)
            .map(|g| (g.current_amount, g.target_amount))
            .collect();

        let inputs = HealthInputs {
            budgets,
            income: totals.income,
            expense: totals.expense,
            goals,
        };
        let report = compute(&inputs, &month.to_string());
        self.cache.lock().insert(
            user_id.to_string(),
            CachedReport {
                computed_at: Instant::now(),
                report: report.clone(),
            },
        );
        Ok(report)
    }

    pub fn invalidate(&self, user_id: &str) {
        self.cache.lock().remove(user_id);
    }

    fn cached(&self, user_id: &str) -> Option<HealthReport> {
        let mut cache = self.cache.lock();
        match cache.get(user_id) {
            Some(entry) if entry.computed_at.elapsed() < self.ttl => Some(entry.report.clone()),
            Some(_) => {
                cache.remove(user_id);
                None
            }
            None => None,
        }
    }
}
