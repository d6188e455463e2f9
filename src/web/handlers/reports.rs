use salvo::prelude::*;
use serde_json::json;

use crate::db::models::{MonthlyTotals, TransactionKind};
use crate::months::Month;
use crate::web::ApiError;
use crate::web::handlers::{context, month_query, today};

const DEFAULT_TREND_MONTHS: u32 = 6;
const MAX_TREND_MONTHS: u32 = 24;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One entry per month from `first` through `last`, zero where nothing was
/// recorded.
fn fill_months(first: Month, last: Month, rows: Vec<MonthlyTotals>) -> Vec<MonthlyTotals> {
    let mut filled = Vec::new();
    let mut month = first;
    while month <= last {
        let key = month.to_string();
        let row = rows
            .iter()
            .find(|r| r.month == key)
            .cloned()
            .unwrap_or(MonthlyTotals {
                month: key,
                income: 0.0,
                expense: 0.0,
            });
        filled.push(row);
        month = month.next();
    }
    filled
}

#[handler]
pub async fn summary(req: &mut Request, depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let month = month_query(req)?;
    let (from, until) = (month.first_day(), month.next().first_day());
    let store = state.db.transaction_store();

    let totals = store.totals(&user.id, from, until).await?;
    let expenses = store
        .category_totals(&user.id, TransactionKind::Expense, from, until)
        .await?;
    let income = store
        .category_totals(&user.id, TransactionKind::Income, from, until)
        .await?;
    let savings_rate = if totals.income > 0.0 {
        round2(totals.balance() / totals.income * 100.0)
    } else {
        0.0
    };

    Ok(Json(json!({
        "month": month.to_string(),
        "income": round2(totals.income),
        "expense": round2(totals.expense),
        "balance": round2(totals.balance()),
        "savings_rate": savings_rate,
        "expenses_by_category": expenses,
        "income_by_category": income,
    })))
}

/// Income and expense for the last `?months=N` months, current included.
#[handler]
pub async fn trend(req: &mut Request, depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let months = req
        .query::<u32>("months")
        .unwrap_or(DEFAULT_TREND_MONTHS)
        .clamp(1, MAX_TREND_MONTHS);
    let last = Month::containing(today());
    let first = last.minus(months - 1);

    let rows = state
        .db
        .transaction_store()
        .monthly_totals(&user.id, first.first_day())
        .await?;
    let series: Vec<serde_json::Value> = fill_months(first, last, rows)
        .into_iter()
        .map(|m| {
            json!({
                "month": m.month,
                "income": round2(m.income),
                "expense": round2(m.expense),
                "balance": round2(m.income - m.expense),
            })
        })
        .collect();
    Ok(Json(json!({ "months": series })))
}
