use std::collections::BTreeMap;

use salvo::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::models::{BudgetSnapshot, TransactionKind};
use crate::months::Month;
use crate::web::ApiError;
use crate::web::handlers::{context, month_query, parse_body, path_param, require_positive, today};

const DEFAULT_HISTORY_MONTHS: u32 = 6;
const MAX_HISTORY_MONTHS: u32 = 36;

#[derive(Debug, Deserialize)]
struct LimitRequest {
    limit: f64,
}

#[derive(Debug, Serialize, PartialEq)]
struct BudgetLine {
    category: String,
    limit: f64,
    spent: f64,
    remaining: f64,
    percent: f64,
    exceeded: bool,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn budget_line(category: String, limit: f64, spent: f64) -> BudgetLine {
    let percent = if limit > 0.0 { spent / limit * 100.0 } else { 0.0 };
    BudgetLine {
        category,
        limit,
        spent: round2(spent),
        remaining: round2(limit - spent),
        percent: (percent * 10.0).round() / 10.0,
        exceeded: spent > limit,
    }
}

#[derive(Debug, Serialize)]
struct HistoryMonth {
    month: String,
    total_limit: f64,
    total_spent: f64,
    categories: Vec<BudgetSnapshot>,
}

/// Groups snapshots by month, keeping the newest month first.
fn group_history(snapshots: Vec<BudgetSnapshot>) -> Vec<HistoryMonth> {
    let mut months: BTreeMap<String, Vec<BudgetSnapshot>> = BTreeMap::new();
    for snapshot in snapshots {
        months.entry(snapshot.month.clone()).or_default().push(snapshot);
    }
    months
        .into_iter()
        .rev()
        .map(|(month, categories)| HistoryMonth {
            month,
            total_limit: round2(categories.iter().map(|s| s.limit_amount).sum()),
            total_spent: round2(categories.iter().map(|s| s.spent).sum()),
            categories,
        })
        .collect()
}

#[handler]
pub async fn overview(req: &mut Request, depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let month = month_query(req)?;

    let spent: BTreeMap<String, f64> = state
        .db
        .transaction_store()
        .category_totals(
            &user.id,
            TransactionKind::Expense,
            month.first_day(),
            month.next().first_day(),
        )
        .await?
        .into_iter()
        .map(|c| (c.category, c.total))
        .collect();
    let limits = state.db.budget_store().list_limits(&user.id).await?;

    let lines: Vec<BudgetLine> = limits
        .iter()
        .map(|l| {
            let used = spent.get(&l.category).copied().unwrap_or(0.0);
            budget_line(l.category.clone(), l.monthly_limit, used)
        })
        .collect();
    let unbudgeted: Vec<serde_json::Value> = spent
        .iter()
        .filter(|(category, _)| !limits.iter().any(|l| &l.category == *category))
        .map(|(category, total)| json!({ "category": category, "spent": round2(*total) }))
        .collect();

    let total_limit: f64 = lines.iter().map(|l| l.limit).sum();
    let total_spent: f64 = lines.iter().map(|l| l.spent).sum();
    Ok(Json(json!({
        "month": month.to_string(),
        "budgets": lines,
        "unbudgeted": unbudgeted,
        "total_limit": round2(total_limit),
        "total_spent": round2(total_spent),
    })))
}

#[handler]
pub async fn set_limit(req: &mut Request, depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let category = path_param(req, "category")?.trim().to_string();
    if category.is_empty() {
        return Err(ApiError::bad_request("category cannot be empty"));
    }
    let body: LimitRequest = parse_body(req).await?;
    require_positive(body.limit, "limit")?;

    let limit = state
        .db
        .budget_store()
        .upsert_limit(&user.id, &category, body.limit)
        .await?;
    state.health.invalidate(&user.id);
    Ok(Json(json!({ "budget": limit })))
}

#[handler]
pub async fn delete_limit(req: &mut Request, depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let category = path_param(req, "category")?;
    if !state
        .db
        .budget_store()
        .delete_limit(&user.id, category.trim())
        .await?
    {
        return Err(ApiError::NotFound("budget"));
    }
    state.health.invalidate(&user.id);
    Ok(Json(json!({ "success": true, "category": category.trim() })))
}

/// Recorded snapshots of the last `?months=N` closed months.
#[handler]
pub async fn history(req: &mut Request, depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let months = req
        .query::<u32>("months")
        .unwrap_or(DEFAULT_HISTORY_MONTHS)
        .clamp(1, MAX_HISTORY_MONTHS);
    let since: Month = Month::containing(today()).minus(months);

    let snapshots = state
        .db
        .budget_store()
        .history(&user.id, &since.to_string())
        .await?;
    Ok(Json(json!({
        "since": since.to_string(),
        "months": group_history(snapshots),
    })))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use salvo::prelude::StatusCode;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::web::handlers::test_support::test_app;

    fn snapshot(month: &str, category: &str, limit: f64, spent: f64) -> BudgetSnapshot {
        BudgetSnapshot {
            id: Uuid::new_v4().to_string(),
            user_id: "u1".to_string(),
            month: month.to_string(),
            category: category.to_string(),
            limit_amount: limit,
            spent,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn lines_report_remaining_and_percent() {
        let line = budget_line("food".to_string(), 200.0, 250.0);
        assert_eq!(line.remaining, -50.0);
        assert_eq!(line.percent, 125.0);
        assert!(line.exceeded);
        assert_eq!(budget_line("fuel".to_string(), 80.0, 0.0).percent, 0.0);
    }

    #[test]
    fn history_groups_newest_first() {
        let grouped = group_history(vec![
            snapshot("2026-08", "food", 100.0, 90.0),
            snapshot("2026-09", "food", 100.0, 120.0),
            snapshot("2026-09", "fuel", 50.0, 20.0),
        ]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].month, "2026-09");
        assert_eq!(grouped[0].total_limit, 150.0);
        assert_eq!(grouped[0].total_spent, 140.0);
        assert_eq!(grouped[1].categories.len(), 1);
    }

    #[tokio::test]
    async fn overview_tracks_spend_against_limits() {
        let app = test_app().await;
        let token = app.register("ana@example.org", "Ana").await;

        let (status, _) = app
            .call("PUT", "/api/budget/food", Some(&token), Some(json!({ "limit": -5 })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = app
            .call("PUT", "/api/budget/food", Some(&token), Some(json!({ "limit": 200 })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["budget"]["monthly_limit"], 200.0);

        for (amount, category) in [(50.0, "food"), (25.0, "food"), (40.0, "taxi")] {
            app.call(
                "POST",
                "/api/transactions",
                Some(&token),
                Some(json!({ "kind": "expense", "amount": amount, "category": category })),
            )
            .await;
        }

        let (status, body) = app.call("GET", "/api/budget", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let food = &body["budgets"][0];
        assert_eq!(food["spent"], 75.0);
        assert_eq!(food["remaining"], 125.0);
        assert_eq!(food["percent"], 37.5);
        assert_eq!(body["unbudgeted"][0]["category"], "taxi");

        let (status, _) = app
            .call("GET", "/api/budget?month=2026-13", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app.call("DELETE", "/api/budget/food", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.call("DELETE", "/api/budget/food", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = app
            .call("GET", "/api/budget/history?months=3", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["months"], json!([]));
    }
}
