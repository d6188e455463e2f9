use chrono::{NaiveDate, Utc};
use salvo::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::db::models::{NotificationKind, Transaction, TransactionFilter, TransactionKind};
use crate::months::Month;
use crate::web::handlers::{
    context, created, date_query, notify, parse_body, path_param, require_positive, today,
};
use crate::web::metrics::Metrics;
use crate::web::{ApiError, AppState};

const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 500;

#[derive(Debug, Deserialize)]
struct NewTransaction {
    kind: TransactionKind,
    amount: f64,
    category: String,
    #[serde(default)]
    description: String,
    #[serde(default, alias = "date")]
    occurred_on: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct TransactionPatch {
    kind: Option<TransactionKind>,
    amount: Option<f64>,
    category: Option<String>,
    description: Option<String>,
    #[serde(alias = "date")]
    occurred_on: Option<NaiveDate>,
}

fn clean_category(category: &str) -> Result<String, ApiError> {
    let category = category.trim();
    if category.is_empty() {
        return Err(ApiError::bad_request("category cannot be empty"));
    }
    Ok(category.to_string())
}

fn filter_from_query(req: &Request) -> Result<TransactionFilter, ApiError> {
    let kind = match req.query::<String>("kind") {
        Some(raw) if !raw.is_empty() => Some(raw.parse().map_err(ApiError::BadRequest)?),
        _ => None,
    };
    let text = |name: &str| {
        req.query::<String>(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    Ok(TransactionFilter {
        kind,
        category: text("category"),
        search: text("search"),
        from: date_query(req, "from")?,
        to: date_query(req, "to")?,
        year: req.query::<i32>("year"),
        limit: req
            .query::<i64>("limit")
            .unwrap_or(DEFAULT_PAGE)
            .clamp(1, MAX_PAGE),
        offset: req.query::<i64>("offset").unwrap_or(0).max(0),
    })
}

/// Notifies the user when this expense is the one that takes the month's
/// category spend past its limit.
async fn check_budget(state: &AppState, transaction: &Transaction) -> Result<(), DatabaseError> {
    if transaction.kind != TransactionKind::Expense {
        return Ok(());
    }
    let Some(limit) = state
        .db
        .budget_store()
        .get_limit(&transaction.user_id, &transaction.category)
        .await?
    else {
        return Ok(());
    };

    let month = Month::containing(transaction.occurred_on);
    let spent = state
        .db
        .transaction_store()
        .category_spent(
            &transaction.user_id,
            &transaction.category,
            month.first_day(),
            month.next().first_day(),
        )
        .await?;
    let before = spent - transaction.amount;
    if before <= limit.monthly_limit && spent > limit.monthly_limit {
        info!(user_id = %transaction.user_id, category = %limit.category, %month, "budget exceeded");
        notify(
            state,
            &transaction.user_id,
            NotificationKind::BudgetExceeded,
            "Budget exceeded",
            format!(
                "You spent {spent:.2} on {} in {month}, over your limit of {:.2}",
                limit.category, limit.monthly_limit
            ),
        )
        .await;
    }
    Ok(())
}

#[handler]
pub async fn list_transactions(
    req: &mut Request,
    depot: &mut Depot,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let filter = filter_from_query(req)?;
    let transactions = state
        .db
        .transaction_store()
        .list_transactions(&user.id, &filter)
        .await?;

    Ok(Json(json!({
        "transactions": transactions,
        "count": transactions.len(),
        "limit": filter.limit,
        "offset": filter.offset,
    })))
}

#[handler]
pub async fn list_categories(depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let categories = state.db.transaction_store().list_categories(&user.id).await?;
    Ok(Json(json!({ "categories": categories })))
}

#[handler]
pub async fn create_transaction(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<(), ApiError> {
    let (state, user) = context(depot)?;
    let body: NewTransaction = parse_body(req).await?;
    require_positive(body.amount, "amount")?;

    let now = Utc::now();
    let transaction = Transaction {
        id: Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        kind: body.kind,
        amount: body.amount,
        category: clean_category(&body.category)?,
        description: body.description.trim().to_string(),
        occurred_on: body.occurred_on.unwrap_or_else(today),
        created_at: now,
        updated_at: now,
    };
    state
        .db
        .transaction_store()
        .create_transaction(&transaction)
        .await?;
    Metrics::transaction_created();
    state.health.invalidate(&user.id);

    if let Err(e) = check_budget(&state, &transaction).await {
        warn!(transaction_id = %transaction.id, error = %e, "budget check failed");
    }
    created(res, Json(transaction));
    Ok(())
}

#[handler]
pub async fn get_transaction(
    req: &mut Request,
    depot: &mut Depot,
) -> Result<Json<Transaction>, ApiError> {
    let (state, user) = context(depot)?;
    let id = path_param(req, "id")?;
    state
        .db
        .transaction_store()
        .get_transaction(&user.id, &id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("transaction"))
}

#[handler]
pub async fn update_transaction(
    req: &mut Request,
    depot: &mut Depot,
) -> Result<Json<Transaction>, ApiError> {
    let (state, user) = context(depot)?;
    let id = path_param(req, "id")?;
    let patch: TransactionPatch = parse_body(req).await?;
    let store = state.db.transaction_store();

    let mut transaction = store
        .get_transaction(&user.id, &id)
        .await?
        .ok_or(ApiError::NotFound("transaction"))?;
    if let Some(kind) = patch.kind {
        transaction.kind = kind;
    }
    if let Some(amount) = patch.amount {
        require_positive(amount, "amount")?;
        transaction.amount = amount;
    }
    if let Some(category) = patch.category {
        transaction.category = clean_category(&category)?;
    }
    if let Some(description) = patch.description {
        transaction.description = description.trim().to_string();
    }
    if let Some(occurred_on) = patch.occurred_on {
        transaction.occurred_on = occurred_on;
    }
    transaction.updated_at = Utc::now();

    if !store.update_transaction(&transaction).await? {
        return Err(ApiError::NotFound("transaction"));
    }
    state.health.invalidate(&user.id);
    Ok(Json(transaction))
}

#[handler]
pub async fn delete_transaction(
    req: &mut Request,
    depot: &mut Depot,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let id = path_param(req, "id")?;
    if !state
        .db
        .transaction_store()
        .delete_transaction(&user.id, &id)
        .await?
    {
        return Err(ApiError::NotFound("transaction"));
    }
    state.health.invalidate(&user.id);
    Ok(Json(json!({ "success": true, "id": id })))
}
