use chrono::{NaiveDate, Utc};
use salvo::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::db::models::{Goal, GoalEntry, GoalEntryKind, GoalStatus, NotificationKind};
use crate::web::handlers::{context, created, notify, parse_body, path_param, require_positive};
use crate::web::{ApiError, AppState};

#[derive(Debug, Deserialize)]
struct NewGoal {
    name: String,
    target_amount: f64,
    #[serde(default)]
    current_amount: f64,
    #[serde(default)]
    deadline: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct GoalPatch {
    name: Option<String>,
    target_amount: Option<f64>,
    deadline: Option<NaiveDate>,
    #[serde(default)]
    clear_deadline: bool,
}

#[derive(Debug, Deserialize)]
struct NewEntry {
    kind: GoalEntryKind,
    amount: f64,
    #[serde(default)]
    note: String,
}

fn clean_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name cannot be empty"));
    }
    Ok(name.to_string())
}

fn goal_body(goal: &Goal) -> serde_json::Value {
    json!({
        "goal": goal,
        "progress": (goal.progress() * 1000.0).round() / 10.0,
    })
}

async fn load_goal(state: &AppState, user_id: &str, id: &str) -> Result<Goal, ApiError> {
    state
        .db
        .goal_store()
        .get_goal(user_id, id)
        .await?
        .ok_or(ApiError::NotFound("goal"))
}

async fn announce_if_reached(state: &AppState, before: GoalStatus, goal: &Goal) {
    if before == GoalStatus::Active && goal.status == GoalStatus::Completed {
        info!(goal_id = %goal.id, user_id = %goal.user_id, "goal reached");
        notify(
            state,
            &goal.user_id,
            NotificationKind::GoalReached,
            "Goal reached",
            format!(
                "You reached your goal \"{}\" of {:.2}",
                goal.name, goal.target_amount
            ),
        )
        .await;
    }
}

#[handler]
pub async fn list_goals(depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let goals = state.db.goal_store().list_goals(&user.id).await?;
    let goals: Vec<serde_json::Value> = goals.iter().map(goal_body).collect();
    Ok(Json(json!({ "goals": goals, "count": goals.len() })))
}

#[handler]
pub async fn create_goal(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<(), ApiError> {
    let (state, user) = context(depot)?;
    let body: NewGoal = parse_body(req).await?;
    require_positive(body.target_amount, "target_amount")?;
    if !body.current_amount.is_finite() || body.current_amount < 0.0 {
        return Err(ApiError::bad_request("current_amount cannot be negative"));
    }

    let now = Utc::now();
    let goal = Goal {
        id: Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        name: clean_name(&body.name)?,
        target_amount: body.target_amount,
        current_amount: body.current_amount,
        deadline: body.deadline,
        status: if body.current_amount >= body.target_amount {
            GoalStatus::Completed
        } else {
            GoalStatus::Active
        },
        created_at: now,
        updated_at: now,
    };
    state.db.goal_store().create_goal(&goal).await?;
    state.health.invalidate(&user.id);
    created(res, Json(goal_body(&goal)));
    Ok(())
}

#[handler]
pub async fn get_goal(req: &mut Request, depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let goal = load_goal(&state, &user.id, &path_param(req, "id")?).await?;
    let entries = state.db.goal_store().list_entries(&goal.id).await?;
    let mut body = goal_body(&goal);
    body["entries"] = json!(entries);
    Ok(Json(body))
}

#[handler]
pub async fn update_goal(req: &mut Request, depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let id = path_param(req, "id")?;
    let patch: GoalPatch = parse_body(req).await?;
    let mut goal = load_goal(&state, &user.id, &id).await?;
    let before = goal.status;

    if let Some(name) = patch.name {
        goal.name = clean_name(&name)?;
    }
    if let Some(target) = patch.target_amount {
        require_positive(target, "target_amount")?;
        goal.target_amount = target;
    }
    if patch.clear_deadline {
        goal.deadline = None;
    } else if let Some(deadline) = patch.deadline {
        goal.deadline = Some(deadline);
    }
    goal.updated_at = Utc::now();

    let store = state.db.goal_store();
    if !store.update_goal(&goal).await? {
        return Err(ApiError::NotFound("goal"));
    }
    state.health.invalidate(&user.id);
    let goal = load_goal(&state, &user.id, &id).await?;
    announce_if_reached(&state, before, &goal).await;
    Ok(Json(goal_body(&goal)))
}

#[handler]
pub async fn delete_goal(req: &mut Request, depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let id = path_param(req, "id")?;
    if !state.db.goal_store().delete_goal(&user.id, &id).await? {
        return Err(ApiError::NotFound("goal"));
    }
    state.health.invalidate(&user.id);
    Ok(Json(json!({ "success": true, "id": id })))
}

#[handler]
pub async fn list_entries(req: &mut Request, depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let goal = load_goal(&state, &user.id, &path_param(req, "id")?).await?;
    let entries = state.db.goal_store().list_entries(&goal.id).await?;
    Ok(Json(json!({ "transactions": entries, "count": entries.len() })))
}

/// Deposits into or withdraws from a goal. Withdrawals beyond the current
/// amount are rejected without touching the ledger.
#[handler]
pub async fn add_entry(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<(), ApiError> {
    let (state, user) = context(depot)?;
    let id = path_param(req, "id")?;
    let body: NewEntry = parse_body(req).await?;
    require_positive(body.amount, "amount")?;

    let goal = load_goal(&state, &user.id, &id).await?;
    let insufficient = || ApiError::bad_request("withdrawal exceeds the goal's current amount");
    if body.kind == GoalEntryKind::Withdrawal && body.amount > goal.current_amount {
        return Err(insufficient());
    }

    let entry = GoalEntry {
        id: Uuid::new_v4().to_string(),
        goal_id: goal.id.clone(),
        user_id: user.id.clone(),
        kind: body.kind,
        amount: body.amount,
        note: body.note.trim().to_string(),
        created_at: Utc::now(),
    };
    if !state.db.goal_store().add_entry(&entry).await? {
        return Err(insufficient());
    }
    state.health.invalidate(&user.id);

    let updated = load_goal(&state, &user.id, &id).await?;
    announce_if_reached(&state, goal.status, &updated).await;

    let mut body = goal_body(&updated);
    body["transaction"] = json!(entry);
    created(res, Json(body));
    Ok(())
}

#[cfg(test)]
mod tests {
    use salvo::prelude::StatusCode;
    use serde_json::json;

    use crate::web::handlers::test_support::test_app;

    #[tokio::test]
    async fn deposits_complete_the_goal() {
        let app = test_app().await;
        let token = app.register("ana@example.org", "Ana").await;

        let (status, body) = app
            .call(
                "POST",
                "/api/goals",
                Some(&token),
                Some(json!({ "name": "Holiday", "target_amount": 1000, "deadline": "2027-06-30" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["goal"]["status"], "active");
        let id = body["goal"]["id"].as_str().unwrap().to_string();
        let entries = format!("/api/goals/{id}/transactions");

        let (status, body) = app
            .call("POST", &entries, Some(&token), Some(json!({ "kind": "deposit", "amount": 400 })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["goal"]["current_amount"], 400.0);
        assert_eq!(body["progress"], 40.0);

        let (status, _) = app
            .call(
                "POST",
                &entries,
                Some(&token),
                Some(json!({ "kind": "withdrawal", "amount": 500 })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = app
            .call("POST", &entries, Some(&token), Some(json!({ "kind": "deposit", "amount": 600 })))
            .await;
        assert_eq!(body["goal"]["status"], "completed");

        let (_, body) = app.call("GET", &entries, Some(&token), None).await;
        assert_eq!(body["count"], 2);

        let (_, body) = app.call("GET", "/api/notifications", Some(&token), None).await;
        assert_eq!(body["notifications"][0]["kind"], "goal_reached");

        let (_, body) = app
            .call(
                "POST",
                &entries,
                Some(&token),
                Some(json!({ "kind": "withdrawal", "amount": 100 })),
            )
            .await;
        assert_eq!(body["goal"]["status"], "active");
        assert_eq!(body["goal"]["current_amount"], 900.0);
    }

    #[tokio::test]
    async fn update_and_delete() {
        let app = test_app().await;
        let token = app.register("ana@example.org", "Ana").await;
        let (_, body) = app
            .call(
                "POST",
                "/api/goals",
                Some(&token),
                Some(json!({ "name": "Car", "target_amount": 500, "current_amount": 300 })),
            )
            .await;
        let id = body["goal"]["id"].as_str().unwrap().to_string();

        let (status, _) = app
            .call("POST", "/api/goals", Some(&token), Some(json!({ "name": "", "target_amount": 5 })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .call(
                "PUT",
                &format!("/api/goals/{id}"),
                Some(&token),
                Some(json!({ "target_amount": 250 })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["goal"]["status"], "completed");
        assert_eq!(body["goal"]["name"], "Car");

        let (status, _) = app
            .call("DELETE", &format!("/api/goals/{id}"), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app
            .call("GET", &format!("/api/goals/{id}"), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
