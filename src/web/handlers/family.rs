use chrono::Utc;
use salvo::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::auth::normalize_email;
use crate::db::models::{Family, FamilyRole, NotificationKind, User};
use crate::web::handlers::{context, created, notify, parse_body, path_param};
use crate::web::{ApiError, AppState};

const DEFAULT_FEED: i64 = 50;
const MAX_FEED: i64 = 500;

#[derive(Debug, Deserialize)]
struct NewFamily {
    name: String,
}

#[derive(Debug, Deserialize)]
struct NewMember {
    email: String,
}

async fn user_family(state: &AppState, user: &User) -> Result<Family, ApiError> {
    state
        .db
        .family_store()
        .family_for_user(&user.id)
        .await?
        .ok_or(ApiError::NotFound("family"))
}

fn require_owner(family: &Family, user: &User) -> Result<(), ApiError> {
    if family.owner_id != user.id {
        return Err(ApiError::forbidden("only the family owner can do this"));
    }
    Ok(())
}

async fn family_body(state: &AppState, family: &Family) -> Result<serde_json::Value, ApiError> {
    let members = state.db.family_store().list_members(&family.id).await?;
    Ok(json!({ "family": family, "members": members }))
}

#[handler]
pub async fn get_family(depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let family = user_family(&state, &user).await?;
    Ok(Json(family_body(&state, &family).await?))
}

#[handler]
pub async fn create_family(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<(), ApiError> {
    let (state, user) = context(depot)?;
    let body: NewFamily = parse_body(req).await?;
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name cannot be empty"));
    }

    let store = state.db.family_store();
    if store.family_for_user(&user.id).await?.is_some() {
        return Err(ApiError::Conflict("you already belong to a family".to_string()));
    }
    let family = Family {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        owner_id: user.id.clone(),
        created_at: Utc::now(),
    };
    store.create_family(&family).await?;
    info!(family_id = %family.id, owner_id = %user.id, "family created");

    created(res, Json(family_body(&state, &family).await?));
    Ok(())
}

#[handler]
pub async fn delete_family(depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let family = user_family(&state, &user).await?;
    require_owner(&family, &user)?;

    if !state.db.family_store().delete_family(&family.id).await? {
        return Err(ApiError::NotFound("family"));
    }
    info!(family_id = %family.id, "family deleted");
    Ok(Json(json!({ "success": true, "id": family.id })))
}

/// Adds a registered user, looked up by email, to the owner's family.
#[handler]
pub async fn add_member(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<(), ApiError> {
    let (state, user) = context(depot)?;
    let body: NewMember = parse_body(req).await?;
    let family = user_family(&state, &user).await?;
    require_owner(&family, &user)?;

    let member = state
        .db
        .user_store()
        .get_user_by_email(&normalize_email(&body.email))
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    let store = state.db.family_store();
    if store.family_for_user(&member.id).await?.is_some() {
        return Err(ApiError::Conflict(
            "user already belongs to a family".to_string(),
        ));
    }
    store
        .add_member(&family.id, &member.id, FamilyRole::Member)
        .await?;
    info!(family_id = %family.id, user_id = %member.id, "family member added");

    notify(
        &state,
        &member.id,
        NotificationKind::FamilyJoined,
        "Added to a family",
        format!("{} added you to the family \"{}\"", user.name, family.name),
    )
    .await;
    created(res, Json(family_body(&state, &family).await?));
    Ok(())
}

/// The owner may remove any other member; members may remove themselves.
#[handler]
pub async fn remove_member(req: &mut Request, depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let target = path_param(req, "user_id")?;
    let family = user_family(&state, &user).await?;

    let is_owner = family.owner_id == user.id;
    if target == family.owner_id {
        return Err(ApiError::bad_request(
            "the owner cannot leave; delete the family instead",
        ));
    }
    if !is_owner && target != user.id {
        return Err(ApiError::forbidden("only the family owner can remove other members"));
    }

    if !state.db.family_store().remove_member(&family.id, &target).await? {
        return Err(ApiError::NotFound("member"));
    }
    info!(family_id = %family.id, user_id = %target, "family member removed");
    Ok(Json(json!({ "success": true, "user_id": target })))
}

/// Recent transactions of every member, newest first.
#[handler]
pub async fn family_transactions(
    req: &mut Request,
    depot: &mut Depot,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let limit = req
        .query::<i64>("limit")
        .unwrap_or(DEFAULT_FEED)
        .clamp(1, MAX_FEED);
    let family = user_family(&state, &user).await?;
    let transactions = state
        .db
        .transaction_store()
        .list_family_transactions(&family.id, limit)
        .await?;
    Ok(Json(json!({
        "family_id": family.id,
        "transactions": transactions,
        "count": transactions.len(),
    })))
}

#[cfg(test)]
mod tests {
    use salvo::prelude::StatusCode;
    use serde_json::json;

    use crate::web::handlers::test_support::test_app;

    #[tokio::test]
    async fn owner_manages_members() {
        let app = test_app().await;
        let ana = app.register("ana@example.org", "Ana").await;
        let bo = app.register("bo@example.org", "Bo").await;
        let cy = app.register("cy@example.org", "Cy").await;

        let (status, _) = app.call("GET", "/api/family", Some(&ana), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = app
            .call("POST", "/api/family", Some(&ana), Some(json!({ "name": "Silva" })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["members"][0]["role"], "owner");
        let (status, _) = app
            .call("POST", "/api/family", Some(&ana), Some(json!({ "name": "Again" })))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = app
            .call(
                "POST",
                "/api/family/members",
                Some(&ana),
                Some(json!({ "email": "BO@example.org" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["members"].as_array().unwrap().len(), 2);
        let bo_id = body["members"]
            .as_array()
            .unwrap()
            .iter()
            .find(|m| m["email"] == "bo@example.org")
            .unwrap()["user_id"]
            .as_str()
            .unwrap()
            .to_string();

        let (_, notes) = app.call("GET", "/api/notifications", Some(&bo), None).await;
        assert_eq!(notes["notifications"][0]["kind"], "family_joined");

        let (status, _) = app
            .call(
                "POST",
                "/api/family/members",
                Some(&bo),
                Some(json!({ "email": "cy@example.org" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app
            .call(
                "POST",
                "/api/family/members",
                Some(&ana),
                Some(json!({ "email": "nobody@example.org" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        app.call(
            "POST",
            "/api/transactions",
            Some(&bo),
            Some(json!({ "kind": "expense", "amount": 12, "category": "food" })),
        )
        .await;
        let (_, feed) = app.call("GET", "/api/family/transactions", Some(&ana), None).await;
        assert_eq!(feed["count"], 1);

        let (status, _) = app.call("GET", "/api/family", Some(&cy), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .call("DELETE", &format!("/api/family/members/{bo_id}"), Some(&bo), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.call("GET", "/api/family", Some(&bo), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app.call("DELETE", "/api/family", Some(&ana), None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
