use chrono::Utc;
use salvo::prelude::*;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::db::models::PushSubscription;
use crate::web::ApiError;
use crate::web::handlers::{context, created, parse_body, path_param};

#[derive(Debug, Deserialize)]
struct SubscriptionKeys {
    p256dh: String,
    auth: String,
}

/// Browser `PushSubscription.toJSON()` shape.
#[derive(Debug, Deserialize)]
struct SubscribeRequest {
    endpoint: String,
    keys: SubscriptionKeys,
}

#[derive(Debug, Deserialize)]
struct UnsubscribeRequest {
    endpoint: String,
}

#[handler]
pub async fn list_notifications(
    req: &mut Request,
    depot: &mut Depot,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let unread_only = req.query::<bool>("unread").unwrap_or(false);
    let limit = req.query::<i64>("limit").unwrap_or(50).clamp(1, 200);
    let store = state.db.notification_store();

    let notifications = store
        .list_notifications(&user.id, unread_only, limit)
        .await?;
    let unread = store.unread_count(&user.id).await?;
    Ok(Json(json!({
        "notifications": notifications,
        "unread": unread,
    })))
}

#[handler]
pub async fn mark_read(req: &mut Request, depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let id = path_param(req, "id")?;
    if !state.db.notification_store().mark_read(&user.id, &id).await? {
        return Err(ApiError::NotFound("notification"));
    }
    Ok(Json(json!({ "success": true, "id": id })))
}

#[handler]
pub async fn mark_all_read(depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let updated = state.db.notification_store().mark_all_read(&user.id).await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}

#[handler]
pub async fn delete_notification(
    req: &mut Request,
    depot: &mut Depot,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let id = path_param(req, "id")?;
    if !state
        .db
        .notification_store()
        .delete_notification(&user.id, &id)
        .await?
    {
        return Err(ApiError::NotFound("notification"));
    }
    Ok(Json(json!({ "success": true, "id": id })))
}

#[handler]
pub async fn subscribe(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<(), ApiError> {
    let (state, user) = context(depot)?;
    let body: SubscribeRequest = parse_body(req).await?;
    let endpoint = body.endpoint.trim();
    if !endpoint.starts_with("https://") {
        return Err(ApiError::bad_request("endpoint must be an https URL"));
    }
    if body.keys.p256dh.is_empty() || body.keys.auth.is_empty() {
        return Err(ApiError::bad_request("subscription keys are required"));
    }

    let subscription = PushSubscription {
        id: Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        endpoint: endpoint.to_string(),
        p256dh: body.keys.p256dh,
        auth_key: body.keys.auth,
        created_at: Utc::now(),
    };
    state.db.notification_store().subscribe(&subscription).await?;
    created(res, Json(json!({ "success": true, "endpoint": subscription.endpoint })));
    Ok(())
}

#[handler]
pub async fn unsubscribe(req: &mut Request, depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let body: UnsubscribeRequest = parse_body(req).await?;
    let removed = state
        .db
        .notification_store()
        .unsubscribe(&user.id, body.endpoint.trim())
        .await?;
    Ok(Json(json!({ "success": true, "removed": removed })))
}

#[cfg(test)]
mod tests {
    use salvo::prelude::StatusCode;
    use serde_json::json;

    use crate::web::handlers::test_support::test_app;

    async fn overspend(app: &crate::web::handlers::test_support::TestApp, token: &str, category: &str) {
        app.call("PUT", &format!("/api/budget/{category}"), Some(token), Some(json!({ "limit": 10 })))
            .await;
        app.call(
            "POST",
            "/api/transactions",
            Some(token),
            Some(json!({ "kind": "expense", "amount": 20, "category": category })),
        )
        .await;
    }

    #[tokio::test]
    async fn read_and_delete_notifications() {
        let app = test_app().await;
        let token = app.register("ana@example.org", "Ana").await;
        overspend(&app, &token, "food").await;
        overspend(&app, &token, "fuel").await;

        let (_, body) = app.call("GET", "/api/notifications", Some(&token), None).await;
        assert_eq!(body["unread"], 2);
        let id = body["notifications"][0]["id"].as_str().unwrap().to_string();

        let (status, _) = app
            .call("PUT", &format!("/api/notifications/{id}/read"), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = app
            .call("GET", "/api/notifications?unread=true", Some(&token), None)
            .await;
        assert_eq!(body["notifications"].as_array().unwrap().len(), 1);

        let (_, body) = app
            .call("PUT", "/api/notifications/read-all", Some(&token), None)
            .await;
        assert_eq!(body["updated"], 1);

        let (status, _) = app
            .call("DELETE", &format!("/api/notifications/{id}"), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app
            .call("DELETE", &format!("/api/notifications/{id}"), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn disabled_notifications_are_not_stored() {
        let app = test_app().await;
        let token = app.register("ana@example.org", "Ana").await;
        app.call(
            "PUT",
            "/api/settings",
            Some(&token),
            Some(json!({ "notifications_enabled": false })),
        )
        .await;
        overspend(&app, &token, "food").await;

        let (_, body) = app.call("GET", "/api/notifications", Some(&token), None).await;
        assert_eq!(body["unread"], 0);
    }

    #[tokio::test]
    async fn push_subscriptions() {
        let app = test_app().await;
        let token = app.register("ana@example.org", "Ana").await;
        let subscription = json!({
            "endpoint": "https://push.example.org/send/abc",
            "keys": { "p256dh": "BNc", "auth": "tBH" },
        });

        let (status, _) = app
            .call("POST", "/api/push/subscribe", Some(&token), Some(subscription.clone()))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = app
            .call("POST", "/api/push/subscribe", Some(&token), Some(subscription))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let subs = app
            .state
            .db
            .notification_store()
            .list_subscriptions(
                &app.state
                    .db
                    .user_store()
                    .get_user_by_email("ana@example.org")
                    .await
                    .unwrap()
                    .unwrap()
                    .id,
            )
            .await
            .unwrap();
        assert_eq!(subs.len(), 1);

        let (_, body) = app
            .call(
                "POST",
                "/api/push/unsubscribe",
                Some(&token),
                Some(json!({ "endpoint": "https://push.example.org/send/abc" })),
            )
            .await;
        assert_eq!(body["removed"], true);

        let (status, _) = app
            .call(
                "POST",
                "/api/push/subscribe",
                Some(&token),
                Some(json!({ "endpoint": "http://insecure", "keys": { "p256dh": "a", "auth": "b" } })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
