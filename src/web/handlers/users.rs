use salvo::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::web::ApiError;
use crate::web::handlers::auth::{clear_session_cookie, session_body, set_session_cookie};
use crate::web::handlers::{context, parse_body};

#[derive(Debug, Deserialize)]
struct UpdateProfile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    current_password: Option<String>,
    #[serde(default)]
    new_password: Option<String>,
}

/// Renames the account and optionally changes the password. A password
/// change signs out every session and answers with a fresh token.
#[handler]
pub async fn update_me(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
) -> Result<(), ApiError> {
    let (state, mut user) = context(depot)?;
    let body: UpdateProfile = parse_body(req).await?;
    let users = state.db.user_store();

    if let Some(name) = body.name.as_deref().map(str::trim) {
        if name.is_empty() {
            return Err(ApiError::bad_request("name cannot be empty"));
        }
        users.update_user_name(&user.id, name).await?;
        user.name = name.to_string();
    }

    if let Some(new_password) = body.new_password.as_deref() {
        let current = body
            .current_password
            .as_deref()
            .ok_or_else(|| ApiError::bad_request("current_password is required"))?;
        let session = state.auth.change_password(&user, current, new_password).await?;
        set_session_cookie(res, &state.auth, &session);
        res.render(Json(session_body(&user, &session)));
        return Ok(());
    }

    res.render(Json(json!({ "user": user })));
    Ok(())
}

#[handler]
pub async fn delete_me(depot: &mut Depot, res: &mut Response) -> Result<(), ApiError> {
    let (state, user) = context(depot)?;
    if !state.db.user_store().delete_user(&user.id).await? {
        return Err(ApiError::NotFound("user"));
    }
    state.health.invalidate(&user.id);
    info!(user_id = %user.id, "account deleted");

    clear_session_cookie(res, &state.auth);
    res.render(Json(json!({ "success": true })));
    Ok(())
}

#[cfg(test)]
mod tests {
    use salvo::prelude::StatusCode;
    use serde_json::json;

    use crate::web::handlers::test_support::test_app;

    #[tokio::test]
    async fn password_change_revokes_old_sessions() {
        let app = test_app().await;
        let token = app.register("ana@example.org", "Ana").await;

        let (status, _) = app
            .call(
                "PUT",
                "/api/users/me",
                Some(&token),
                Some(json!({ "new_password": "another secret" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .call(
                "PUT",
                "/api/users/me",
                Some(&token),
                Some(json!({
                    "name": "Ana Maria",
                    "current_password": "correct horse",
                    "new_password": "another secret",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["name"], "Ana Maria");
        let fresh = body["token"].as_str().unwrap().to_string();

        let (status, _) = app.call("GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = app
            .call(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "email": "ana@example.org", "password": "another secret" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app.call("DELETE", "/api/users/me", Some(&fresh), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.call("GET", "/api/auth/me", Some(&fresh), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
