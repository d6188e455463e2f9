use salvo::http::cookie::{Cookie, SameSite};
use salvo::prelude::*;
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthService;
use crate::db::models::{Session, User};
use crate::web::handlers::{context, created, parse_body};
use crate::web::middleware::session_token;
use crate::web::{ApiError, app_state};

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    email: String,
    name: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

pub(crate) fn set_session_cookie(res: &mut Response, auth: &AuthService, session: &Session) {
    let cookie = Cookie::build((auth.cookie_name().to_string(), session.token.clone()))
        .path("/")
        .http_only(true)
        .secure(auth.secure_cookies())
        .same_site(SameSite::Lax)
        .build();
    res.add_cookie(cookie);
}

pub(crate) fn clear_session_cookie(res: &mut Response, auth: &AuthService) {
    let mut cookie = Cookie::build((auth.cookie_name().to_string(), String::new()))
        .path("/")
        .build();
    cookie.make_removal();
    res.add_cookie(cookie);
}

pub(crate) fn session_body(user: &User, session: &Session) -> serde_json::Value {
    json!({
        "user": user,
        "token": session.token,
        "expires_at": session.expires_at,
    })
}

#[handler]
pub async fn register(req: &mut Request, depot: &mut Depot, res: &mut Response) -> Result<(), ApiError> {
    let auth = app_state(depot)?.auth.clone();
    let body: RegisterRequest = parse_body(req).await?;

    let (user, session) = auth.register(&body.email, &body.name, &body.password).await?;
    set_session_cookie(res, &auth, &session);
    created(res, Json(session_body(&user, &session)));
    Ok(())
}

#[handler]
pub async fn login(req: &mut Request, depot: &mut Depot, res: &mut Response) -> Result<(), ApiError> {
    let auth = app_state(depot)?.auth.clone();
    let body: LoginRequest = parse_body(req).await?;

    let (user, session) = auth.login(&body.email, &body.password).await?;
    set_session_cookie(res, &auth, &session);
    res.render(Json(session_body(&user, &session)));
    Ok(())
}

#[handler]
pub async fn logout(depot: &mut Depot, res: &mut Response) -> Result<(), ApiError> {
    let (state, _) = context(depot)?;
    if let Some(token) = session_token(depot).cloned() {
        state.auth.logout(&token).await?;
    }
    clear_session_cookie(res, &state.auth);
    res.render(Json(json!({ "success": true })));
    Ok(())
}

#[handler]
pub async fn me(depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let settings = state.db.user_store().get_settings(&user.id).await?;
    Ok(Json(json!({ "user": user, "settings": settings })))
}

#[cfg(test)]
mod tests {
    use salvo::prelude::StatusCode;
    use serde_json::json;

    use crate::web::handlers::test_support::test_app;

    #[tokio::test]
    async fn register_login_and_logout() {
        let app = test_app().await;
        let token = app.register("Ana@Example.org", "Ana").await;

        let (status, body) = app.call("GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], "ana@example.org");
        assert_eq!(body["settings"]["currency"], "USD");
        assert!(body["user"].get("password_hash").is_none());

        let (status, body) = app
            .call(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "email": "ana@example.org", "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let second = body["token"].as_str().unwrap().to_string();
        assert_ne!(second, token);

        let (status, _) = app.call("POST", "/api/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = app.call("GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());

        let (status, _) = app.call("GET", "/api/auth/me", Some(&second), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn rejects_bad_credentials_and_duplicates() {
        let app = test_app().await;
        app.register("ana@example.org", "Ana").await;

        let (status, _) = app
            .call(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({ "email": "ANA@example.org", "name": "Other", "password": "12345678" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = app
            .call(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({ "email": "bo@example.org", "name": "Bo", "password": "short" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .call(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "email": "ana@example.org", "password": "wrong password" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app.call("GET", "/api/transactions", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = app
            .call("GET", "/api/transactions", Some("not-a-token"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
