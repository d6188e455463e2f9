use chrono::{NaiveDate, Utc};
use salvo::prelude::*;
use salvo::writing::Scribe;
use serde::de::DeserializeOwned;
use tracing::warn;
use uuid::Uuid;

use crate::db::models::{Notification, NotificationKind, User};
use crate::months::Month;
use crate::web::middleware::current_user;
use crate::web::{ApiError, AppState, app_state};

pub mod auth;
pub mod budget;
pub mod family;
pub mod goals;
pub mod notifications;
pub mod ops;
pub mod planning;
pub mod reference;
pub mod reports;
pub mod settings;
pub mod transactions;
pub mod users;

/// State and signed-in user, owned so they can be held across awaits.
pub(crate) fn context(depot: &Depot) -> Result<(AppState, User), ApiError> {
    let state = app_state(depot)?.clone();
    let user = current_user(depot)?.clone();
    Ok((state, user))
}

pub(crate) async fn parse_body<T: DeserializeOwned + Send>(req: &mut Request) -> Result<T, ApiError> {
    req.parse_json::<T>()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid request body: {e}")))
}

pub(crate) fn path_param(req: &Request, name: &str) -> Result<String, ApiError> {
    req.param::<String>(name)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("missing path parameter {name}")))
}

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// `?month=YYYY-MM`, defaulting to the current month.
pub(crate) fn month_query(req: &Request) -> Result<Month, ApiError> {
    match req.query::<String>("month") {
        Some(raw) if !raw.trim().is_empty() => raw.parse().map_err(ApiError::BadRequest),
        _ => Ok(Month::containing(today())),
    }
}

pub(crate) fn date_query(req: &Request, name: &str) -> Result<Option<NaiveDate>, ApiError> {
    match req.query::<String>(name) {
        Some(raw) if !raw.trim().is_empty() => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("{name} must be YYYY-MM-DD"))),
        _ => Ok(None),
    }
}

pub(crate) fn require_positive(value: f64, field: &str) -> Result<(), ApiError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ApiError::bad_request(format!("{field} must be greater than zero")));
    }
    Ok(())
}

pub(crate) fn created<T: Scribe>(res: &mut Response, body: T) {
    res.status_code(StatusCode::CREATED);
    res.render(body);
}

/// Stores an in-app notification unless the user turned them off. Failures
/// are logged and never fail the request that triggered them.
pub(crate) async fn notify(
    state: &AppState,
    user_id: &str,
    kind: NotificationKind,
    title: &str,
    message: String,
) {
    match state.db.user_store().get_settings(user_id).await {
        Ok(settings) if !settings.notifications_enabled => return,
        Ok(_) => {}
        Err(e) => {
            warn!(user_id, error = %e, "could not read notification settings");
            return;
        }
    }

    let notification = Notification {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        kind: kind.as_str().to_string(),
        title: title.to_string(),
        message,
        read: false,
        created_at: Utc::now(),
    };
    if let Err(e) = state
        .db
        .notification_store()
        .create_notification(&notification)
        .await
    {
        warn!(user_id, kind = kind.as_str(), error = %e, "notification not stored");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use salvo::prelude::*;
    use salvo::test::{ResponseExt, TestClient};
    use serde_json::Value;
    use tempfile::NamedTempFile;

    use crate::auth::AuthService;
    use crate::config::{AuthConfig, RatesConfig};
    use crate::db::manager::temp_sqlite;
    use crate::planning::HealthService;
    use crate::rates::RateService;
    use crate::web::{AppState, create_router};

    pub const BASE: &str = "http://127.0.0.1:5800";

    pub struct TestApp {
        pub _file: NamedTempFile,
        pub state: AppState,
        pub service: Service,
    }

    pub async fn test_app() -> TestApp {
        let (file, manager) = temp_sqlite().await;
        let db = Arc::new(manager);
        let auth = AuthService::new(
            db.user_store(),
            AuthConfig {
                bcrypt_cost: 4,
                ..AuthConfig::default()
            },
        );
        let health = HealthService::new(
            db.transaction_store(),
            db.budget_store(),
            db.goal_store(),
            Duration::from_secs(1800),
        );
        let rates = RateService::new(&RatesConfig::default(), db.reference_store()).unwrap();
        let state = AppState::new(db, auth, health, rates);
        let service = Service::new(create_router(state.clone()));
        TestApp {
            _file: file,
            state,
            service,
        }
    }

    impl TestApp {
        /// Registers an account and returns its session token.
        pub async fn register(&self, email: &str, name: &str) -> String {
            let mut res = TestClient::post(format!("{BASE}/api/auth/register"))
                .json(&serde_json::json!({
                    "email": email,
                    "name": name,
                    "password": "correct horse",
                }))
                .send(&self.service)
                .await;
            assert_eq!(res.status_code, Some(StatusCode::CREATED));
            let body: Value = res.take_json().await.unwrap();
            body["token"].as_str().unwrap().to_string()
        }

        pub async fn call(
            &self,
            method: &str,
            path: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let url = format!("{BASE}{path}");
            let mut client = match method {
                "POST" => TestClient::post(url),
                "PUT" => TestClient::put(url),
                "DELETE" => TestClient::delete(url),
                _ => TestClient::get(url),
            };
            if let Some(token) = token {
                client = client.add_header("authorization", format!("Bearer {token}"), true);
            }
            if let Some(body) = body {
                client = client.json(&body);
            }
            let mut res = client.send(&self.service).await;
            let status = res.status_code.unwrap_or(StatusCode::OK);
            let text = res.take_string().await.unwrap_or_default();
            let value = serde_json::from_str(&text).unwrap_or(Value::Null);
            (status, value)
        }
    }
}
