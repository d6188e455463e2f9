use std::collections::BTreeMap;

use salvo::prelude::*;
use serde_json::json;

use crate::rates::RateProvider;
use crate::web::handlers::{context, parse_body, path_param};
use crate::web::{ApiError, app_state};

const MAX_LANGUAGE_LEN: usize = 16;

fn language_param(req: &Request) -> Result<String, ApiError> {
    let language = path_param(req, "lang")?.trim().to_ascii_lowercase();
    let valid = language.len() <= MAX_LANGUAGE_LEN
        && language
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if language.is_empty() || !valid {
        return Err(ApiError::bad_request("language is not valid"));
    }
    Ok(language)
}

#[handler]
pub async fn get_translations(
    req: &mut Request,
    depot: &mut Depot,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = app_state(depot)?.clone();
    let language = language_param(req)?;
    let messages = state.db.reference_store().translations(&language).await?;
    Ok(Json(json!({ "language": language, "messages": messages })))
}

#[handler]
pub async fn put_translations(
    req: &mut Request,
    depot: &mut Depot,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, _) = context(depot)?;
    let language = language_param(req)?;
    let entries: BTreeMap<String, String> = parse_body(req).await?;
    if entries.keys().any(|key| key.trim().is_empty()) {
        return Err(ApiError::bad_request("translation keys cannot be empty"));
    }

    let store = state.db.reference_store();
    store.upsert_translations(&language, &entries).await?;
    let messages = store.translations(&language).await?;
    Ok(Json(json!({ "language": language, "messages": messages })))
}

/// Stored rates of `?provider=`, or of the provider picked in the user's
/// settings.
#[handler]
pub async fn list_rates(req: &mut Request, depot: &mut Depot) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, user) = context(depot)?;
    let provider: RateProvider = match req.query::<String>("provider") {
        Some(raw) if !raw.trim().is_empty() => raw.parse()?,
        _ => state
            .db
            .user_store()
            .get_settings(&user.id)
            .await?
            .rate_provider
            .parse()?,
    };

    let rates = state.rates.latest(provider).await?;
    Ok(Json(json!({ "provider": provider, "rates": rates })))
}

/// Refreshes one provider when `?provider=` is given, otherwise all of the
/// configured ones.
#[handler]
pub async fn refresh_rates(
    req: &mut Request,
    depot: &mut Depot,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (state, _) = context(depot)?;
    match req.query::<String>("provider") {
        Some(raw) if !raw.trim().is_empty() => {
            let provider: RateProvider = raw.parse()?;
            let updated = state.rates.refresh(provider).await?;
            Ok(Json(json!({ "providers": [provider], "updated": updated })))
        }
        _ => {
            let providers = state.rates.configured();
            let updated = state.rates.refresh_all().await;
            Ok(Json(json!({ "providers": providers, "updated": updated })))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use salvo::prelude::StatusCode;
    use serde_json::json;

    use crate::db::models::ExchangeRate;
    use crate::web::handlers::test_support::test_app;

    #[tokio::test]
    async fn translations_are_public_to_read() {
        let app = test_app().await;
        let token = app.register("ana@example.org", "Ana").await;

        let (status, _) = app
            .call("PUT", "/api/translations/es", None, Some(json!({ "hello": "hola" })))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app
            .call(
                "PUT",
                "/api/translations/es",
                Some(&token),
                Some(json!({ "hello": "hola", "budget": "presupuesto" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app.call("GET", "/api/translations/ES", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["language"], "es");
        assert_eq!(body["messages"]["budget"], "presupuesto");

        let (_, body) = app.call("GET", "/api/translations/fr", None, None).await;
        assert_eq!(body["messages"], json!({}));
    }

    #[tokio::test]
    async fn rates_default_to_the_users_provider() {
        let app = test_app().await;
        let token = app.register("ana@example.org", "Ana").await;
        let now = Utc::now();
        app.state
            .db
            .reference_store()
            .upsert_rates(&[
                ExchangeRate {
                    provider: "official".to_string(),
                    currency: "EUR".to_string(),
                    rate: 0.92,
                    fetched_at: now,
                },
                ExchangeRate {
                    provider: "parallel".to_string(),
                    currency: "EUR".to_string(),
                    rate: 0.95,
                    fetched_at: now,
                },
            ])
            .await
            .unwrap();

        let (_, body) = app.call("GET", "/api/rates", Some(&token), None).await;
        assert_eq!(body["provider"], "official");
        assert_eq!(body["rates"][0]["rate"], 0.92);

        app.call(
            "PUT",
            "/api/settings",
            Some(&token),
            Some(json!({ "rate_provider": "parallel" })),
        )
        .await;
        let (_, body) = app.call("GET", "/api/rates", Some(&token), None).await;
        assert_eq!(body["rates"][0]["rate"], 0.95);

        let (status, _) = app
            .call("GET", "/api/rates?provider=crypto", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app
            .call("POST", "/api/rates/refresh?provider=forex", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = app.call("POST", "/api/rates/refresh", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated"], 0);
    }
}
