use salvo::prelude::*;
use serde::Deserialize;

use crate::db::models::UserSettings;
use crate::rates::RateProvider;
use crate::web::ApiError;
use crate::web::handlers::{context, parse_body};

const THEMES: [&str; 3] = ["light", "dark", "system"];

#[derive(Debug, Default, Deserialize)]
struct SettingsPatch {
    currency: Option<String>,
    language: Option<String>,
    rate_provider: Option<String>,
    theme: Option<String>,
    notifications_enabled: Option<bool>,
}

fn apply(mut settings: UserSettings, patch: SettingsPatch) -> Result<UserSettings, ApiError> {
    if let Some(currency) = patch.currency {
        let currency = currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ApiError::bad_request("currency must be a three letter code"));
        }
        settings.currency = currency;
    }
    if let Some(language) = patch.language {
        let language = language.trim().to_ascii_lowercase();
        if language.is_empty() || language.len() > 16 {
            return Err(ApiError::bad_request("language is not valid"));
        }
        settings.language = language;
    }
    if let Some(provider) = patch.rate_provider {
        let provider: RateProvider = provider.parse()?;
        settings.rate_provider = provider.as_str().to_string();
    }
    if let Some(theme) = patch.theme {
        let theme = theme.trim().to_ascii_lowercase();
        if !THEMES.contains(&theme.as_str()) {
            return Err(ApiError::bad_request("theme must be light, dark or system"));
        }
        settings.theme = theme;
    }
    if let Some(enabled) = patch.notifications_enabled {
        settings.notifications_enabled = enabled;
    }
    Ok(settings)
}

#[handler]
pub async fn get_settings(depot: &mut Depot) -> Result<Json<UserSettings>, ApiError> {
    let (state, user) = context(depot)?;
    Ok(Json(state.db.user_store().get_settings(&user.id).await?))
}

#[handler]
pub async fn update_settings(
    req: &mut Request,
    depot: &mut Depot,
) -> Result<Json<UserSettings>, ApiError> {
    let (state, user) = context(depot)?;
    let patch: SettingsPatch = parse_body(req).await?;
    let users = state.db.user_store();

    let settings = apply(users.get_settings(&user.id).await?, patch)?;
    users.upsert_settings(&user.id, &settings).await?;
    Ok(Json(settings))
}
