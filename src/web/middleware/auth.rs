use salvo::http::header::AUTHORIZATION;
use salvo::prelude::*;
use tracing::debug;

use crate::auth::AuthService;
use crate::db::models::User;
use crate::web::metrics::Metrics;
use crate::web::{ApiError, app_state};

pub const SESSION_TOKEN: &str = "session_token";

fn bearer_token(req: &Request) -> Option<String> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn request_token(req: &Request, cookie_name: &str) -> Option<String> {
    bearer_token(req)
        .or_else(|| req.cookie(cookie_name).map(|cookie| cookie.value().to_string()))
        .filter(|token| !token.is_empty())
}

async fn resolve_user(auth: &AuthService, token: Option<String>) -> Result<(User, String), ApiError> {
    let token = token.ok_or_else(ApiError::unauthenticated)?;
    match auth.authenticate(&token).await? {
        Some(user) => Ok((user, token)),
        None => {
            debug!("unknown or expired session token");
            Err(ApiError::unauthenticated())
        }
    }
}

/// Rejects the request with 401 unless it carries a live session. The
/// user and the token are left in the depot for the handlers.
#[handler]
pub async fn require_auth(
    req: &mut Request,
    depot: &mut Depot,
    res: &mut Response,
    ctrl: &mut FlowCtrl,
) {
    let outcome = match app_state(depot) {
        Ok(state) => {
            let auth = state.auth.clone();
            let token = request_token(req, auth.cookie_name());
            resolve_user(&auth, token).await
        }
        Err(err) => Err(err),
    };
    match outcome {
        Ok((user, token)) => {
            depot.inject(user);
            depot.insert(SESSION_TOKEN, token);
        }
        Err(err) => {
            if matches!(err, ApiError::Unauthorized(_)) {
                Metrics::auth_failure();
            }
            res.render(err);
            ctrl.skip_rest();
        }
    }
}

pub fn current_user(depot: &Depot) -> Result<&User, ApiError> {
    depot
        .obtain::<User>()
        .map_err(|_| ApiError::unauthenticated())
}

pub fn session_token(depot: &Depot) -> Option<&String> {
    depot.get::<String>(SESSION_TOKEN).ok()
}
