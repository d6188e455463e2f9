pub mod auth;
pub mod logging;

pub use self::auth::{current_user, require_auth, session_token};
pub use self::logging::log_requests;
