use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use salvo::prelude::*;
use tracing::info;

use crate::auth::AuthService;
use crate::config::ServerConfig;
use crate::db::DatabaseManager;
use crate::planning::HealthService;
use crate::rates::RateService;

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;

pub use self::error::ApiError;
pub use self::routes::create_router;

/// Shared services handed to every request through the depot.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseManager>,
    pub auth: AuthService,
    pub health: HealthService,
    pub rates: RateService,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseManager>,
        auth: AuthService,
        health: HealthService,
        rates: RateService,
    ) -> Self {
        Self {
            db,
            auth,
            health,
            rates,
            started_at: Instant::now(),
        }
    }
}

pub fn app_state(depot: &Depot) -> Result<&AppState, ApiError> {
    depot
        .obtain::<AppState>()
        .map_err(|_| ApiError::Internal("application state is not attached".to_string()))
}

#[derive(Clone)]
pub struct WebServer {
    config: ServerConfig,
    state: AppState,
}

impl WebServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub async fn start(&self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.config.bind_address, self.config.port);
        info!("Starting web server on {}", bind_addr);

        let acceptor = TcpListener::new(bind_addr).bind().await;
        Server::new(acceptor)
            .serve(create_router(self.state.clone()))
            .await;

        Ok(())
    }
}
