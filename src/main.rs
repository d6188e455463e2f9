#![forbid(unsafe_code)]
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};

mod auth;
mod cli;
mod config;
mod db;
mod months;
mod planning;
mod rates;
mod scheduler;
mod simulation;
mod utils;
mod web;

use auth::AuthService;
use config::Config;
use planning::HealthService;
use rates::RateService;
use scheduler::{BudgetHistoryJob, Scheduler};
use web::metrics::Metrics;
use web::{AppState, WebServer};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse_args();
    let config = Config::load(args.config.as_deref())?;
    utils::logging::init_tracing(&config.logging);
    Metrics::start();
    info!("family finance service starting up");

    let db_manager = Arc::new(db::DatabaseManager::new(&config.database)?);
    db_manager.migrate().await?;
    info!(dialect = db_manager.dialect().name(), "database ready");
    if args.migrate_only {
        info!("migrations applied; exiting");
        return Ok(());
    }

    let auth = AuthService::new(db_manager.user_store(), config.auth.clone());
    let health = HealthService::new(
        db_manager.transaction_store(),
        db_manager.budget_store(),
        db_manager.goal_store(),
        Duration::from_secs(config.planning.health_cache_ttl_secs),
    );
    let rates = RateService::new(&config.rates, db_manager.reference_store())?;

    let scheduler = Scheduler::new(
        config.scheduler.clone(),
        BudgetHistoryJob::new(db_manager.transaction_store(), db_manager.budget_store()),
        rates.clone(),
        auth.clone(),
    );
    let web_server = WebServer::new(
        config.server.clone(),
        AppState::new(db_manager.clone(), auth, health, rates),
    );

    let web_handle = tokio::spawn(async move {
        if let Err(e) = web_server.start().await {
            error!("web server error: {}", e);
        }
    });

    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.start().await {
            error!("scheduler error: {}", e);
        }
    });

    tokio::select! {
        _ = web_handle => {},
        _ = scheduler_handle => {},
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }

    info!("family finance service shutting down");
    Ok(())
}
