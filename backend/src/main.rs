use std::sync::Arc;

use axum::http::{header, Method};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use reelhouse_shared::{GameRegistry, ReelSpinner, SeededSpinner, ThreadRngSpinner};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::games::backend_slot_game::{create_router as create_slot_game_router, SlotGameState};
use crate::ledger::{Ledger, MemoryLedger, PgLedger};
use crate::services::{AccountService, WagerService};

mod config;
mod error;
mod games;
mod ledger;
mod logging;
mod services;

pub async fn health_check() -> impl IntoResponse {
    "OK"
}

fn build_registry(config: &Config) -> Result<GameRegistry, reelhouse_shared::RegistryError> {
    let mut registry = GameRegistry::builtin()?;
    if let Some(dir) = &config.games_dir {
        let added = registry.load_dir(dir)?;
        info!("Loaded {} game definitions from {}", added, dir.display());
    }
    Ok(registry)
}

async fn build_ledger(config: &Config) -> Result<Arc<dyn Ledger>, Box<dyn std::error::Error>> {
    match &config.database_url {
        Some(url) => {
            let ledger = PgLedger::connect(url, config.database_max_connections, config.ledger_timeout).await?;
            ledger.migrate().await?;
            Ok(Arc::new(ledger))
        }
        None => {
            warn!("DATABASE_URL not set, accounts are kept in memory and lost on exit");
            Ok(Arc::new(MemoryLedger::new()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::from_path(".env").ok();
    logging::setup();

    let config = Config::from_env()?;

    let registry = match build_registry(&config) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("Refusing to start: {}", e);
            return Err(e.into());
        }
    };
    info!("Games available: {}", registry.ids().join(", "));

    let ledger = build_ledger(&config).await?;

    let spinner: Arc<dyn ReelSpinner> = match config.spin_seed {
        Some(seed) => {
            warn!("SPIN_SEED set, reel outcomes are reproducible");
            Arc::new(SeededSpinner::new(seed))
        }
        None => Arc::new(ThreadRngSpinner),
    };

    let state = SlotGameState {
        accounts: Arc::new(AccountService::new(
            ledger.clone(),
            config.initial_balance,
            config.ledger_timeout,
        )),
        wagers: Arc::new(WagerService::new(
            ledger.clone(),
            spinner,
            registry,
            config.ledger_timeout,
        )),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(vec![header::CONTENT_TYPE]);

    let app = Router::new()
        .route("/api/health_check", get(health_check))
        .merge(create_slot_game_router().with_state(state))
        .fallback_service(ServeDir::new(&config.static_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ledger.close().await;
    info!("Server stopped");
    Ok(())
}
