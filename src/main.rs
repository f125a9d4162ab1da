// src/main.rs
mod routes;
mod handlers;
mod models;
mod database;
mod middleware;
mod state;
mod dtos; // expose DTO modules
mod error;
mod auth; // expose auth module
mod config;
mod services;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return;
        }
    };

    // Pick the store: PostgreSQL when configured, otherwise in memory
    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => match database::create_pool(url, config.database_max_connections).await {
            Ok(pool) => Arc::new(PgStore::new(pool)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to create database pool");
                return;
            }
        },
        None => {
            tracing::warn!("DATABASE_URL not set, data is kept in memory and lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let (host, base_port) = (config.host, config.port);

    // Create application state
    let app_state = state::AppState::new(store, config);
    let app = routes::app(app_state);

    // Try base_port..base_port+20 to avoid crash when address is in use
    let listener = {
        let mut bound = None;
        for offset in 0u16..=20 {
            let port = base_port.saturating_add(offset);
            let addr = SocketAddr::from((host, port));
            match TcpListener::bind(addr).await {
                Ok(l) => { bound = Some((l, addr)); break; }
                Err(e) => {
                    if offset == 0 { tracing::warn!(%addr, error=%e, "Port in use, trying next"); }
                }
            }
        }
        match bound {
            Some((l, addr)) => {
                tracing::info!("Server running on {}", addr);
                l
            }
            None => {
                tracing::error!("Failed to bind to any port starting at {} on {}", base_port, host);
                return;
            }
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error=%e, "Server error");
    }
}
