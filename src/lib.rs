pub mod api;
pub mod backup;
pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod net;
pub mod paths;
pub mod registry;
pub mod utils;

use std::sync::Arc;

use log::info;

use crate::error::Result;
use crate::paths::Paths;
use crate::registry::Registry;

pub const DEFAULT_PORT: u16 = 7767;

/// Brings up the registry, reconciles against whatever is already running,
/// and serves the dashboard API until the process is killed.
pub async fn run() -> Result<()> {
    let paths = Paths::new()?;
    tokio::fs::create_dir_all(paths.data_dir()).await?;
    info!("data directory: {}", paths.data_dir().display());

    let registry = Arc::new(Registry::new(paths));
    registry.reconcile_on_startup().await?;

    let host = std::env::var("MCSM_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("MCSM_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on http://{addr}");

    axum::serve(listener, api::rest::router(registry)).await?;
    Ok(())
}
