//! `rerum` server entry point.
//!
//! # Responsibility
//! - Read configuration from the environment and bootstrap logging.
//! - Open the document store and serve the HTTP router until interrupted.

use axum::Router;
use log::{error, info};
use rerum_core::db::open_db;
use rerum_core::{init_logging, RerumConfig};
use rerum_http::{build_router, AppState};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=server_exit module=cli status=error message={message}");
            eprintln!("rerum: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), String> {
    let config = RerumConfig::from_env().map_err(|err| err.to_string())?;
    let log_dir = config
        .log_dir
        .as_ref()
        .map(|dir| dir.to_string_lossy().into_owned());
    init_logging(config.log_level, log_dir.as_deref())?;

    let conn = open_db(&config.db_path)
        .map_err(|err| format!("cannot open {}: {err}", config.db_path.display()))?;
    let bind_addr = config.bind_addr;
    let mount_path = config.mount_path.clone();

    let router = build_router(AppState::new(conn, config));
    let app = if mount_path.is_empty() {
        router
    } else {
        Router::new().nest(&mount_path, router)
    };

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|err| format!("cannot bind {bind_addr}: {err}"))?;
    info!(
        "event=server_start module=cli status=ok addr={bind_addr} mount={}",
        if mount_path.is_empty() { "/" } else { mount_path.as_str() }
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| format!("server failed: {err}"))?;
    info!("event=server_stop module=cli status=ok");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("event=shutdown_signal module=cli status=error message={err}");
    }
}
