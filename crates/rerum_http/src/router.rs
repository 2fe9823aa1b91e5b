//! Route table and cross-cutting middleware.

use crate::agent::authenticate;
use crate::handlers;
use crate::state::AppState;
use axum::body::Body;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use log::info;
use std::time::Instant;

/// Builds the store's router. Callers nest it under the configured mount path.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/create", post(handlers::create))
        .route("/bulkCreate", post(handlers::bulk_create))
        .route("/update", put(handlers::update))
        .route("/bulkUpdate", put(handlers::bulk_update))
        .route("/overwrite", put(handlers::overwrite))
        .route("/set", patch(handlers::set))
        .route("/unset", patch(handlers::unset))
        .route("/patch", patch(handlers::patch))
        .route("/delete/:_id", delete(handlers::delete))
        .route("/id/:_id", get(handlers::get_by_id))
        .route("/history/:_id", get(handlers::history))
        .route("/since/:_id", get(handlers::since))
        .route("/release/:_id", patch(handlers::release))
        .route("/query", post(handlers::query))
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn log_requests(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    let status = response.status();
    info!(
        "event=http_request module=http status={} method={} path={} http_status={} duration_ms={}",
        if status.is_server_error() { "error" } else { "ok" },
        method,
        path,
        status.as_u16(),
        started.elapsed().as_millis()
    );
    response
}
