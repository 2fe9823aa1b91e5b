//! Route handlers.
//!
//! Each handler parses the request, runs one service call on the blocking
//! pool and shapes the result. Status mapping lives in [`ApiError`].

use crate::agent::Agent;
use crate::error::ApiError;
use crate::headers::{document_response, documents_response, no_content};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use rerum_core::QueryPage;
use serde::Deserialize;
use serde_json::Value;

const SLUG_HEADER: &str = "slug";
const OVERWRITE_VERSION_HEADER: &str = "if-overwritten-version";

type HandlerResult = Result<Response, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct QueryParams {
    limit: Option<u32>,
    skip: Option<u32>,
}

pub(crate) async fn create(
    State(state): State<AppState>,
    Agent(agent): Agent,
    body: Bytes,
) -> HandlerResult {
    let payload = parse_body(&body)?;
    let doc = state
        .run(move |service| service.create(&agent, payload))
        .await?;
    document_response(StatusCode::CREATED, doc, state.config(), None)
}

pub(crate) async fn bulk_create(
    State(state): State<AppState>,
    Agent(agent): Agent,
    body: Bytes,
) -> HandlerResult {
    let payload = parse_body(&body)?;
    let docs = state
        .run(move |service| service.bulk_create(&agent, payload))
        .await?;
    documents_response(StatusCode::CREATED, docs, true)
}

pub(crate) async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> HandlerResult {
    let doc = state.run(move |service| service.get(&id)).await?;
    document_response(StatusCode::OK, doc, state.config(), Some(&headers))
}

pub(crate) async fn update(
    State(state): State<AppState>,
    Agent(agent): Agent,
    body: Bytes,
) -> HandlerResult {
    let payload = parse_body(&body)?;
    let doc = state
        .run(move |service| service.update(&agent, payload))
        .await?;
    document_response(StatusCode::OK, doc, state.config(), None)
}

pub(crate) async fn bulk_update(
    State(state): State<AppState>,
    Agent(agent): Agent,
    body: Bytes,
) -> HandlerResult {
    let payload = parse_body(&body)?;
    let docs = state
        .run(move |service| service.bulk_update(&agent, payload))
        .await?;
    documents_response(StatusCode::OK, docs, true)
}

pub(crate) async fn overwrite(
    State(state): State<AppState>,
    Agent(agent): Agent,
    headers: HeaderMap,
    body: Bytes,
) -> HandlerResult {
    let expected = header_text(&headers, OVERWRITE_VERSION_HEADER)?;
    let payload = parse_body(&body)?;
    let doc = state
        .run(move |service| service.overwrite(&agent, payload, expected.as_deref()))
        .await?;
    document_response(StatusCode::OK, doc, state.config(), None)
}

pub(crate) async fn set(
    State(state): State<AppState>,
    Agent(agent): Agent,
    body: Bytes,
) -> HandlerResult {
    let payload = parse_body(&body)?;
    let doc = state.run(move |service| service.set(&agent, payload)).await?;
    document_response(StatusCode::OK, doc, state.config(), None)
}

pub(crate) async fn unset(
    State(state): State<AppState>,
    Agent(agent): Agent,
    body: Bytes,
) -> HandlerResult {
    let payload = parse_body(&body)?;
    let doc = state
        .run(move |service| service.unset(&agent, payload))
        .await?;
    document_response(StatusCode::OK, doc, state.config(), None)
}

pub(crate) async fn patch(
    State(state): State<AppState>,
    Agent(agent): Agent,
    body: Bytes,
) -> HandlerResult {
    let payload = parse_body(&body)?;
    let doc = state
        .run(move |service| service.patch(&agent, payload))
        .await?;
    document_response(StatusCode::OK, doc, state.config(), None)
}

pub(crate) async fn release(
    State(state): State<AppState>,
    Agent(agent): Agent,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> HandlerResult {
    let slug = header_text(&headers, SLUG_HEADER)?;
    let doc = state
        .run(move |service| service.release(&agent, &id, slug.as_deref()))
        .await?;
    document_response(StatusCode::OK, doc, state.config(), None)
}

pub(crate) async fn delete(
    State(state): State<AppState>,
    Agent(agent): Agent,
    Path(id): Path<String>,
) -> HandlerResult {
    state
        .run(move |service| service.delete(&agent, &id))
        .await?;
    Ok(no_content())
}

pub(crate) async fn history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HandlerResult {
    let docs = state.run(move |service| service.history(&id)).await?;
    documents_response(StatusCode::OK, docs, false)
}

pub(crate) async fn since(State(state): State<AppState>, Path(id): Path<String>) -> HandlerResult {
    let docs = state.run(move |service| service.since(&id)).await?;
    documents_response(StatusCode::OK, docs, false)
}

pub(crate) async fn query(
    State(state): State<AppState>,
    params: Result<Query<QueryParams>, QueryRejection>,
    body: Bytes,
) -> HandlerResult {
    let Query(params) =
        params.map_err(|err| ApiError::bad_request(format!("invalid paging: {err}")))?;
    let filter = parse_body(&body)?;
    let page = QueryPage {
        limit: params.limit,
        skip: params.skip,
    };
    let docs = state
        .run(move |service| service.query(filter, page))
        .await?;
    documents_response(StatusCode::OK, docs, false)
}

fn parse_body(body: &[u8]) -> Result<Value, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("request body is empty"));
    }
    serde_json::from_slice(body)
        .map_err(|err| ApiError::bad_request(format!("request body is not valid JSON: {err}")))
}

fn header_text(headers: &HeaderMap, name: &str) -> Result<Option<String>, ApiError> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map(str::to_string)
                .map_err(|_| ApiError::bad_request(format!("header `{name}` is not visible ASCII")))
        })
        .transpose()
}
