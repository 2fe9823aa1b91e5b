//! Response shaping: negotiation plus the store's discovery headers.
//!
//! # Invariants
//! - Bodies are negotiated before hashing, so `ETag` matches the bytes sent.
//! - `Location` is the negotiated public id.

use crate::error::ApiError;
use axum::body::Body;
use axum::http::header::{ALLOW, CONTENT_TYPE, ETAG, IF_NONE_MATCH, LINK, LOCATION};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use rerum_core::{negotiate, public_id, Document, RerumConfig};
use sha2::{Digest, Sha256};
use std::fmt::Write;

pub(crate) const ALLOW_METHODS: &str = "GET,OPTIONS,HEAD,PUT,PATCH,DELETE,POST";
const LDP_RESOURCE: &str = "<http://www.w3.org/ns/ldp#Resource>; rel=\"type\"";
const JSON_LD: &str = "application/ld+json; charset=utf-8";
const JSON: &str = "application/json; charset=utf-8";

/// Response for a single document.
///
/// Returns 304 when `request_headers` carries a matching `If-None-Match`.
pub(crate) fn document_response(
    status: StatusCode,
    doc: Document,
    config: &RerumConfig,
    request_headers: Option<&HeaderMap>,
) -> Result<Response, ApiError> {
    let link = document_link(config, &doc);
    let view = negotiate(doc);
    let location = public_id(&view).map(str::to_string);
    let content_type = if view.contains_key("@context") {
        JSON_LD
    } else {
        JSON
    };
    let body = encode(&view)?;
    let etag = etag_for(&body);

    let not_modified = request_headers
        .and_then(|headers| headers.get(IF_NONE_MATCH))
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| if_none_match_hits(value, &etag));

    let mut response = if not_modified {
        bare(StatusCode::NOT_MODIFIED, Body::empty())
    } else {
        bare(status, Body::from(body))
    };
    let headers = response.headers_mut();
    put(headers, CONTENT_TYPE, content_type);
    put(headers, ETAG, &etag);
    put(headers, ALLOW, ALLOW_METHODS);
    put(headers, LINK, &link);
    if let Some(location) = location {
        put(headers, LOCATION, &location);
    }
    Ok(response)
}

/// Response for an array of documents.
///
/// With `link_items`, a `Link` header lists every item's public id.
pub(crate) fn documents_response(
    status: StatusCode,
    docs: Vec<Document>,
    link_items: bool,
) -> Result<Response, ApiError> {
    let views: Vec<Document> = docs.into_iter().map(negotiate).collect();
    let body = encode(&views)?;
    let etag = etag_for(&body);
    let links = link_items.then(|| {
        views
            .iter()
            .filter_map(public_id)
            .map(|uri| format!("<{uri}>; rel=\"item\""))
            .collect::<Vec<_>>()
            .join(", ")
    });

    let mut response = bare(status, Body::from(body));
    let headers = response.headers_mut();
    put(headers, CONTENT_TYPE, JSON);
    put(headers, ETAG, &etag);
    put(headers, ALLOW, ALLOW_METHODS);
    if let Some(links) = links.filter(|links| !links.is_empty()) {
        put(headers, LINK, &links);
    }
    Ok(response)
}

pub(crate) fn no_content() -> Response {
    let mut response = bare(StatusCode::NO_CONTENT, Body::empty());
    put(response.headers_mut(), ALLOW, ALLOW_METHODS);
    response
}

/// Quoted SHA-256 hex digest of a response body.
pub(crate) fn etag_for(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    let mut out = String::with_capacity(digest.len() * 2 + 2);
    out.push('"');
    for byte in digest.iter() {
        let _ = write!(out, "{byte:02x}");
    }
    out.push('"');
    out
}

/// Weak comparison of an `If-None-Match` list against the current tag.
pub(crate) fn if_none_match_hits(header: &str, etag: &str) -> bool {
    header.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
    })
}

/// `Link` value: resource type plus history and release discovery links.
pub(crate) fn document_link(config: &RerumConfig, doc: &Document) -> String {
    let Some(id) = doc.get("_id").and_then(|value| value.as_str()) else {
        return LDP_RESOURCE.to_string();
    };
    let prefix = &config.api_prefix;
    format!(
        "{LDP_RESOURCE}, <{prefix}history/{id}>; rel=\"version-history\", \
         <{prefix}since/{id}>; rel=\"successor-version\", \
         <{prefix}release/{id}>; rel=\"release\""
    )
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, ApiError> {
    serde_json::to_vec(value)
        .map_err(|err| ApiError::internal(format!("cannot encode response body: {err}")))
}

fn bare(status: StatusCode, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

fn put(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
