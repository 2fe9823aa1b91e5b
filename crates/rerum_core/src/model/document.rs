//! Document shape, reserved keys and identifier helpers.
//!
//! # Invariants
//! - `_id` is the storage key and never leaves the service boundary.
//! - The public URI is always `id_prefix + _id`.
//! - Client payloads cannot write `_id`, `__rerum` or `__deleted`.

use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

/// Ordered JSON object holding one stored record.
pub type Document = Map<String, Value>;

/// Internal storage id.
pub const KEY_INTERNAL_ID: &str = "_id";
/// JSON-LD public address.
pub const KEY_AT_ID: &str = "@id";
/// Plain public address used by negotiating contexts.
pub const KEY_ID: &str = "id";
/// Store-owned metadata block.
pub const KEY_RERUM: &str = "__rerum";
/// Tombstone marker written on delete.
pub const KEY_DELETED: &str = "__deleted";
pub const KEY_CONTEXT: &str = "@context";

/// Keys no client payload may set.
const STORE_OWNED_KEYS: &[&str] = &[KEY_INTERNAL_ID, KEY_RERUM, KEY_DELETED];

/// Returns whether `key` is owned by the store rather than the client.
pub fn is_store_owned_key(key: &str) -> bool {
    STORE_OWNED_KEYS.contains(&key)
}

/// Mints a fresh internal id.
pub fn mint_internal_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Builds the public URI of an internal id.
pub fn public_uri(id_prefix: &str, internal_id: &str) -> String {
    format!("{id_prefix}{internal_id}")
}

/// Extracts the internal id from a public URI or bare id.
///
/// The id is the last non-empty path segment; query strings and fragments are
/// ignored. Returns `None` when nothing usable remains.
pub fn parse_internal_id(uri: &str) -> Option<String> {
    let without_suffix = uri
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');
    let segment = without_suffix.rsplit('/').next()?.trim();
    if segment.is_empty() || segment.contains(':') {
        return None;
    }
    Some(segment.to_string())
}

/// Returns the address a request body points at: `@id` first, then `id`.
pub fn addressed_uri(doc: &Document) -> Option<&str> {
    doc.get(KEY_AT_ID)
        .and_then(Value::as_str)
        .or_else(|| doc.get(KEY_ID).and_then(Value::as_str))
        .filter(|value| !value.trim().is_empty())
}

/// Reads the internal id stored on a document.
pub fn internal_id_of(doc: &Document) -> Option<&str> {
    doc.get(KEY_INTERNAL_ID).and_then(Value::as_str)
}

/// Resolves a dotted path (`a.b.c`) inside a document.
pub fn lookup_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = doc.get(first)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let index = segment.parse::<usize>().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Current UTC time formatted as RFC 3339.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
