//! Identity negotiation: the client-safe view of a stored document.
//!
//! # Responsibility
//! - Strip the internal `_id` from every outgoing document.
//! - Normalize the public address of documents whose `@context` expects a
//!   plain `id` key.
//!
//! # Invariants
//! - Output never contains `_id`.
//! - A negotiated document carries exactly one address key (`id`).
//! - Negotiation is pure and idempotent.

use crate::model::document::{Document, KEY_AT_ID, KEY_CONTEXT, KEY_ID, KEY_INTERNAL_ID};
use serde_json::Value;

/// Context URLs whose documents address themselves through `id`.
///
/// Matched as substrings so scheme and version suffix variants also count.
const NEGOTIATING_CONTEXTS: &[&str] = &[
    "iiif.io/api/presentation/3/context.json",
    "iiif.io/api/image/3/context.json",
    "iiif.io/api/search/2/context.json",
    "iiif.io/api/auth/2/context.json",
    "www.w3.org/ns/anno.jsonld",
];

/// Returns whether an `@context` value requires address negotiation.
///
/// Accepts a single string or an array; non-string entries never match.
pub fn requires_negotiation(context: &Value) -> bool {
    match context {
        Value::String(url) => is_negotiating_url(url),
        Value::Array(entries) => entries
            .iter()
            .filter_map(Value::as_str)
            .any(is_negotiating_url),
        _ => false,
    }
}

/// Returns whether a document's own `@context` requires negotiation.
pub fn document_requires_negotiation(doc: &Document) -> bool {
    doc.get(KEY_CONTEXT).is_some_and(requires_negotiation)
}

fn is_negotiating_url(url: &str) -> bool {
    NEGOTIATING_CONTEXTS
        .iter()
        .any(|candidate| url.contains(candidate))
}

/// Produces the client-facing view of `doc`.
///
/// For negotiating contexts `@id` moves to a leading `id` key, replacing any
/// author-supplied `id`. A document without `@id` keeps its own `id`.
pub fn negotiate(mut doc: Document) -> Document {
    doc.shift_remove(KEY_INTERNAL_ID);
    if !document_requires_negotiation(&doc) {
        return doc;
    }

    let author_id = doc.shift_remove(KEY_ID);
    let address = doc.shift_remove(KEY_AT_ID).or(author_id);
    let Some(address) = address else {
        return doc;
    };

    let mut negotiated = Document::new();
    negotiated.insert(KEY_ID.to_string(), address);
    negotiated.extend(doc);
    negotiated
}

/// Public address a client sees for `doc` after negotiation.
///
/// Works on stored and negotiated documents alike: `@id` always wins, and a
/// plain `id` only counts once negotiation has moved the address there.
pub fn public_id(doc: &Document) -> Option<&str> {
    let at_id = doc.get(KEY_AT_ID).and_then(Value::as_str);
    if !document_requires_negotiation(doc) {
        return at_id;
    }
    at_id.or_else(|| doc.get(KEY_ID).and_then(Value::as_str))
}
