//! `__rerum` metadata block.
//!
//! # Responsibility
//! - Define the version-chain pointers and release state of a document.
//! - Provide constructors for original documents and forked versions.
//!
//! # Invariants
//! - `history.prime` is `"root"` only on original documents.
//! - `history.previous` is empty only on original documents.
//! - `history.next` is append-only.
//! - `is_released` never flips back to `false`.

use super::document::{now_rfc3339, Document, KEY_AT_ID, KEY_RERUM};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `history.prime` value carried by original documents.
pub const PRIME_ROOT: &str = "root";

/// Version-chain pointers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    /// `"root"` or the `@id` of the original document.
    pub prime: String,
    /// `@id` of the parent version, empty on the original.
    #[serde(default)]
    pub previous: String,
    /// `@id`s of versions forked from this one.
    #[serde(default)]
    pub next: Vec<String>,
}

impl History {
    pub fn root() -> Self {
        Self {
            prime: PRIME_ROOT.to_string(),
            previous: String::new(),
            next: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.prime == PRIME_ROOT
    }
}

/// Store-owned metadata attached under `__rerum`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerumMeta {
    #[serde(rename = "@context")]
    pub context: String,
    pub alpha: bool,
    #[serde(rename = "APIversion")]
    pub api_version: String,
    pub history: History,
    pub generated_by: String,
    pub created_at: String,
    /// Empty, or the RFC 3339 time of the last in-place overwrite.
    #[serde(default)]
    pub is_overwritten: String,
    #[serde(default)]
    pub is_released: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

impl RerumMeta {
    /// Metadata for a brand-new original document.
    pub fn original(context: &str, api_version: &str, agent: &str) -> Self {
        Self {
            context: context.to_string(),
            alpha: true,
            api_version: api_version.to_string(),
            history: History::root(),
            generated_by: agent.to_string(),
            created_at: now_rfc3339(),
            is_overwritten: String::new(),
            is_released: false,
            slug: None,
        }
    }

    /// Metadata for a version forked from `parent`, whose public URI is
    /// `parent_uri`.
    ///
    /// Release state and slug are not inherited.
    pub fn forked_from(&self, parent_uri: &str, agent: &str) -> Self {
        let prime = if self.history.is_root() {
            parent_uri.to_string()
        } else {
            self.history.prime.clone()
        };
        Self {
            context: self.context.clone(),
            alpha: self.alpha,
            api_version: self.api_version.clone(),
            history: History {
                prime,
                previous: parent_uri.to_string(),
                next: Vec::new(),
            },
            generated_by: agent.to_string(),
            created_at: now_rfc3339(),
            is_overwritten: String::new(),
            is_released: false,
            slug: None,
        }
    }

    /// Reads the metadata block of a stored document.
    pub fn read(doc: &Document) -> Option<Self> {
        doc.get(KEY_RERUM)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Writes this block back onto `doc`, replacing any previous value.
    pub fn write(&self, doc: &mut Document) {
        if let Ok(value) = serde_json::to_value(self) {
            doc.insert(KEY_RERUM.to_string(), value);
        }
    }
}

/// Reads the public `@id` of a stored document.
pub fn at_id_of(doc: &Document) -> Option<&str> {
    doc.get(KEY_AT_ID).and_then(Value::as_str)
}
