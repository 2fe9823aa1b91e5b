//! Equality filters for the query endpoint.
//!
//! A filter is a JSON object mapping dotted paths to expected values. A
//! document matches when every path matches:
//! - the value at the path equals the expected value, or
//! - the value is an array containing the expected value, or
//! - the path is absent and the expected value is `null`.

use super::error::{DocumentServiceError, ServiceResult};
use crate::model::document::{lookup_path, Document, KEY_DELETED, KEY_INTERNAL_ID};
use serde_json::Value;

/// Validated query filter.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentFilter {
    terms: Vec<(String, Value)>,
}

impl DocumentFilter {
    /// Builds a filter from a request body.
    ///
    /// # Errors
    /// - Body is not a JSON object.
    /// - A path is empty or targets the internal id or tombstone data.
    pub fn parse(body: Value) -> ServiceResult<Self> {
        let Value::Object(map) = body else {
            return Err(DocumentServiceError::InvalidQuery(
                "query body must be a JSON object".to_string(),
            ));
        };
        let mut terms = Vec::with_capacity(map.len());
        for (path, expected) in map {
            let root = path.split('.').next().unwrap_or_default();
            if path.is_empty() || path.split('.').any(str::is_empty) {
                return Err(DocumentServiceError::InvalidQuery(format!(
                    "invalid path `{path}`"
                )));
            }
            if root == KEY_INTERNAL_ID || root == KEY_DELETED {
                return Err(DocumentServiceError::InvalidQuery(format!(
                    "`{root}` is not queryable"
                )));
            }
            terms.push((path, expected));
        }
        Ok(Self { terms })
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.terms
            .iter()
            .all(|(path, expected)| match lookup_path(doc, path) {
                Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
                Some(actual) => actual == expected,
                None => expected.is_null(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::DocumentFilter;
    use crate::model::document::Document;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn matches_nested_paths_and_array_membership() {
        let filter = DocumentFilter::parse(json!({
            "creator.name": "ana",
            "tags": "ritual"
        }))
        .unwrap();
        assert!(filter.matches(&doc(json!({
            "creator": {"name": "ana"},
            "tags": ["ritual", "procession"]
        }))));
        assert!(!filter.matches(&doc(json!({
            "creator": {"name": "ben"},
            "tags": ["ritual"]
        }))));
    }

    #[test]
    fn null_matches_missing_field() {
        let filter = DocumentFilter::parse(json!({"published": null})).unwrap();
        assert!(filter.matches(&doc(json!({"title": "x"}))));
        assert!(!filter.matches(&doc(json!({"published": true}))));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = DocumentFilter::parse(json!({})).unwrap();
        assert!(filter.matches(&doc(json!({"a": 1}))));
    }

    #[test]
    fn internal_id_and_non_objects_are_rejected() {
        assert!(DocumentFilter::parse(json!({"_id": "x"})).is_err());
        assert!(DocumentFilter::parse(json!({"a..b": 1})).is_err());
        assert!(DocumentFilter::parse(json!(["a"])).is_err());
    }
}
