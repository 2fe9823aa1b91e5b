//! Document use-case service: the versioning controller.
//!
//! # Responsibility
//! - Create documents and attach their `__rerum` metadata.
//! - Decide per request whether to fork a new version, overwrite in place,
//!   release, or tombstone.
//! - Thread `history.previous` / `history.next` pointers on every fork.
//!
//! # Invariants
//! - update, set, unset and patch never mutate the target's domain fields;
//!   they fork a child version and append it to the parent's `history.next`.
//! - overwrite is the only in-place domain mutation and is refused for
//!   released documents.
//! - Every read-modify-write goes through the repository's compare-and-set.
//! - Returned documents still carry `_id`; adapters negotiate before
//!   responding.

use super::error::{DocumentServiceError, ServiceResult};
use super::history;
use super::query::DocumentFilter;
use crate::config::{RerumConfig, QUERY_LIMIT_MAX};
use crate::model::document::{
    addressed_uri, is_store_owned_key, mint_internal_id, now_rfc3339, parse_internal_id,
    public_uri, Document, KEY_AT_ID, KEY_CONTEXT, KEY_DELETED, KEY_ID, KEY_INTERNAL_ID,
    KEY_RERUM,
};
use crate::model::rerum::{at_id_of, RerumMeta};
use crate::negotiate::document_requires_negotiation;
use crate::repo::document_repo::{DocumentListQuery, DocumentRecord, DocumentRepository, RepoError};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

static SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,100}$").expect("valid slug regex"));

/// Rows read from the store per query round trip.
const QUERY_SCAN_BATCH: u32 = 256;

/// Paging for the query use-case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryPage {
    pub limit: Option<u32>,
    pub skip: Option<u32>,
}

/// Versioning controller over a document repository.
pub struct DocumentService<'cfg, R: DocumentRepository> {
    repo: R,
    config: &'cfg RerumConfig,
}

impl<'cfg, R: DocumentRepository> DocumentService<'cfg, R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R, config: &'cfg RerumConfig) -> Self {
        Self { repo, config }
    }

    /// Creates one original document from a client payload.
    pub fn create(&mut self, agent: &str, payload: Value) -> ServiceResult<Document> {
        let provided = expect_object(payload)?;
        let doc = self.compose_original(agent, provided);
        self.repo.insert_document(&doc)?;
        info!(
            "event=document_create module=service status=ok id={}",
            id_for_log(&doc)
        );
        Ok(doc)
    }

    /// Creates every document of a JSON array in one transaction.
    pub fn bulk_create(&mut self, agent: &str, payload: Value) -> ServiceResult<Vec<Document>> {
        let items = expect_array(payload)?;
        let mut docs = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let Value::Object(provided) = item else {
                return Err(DocumentServiceError::InvalidPayload(format!(
                    "item {index} is not a JSON object"
                )));
            };
            docs.push(self.compose_original(agent, provided));
        }
        self.repo.insert_documents(&docs)?;
        info!(
            "event=document_bulk_create module=service status=ok count={}",
            docs.len()
        );
        Ok(docs)
    }

    /// Gets one active document by internal id or release slug.
    pub fn get(&self, key: &str) -> ServiceResult<Document> {
        self.repo
            .get_document(key, false)?
            .map(|record| record.body)
            .ok_or_else(|| DocumentServiceError::NotFound(key.to_string()))
    }

    /// Replaces all domain fields by forking a new version.
    pub fn update(&mut self, agent: &str, payload: Value) -> ServiceResult<Document> {
        let provided = expect_object(payload)?;
        let parent = self.resolve_target(&provided)?;
        let fields = replacement_fields(provided);
        let child = self.fork(agent, parent, fields)?;
        log_write("document_update", &child);
        Ok(child)
    }

    /// Applies `update` to every item of a JSON array, in order.
    ///
    /// Items are shape-checked up front; a storage failure midway leaves the
    /// earlier forks in place.
    pub fn bulk_update(&mut self, agent: &str, payload: Value) -> ServiceResult<Vec<Document>> {
        let items = expect_array(payload)?;
        for (index, item) in items.iter().enumerate() {
            let Some(provided) = item.as_object() else {
                return Err(DocumentServiceError::InvalidPayload(format!(
                    "item {index} is not a JSON object"
                )));
            };
            if addressed_uri(provided).is_none() {
                return Err(DocumentServiceError::InvalidPayload(format!(
                    "item {index} has no 'id' or '@id' property"
                )));
            }
        }

        let mut updated = Vec::with_capacity(items.len());
        for item in items {
            updated.push(self.update(agent, item)?);
        }
        Ok(updated)
    }

    /// Replaces domain fields in place, keeping `@id` and history.
    ///
    /// `expected_overwritten` is the caller's view of `__rerum.isOverwritten`;
    /// a stale value is refused.
    pub fn overwrite(
        &mut self,
        agent: &str,
        payload: Value,
        expected_overwritten: Option<&str>,
    ) -> ServiceResult<Document> {
        let provided = expect_object(payload)?;
        let target = self.resolve_target(&provided)?;
        let mut meta = read_meta(&target)?;
        ensure_generator(&meta, agent, &target.id)?;
        if meta.is_released {
            return Err(DocumentServiceError::Released(target.id));
        }
        if let Some(expected) = expected_overwritten {
            if expected != meta.is_overwritten {
                return Err(DocumentServiceError::VersionMismatch {
                    id: target.id,
                    current: meta.is_overwritten,
                });
            }
        }

        let uri = stored_uri(&target)?;
        meta.is_overwritten = now_rfc3339();
        let doc = assemble(&target.id, &uri, replacement_fields(provided), &meta);
        self.repo.replace_document(&doc, target.revision, false)?;
        log_write("document_overwrite", &doc);
        Ok(doc)
    }

    /// Shallow-merges payload keys into the target and forks a new version.
    ///
    /// Returns the target unchanged when the merge alters nothing.
    pub fn set(&mut self, agent: &str, payload: Value) -> ServiceResult<Document> {
        let provided = expect_object(payload)?;
        let parent = self.resolve_target(&provided)?;
        let changes = patch_entries(provided);
        let mut fields = domain_fields(&parent.body);
        let before = fields.clone();
        for (key, value) in changes {
            fields.insert(key, value);
        }
        self.fork_if_changed("document_set", agent, parent, before, fields)
    }

    /// Updates keys that already exist; `null` removes the key. Unknown keys
    /// are ignored.
    pub fn patch(&mut self, agent: &str, payload: Value) -> ServiceResult<Document> {
        let provided = expect_object(payload)?;
        let parent = self.resolve_target(&provided)?;
        let changes = patch_entries(provided);
        let mut fields = domain_fields(&parent.body);
        let before = fields.clone();
        for (key, value) in changes {
            if !fields.contains_key(&key) {
                continue;
            }
            if value.is_null() {
                fields.shift_remove(&key);
            } else {
                fields.insert(key, value);
            }
        }
        self.fork_if_changed("document_patch", agent, parent, before, fields)
    }

    /// Removes every key named in the payload and forks a new version.
    ///
    /// Payload values are sentinels and ignored. Naming a key the document
    /// does not have fails with [`DocumentServiceError::MissingKeys`].
    pub fn unset(&mut self, agent: &str, payload: Value) -> ServiceResult<Document> {
        let provided = expect_object(payload)?;
        let parent = self.resolve_target(&provided)?;
        let keys: Vec<String> = patch_entries(provided).into_iter().map(|(k, _)| k).collect();
        let mut fields = domain_fields(&parent.body);
        let missing: Vec<String> = keys
            .iter()
            .filter(|key| !fields.contains_key(key.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(DocumentServiceError::MissingKeys(missing));
        }

        let before = fields.clone();
        for key in &keys {
            fields.shift_remove(key.as_str());
        }
        self.fork_if_changed("document_unset", agent, parent, before, fields)
    }

    /// Marks a document released under a permanent slug.
    pub fn release(
        &mut self,
        agent: &str,
        key: &str,
        slug: Option<&str>,
    ) -> ServiceResult<Document> {
        let slug = slug
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(DocumentServiceError::MissingSlug)?;
        if !SLUG_RE.is_match(slug) {
            return Err(DocumentServiceError::InvalidSlug(slug.to_string()));
        }

        let target = self.lookup_mutable(key)?;
        let mut meta = read_meta(&target)?;
        ensure_generator(&meta, agent, &target.id)?;
        if self.repo.get_document(slug, true)?.is_some() {
            return Err(DocumentServiceError::SlugInUse(slug.to_string()));
        }
        if meta.is_released {
            return Err(DocumentServiceError::AlreadyReleased(target.id));
        }

        meta.is_released = true;
        meta.slug = Some(slug.to_string());
        let mut doc = target.body;
        meta.write(&mut doc);
        self.repo.replace_document(&doc, target.revision, false)?;
        info!(
            "event=document_release module=service status=ok id={} slug={}",
            target.id, slug
        );
        Ok(doc)
    }

    /// Tombstones a document.
    pub fn delete(&mut self, agent: &str, key: &str) -> ServiceResult<()> {
        let target = self.lookup_mutable(key)?;
        let meta = read_meta(&target)?;
        ensure_generator(&meta, agent, &target.id)?;
        if meta.is_released {
            return Err(DocumentServiceError::Released(target.id));
        }

        let mut doc = target.body;
        doc.insert(
            KEY_DELETED.to_string(),
            json!({ "deletor": agent, "time": now_rfc3339() }),
        );
        self.repo.replace_document(&doc, target.revision, true)?;
        info!(
            "event=document_delete module=service status=ok id={}",
            target.id
        );
        Ok(())
    }

    /// Prior versions of a document, nearest first, back to the prime.
    pub fn history(&self, key: &str) -> ServiceResult<Vec<Document>> {
        let start = self.get(key)?;
        let chain = history::ancestors(&self.repo, &start)?;
        Ok(active_bodies(chain))
    }

    /// Every later version forked from a document, breadth-first.
    pub fn since(&self, key: &str) -> ServiceResult<Vec<Document>> {
        let start = self.get(key)?;
        let found = history::descendants(&self.repo, &start)?;
        Ok(active_bodies(found))
    }

    /// Filters active documents in insertion order.
    pub fn query(&self, filter: Value, page: QueryPage) -> ServiceResult<Vec<Document>> {
        let filter = DocumentFilter::parse(filter)?;
        let limit = match page.limit {
            None => self.config.default_query_limit,
            Some(0) => {
                return Err(DocumentServiceError::InvalidQuery(
                    "limit must be at least 1".to_string(),
                ))
            }
            Some(value) => value.min(QUERY_LIMIT_MAX),
        };
        let mut to_skip = page.skip.unwrap_or(0);
        let limit = limit as usize;

        // Scan in batches and stop as soon as the page is full.
        let mut page_docs = Vec::with_capacity(limit);
        let mut offset = 0u32;
        'scan: loop {
            let batch = self.repo.list_documents(&DocumentListQuery {
                limit: Some(QUERY_SCAN_BATCH),
                offset,
            })?;
            let fetched = batch.len();
            for record in batch {
                if !filter.matches(&record.body) {
                    continue;
                }
                if to_skip > 0 {
                    to_skip -= 1;
                    continue;
                }
                page_docs.push(record.body);
                if page_docs.len() >= limit {
                    break 'scan;
                }
            }
            if fetched < QUERY_SCAN_BATCH as usize {
                break;
            }
            offset = offset.saturating_add(QUERY_SCAN_BATCH);
        }
        Ok(page_docs)
    }

    fn compose_original(&self, agent: &str, provided: Document) -> Document {
        let id = mint_internal_id();
        let uri = public_uri(&self.config.id_prefix, &id);
        let fields = creation_fields(provided);
        let meta = RerumMeta::original(&self.config.rerum_context, &self.config.api_version, agent);
        assemble(&id, &uri, fields, &meta)
    }

    fn resolve_target(&self, provided: &Document) -> ServiceResult<DocumentRecord> {
        let uri = addressed_uri(provided).ok_or(DocumentServiceError::MissingAddress)?;
        let id = parse_internal_id(uri).ok_or_else(|| {
            DocumentServiceError::InvalidPayload(format!("cannot read a document id from `{uri}`"))
        })?;
        self.lookup_mutable(&id)
    }

    fn lookup_mutable(&self, key: &str) -> ServiceResult<DocumentRecord> {
        let record = self
            .repo
            .get_document(key, true)?
            .ok_or_else(|| DocumentServiceError::NotFound(key.to_string()))?;
        if record.is_deleted {
            return Err(DocumentServiceError::Deleted(record.id));
        }
        Ok(record)
    }

    fn fork_if_changed(
        &mut self,
        event: &str,
        agent: &str,
        parent: DocumentRecord,
        before: Document,
        fields: Document,
    ) -> ServiceResult<Document> {
        if before == fields {
            info!(
                "event={event} module=service status=noop id={}",
                parent.id
            );
            return Ok(parent.body);
        }
        let child = self.fork(agent, parent, fields)?;
        log_write(event, &child);
        Ok(child)
    }

    fn fork(
        &mut self,
        agent: &str,
        parent: DocumentRecord,
        fields: Document,
    ) -> ServiceResult<Document> {
        let mut parent_meta = read_meta(&parent)?;
        let parent_uri = stored_uri(&parent)?;

        let child_id = mint_internal_id();
        let child_uri = public_uri(&self.config.id_prefix, &child_id);
        if history::is_ancestor(&self.repo, &parent.body, &child_uri)? {
            return Err(DocumentServiceError::HistoryCycle(child_uri));
        }

        let child_meta = parent_meta.forked_from(&parent_uri, agent);
        let child = assemble(&child_id, &child_uri, fields, &child_meta);

        parent_meta.history.next.push(child_uri);
        let mut parent_body = parent.body;
        parent_meta.write(&mut parent_body);
        self.repo
            .fork_document(&parent_body, parent.revision, &child)?;
        Ok(child)
    }
}

/// Builds a stored document: `@context`, `@id`, domain fields, `__rerum`,
/// then `_id`.
///
/// Under a negotiating context `id` is reserved for the public address, so an
/// author `id` carried over from an earlier version is dropped.
fn assemble(id: &str, uri: &str, mut fields: Document, meta: &RerumMeta) -> Document {
    if document_requires_negotiation(&fields) {
        fields.shift_remove(KEY_ID);
    }
    let mut doc = Document::new();
    if let Some(context) = fields.shift_remove(KEY_CONTEXT) {
        doc.insert(KEY_CONTEXT.to_string(), context);
    }
    doc.insert(KEY_AT_ID.to_string(), Value::String(uri.to_string()));
    doc.extend(fields);
    meta.write(&mut doc);
    doc.insert(KEY_INTERNAL_ID.to_string(), Value::String(id.to_string()));
    doc
}

/// Domain fields of a create payload.
///
/// `id` survives only for contexts that do not negotiate addresses.
fn creation_fields(mut provided: Document) -> Document {
    let negotiates = document_requires_negotiation(&provided);
    strip_store_owned(&mut provided);
    provided.shift_remove(KEY_AT_ID);
    if negotiates {
        provided.shift_remove(KEY_ID);
    }
    provided
}

/// Domain fields of a full-replacement payload.
///
/// The address key is consumed; a plain `id` next to `@id` is data unless the
/// context negotiates.
fn replacement_fields(mut provided: Document) -> Document {
    let id_is_address = !provided.contains_key(KEY_AT_ID);
    let negotiates = document_requires_negotiation(&provided);
    strip_store_owned(&mut provided);
    provided.shift_remove(KEY_AT_ID);
    if id_is_address || negotiates {
        provided.shift_remove(KEY_ID);
    }
    provided
}

/// Key/value pairs of a patch-style payload; address keys never count as data.
fn patch_entries(mut provided: Document) -> Document {
    strip_store_owned(&mut provided);
    provided.shift_remove(KEY_AT_ID);
    provided.shift_remove(KEY_ID);
    provided
}

/// Client-owned view of a stored document (keeps `@context` and author `id`).
fn domain_fields(body: &Document) -> Document {
    body.iter()
        .filter(|(key, _)| !is_store_owned_key(key) && key.as_str() != KEY_AT_ID)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn strip_store_owned(doc: &mut Document) {
    doc.retain(|key, _| !is_store_owned_key(key));
}

fn read_meta(record: &DocumentRecord) -> ServiceResult<RerumMeta> {
    RerumMeta::read(&record.body).ok_or_else(|| {
        DocumentServiceError::Repo(RepoError::InvalidData(format!(
            "document `{}` has no readable {KEY_RERUM} block",
            record.id
        )))
    })
}

fn stored_uri(record: &DocumentRecord) -> ServiceResult<String> {
    at_id_of(&record.body).map(str::to_string).ok_or_else(|| {
        DocumentServiceError::Repo(RepoError::InvalidData(format!(
            "document `{}` has no {KEY_AT_ID}",
            record.id
        )))
    })
}

fn ensure_generator(meta: &RerumMeta, agent: &str, id: &str) -> ServiceResult<()> {
    if meta.generated_by != agent {
        return Err(DocumentServiceError::NotGenerator(id.to_string()));
    }
    Ok(())
}

fn active_bodies(records: Vec<DocumentRecord>) -> Vec<Document> {
    records
        .into_iter()
        .filter(|record| !record.is_deleted)
        .map(|record| record.body)
        .collect()
}

fn expect_object(payload: Value) -> ServiceResult<Document> {
    match payload {
        Value::Object(map) => Ok(map),
        other => Err(DocumentServiceError::InvalidPayload(format!(
            "expected a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

fn expect_array(payload: Value) -> ServiceResult<Vec<Value>> {
    match payload {
        Value::Array(items) if items.is_empty() => Err(DocumentServiceError::InvalidPayload(
            "no documents in request array".to_string(),
        )),
        Value::Array(items) => Ok(items),
        other => Err(DocumentServiceError::InvalidPayload(format!(
            "expected a JSON array, got {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn id_for_log(doc: &Document) -> &str {
    doc.get(KEY_INTERNAL_ID)
        .and_then(Value::as_str)
        .unwrap_or("unknown")
}

fn log_write(event: &str, doc: &Document) {
    info!(
        "event={event} module=service status=ok id={}",
        id_for_log(doc)
    );
}

#[cfg(test)]
mod tests {
    use super::{creation_fields, domain_fields, patch_entries, replacement_fields};
    use crate::model::document::Document;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn creation_keeps_author_id_only_without_negotiation() {
        let plain = creation_fields(doc(json!({
            "@id": "x", "id": "mine", "_id": "y", "__rerum": {}, "a": 1
        })));
        assert_eq!(Value::Object(plain), json!({"id": "mine", "a": 1}));

        let negotiated = creation_fields(doc(json!({
            "@context": "http://iiif.io/api/presentation/3/context.json",
            "id": "mine",
            "type": "Manifest"
        })));
        assert!(!negotiated.contains_key("id"));
        assert!(negotiated.contains_key("@context"));
    }

    #[test]
    fn replacement_consumes_plain_id_when_it_is_the_address() {
        let fields = replacement_fields(doc(json!({"id": "http://s/id/1", "a": 1})));
        assert_eq!(Value::Object(fields), json!({"a": 1}));

        let fields = replacement_fields(doc(json!({
            "@id": "http://s/id/1", "id": "mine", "a": 1
        })));
        assert_eq!(Value::Object(fields), json!({"id": "mine", "a": 1}));
    }

    #[test]
    fn patch_entries_drop_addresses_and_store_keys() {
        let entries = patch_entries(doc(json!({
            "@id": "http://s/id/1", "id": "x", "__rerum": {}, "_id": "1", "color": null
        })));
        assert_eq!(Value::Object(entries), json!({"color": null}));
    }

    #[test]
    fn domain_fields_hide_store_keys() {
        let fields = domain_fields(&doc(json!({
            "@context": "c", "@id": "u", "a": 1, "__rerum": {}, "_id": "1"
        })));
        assert_eq!(Value::Object(fields), json!({"@context": "c", "a": 1}));
    }
}
