//! Version-chain traversal.
//!
//! # Invariants
//! - Walks never revisit a node; a revisit is reported as a cycle.
//! - Tombstoned versions are traversed so the chain stays connected.

use super::error::{DocumentServiceError, ServiceResult};
use crate::model::document::{parse_internal_id, Document};
use crate::model::rerum::{at_id_of, RerumMeta};
use crate::repo::document_repo::{DocumentRecord, DocumentRepository};
use log::warn;
use std::collections::{HashSet, VecDeque};

/// Returns the versions before `start`, nearest first, ending at the prime.
pub fn ancestors<R: DocumentRepository + ?Sized>(
    repo: &R,
    start: &Document,
) -> ServiceResult<Vec<DocumentRecord>> {
    let mut visited = HashSet::new();
    if let Some(uri) = at_id_of(start) {
        visited.insert(uri.to_string());
    }

    let mut chain = Vec::new();
    let mut previous = previous_of(start);
    while let Some(uri) = previous {
        if !visited.insert(uri.clone()) {
            return Err(DocumentServiceError::HistoryCycle(uri));
        }
        let Some(record) = load(repo, &uri)? else {
            warn!("event=history_walk module=service status=broken missing={uri}");
            break;
        };
        previous = previous_of(&record.body);
        chain.push(record);
    }
    Ok(chain)
}

/// Returns every version forked, directly or transitively, from `start`,
/// breadth-first.
pub fn descendants<R: DocumentRepository + ?Sized>(
    repo: &R,
    start: &Document,
) -> ServiceResult<Vec<DocumentRecord>> {
    let mut visited = HashSet::new();
    if let Some(uri) = at_id_of(start) {
        visited.insert(uri.to_string());
    }

    let mut found = Vec::new();
    let mut queue: VecDeque<String> = next_of(start).into();
    while let Some(uri) = queue.pop_front() {
        if !visited.insert(uri.clone()) {
            return Err(DocumentServiceError::HistoryCycle(uri));
        }
        let Some(record) = load(repo, &uri)? else {
            warn!("event=history_walk module=service status=broken missing={uri}");
            continue;
        };
        queue.extend(next_of(&record.body));
        found.push(record);
    }
    Ok(found)
}

/// Returns whether `candidate` already appears in the ancestry of `parent`
/// (including `parent` itself).
pub fn is_ancestor<R: DocumentRepository + ?Sized>(
    repo: &R,
    parent: &Document,
    candidate: &str,
) -> ServiceResult<bool> {
    if at_id_of(parent) == Some(candidate) {
        return Ok(true);
    }
    let chain = ancestors(repo, parent)?;
    Ok(chain
        .iter()
        .any(|record| at_id_of(&record.body) == Some(candidate)))
}

fn load<R: DocumentRepository + ?Sized>(
    repo: &R,
    uri: &str,
) -> ServiceResult<Option<DocumentRecord>> {
    let Some(id) = parse_internal_id(uri) else {
        return Ok(None);
    };
    Ok(repo.get_document(&id, true)?)
}

fn previous_of(doc: &Document) -> Option<String> {
    RerumMeta::read(doc)
        .map(|meta| meta.history.previous)
        .filter(|previous| !previous.is_empty())
}

fn next_of(doc: &Document) -> Vec<String> {
    RerumMeta::read(doc)
        .map(|meta| meta.history.next)
        .unwrap_or_default()
}
