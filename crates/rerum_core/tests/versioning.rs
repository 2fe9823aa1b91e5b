use rerum_core::db::open_db_in_memory;
use rerum_core::{
    negotiate, public_id, Document, DocumentRepository, DocumentService, DocumentServiceError,
    ErrorKind, QueryPage, RerumConfig, RerumMeta, SqliteDocumentRepository,
};
use serde_json::{json, Value};

const AGENT: &str = "http://store.rerum.io/v1/id/agent-ana";
const OTHER_AGENT: &str = "http://store.rerum.io/v1/id/agent-ben";

fn at_id(doc: &Document) -> String {
    doc.get("@id").and_then(Value::as_str).unwrap().to_string()
}

fn internal_id(doc: &Document) -> String {
    doc.get("_id").and_then(Value::as_str).unwrap().to_string()
}

fn meta(doc: &Document) -> RerumMeta {
    RerumMeta::read(doc).unwrap()
}

#[test]
fn create_assigns_identity_and_root_history() {
    let mut conn = open_db_in_memory().unwrap();
    let config = RerumConfig::default();
    let mut service = DocumentService::new(SqliteDocumentRepository::new(&mut conn), &config);

    let created = service
        .create(AGENT, json!({"test": "item", "_id": "forged", "@id": "forged"}))
        .unwrap();

    let id = internal_id(&created);
    assert_ne!(id, "forged");
    assert_eq!(at_id(&created), format!("{}{id}", config.id_prefix));
    assert_eq!(created.get("test"), Some(&json!("item")));

    let meta = meta(&created);
    assert_eq!(meta.history.prime, "root");
    assert_eq!(meta.generated_by, AGENT);
    assert_eq!(meta.context, config.rerum_context);
    assert!(!meta.is_released);

    let fetched = service.get(&id).unwrap();
    assert_eq!(fetched, created);
}

#[test]
fn create_rejects_non_object_payload() {
    let mut conn = open_db_in_memory().unwrap();
    let config = RerumConfig::default();
    let mut service = DocumentService::new(SqliteDocumentRepository::new(&mut conn), &config);

    let err = service.create(AGENT, json!(["not", "an", "object"])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[test]
fn update_forks_a_new_version_and_links_both_ways() {
    let mut conn = open_db_in_memory().unwrap();
    let config = RerumConfig::default();
    let mut service = DocumentService::new(SqliteDocumentRepository::new(&mut conn), &config);

    let original = service.create(AGENT, json!({"title": "draft", "keep": 1})).unwrap();
    let updated = service
        .update(OTHER_AGENT, json!({"@id": at_id(&original), "title": "final"}))
        .unwrap();

    assert_ne!(at_id(&updated), at_id(&original));
    assert_eq!(updated.get("title"), Some(&json!("final")));
    assert!(!updated.contains_key("keep"), "update replaces all domain fields");

    let child_meta = meta(&updated);
    assert_eq!(child_meta.history.previous, at_id(&original));
    assert_eq!(child_meta.history.prime, at_id(&original));
    assert_eq!(child_meta.generated_by, OTHER_AGENT);

    let parent = service.get(&internal_id(&original)).unwrap();
    assert_eq!(parent.get("title"), Some(&json!("draft")));
    assert_eq!(meta(&parent).history.next, vec![at_id(&updated)]);
}

#[test]
fn update_without_address_or_with_unknown_id_fails() {
    let mut conn = open_db_in_memory().unwrap();
    let config = RerumConfig::default();
    let mut service = DocumentService::new(SqliteDocumentRepository::new(&mut conn), &config);

    let err = service.update(AGENT, json!({"title": "x"})).unwrap_err();
    assert!(matches!(err, DocumentServiceError::MissingAddress));
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let err = service
        .update(AGENT, json!({"@id": "http://localhost:3001/v1/id/nope"}))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn history_lists_every_prior_version_in_chain_order() {
    let mut conn = open_db_in_memory().unwrap();
    let config = RerumConfig::default();
    let mut service = DocumentService::new(SqliteDocumentRepository::new(&mut conn), &config);

    let original = service.create(AGENT, json!({"rev": 0})).unwrap();
    let mut versions = vec![original];
    for rev in 1..=4 {
        let latest = versions.last().unwrap();
        let next = service
            .update(AGENT, json!({"@id": at_id(latest), "rev": rev}))
            .unwrap();
        versions.push(next);
    }

    let head = versions.last().unwrap();
    let history = service.history(&internal_id(head)).unwrap();
    assert_eq!(history.len(), 4);
    let revs: Vec<i64> = history
        .iter()
        .map(|doc| doc.get("rev").and_then(Value::as_i64).unwrap())
        .collect();
    assert_eq!(revs, vec![3, 2, 1, 0]);

    let prime = at_id(&versions[0]);
    for version in &versions[1..] {
        assert_eq!(meta(version).history.prime, prime);
    }

    let since = service.since(&internal_id(&versions[0])).unwrap();
    assert_eq!(since.len(), 4);
    assert!(service.history(&internal_id(&versions[0])).unwrap().is_empty());
}

#[test]
fn set_merges_and_noop_set_keeps_the_same_version() {
    let mut conn = open_db_in_memory().unwrap();
    let config = RerumConfig::default();
    let mut service = DocumentService::new(SqliteDocumentRepository::new(&mut conn), &config);

    let original = service.create(AGENT, json!({"a": 1, "b": 2})).unwrap();
    let merged = service
        .set(AGENT, json!({"@id": at_id(&original), "b": 3, "c": 4}))
        .unwrap();
    assert_ne!(at_id(&merged), at_id(&original));
    assert_eq!(merged.get("a"), Some(&json!(1)));
    assert_eq!(merged.get("b"), Some(&json!(3)));
    assert_eq!(merged.get("c"), Some(&json!(4)));

    let same = service
        .set(AGENT, json!({"@id": at_id(&merged), "c": 4}))
        .unwrap();
    assert_eq!(at_id(&same), at_id(&merged));
}

#[test]
fn unset_removes_keys_and_reports_missing_ones() {
    let mut conn = open_db_in_memory().unwrap();
    let config = RerumConfig::default();
    let mut service = DocumentService::new(SqliteDocumentRepository::new(&mut conn), &config);

    let original = service
        .create(AGENT, json!({"a": 1, "b": 2, "c": 3}))
        .unwrap();
    let trimmed = service
        .unset(AGENT, json!({"@id": at_id(&original), "b": null, "c": null}))
        .unwrap();
    assert!(trimmed.contains_key("a"));
    assert!(!trimmed.contains_key("b"));
    assert!(!trimmed.contains_key("c"));

    let err = service
        .unset(AGENT, json!({"@id": at_id(&trimmed), "a": null, "zzz": null}))
        .unwrap_err();
    match err {
        DocumentServiceError::MissingKeys(keys) => assert_eq!(keys, vec!["zzz".to_string()]),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn patch_only_touches_existing_keys() {
    let mut conn = open_db_in_memory().unwrap();
    let config = RerumConfig::default();
    let mut service = DocumentService::new(SqliteDocumentRepository::new(&mut conn), &config);

    let original = service.create(AGENT, json!({"a": 1, "b": 2})).unwrap();
    let patched = service
        .patch(
            AGENT,
            json!({"@id": at_id(&original), "a": 10, "b": null, "new": true}),
        )
        .unwrap();
    assert_eq!(patched.get("a"), Some(&json!(10)));
    assert!(!patched.contains_key("b"));
    assert!(!patched.contains_key("new"));
}

#[test]
fn overwrite_keeps_identity_and_honors_preconditions() {
    let mut conn = open_db_in_memory().unwrap();
    let config = RerumConfig::default();
    let mut service = DocumentService::new(SqliteDocumentRepository::new(&mut conn), &config);

    let original = service.create(AGENT, json!({"a": 1})).unwrap();

    let err = service
        .overwrite(OTHER_AGENT, json!({"@id": at_id(&original), "a": 2}), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let overwritten = service
        .overwrite(AGENT, json!({"@id": at_id(&original), "a": 2}), Some(""))
        .unwrap();
    assert_eq!(at_id(&overwritten), at_id(&original));
    assert_eq!(overwritten.get("a"), Some(&json!(2)));
    let stamp = meta(&overwritten).is_overwritten;
    assert!(!stamp.is_empty());

    let err = service
        .overwrite(AGENT, json!({"@id": at_id(&original), "a": 3}), Some(""))
        .unwrap_err();
    assert!(matches!(err, DocumentServiceError::VersionMismatch { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test]
fn release_is_monotonic_and_slugs_are_unique() {
    let mut conn = open_db_in_memory().unwrap();
    let config = RerumConfig::default();
    let mut service = DocumentService::new(SqliteDocumentRepository::new(&mut conn), &config);

    let doc = service.create(AGENT, json!({"a": 1})).unwrap();
    let id = internal_id(&doc);

    let err = service.release(AGENT, &id, None).unwrap_err();
    assert!(matches!(err, DocumentServiceError::MissingSlug));
    let err = service.release(AGENT, &id, Some("bad slug!")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    let err = service.release(OTHER_AGENT, &id, Some("rcgslu1")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let released = service.release(AGENT, &id, Some("rcgslu1")).unwrap();
    let released_meta = meta(&released);
    assert!(released_meta.is_released);
    assert_eq!(released_meta.slug.as_deref(), Some("rcgslu1"));
    assert_eq!(service.get("rcgslu1").unwrap(), released);

    let err = service.release(AGENT, &id, Some("rcgslu1")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let err = service.release(AGENT, &id, Some("rcgslu2")).unwrap_err();
    assert!(matches!(err, DocumentServiceError::AlreadyReleased(_)));

    let err = service
        .overwrite(AGENT, json!({"@id": at_id(&released), "a": 2}), None)
        .unwrap_err();
    assert!(matches!(err, DocumentServiceError::Released(_)));

    let fork = service
        .update(AGENT, json!({"@id": at_id(&released), "a": 2}))
        .unwrap();
    assert!(!meta(&fork).is_released);
    assert!(meta(&service.get(&id).unwrap()).is_released);
}

#[test]
fn delete_tombstones_and_guards_released_documents() {
    let mut conn = open_db_in_memory().unwrap();
    let config = RerumConfig::default();
    let mut service = DocumentService::new(SqliteDocumentRepository::new(&mut conn), &config);

    let doc = service.create(AGENT, json!({"a": 1})).unwrap();
    let id = internal_id(&doc);

    let err = service.delete(OTHER_AGENT, &id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    service.delete(AGENT, &id).unwrap();
    assert_eq!(service.get(&id).unwrap_err().kind(), ErrorKind::NotFound);
    let err = service.delete(AGENT, &id).unwrap_err();
    assert!(matches!(err, DocumentServiceError::Deleted(_)));

    let kept = service.create(AGENT, json!({"a": 2})).unwrap();
    let kept_id = internal_id(&kept);
    service.release(AGENT, &kept_id, Some("kept")).unwrap();
    let err = service.delete(AGENT, &kept_id).unwrap_err();
    assert!(matches!(err, DocumentServiceError::Released(_)));
}

#[test]
fn history_skips_deleted_versions_but_keeps_walking() {
    let mut conn = open_db_in_memory().unwrap();
    let config = RerumConfig::default();
    let mut service = DocumentService::new(SqliteDocumentRepository::new(&mut conn), &config);

    let v0 = service.create(AGENT, json!({"rev": 0})).unwrap();
    let v1 = service
        .update(AGENT, json!({"@id": at_id(&v0), "rev": 1}))
        .unwrap();
    let v2 = service
        .update(AGENT, json!({"@id": at_id(&v1), "rev": 2}))
        .unwrap();

    service.delete(AGENT, &internal_id(&v1)).unwrap();
    let history = service.history(&internal_id(&v2)).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].get("rev"), Some(&json!(0)));
}

#[test]
fn query_filters_pages_and_excludes_deleted() {
    let mut conn = open_db_in_memory().unwrap();
    let config = RerumConfig::default();
    let mut service = DocumentService::new(SqliteDocumentRepository::new(&mut conn), &config);

    for n in 0..5 {
        service
            .create(AGENT, json!({"kind": "note", "n": n, "tags": ["field"]}))
            .unwrap();
    }
    let other = service.create(AGENT, json!({"kind": "flag"})).unwrap();
    service.delete(AGENT, &internal_id(&other)).unwrap();

    let notes = service
        .query(json!({"kind": "note", "tags": "field"}), QueryPage::default())
        .unwrap();
    assert_eq!(notes.len(), 5);

    let page = service
        .query(
            json!({"kind": "note"}),
            QueryPage {
                limit: Some(2),
                skip: Some(1),
            },
        )
        .unwrap();
    let ns: Vec<i64> = page
        .iter()
        .map(|doc| doc.get("n").and_then(Value::as_i64).unwrap())
        .collect();
    assert_eq!(ns, vec![1, 2]);

    assert!(service
        .query(json!({"kind": "flag"}), QueryPage::default())
        .unwrap()
        .is_empty());
}

#[test]
fn bulk_create_is_all_or_nothing_on_shape_errors() {
    let mut conn = open_db_in_memory().unwrap();
    let config = RerumConfig::default();
    let mut service = DocumentService::new(SqliteDocumentRepository::new(&mut conn), &config);

    let err = service
        .bulk_create(AGENT, json!([{"a": 1}, "nope"]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert!(service
        .query(json!({}), QueryPage::default())
        .unwrap()
        .is_empty());

    let created = service
        .bulk_create(AGENT, json!([{"a": 1}, {"a": 2}]))
        .unwrap();
    assert_eq!(created.len(), 2);

    let err = service.bulk_create(AGENT, json!([])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[test]
fn bulk_update_forks_each_item() {
    let mut conn = open_db_in_memory().unwrap();
    let config = RerumConfig::default();
    let mut service = DocumentService::new(SqliteDocumentRepository::new(&mut conn), &config);

    let a = service.create(AGENT, json!({"v": "a"})).unwrap();
    let b = service.create(AGENT, json!({"v": "b"})).unwrap();
    let updated = service
        .bulk_update(
            AGENT,
            json!([
                {"@id": at_id(&a), "v": "a2"},
                {"@id": at_id(&b), "v": "b2"}
            ]),
        )
        .unwrap();
    assert_eq!(updated.len(), 2);
    assert_eq!(meta(&updated[0]).history.previous, at_id(&a));
    assert_eq!(meta(&updated[1]).history.previous, at_id(&b));

    let err = service
        .bulk_update(AGENT, json!([{"v": "no address"}]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[test]
fn negotiated_view_of_presentation_document_hides_internal_keys() {
    let mut conn = open_db_in_memory().unwrap();
    let config = RerumConfig::default();
    let mut service = DocumentService::new(SqliteDocumentRepository::new(&mut conn), &config);

    let created = service
        .create(
            AGENT,
            json!({
                "@context": "http://iiif.io/api/presentation/3/context.json",
                "type": "Manifest",
                "id": "ignored"
            }),
        )
        .unwrap();
    let public = at_id(&created);
    let view = negotiate(created);
    assert_eq!(view.get("id"), Some(&json!(public)));
    assert!(!view.contains_key("@id"));
    assert!(!view.contains_key("_id"));
}

#[test]
fn adding_a_negotiating_context_keeps_the_store_address() {
    let mut conn = open_db_in_memory().unwrap();
    let config = RerumConfig::default();
    let mut service = DocumentService::new(SqliteDocumentRepository::new(&mut conn), &config);

    let original = service
        .create(
            AGENT,
            json!({"@context": "http://schema.org", "id": "mine", "a": 1}),
        )
        .unwrap();
    assert_eq!(original.get("id"), Some(&json!("mine")));

    let child = service
        .set(
            AGENT,
            json!({
                "@id": at_id(&original),
                "@context": "http://iiif.io/api/presentation/3/context.json"
            }),
        )
        .unwrap();
    assert!(!child.contains_key("id"));
    assert_eq!(public_id(&child), Some(at_id(&child).as_str()));

    let view = negotiate(child.clone());
    assert_eq!(view.get("id"), Some(&json!(at_id(&child))));
    assert_eq!(public_id(&view), Some(at_id(&child).as_str()));

    let next = service
        .update(AGENT, json!({"id": at_id(&child), "a": 2}))
        .unwrap();
    assert_eq!(meta(&next).history.previous, at_id(&child));
}

fn cyclic_version(id: &str, previous: &str, config: &RerumConfig) -> Document {
    let mut meta = RerumMeta::original(&config.rerum_context, &config.api_version, AGENT);
    meta.history.prime = format!("{}{previous}", config.id_prefix);
    meta.history.previous = format!("{}{previous}", config.id_prefix);
    let mut doc: Document = json!({
        "@id": format!("{}{id}", config.id_prefix),
        "label": id,
        "_id": id
    })
    .as_object()
    .cloned()
    .unwrap();
    meta.write(&mut doc);
    doc
}

#[test]
fn history_reports_pointer_cycles() {
    let mut conn = open_db_in_memory().unwrap();
    let config = RerumConfig::default();
    {
        let mut repo = SqliteDocumentRepository::new(&mut conn);
        repo.insert_document(&cyclic_version("a", "b", &config))
            .unwrap();
        repo.insert_document(&cyclic_version("b", "a", &config))
            .unwrap();
    }
    let mut service = DocumentService::new(SqliteDocumentRepository::new(&mut conn), &config);

    let err = service.history("a").unwrap_err();
    assert!(matches!(err, DocumentServiceError::HistoryCycle(_)));
    assert_eq!(err.kind(), ErrorKind::Upstream);

    let err = service
        .update(AGENT, json!({"@id": format!("{}a", config.id_prefix), "label": "c"}))
        .unwrap_err();
    assert!(matches!(err, DocumentServiceError::HistoryCycle(_)));
}

#[test]
fn query_scans_past_the_first_batch_and_stops_at_the_page() {
    let mut conn = open_db_in_memory().unwrap();
    let config = RerumConfig::default();
    let mut service = DocumentService::new(SqliteDocumentRepository::new(&mut conn), &config);

    let items: Vec<Value> = (0..600).map(|n| json!({"kind": "row", "n": n})).collect();
    service.bulk_create(AGENT, Value::Array(items)).unwrap();

    let tail = service
        .query(
            json!({"kind": "row"}),
            QueryPage {
                limit: Some(5),
                skip: Some(590),
            },
        )
        .unwrap();
    let ns: Vec<i64> = tail
        .iter()
        .map(|doc| doc.get("n").and_then(Value::as_i64).unwrap())
        .collect();
    assert_eq!(ns, vec![590, 591, 592, 593, 594]);

    let first_page = service
        .query(json!({"kind": "row"}), QueryPage::default())
        .unwrap();
    assert_eq!(first_page.len(), config.default_query_limit as usize);
    assert_eq!(first_page[99].get("n"), Some(&json!(99)));

    let odd_tail = service
        .query(
            json!({"n": 599}),
            QueryPage {
                limit: Some(10),
                skip: None,
            },
        )
        .unwrap();
    assert_eq!(odd_tail.len(), 1);
}
