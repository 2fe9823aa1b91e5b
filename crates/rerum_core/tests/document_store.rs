use rerum_core::db::open_db_in_memory;
use rerum_core::{
    Document, DocumentListQuery, DocumentRepository, RepoError, RerumMeta,
    SqliteDocumentRepository,
};
use serde_json::{json, Value};

fn stored(id: &str, extra: Value) -> Document {
    let mut doc = extra.as_object().cloned().unwrap();
    doc.insert("@id".to_string(), json!(format!("http://s/id/{id}")));
    RerumMeta::original("ctx", "1.0.0", "agent:a").write(&mut doc);
    doc.insert("_id".to_string(), json!(id));
    doc
}

#[test]
fn insert_and_get_roundtrip() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteDocumentRepository::new(&mut conn);

    let doc = stored("a1", json!({"note": "field visit"}));
    repo.insert_document(&doc).unwrap();

    let record = repo.get_document("a1", false).unwrap().unwrap();
    assert_eq!(record.id, "a1");
    assert_eq!(record.revision, 1);
    assert!(!record.is_deleted);
    assert_eq!(record.body, doc);
}

#[test]
fn insert_without_internal_id_is_rejected() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteDocumentRepository::new(&mut conn);

    let mut doc = stored("a1", json!({}));
    doc.shift_remove("_id");
    let err = repo.insert_document(&doc).unwrap_err();
    assert!(matches!(err, RepoError::MissingInternalId));
}

#[test]
fn replace_requires_matching_revision() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteDocumentRepository::new(&mut conn);

    let mut doc = stored("a1", json!({"n": 1}));
    repo.insert_document(&doc).unwrap();

    doc.insert("n".to_string(), json!(2));
    repo.replace_document(&doc, 1, false).unwrap();
    let record = repo.get_document("a1", false).unwrap().unwrap();
    assert_eq!(record.revision, 2);
    assert_eq!(record.body.get("n"), Some(&json!(2)));

    doc.insert("n".to_string(), json!(3));
    let err = repo.replace_document(&doc, 1, false).unwrap_err();
    assert!(matches!(err, RepoError::RevisionMismatch { expected: 1, .. }));
}

#[test]
fn replace_unknown_document_is_not_found() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteDocumentRepository::new(&mut conn);

    let doc = stored("ghost", json!({}));
    let err = repo.replace_document(&doc, 1, false).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(id) if id == "ghost"));
}

#[test]
fn tombstoned_documents_are_hidden_unless_requested() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteDocumentRepository::new(&mut conn);

    let doc = stored("a1", json!({}));
    repo.insert_document(&doc).unwrap();
    repo.replace_document(&doc, 1, true).unwrap();

    assert!(repo.get_document("a1", false).unwrap().is_none());
    assert!(repo.get_document("a1", true).unwrap().unwrap().is_deleted);
    assert!(repo
        .list_documents(&DocumentListQuery::default())
        .unwrap()
        .is_empty());
}

#[test]
fn slug_lookup_and_uniqueness() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteDocumentRepository::new(&mut conn);

    let mut first = stored("a1", json!({}));
    let mut second = stored("a2", json!({}));
    repo.insert_document(&first).unwrap();
    repo.insert_document(&second).unwrap();

    let mut meta = RerumMeta::read(&first).unwrap();
    meta.is_released = true;
    meta.slug = Some("procession-2024".to_string());
    meta.write(&mut first);
    repo.replace_document(&first, 1, false).unwrap();

    let by_slug = repo.get_document("procession-2024", false).unwrap().unwrap();
    assert_eq!(by_slug.id, "a1");
    assert_eq!(by_slug.slug.as_deref(), Some("procession-2024"));

    let mut meta = RerumMeta::read(&second).unwrap();
    meta.slug = Some("procession-2024".to_string());
    meta.write(&mut second);
    let err = repo.replace_document(&second, 1, false).unwrap_err();
    assert!(matches!(err, RepoError::SlugConflict(slug) if slug == "procession-2024"));
}

#[test]
fn fork_is_atomic_when_parent_revision_is_stale() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteDocumentRepository::new(&mut conn);

    let parent = stored("p1", json!({}));
    repo.insert_document(&parent).unwrap();
    repo.replace_document(&parent, 1, false).unwrap();

    let child = stored("c1", json!({}));
    let err = repo.fork_document(&parent, 1, &child).unwrap_err();
    assert!(matches!(err, RepoError::RevisionMismatch { .. }));
    assert!(repo.get_document("c1", true).unwrap().is_none());

    repo.fork_document(&parent, 2, &child).unwrap();
    assert!(repo.get_document("c1", false).unwrap().is_some());
    assert_eq!(repo.get_document("p1", false).unwrap().unwrap().revision, 3);
}

#[test]
fn bulk_insert_rolls_back_on_duplicate() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteDocumentRepository::new(&mut conn);

    let docs = vec![stored("b1", json!({})), stored("b1", json!({}))];
    assert!(repo.insert_documents(&docs).is_err());
    assert!(repo.get_document("b1", true).unwrap().is_none());
}

#[test]
fn list_returns_insertion_order_with_paging() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteDocumentRepository::new(&mut conn);

    for id in ["x1", "x2", "x3"] {
        repo.insert_document(&stored(id, json!({}))).unwrap();
    }

    let all = repo.list_documents(&DocumentListQuery::default()).unwrap();
    let ids: Vec<&str> = all.iter().map(|record| record.id.as_str()).collect();
    assert_eq!(ids, vec!["x1", "x2", "x3"]);

    let page = repo
        .list_documents(&DocumentListQuery {
            limit: Some(1),
            offset: 1,
        })
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, "x2");
}

#[test]
fn corrupt_body_is_reported_as_invalid_data() {
    let mut conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO documents (id, body) VALUES ('bad', '[1,2,3]');",
        [],
    )
    .unwrap();
    let repo = SqliteDocumentRepository::new(&mut conn);
    let err = repo.get_document("bad", false).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
}
