//! Document repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide storage primitives over the `documents` table.
//! - Keep SQL details inside the core persistence boundary.
//! - Expose per-document compare-and-set so read-modify-write callers never
//!   lose a concurrent update silently.
//!
//! # Invariants
//! - Every write bumps `revision`; conditional writes match on it.
//! - A fork (parent update + child insert) commits atomically or not at all.
//! - Read paths reject persisted bodies that are not JSON objects.

use crate::db::DbError;
use crate::model::document::{internal_id_of, Document};
use crate::model::rerum::RerumMeta;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

const DOCUMENT_SELECT_SQL: &str = "SELECT
    id,
    slug,
    is_deleted,
    revision,
    body
FROM documents";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for document persistence and lookup.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// No row for the given internal id.
    NotFound(String),
    /// Conditional write lost against a concurrent writer.
    RevisionMismatch { id: String, expected: i64 },
    /// Slug already taken by another row.
    SlugConflict(String),
    /// Caller passed a document without `_id`.
    MissingInternalId,
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "document not found: {id}"),
            Self::RevisionMismatch { id, expected } => write!(
                f,
                "document {id} changed concurrently (expected revision {expected})"
            ),
            Self::SlugConflict(slug) => write!(f, "slug already in use: {slug}"),
            Self::MissingInternalId => write!(f, "document has no internal id"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted document data: {message}")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One stored row: body plus storage bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    /// Internal id (`_id`).
    pub id: String,
    pub slug: Option<String>,
    pub is_deleted: bool,
    /// Bumped on every write; used for compare-and-set.
    pub revision: i64,
    /// Full stored body, including `_id` and `__rerum`.
    pub body: Document,
}

/// Paging options for listing active documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentListQuery {
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for document storage.
pub trait DocumentRepository {
    /// Inserts one new document; `_id` must be set.
    fn insert_document(&mut self, doc: &Document) -> RepoResult<()>;
    /// Inserts several new documents in one transaction.
    fn insert_documents(&mut self, docs: &[Document]) -> RepoResult<()>;
    /// Looks a document up by internal id, falling back to slug.
    fn get_document(&self, key: &str, include_deleted: bool)
        -> RepoResult<Option<DocumentRecord>>;
    /// Replaces a body if the row still has `expected_revision`.
    fn replace_document(
        &mut self,
        doc: &Document,
        expected_revision: i64,
        is_deleted: bool,
    ) -> RepoResult<()>;
    /// Atomically rewrites the parent (compare-and-set) and inserts the child.
    fn fork_document(
        &mut self,
        parent: &Document,
        parent_revision: i64,
        child: &Document,
    ) -> RepoResult<()>;
    /// Lists non-deleted documents in insertion order.
    fn list_documents(&self, query: &DocumentListQuery) -> RepoResult<Vec<DocumentRecord>>;
}

/// SQLite-backed document repository.
pub struct SqliteDocumentRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteDocumentRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self { conn }
    }
}

impl DocumentRepository for SqliteDocumentRepository<'_> {
    fn insert_document(&mut self, doc: &Document) -> RepoResult<()> {
        insert_row(self.conn, doc)
    }

    fn insert_documents(&mut self, docs: &[Document]) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        for doc in docs {
            insert_row(&tx, doc)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get_document(
        &self,
        key: &str,
        include_deleted: bool,
    ) -> RepoResult<Option<DocumentRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{DOCUMENT_SELECT_SQL}
             WHERE (id = ?1 OR slug = ?1)
               AND (?2 = 1 OR is_deleted = 0)
             ORDER BY CASE WHEN id = ?1 THEN 0 ELSE 1 END
             LIMIT 1;"
        ))?;
        let raw = stmt
            .query_row(params![key, bool_to_int(include_deleted)], RawRow::read)
            .optional()?;
        raw.map(RawRow::parse).transpose()
    }

    fn replace_document(
        &mut self,
        doc: &Document,
        expected_revision: i64,
        is_deleted: bool,
    ) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        update_row(&tx, doc, expected_revision, is_deleted)?;
        tx.commit()?;
        Ok(())
    }

    fn fork_document(
        &mut self,
        parent: &Document,
        parent_revision: i64,
        child: &Document,
    ) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        update_row(&tx, parent, parent_revision, false)?;
        insert_row(&tx, child)?;
        tx.commit()?;
        Ok(())
    }

    fn list_documents(&self, query: &DocumentListQuery) -> RepoResult<Vec<DocumentRecord>> {
        let limit = query.limit.map_or(-1, i64::from);
        let mut stmt = self.conn.prepare(&format!(
            "{DOCUMENT_SELECT_SQL}
             WHERE is_deleted = 0
             ORDER BY created_at ASC, rowid ASC
             LIMIT ?1 OFFSET ?2;"
        ))?;
        let mut rows = stmt.query(params![limit, i64::from(query.offset)])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(RawRow::read(row)?.parse()?);
        }
        Ok(records)
    }
}

struct RawRow {
    id: String,
    slug: Option<String>,
    is_deleted: i64,
    revision: i64,
    body: String,
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            slug: row.get("slug")?,
            is_deleted: row.get("is_deleted")?,
            revision: row.get("revision")?,
            body: row.get("body")?,
        })
    }

    fn parse(self) -> RepoResult<DocumentRecord> {
        let is_deleted = match self.is_deleted {
            0 => false,
            1 => true,
            other => {
                return Err(RepoError::InvalidData(format!(
                    "invalid is_deleted value `{other}` in documents.is_deleted"
                )));
            }
        };
        let body = match serde_json::from_str::<Value>(&self.body) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(RepoError::InvalidData(format!(
                    "documents.body of `{}` is not a JSON object",
                    self.id
                )));
            }
            Err(err) => {
                return Err(RepoError::InvalidData(format!(
                    "documents.body of `{}` is not valid JSON: {err}",
                    self.id
                )));
            }
        };
        Ok(DocumentRecord {
            id: self.id,
            slug: self.slug,
            is_deleted,
            revision: self.revision,
            body,
        })
    }
}

fn insert_row(conn: &Connection, doc: &Document) -> RepoResult<()> {
    let id = internal_id_of(doc).ok_or(RepoError::MissingInternalId)?;
    let slug = slug_of(doc);
    let body = encode_body(doc)?;
    conn.execute(
        "INSERT INTO documents (id, slug, is_deleted, revision, body)
         VALUES (?1, ?2, 0, 1, ?3);",
        params![id, slug.as_deref(), body],
    )
    .map_err(|err| map_write_error(err, slug.as_deref()))?;
    Ok(())
}

fn update_row(
    conn: &Connection,
    doc: &Document,
    expected_revision: i64,
    is_deleted: bool,
) -> RepoResult<()> {
    let id = internal_id_of(doc).ok_or(RepoError::MissingInternalId)?;
    let slug = slug_of(doc);
    let body = encode_body(doc)?;
    let changed = conn
        .execute(
            "UPDATE documents
             SET
                slug = ?2,
                is_deleted = ?3,
                body = ?4,
                revision = revision + 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND revision = ?5;",
            params![
                id,
                slug.as_deref(),
                bool_to_int(is_deleted),
                body,
                expected_revision
            ],
        )
        .map_err(|err| map_write_error(err, slug.as_deref()))?;

    if changed == 0 {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM documents WHERE id = ?1);",
            [id],
            |row| row.get(0),
        )?;
        if exists == 1 {
            return Err(RepoError::RevisionMismatch {
                id: id.to_string(),
                expected: expected_revision,
            });
        }
        return Err(RepoError::NotFound(id.to_string()));
    }
    Ok(())
}

fn slug_of(doc: &Document) -> Option<String> {
    RerumMeta::read(doc).and_then(|meta| meta.slug)
}

fn encode_body(doc: &Document) -> RepoResult<String> {
    serde_json::to_string(doc)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode document body: {err}")))
}

fn map_write_error(err: rusqlite::Error, slug: Option<&str>) -> RepoError {
    if let (rusqlite::Error::SqliteFailure(failure, Some(message)), Some(slug)) = (&err, slug) {
        if failure.code == ErrorCode::ConstraintViolation && message.contains("documents.slug") {
            return RepoError::SlugConflict(slug.to_string());
        }
    }
    RepoError::from(err)
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
