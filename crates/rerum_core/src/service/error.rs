//! Service error taxonomy.

use crate::repo::document_repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, DocumentServiceError>;

/// Coarse failure class used by adapters to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Forbidden,
    NotFound,
    Conflict,
    /// Store failed or returned data it should never hold.
    Upstream,
}

/// Service error for document use-cases.
#[derive(Debug)]
pub enum DocumentServiceError {
    /// Body is not the expected JSON shape.
    InvalidPayload(String),
    /// Body carries neither `@id` nor `id`.
    MissingAddress,
    MissingSlug,
    InvalidSlug(String),
    InvalidQuery(String),
    NotFound(String),
    /// Unset named keys the document does not have.
    MissingKeys(Vec<String>),
    Deleted(String),
    /// Caller is not the agent that generated the document.
    NotGenerator(String),
    /// Released documents cannot be overwritten or deleted.
    Released(String),
    AlreadyReleased(String),
    SlugInUse(String),
    /// `If-Overwritten-Version` precondition failed.
    VersionMismatch { id: String, current: String },
    /// Lost a compare-and-set race against another writer.
    ConcurrentWrite(String),
    HistoryCycle(String),
    Repo(RepoError),
}

impl DocumentServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPayload(_)
            | Self::MissingAddress
            | Self::MissingSlug
            | Self::InvalidSlug(_)
            | Self::InvalidQuery(_) => ErrorKind::BadRequest,
            Self::NotFound(_) | Self::MissingKeys(_) => ErrorKind::NotFound,
            Self::Deleted(_) | Self::NotGenerator(_) | Self::Released(_) => ErrorKind::Forbidden,
            Self::AlreadyReleased(_)
            | Self::SlugInUse(_)
            | Self::VersionMismatch { .. }
            | Self::ConcurrentWrite(_) => ErrorKind::Conflict,
            Self::HistoryCycle(_) | Self::Repo(_) => ErrorKind::Upstream,
        }
    }
}

impl Display for DocumentServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPayload(message) => write!(f, "invalid request body: {message}"),
            Self::MissingAddress => write!(
                f,
                "object in request body must have an 'id' or '@id' property"
            ),
            Self::MissingSlug => write!(f, "a Slug header is required to release a document"),
            Self::InvalidSlug(slug) => write!(
                f,
                "invalid slug `{slug}`: use 1-100 letters, digits, '-' or '_'"
            ),
            Self::InvalidQuery(message) => write!(f, "invalid query: {message}"),
            Self::NotFound(id) => write!(f, "no document with id `{id}`"),
            Self::MissingKeys(keys) => {
                write!(f, "document has no key(s) to unset: {}", keys.join(", "))
            }
            Self::Deleted(id) => write!(f, "document `{id}` is deleted"),
            Self::NotGenerator(id) => write!(
                f,
                "only the agent that generated `{id}` may change it in place"
            ),
            Self::Released(id) => write!(
                f,
                "document `{id}` is released; fork it with update instead"
            ),
            Self::AlreadyReleased(id) => write!(f, "document `{id}` is already released"),
            Self::SlugInUse(slug) => write!(f, "slug `{slug}` is already in use"),
            Self::VersionMismatch { id, current } => write!(
                f,
                "document `{id}` was overwritten at `{current}`; refusing stale overwrite"
            ),
            Self::ConcurrentWrite(id) => write!(f, "document `{id}` changed concurrently"),
            Self::HistoryCycle(uri) => write!(f, "version history cycle detected at `{uri}`"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DocumentServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for DocumentServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::RevisionMismatch { id, .. } => Self::ConcurrentWrite(id),
            RepoError::SlugConflict(slug) => Self::SlugInUse(slug),
            other => Self::Repo(other),
        }
    }
}
