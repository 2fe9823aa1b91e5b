//! Core domain logic for the RERUM-style document store.
//! This crate is the single source of truth for identity and versioning
//! invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod negotiate;
pub mod repo;
pub mod service;

pub use config::{ConfigError, RerumConfig};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use model::document::Document;
pub use model::rerum::{History, RerumMeta};
pub use negotiate::{negotiate, public_id};
pub use repo::document_repo::{
    DocumentListQuery, DocumentRecord, DocumentRepository, RepoError, RepoResult,
    SqliteDocumentRepository,
};
pub use service::document_service::{DocumentService, QueryPage};
pub use service::error::{DocumentServiceError, ErrorKind, ServiceResult};
