//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define storage contracts used by the versioning controller.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `RevisionMismatch`,
//!   `SlugConflict`) in addition to DB transport errors.

pub mod document_repo;
