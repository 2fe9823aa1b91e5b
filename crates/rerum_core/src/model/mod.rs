//! Document model shared by the store, the versioning controller and the
//! HTTP adapters.
//!
//! # Responsibility
//! - Define the stored document shape and its reserved keys.
//! - Define the `__rerum` metadata block that threads the version chain.
//!
//! # Invariants
//! - Every stored document is identified by an internal `_id` and a public
//!   `@id` URI derived from it.
//! - Deletion is represented by tombstones, not hard delete.

pub mod document;
pub mod rerum;
