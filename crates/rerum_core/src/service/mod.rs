//! Versioning controller and its helpers.
//!
//! # Responsibility
//! - Decide how each request mutates stored state (fork, overwrite, tombstone).
//! - Keep HTTP adapters decoupled from storage details.

pub mod document_service;
pub mod error;
pub mod history;
pub mod query;
