//! HTTP adapter for the RERUM-style document store.
//!
//! # Responsibility
//! - Translate HTTP requests into `rerum_core` service calls.
//! - Translate service results into status codes, headers and JSON bodies.
//!
//! # Invariants
//! - Handlers hold no domain rules; validation and versioning live in core.
//! - Every document leaves through `rerum_core::negotiate`.

mod agent;
mod error;
mod handlers;
mod headers;
mod router;
mod state;

pub use agent::{Agent, AuthenticatedUser};
pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
