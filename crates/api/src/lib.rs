//! sitecraft-api
//!
//! Thin typed client for the external project/template persistence API
//! the editor is served by. Plain request/response; no retries, no
//! caching, no offline queue.

pub mod projects;

pub use projects::{ApiError, ProjectDocument, ProjectStore, TemplateSummary};
