//!  Storage is organized through [project_store::ProjectStore].
//!  The basic idea is:
//!   - All projects live in a single json document inside the application directory.
//!   - The document is rewritten in full on every mutation. There is no append log.
//!   - Failing to read or write the document never stops tracking; the in-memory records stay
//!     authoritative until the next successful save.

pub mod entities;
pub mod project_store;

use thiserror::Error;

pub const PROJECTS_FILE: &str = "projects.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("project document io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("project document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}
