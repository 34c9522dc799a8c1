//! JSON document store subsystem.
//!
//! # Data Flow
//! ```text
//! db.json
//!     → document.rs (load, hold behind RwLock, persist after each write)
//!     → query.rs (filter, search, sort, slice collection reads)
//!     → watcher.rs (optional reload on external edits)
//! ```
//!
//! # Design Decisions
//! - Every top-level key is a resource: arrays are collections, objects are singular
//! - Writers hold the write lock through persistence so file writes stay ordered
//! - Record ids compare by their string form, so `/items/1` finds `{"id": 1}`

pub mod document;
pub mod query;
pub mod watcher;

pub use document::{Resource, SharedStore, Store};
pub use query::{ListPage, ListQuery};

/// Errors raised by store reads and writes.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("resource '{0}' not found")]
    ResourceNotFound(String),

    #[error("record '{id}' not found in '{resource}'")]
    RecordNotFound { resource: String, id: String },

    #[error("'{0}' is not a collection")]
    NotACollection(String),

    #[error("'{0}' is not a singular resource")]
    NotSingular(String),

    #[error("request body must be a JSON object")]
    NotAnObject,

    #[error("insert failed, duplicate id '{0}'")]
    DuplicateId(String),

    #[error("invalid query parameter {name}={value}")]
    InvalidQuery { name: String, value: String },

    #[error("document root must be a JSON object")]
    InvalidDocument,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
