//! Sehat Store: SQLite persistence of audit records and dashboard aggregates.

pub mod schema;
pub mod sqlite;
pub mod types;

pub use sqlite::AuditStore;
pub use types::*;
