//! Sehat Core: the pipeline data model and shared error type.

pub mod audit;
pub mod config;
pub mod error;
pub mod types;

pub use audit::{AuditRecord, AuditSink};
pub use config::{DataPaths, PipelineSettings, SehatConfig};
pub use error::{Error, Result};
pub use types::*;
