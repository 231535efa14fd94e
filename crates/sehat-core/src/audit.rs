//! Outbound persistence interface for finished pipeline runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Mode, Outcome, PipelineResult, RiskLevel};

/// Immutable summary of one `analyze` invocation. Holds symptom codes, never query text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub session_id: String,
    pub mode: Mode,
    pub risk_level: RiskLevel,
    pub outcome: Outcome,
    pub symptoms: Vec<String>,
    pub timed_out: bool,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn from_result(result: &PipelineResult) -> Self {
        Self {
            session_id: result.session_id.clone(),
            mode: result.mode,
            risk_level: result.risk.risk_level,
            outcome: result.outcome,
            symptoms: result.symptoms.codes().into_iter().map(String::from).collect(),
            timed_out: result.timed_out,
            timestamp: Utc::now(),
        }
    }
}

/// Where audit records go. Failures are logged by the caller and never fail a pipeline.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<()>;
}
