//! Dashboard aggregate types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How often a symptom code appeared across audit records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomCount {
    pub code: String,
    pub count: i64,
}

/// Read-only aggregates over persisted audit records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_records: i64,
    pub by_risk_level: BTreeMap<String, i64>,
    pub by_mode: BTreeMap<String, i64>,
    pub by_outcome: BTreeMap<String, i64>,
    pub timed_out: i64,
    /// Most frequent first; ties by code.
    pub top_symptoms: Vec<SymptomCount>,
    pub db_size_mb: f64,
}
