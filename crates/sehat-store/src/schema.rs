//! Audit database schema.

/// One row per finished pipeline run, plus its recognised symptom codes.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS audit_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    mode TEXT NOT NULL,
    risk_level TEXT NOT NULL,
    outcome TEXT NOT NULL,
    timed_out INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_symptoms (
    record_id INTEGER NOT NULL REFERENCES audit_records(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    code TEXT NOT NULL,
    PRIMARY KEY (record_id, position)
);

CREATE INDEX IF NOT EXISTS idx_audit_session ON audit_records(session_id);
CREATE INDEX IF NOT EXISTS idx_audit_risk ON audit_records(risk_level);
CREATE INDEX IF NOT EXISTS idx_audit_symptoms_code ON audit_symptoms(code);
"#;
