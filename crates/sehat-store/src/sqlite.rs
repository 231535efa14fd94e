//! SQLite-backed audit store.
//!
//! Records are append-only. Only symptom codes are stored, never query text.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use sehat_core::{AuditRecord, AuditSink, Error, Mode, Outcome, Result, RiskLevel};

use crate::schema::SCHEMA_SQL;
use crate::types::*;

pub struct AuditStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl AuditStore {
    /// Open or create the store. The file will be `db_dir/sehat.db`.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir)?;
        let db_path = db_dir.join("sehat.db");

        let conn = Self::create_connection(&db_path)?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        };
        info!(
            "AuditStore initialized: {} records, path={}",
            store.count()?,
            store.db_path.display()
        );
        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(db_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(db_err)?;
        Ok(conn)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Append one record. Returns its row ID.
    pub fn insert(&self, record: &AuditRecord) -> Result<i64> {
        insert_record(&mut self.conn.lock(), record)
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM audit_records", [], |row| row.get(0))
            .map_err(db_err)
    }

    /// Newest records first.
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, session_id, mode, risk_level, outcome, timed_out, created_at
                 FROM audit_records ORDER BY id DESC LIMIT ?1",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, bool>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;

        let mut symptoms_stmt = conn
            .prepare_cached("SELECT code FROM audit_symptoms WHERE record_id = ?1 ORDER BY position")
            .map_err(db_err)?;
        let mut out = Vec::with_capacity(rows.len());
        for (id, session_id, mode, risk, outcome, timed_out, created_at) in rows {
            let symptoms = symptoms_stmt
                .query_map([id], |row| row.get::<_, String>(0))
                .map_err(db_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err)?;
            out.push(AuditRecord {
                session_id,
                mode: parse_mode(&mode)?,
                risk_level: RiskLevel::parse(&risk)
                    .ok_or_else(|| Error::Database(format!("unknown risk level {risk:?}")))?,
                outcome: parse_outcome(&outcome)?,
                symptoms,
                timed_out,
                timestamp: DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| Error::Database(e.to_string()))?
                    .with_timezone(&Utc),
            });
        }
        Ok(out)
    }

    /// Counts by risk level, mode and outcome, plus the `top_n` most frequent symptoms.
    pub fn stats(&self, top_n: usize) -> Result<DashboardStats> {
        let conn = self.conn.lock();
        let total_records: i64 = conn
            .query_row("SELECT COUNT(*) FROM audit_records", [], |row| row.get(0))
            .map_err(db_err)?;
        let timed_out: i64 = conn
            .query_row("SELECT COUNT(*) FROM audit_records WHERE timed_out = 1", [], |row| row.get(0))
            .map_err(db_err)?;

        let by_risk_level = group_counts(&conn, "risk_level")?;
        let by_mode = group_counts(&conn, "mode")?;
        let by_outcome = group_counts(&conn, "outcome")?;

        let mut stmt = conn
            .prepare_cached(
                "SELECT code, COUNT(*) AS n FROM audit_symptoms
                 GROUP BY code ORDER BY n DESC, code ASC LIMIT ?1",
            )
            .map_err(db_err)?;
        let top_symptoms = stmt
            .query_map([top_n as i64], |row| {
                Ok(SymptomCount {
                    code: row.get(0)?,
                    count: row.get(1)?,
                })
            })
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        drop(stmt);
        drop(conn);

        let db_size = std::fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0);

        Ok(DashboardStats {
            total_records,
            by_risk_level,
            by_mode,
            by_outcome,
            timed_out,
            top_symptoms,
            db_size_mb: db_size as f64 / (1024.0 * 1024.0),
        })
    }
}

/// SQLite writes block, so each record is written on the blocking pool.
#[async_trait]
impl AuditSink for AuditStore {
    async fn record(&self, record: AuditRecord) -> Result<()> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || insert_record(&mut conn.lock(), &record))
            .await
            .map_err(|e| Error::Internal(format!("audit write task failed: {}", e)))?
            .map(|_| ())
    }
}

fn insert_record(conn: &mut Connection, record: &AuditRecord) -> Result<i64> {
    let tx = conn.transaction().map_err(db_err)?;
    tx.execute(
        "INSERT INTO audit_records (session_id, mode, risk_level, outcome, timed_out, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.session_id,
            record.mode.as_str(),
            record.risk_level.as_str(),
            record.outcome.as_str(),
            record.timed_out,
            record.timestamp.to_rfc3339(),
        ],
    )
    .map_err(db_err)?;
    let id = tx.last_insert_rowid();
    {
        let mut stmt = tx
            .prepare_cached("INSERT INTO audit_symptoms (record_id, position, code) VALUES (?1, ?2, ?3)")
            .map_err(db_err)?;
        for (position, code) in record.symptoms.iter().enumerate() {
            stmt.execute(params![id, position as i64, code]).map_err(db_err)?;
        }
    }
    tx.commit().map_err(db_err)?;
    debug!(session = %record.session_id, id, "Audit record stored");
    Ok(id)
}

fn group_counts(conn: &Connection, column: &str) -> Result<BTreeMap<String, i64>> {
    let sql = format!("SELECT {column}, COUNT(*) FROM audit_records GROUP BY {column}");
    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(db_err)?;
    rows.collect::<std::result::Result<BTreeMap<_, _>, _>>()
        .map_err(db_err)
}

fn parse_mode(s: &str) -> Result<Mode> {
    match s {
        "full" => Ok(Mode::Full),
        "degraded" => Ok(Mode::Degraded),
        "mixed" => Ok(Mode::Mixed),
        other => Err(Error::Database(format!("unknown mode {other:?}"))),
    }
}

fn parse_outcome(s: &str) -> Result<Outcome> {
    match s {
        "done" => Ok(Outcome::Done),
        "escalated" => Ok(Outcome::Escalated),
        other => Err(Error::Database(format!("unknown outcome {other:?}"))),
    }
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::Database(e.to_string())
}
