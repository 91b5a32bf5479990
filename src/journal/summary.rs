//! Run summary aggregation.

use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::journal::Journal;

#[derive(Debug, Clone, Serialize)]
pub struct OpBreakdown {
    pub kind: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileDiagnostics {
    pub path: String,
    pub issues: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub public_id: String,
    pub status: String,
    pub op_count: i64,
    pub bytes_added: i64,
    pub bytes_removed: i64,
    pub file_bytes: i64,
    /// Percentage of operations with no error or warning diagnostics.
    pub safe_change_percent: f64,
    pub guardrail_pass_rate: f64,
    pub duration_ms: Option<i64>,
    pub ops_by_kind: Vec<OpBreakdown>,
    /// Top ten files by error+warning diagnostic count.
    pub top_diagnostic_files: Vec<FileDiagnostics>,
}

impl Journal {
    pub fn run_summary(&self, run_key: &str) -> Result<RunSummary> {
        let run = self
            .find_run(run_key)?
            .ok_or_else(|| Error::StoreIntegrity(format!("run {run_key} not found")))?;

        let conn = self.conn.lock();

        let op_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM operations WHERE run_id = ?1",
            params![run.id],
            |row| row.get(0),
        )?;

        let (bytes_added, bytes_removed): (i64, i64) = conn.query_row(
            "SELECT COALESCE(SUM(p.bytes_added), 0), COALESCE(SUM(p.bytes_removed), 0)
             FROM patches p JOIN operations o ON o.id = p.op_id
             WHERE o.run_id = ?1",
            params![run.id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let file_bytes: i64 = conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM files WHERE run_id = ?1",
            params![run.id],
            |row| row.get(0),
        )?;

        let flagged: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT d.op_id)
             FROM diagnostics d JOIN operations o ON o.id = d.op_id
             WHERE o.run_id = ?1 AND d.severity IN ('error', 'warning')",
            params![run.id],
            |row| row.get(0),
        )?;
        let safe_change_percent = if op_count == 0 {
            100.0
        } else {
            (op_count - flagged) as f64 / op_count as f64 * 100.0
        };
        let guardrail_pass_rate = 100.0 - safe_change_percent;

        let finished_at: Option<i64> = conn
            .query_row(
                "SELECT finished_at FROM runs WHERE id = ?1",
                params![run.id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        let duration_ms = finished_at.map(|end| end - run.started_at);

        let ops_by_kind = {
            let mut stmt = conn.prepare(
                "SELECT kind, COUNT(*) FROM operations WHERE run_id = ?1
                 GROUP BY kind ORDER BY COUNT(*) DESC, kind",
            )?;
            stmt.query_map(params![run.id], |row| {
                Ok(OpBreakdown {
                    kind: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let top_diagnostic_files = {
            let mut stmt = conn.prepare(
                "SELECT f.path, COUNT(*) AS issues
                 FROM diagnostics d
                 JOIN operations o ON o.id = d.op_id
                 JOIN files f ON f.id = o.file_id
                 WHERE o.run_id = ?1 AND d.severity IN ('error', 'warning')
                 GROUP BY f.path ORDER BY issues DESC, f.path LIMIT 10",
            )?;
            stmt.query_map(params![run.id], |row| {
                Ok(FileDiagnostics {
                    path: row.get(0)?,
                    issues: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        Ok(RunSummary {
            run_id: run.id,
            public_id: run.public_id,
            status: run.status,
            op_count,
            bytes_added,
            bytes_removed,
            file_bytes,
            safe_change_percent,
            guardrail_pass_rate,
            duration_ms,
            ops_by_kind,
            top_diagnostic_files,
        })
    }
}
