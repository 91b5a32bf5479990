//! Journal database schema and maintenance.

use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

/// WAL size that triggers a truncating checkpoint.
const WAL_CHECKPOINT_BYTES: u64 = 4 * 1024 * 1024;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS runs (
    id          TEXT PRIMARY KEY,
    public_id   TEXT NOT NULL UNIQUE,
    repo        TEXT,
    branch      TEXT,
    commit_base TEXT,
    status      TEXT NOT NULL DEFAULT 'started',
    started_at  INTEGER NOT NULL,
    finished_at INTEGER,
    metrics     TEXT,
    next_op_seq INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS files (
    id          INTEGER PRIMARY KEY,
    run_id      TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    path        TEXT NOT NULL,
    lang        TEXT,
    size_bytes  INTEGER NOT NULL DEFAULT 0,
    hash_before TEXT,
    hash_after  TEXT,
    status      TEXT NOT NULL DEFAULT 'pending'
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_files_run_path ON files(run_id, path);

CREATE TABLE IF NOT EXISTS operations (
    id          TEXT PRIMARY KEY,
    run_id      TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    file_id     INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    seq         INTEGER NOT NULL,
    kind        TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'pending',
    started_at  INTEGER NOT NULL,
    finished_at INTEGER
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_operations_run_seq ON operations(run_id, seq);

CREATE TABLE IF NOT EXISTS patches (
    id            INTEGER PRIMARY KEY,
    op_id         TEXT NOT NULL REFERENCES operations(id) ON DELETE CASCADE,
    file_id       INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    algo          TEXT NOT NULL,
    forward       BLOB NOT NULL,
    reverse       BLOB NOT NULL,
    bytes_added   INTEGER NOT NULL DEFAULT 0,
    bytes_removed INTEGER NOT NULL DEFAULT 0,
    enc_algo      TEXT NOT NULL DEFAULT 'PLAINTEXT',
    key_version   INTEGER NOT NULL DEFAULT 0,
    nonce         BLOB
);
CREATE INDEX IF NOT EXISTS idx_patches_op ON patches(op_id);

CREATE TABLE IF NOT EXISTS checkpoints (
    id         INTEGER PRIMARY KEY,
    run_id     TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    name       TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    meta       TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_checkpoints_run_name ON checkpoints(run_id, name);

CREATE TABLE IF NOT EXISTS diagnostics (
    id       INTEGER PRIMARY KEY,
    op_id    TEXT NOT NULL REFERENCES operations(id) ON DELETE CASCADE,
    severity TEXT NOT NULL,
    code     TEXT NOT NULL,
    message  TEXT NOT NULL,
    location TEXT
);
CREATE INDEX IF NOT EXISTS idx_diagnostics_op ON diagnostics(op_id);

CREATE TABLE IF NOT EXISTS keys (
    version    INTEGER PRIMARY KEY,
    created_at INTEGER NOT NULL,
    algo       TEXT NOT NULL,
    key_hash   BLOB NOT NULL,
    is_active  INTEGER NOT NULL DEFAULT 0,
    salt       TEXT NOT NULL,
    info       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS logs (
    id    INTEGER PRIMARY KEY,
    ts    INTEGER NOT NULL,
    level TEXT NOT NULL,
    text  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_logs_ts ON logs(ts);
";

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Try to set up an FTS5 shadow table for log search. Returns whether the
/// engine supports it; callers fall back to LIKE matching otherwise.
pub fn init_log_fts(conn: &Connection) -> bool {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS logs_fts
             USING fts5(text, content='logs', content_rowid='id')",
    )
    .is_ok()
}

/// Collapse the WAL once it grows past the threshold.
pub fn maintain_wal(conn: &Connection, db_path: &Path) -> Result<()> {
    let wal_path = db_path.with_extension("db-wal");
    let size = std::fs::metadata(&wal_path).map(|m| m.len()).unwrap_or(0);
    if size > WAL_CHECKPOINT_BYTES {
        tracing::debug!(size, "checkpointing WAL");
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
    }
    Ok(())
}
