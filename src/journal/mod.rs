//! The operation journal.
//!
//! A SQLite database under `.morfx/run.db` records runs, tracked files,
//! operations, byte-level patches, checkpoints, diagnostics, and encryption
//! keys. Files on disk are the authoritative source; the journal is the
//! undo tape.
//!
//! Every write path runs inside a transaction. Statements are wrapped in a
//! retry loop that treats "database is locked" as transient with a capped
//! attempt count and fixed back-off; anything else surfaces immediately.

pub mod schema;
pub mod summary;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard, RwLock};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::config::{EngineConfig, EncryptionMode, MasterKey, DB_FILE_NAME, WORKSPACE_DIR};
use crate::crypto::keyring::{HKDF_SALT, key_info};
use crate::crypto::{
    AeadAlgo, Keyring, decode_blob, derive_key, encode_versioned, generate_nonce, key_hash, open,
    patch_aad, seal,
};
use crate::error::{Error, Result, is_locked};

pub use summary::RunSummary;

const LOCK_RETRIES: u32 = 5;
const LOCK_BACKOFF: Duration = Duration::from_millis(500);

/// Blob format tag for full-content forward/reverse snapshots.
pub const PATCH_ALGO_BINARY: &str = "binary";

pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Retry a statement while SQLite reports the database as locked.
fn with_retry<T>(what: &str, mut f: impl FnMut() -> rusqlite::Result<T>) -> Result<T> {
    for attempt in 1..=LOCK_RETRIES {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) if is_locked(&err) => {
                if attempt == LOCK_RETRIES {
                    return Err(Error::StoreContention {
                        attempts: LOCK_RETRIES,
                    });
                }
                tracing::warn!(what, attempt, "database locked, retrying");
                std::thread::sleep(LOCK_BACKOFF);
            }
            Err(err) => return Err(classify(err)),
        }
    }
    unreachable!("retry loop always returns")
}

/// Constraint violations become integrity errors; everything else keeps the
/// SQLite error.
fn classify(err: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(code, ref message) = err {
        if code.code == rusqlite::ErrorCode::ConstraintViolation {
            return Error::StoreIntegrity(
                message.clone().unwrap_or_else(|| "constraint violation".to_string()),
            );
        }
    }
    Error::Store(err)
}

#[derive(Debug, Clone, Default)]
pub struct RunMeta {
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub commit_base: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunRow {
    pub id: String,
    pub public_id: String,
    pub status: String,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub next_op_seq: i64,
}

#[derive(Debug, Clone)]
pub struct OperationRow {
    pub id: String,
    pub run_id: String,
    pub file_id: i64,
    pub seq: i64,
    pub kind: String,
    pub status: String,
    pub started_at: i64,
}

/// Patch joined with its operation and file, as needed by rollback.
#[derive(Debug, Clone)]
pub struct PatchRow {
    pub id: i64,
    pub op_id: String,
    pub file_id: i64,
    pub algo: String,
    pub forward: Vec<u8>,
    pub reverse: Vec<u8>,
    pub enc_algo: String,
    pub key_version: u32,
    pub nonce: Option<Vec<u8>>,
    pub op_seq: i64,
    pub path: String,
}

/// A patch to record: plaintext blobs plus byte accounting.
#[derive(Debug, Clone)]
pub struct NewPatch {
    pub op_id: String,
    pub file_id: i64,
    pub algo: String,
    pub forward: Vec<u8>,
    pub reverse: Vec<u8>,
    pub bytes_added: u64,
    pub bytes_removed: u64,
}

#[derive(Debug, Clone)]
pub struct KeyRow {
    pub version: u32,
    pub created_at: i64,
    pub algo: String,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub ts: i64,
    pub level: String,
    pub text: String,
}

/// An open transaction holding the connection lock. Rolls back on drop
/// unless committed, which makes an abandoned transaction (crash point,
/// error path) identical to a process crash.
pub struct JournalTx<'a> {
    conn: MutexGuard<'a, Connection>,
    done: bool,
}

impl JournalTx<'_> {
    pub fn commit(mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.done = true;
        Ok(())
    }
}

impl std::ops::Deref for JournalTx<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for JournalTx<'_> {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}

pub struct Journal {
    conn: Mutex<Connection>,
    keyring: Keyring,
    /// Active cipher: `None` stores plaintext blobs.
    cipher: RwLock<Option<(AeadAlgo, u32)>>,
    master: Option<MasterKey>,
    db_path: PathBuf,
    retain_runs: u32,
    retain_keys: u32,
    fts_enabled: bool,
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("db_path", &self.db_path)
            .field("retain_runs", &self.retain_runs)
            .field("retain_keys", &self.retain_keys)
            .field("fts_enabled", &self.fts_enabled)
            .finish_non_exhaustive()
    }
}

static PUBLIC_ID_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Monotonic lexicographic run identifier.
fn next_public_id(started_at: i64) -> String {
    let counter = PUBLIC_ID_COUNTER.fetch_add(1, Ordering::Relaxed) % 10_000;
    format!("r{started_at:013}-{counter:04}")
}

impl Journal {
    /// Open (creating if needed) the journal under `root/.morfx/`, applying
    /// the schema and initialising the keyring.
    pub fn open(root: &Path, config: &EngineConfig) -> Result<Self> {
        let dir = root.join(WORKSPACE_DIR);
        std::fs::create_dir_all(&dir)?;
        restrict_permissions(&dir, 0o700)?;

        let db_path = dir.join(DB_FILE_NAME);
        let conn = Connection::open(&db_path)?;
        restrict_permissions(&db_path, 0o600)?;

        conn.query_row("PRAGMA journal_mode = WAL", [], |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        schema::migrate(&conn)?;
        let fts_enabled = schema::init_log_fts(&conn);

        if config.encryption_mode == EncryptionMode::On && config.master_key.is_none() {
            return Err(Error::Crypto(
                "encryption is on but no master key is configured".to_string(),
            ));
        }

        let cipher = if config.encryption_enabled() {
            Some((AeadAlgo::from(config.encryption_algo), config.key_version))
        } else {
            None
        };

        let journal = Self {
            conn: Mutex::new(conn),
            keyring: Keyring::new(),
            cipher: RwLock::new(cipher),
            master: config.master_key.clone(),
            db_path,
            retain_runs: config.retain_runs,
            retain_keys: config.retain_keys,
            fts_enabled,
        };

        if journal.encryption_active() {
            journal.init_keyring(config.key_version)?;
        }

        Ok(journal)
    }

    pub fn encryption_active(&self) -> bool {
        self.cipher.read().is_some()
    }

    pub(crate) fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    /// Derive the active key, persist its row if absent, then load and
    /// verify every persisted key row against re-derivation.
    fn init_keyring(&self, active_version: u32) -> Result<()> {
        let master = self
            .master
            .as_ref()
            .ok_or_else(|| Error::Crypto("no master key configured".to_string()))?;
        let algo = self.cipher.read().map(|(a, _)| a).expect("cipher active");

        let conn = self.conn.lock();
        let existing: Option<u32> = with_retry("select key", || {
            conn.query_row(
                "SELECT version FROM keys WHERE version = ?1",
                params![active_version],
                |row| row.get(0),
            )
            .optional()
        })?;

        if existing.is_none() {
            let key = derive_key(master.bytes(), active_version)?;
            let hash = key_hash(&key);
            with_retry("insert key", || {
                conn.execute("UPDATE keys SET is_active = 0", [])?;
                conn.execute(
                    "INSERT INTO keys (version, created_at, algo, key_hash, is_active, salt, info)
                     VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
                    params![
                        active_version,
                        now_millis(),
                        algo.as_str(),
                        hash.as_slice(),
                        HKDF_SALT,
                        key_info(active_version),
                    ],
                )
            })?;
        }

        let rows: Vec<(u32, Vec<u8>)> = {
            let mut stmt = conn.prepare("SELECT version, key_hash FROM keys")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        drop(conn);

        for (version, stored_hash) in rows {
            let key = derive_key(master.bytes(), version)?;
            if key_hash(&key).as_slice() != stored_hash.as_slice() {
                return Err(Error::TamperDetection(version));
            }
            self.keyring.insert(version, key);
        }

        Ok(())
    }

    /// Start a transaction, taking the write lock up front.
    pub(crate) fn begin(&self) -> Result<JournalTx<'_>> {
        let conn = self.conn.lock();
        with_retry("begin", || conn.execute_batch("BEGIN IMMEDIATE"))?;
        Ok(JournalTx { conn, done: false })
    }

    // ------------------------------------------------------------------
    // Runs
    // ------------------------------------------------------------------

    /// Enforce retention, then insert a new run with status `started`.
    pub fn begin_run(&self, meta: RunMeta) -> Result<RunRow> {
        if self.retain_runs > 0 {
            self.enforce_retention()?;
        }

        let id = Uuid::new_v4().to_string();
        let started_at = now_millis();
        let public_id = next_public_id(started_at);

        let conn = self.conn.lock();
        with_retry("insert run", || {
            conn.execute(
                "INSERT INTO runs (id, public_id, repo, branch, commit_base, status, started_at, next_op_seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'started', ?6, 0)",
                params![id, public_id, meta.repo, meta.branch, meta.commit_base, started_at],
            )
        })?;

        tracing::info!(run = %public_id, "run started");
        Ok(RunRow {
            id,
            public_id,
            status: "started".to_string(),
            started_at,
            finished_at: None,
            next_op_seq: 0,
        })
    }

    pub fn complete_run(&self, run_id: &str, metrics: Option<serde_json::Value>) -> Result<()> {
        let conn = self.conn.lock();
        with_retry("complete run", || {
            conn.execute(
                "UPDATE runs SET status = 'completed', finished_at = ?1, metrics = ?2 WHERE id = ?3",
                params![
                    now_millis(),
                    metrics.as_ref().map(|m| m.to_string()),
                    run_id
                ],
            )
        })?;
        Ok(())
    }

    /// Archive runs beyond the retention count, newest first.
    pub fn enforce_retention(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let archived = with_retry("enforce retention", || {
            conn.execute(
                "UPDATE runs SET status = 'archived' WHERE id IN (
                     SELECT id FROM runs WHERE status != 'archived'
                     ORDER BY started_at DESC, public_id DESC
                     LIMIT -1 OFFSET ?1
                 )",
                params![self.retain_runs],
            )
        })?;
        if archived > 0 {
            tracing::info!(archived, "retention archived runs");
        }
        Ok(archived)
    }

    pub fn latest_run(&self) -> Result<Option<RunRow>> {
        let conn = self.conn.lock();
        let row = with_retry("latest run", || {
            conn.query_row(
                "SELECT id, public_id, status, started_at, finished_at, next_op_seq
                 FROM runs WHERE status != 'archived'
                 ORDER BY started_at DESC, public_id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()
        })?;
        Ok(row)
    }

    pub fn list_runs(&self, limit: u32) -> Result<Vec<RunRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, public_id, status, started_at, finished_at, next_op_seq
             FROM runs ORDER BY started_at DESC, public_id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], run_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Resolve a run by stable id or public id.
    pub fn find_run(&self, key: &str) -> Result<Option<RunRow>> {
        let conn = self.conn.lock();
        let row = with_retry("find run", || {
            conn.query_row(
                "SELECT id, public_id, status, started_at, finished_at, next_op_seq
                 FROM runs WHERE id = ?1 OR public_id = ?1",
                params![key],
                run_from_row,
            )
            .optional()
        })?;
        Ok(row)
    }

    // ------------------------------------------------------------------
    // Files and operations
    // ------------------------------------------------------------------

    /// Insert or refresh the tracked-file row for (run, path).
    pub(crate) fn ensure_file_tx(
        &self,
        conn: &Connection,
        run_id: &str,
        path: &str,
        lang: &str,
        size_bytes: u64,
        hash_before: &str,
    ) -> Result<i64> {
        conn.execute(
            "INSERT INTO files (run_id, path, lang, size_bytes, hash_before, status)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending')
             ON CONFLICT(run_id, path) DO UPDATE SET size_bytes = ?4",
            params![run_id, path, lang, size_bytes as i64, hash_before],
        )
        .map_err(classify)?;
        let id = conn
            .query_row(
                "SELECT id FROM files WHERE run_id = ?1 AND path = ?2",
                params![run_id, path],
                |row| row.get(0),
            )
            .map_err(classify)?;
        Ok(id)
    }

    /// Read the run's `next_op_seq`, increment it, and insert the
    /// operation with the new sequence number and status `pending`.
    pub(crate) fn append_op_tx(
        &self,
        conn: &Connection,
        run_id: &str,
        file_id: i64,
        kind: &str,
    ) -> Result<OperationRow> {
        let next: i64 = conn
            .query_row(
                "SELECT next_op_seq FROM runs WHERE id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(classify)?
            .ok_or_else(|| Error::StoreIntegrity(format!("run {run_id} not found")))?;
        let seq = next + 1;
        conn.execute(
            "UPDATE runs SET next_op_seq = ?1 WHERE id = ?2",
            params![seq, run_id],
        )
        .map_err(classify)?;

        let id = Uuid::new_v4().to_string();
        let started_at = now_millis();
        conn.execute(
            "INSERT INTO operations (id, run_id, file_id, seq, kind, status, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
            params![id, run_id, file_id, seq, kind, started_at],
        )
        .map_err(classify)?;

        Ok(OperationRow {
            id,
            run_id: run_id.to_string(),
            file_id,
            seq,
            kind: kind.to_string(),
            status: "pending".to_string(),
            started_at,
        })
    }

    pub(crate) fn finish_op_tx(
        &self,
        conn: &Connection,
        op_id: &str,
        status: &str,
    ) -> Result<()> {
        conn.execute(
            "UPDATE operations SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status, now_millis(), op_id],
        )
        .map_err(classify)?;
        Ok(())
    }

    pub(crate) fn set_file_result_tx(
        &self,
        conn: &Connection,
        file_id: i64,
        hash_after: &str,
        status: &str,
    ) -> Result<()> {
        conn.execute(
            "UPDATE files SET hash_after = ?1, status = ?2 WHERE id = ?3",
            params![hash_after, status, file_id],
        )
        .map_err(classify)?;
        Ok(())
    }

    pub(crate) fn mark_file_status_tx(
        &self,
        conn: &Connection,
        file_id: i64,
        status: &str,
    ) -> Result<()> {
        conn.execute(
            "UPDATE files SET status = ?1 WHERE id = ?2",
            params![status, file_id],
        )
        .map_err(classify)?;
        Ok(())
    }

    pub fn find_operation(&self, op_id: &str) -> Result<Option<OperationRow>> {
        let conn = self.conn.lock();
        let row = with_retry("find op", || {
            conn.query_row(
                "SELECT id, run_id, file_id, seq, kind, status, started_at
                 FROM operations WHERE id = ?1",
                params![op_id],
                |row| {
                    Ok(OperationRow {
                        id: row.get(0)?,
                        run_id: row.get(1)?,
                        file_id: row.get(2)?,
                        seq: row.get(3)?,
                        kind: row.get(4)?,
                        status: row.get(5)?,
                        started_at: row.get(6)?,
                    })
                },
            )
            .optional()
        })?;
        Ok(row)
    }

    // ------------------------------------------------------------------
    // Patches
    // ------------------------------------------------------------------

    /// Record a patch, encrypting the blobs when encryption is active.
    /// Each blob gets a fresh nonce (carried in the versioned blob); the
    /// `nonce` column records the forward blob's.
    pub(crate) fn record_patch_tx(&self, conn: &Connection, patch: &NewPatch) -> Result<()> {
        let cipher = *self.cipher.read();
        match cipher {
            None => {
                conn.execute(
                    "INSERT INTO patches (op_id, file_id, algo, forward, reverse,
                                          bytes_added, bytes_removed, enc_algo, key_version, nonce)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'PLAINTEXT', 0, NULL)",
                    params![
                        patch.op_id,
                        patch.file_id,
                        patch.algo,
                        patch.forward,
                        patch.reverse,
                        patch.bytes_added as i64,
                        patch.bytes_removed as i64,
                    ],
                )
                .map_err(classify)?;
            }
            Some((algo, version)) => {
                let key = self.keyring.get(version).ok_or_else(|| {
                    Error::Crypto(format!("missing key version {version}"))
                })?;
                let aad = patch_aad(&patch.op_id, patch.file_id, &patch.algo);

                let forward_nonce = generate_nonce(algo);
                let forward_ct =
                    seal(algo, &key, &forward_nonce, aad.as_bytes(), &patch.forward)?;
                let forward = encode_versioned(version, &forward_nonce, &forward_ct);

                let reverse_nonce = generate_nonce(algo);
                let reverse_ct =
                    seal(algo, &key, &reverse_nonce, aad.as_bytes(), &patch.reverse)?;
                let reverse = encode_versioned(version, &reverse_nonce, &reverse_ct);

                conn.execute(
                    "INSERT INTO patches (op_id, file_id, algo, forward, reverse,
                                          bytes_added, bytes_removed, enc_algo, key_version, nonce)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        patch.op_id,
                        patch.file_id,
                        patch.algo,
                        forward,
                        reverse,
                        patch.bytes_added as i64,
                        patch.bytes_removed as i64,
                        algo.as_str(),
                        version,
                        forward_nonce,
                    ],
                )
                .map_err(classify)?;
            }
        }
        Ok(())
    }

    /// Patches of a run with `op.seq >= start_seq`, excluding operations
    /// already rolled back, ordered LIFO.
    pub(crate) fn pending_patches_tx(
        &self,
        conn: &Connection,
        run_id: &str,
        start_seq: i64,
    ) -> Result<Vec<PatchRow>> {
        let mut stmt = conn
            .prepare(
                "SELECT p.id, p.op_id, p.file_id, p.algo, p.forward, p.reverse,
                        p.enc_algo, p.key_version, p.nonce, o.seq, f.path
                 FROM patches p
                 JOIN operations o ON o.id = p.op_id
                 JOIN files f ON f.id = p.file_id
                 WHERE o.run_id = ?1 AND o.seq >= ?2 AND o.status != 'rolled_back'
                 ORDER BY o.seq DESC",
            )
            .map_err(classify)?;
        let rows = stmt
            .query_map(params![run_id, start_seq], |row| {
                Ok(PatchRow {
                    id: row.get(0)?,
                    op_id: row.get(1)?,
                    file_id: row.get(2)?,
                    algo: row.get(3)?,
                    forward: row.get(4)?,
                    reverse: row.get(5)?,
                    enc_algo: row.get(6)?,
                    key_version: row.get(7)?,
                    nonce: row.get(8)?,
                    op_seq: row.get(9)?,
                    path: row.get(10)?,
                })
            })
            .map_err(classify)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(classify)?;
        Ok(rows)
    }

    pub(crate) fn mark_ops_rolled_back_tx(
        &self,
        conn: &Connection,
        op_ids: &[String],
    ) -> Result<()> {
        if op_ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; op_ids.len()].join(",");
        let sql = format!(
            "UPDATE operations SET status = 'rolled_back', finished_at = {} WHERE id IN ({placeholders})",
            now_millis()
        );
        conn.execute(&sql, rusqlite::params_from_iter(op_ids.iter()))
            .map_err(classify)?;
        Ok(())
    }

    /// Decrypt a patch's reverse blob using the row's own columns for the
    /// AAD and key selection.
    pub fn decrypt_reverse(&self, patch: &PatchRow) -> Result<Vec<u8>> {
        self.decrypt_patch(patch, &patch.reverse)
    }

    pub fn decrypt_forward(&self, patch: &PatchRow) -> Result<Vec<u8>> {
        self.decrypt_patch(patch, &patch.forward)
    }

    fn decrypt_patch(&self, patch: &PatchRow, blob: &[u8]) -> Result<Vec<u8>> {
        if patch.enc_algo == "PLAINTEXT" {
            return Ok(blob.to_vec());
        }
        let algo = AeadAlgo::parse(&patch.enc_algo)?;
        let decoded = decode_blob(blob, algo, |v| self.keyring.contains(v))?;
        let version = decoded.key_version.unwrap_or(patch.key_version);
        let key = self
            .keyring
            .get(version)
            .ok_or_else(|| Error::Crypto(format!("missing key version {version}")))?;
        let nonce = match decoded.key_version {
            Some(_) => decoded.nonce,
            None => patch.nonce.as_deref().unwrap_or(decoded.nonce),
        };
        let aad = patch_aad(&patch.op_id, patch.file_id, &patch.algo);
        open(algo, &key, nonce, aad.as_bytes(), decoded.ciphertext)
    }

    // ------------------------------------------------------------------
    // Checkpoints and diagnostics
    // ------------------------------------------------------------------

    pub fn checkpoint(&self, run_id: &str, name: &str, meta: Option<&str>) -> Result<()> {
        let conn = self.conn.lock();
        with_retry("insert checkpoint", || {
            conn.execute(
                "INSERT INTO checkpoints (run_id, name, created_at, meta) VALUES (?1, ?2, ?3, ?4)",
                params![run_id, name, now_millis(), meta],
            )
        })?;
        Ok(())
    }

    /// Newest non-archived run owning a checkpoint with this name, plus the
    /// checkpoint's creation time.
    pub fn find_checkpoint(&self, name: &str) -> Result<Option<(String, i64)>> {
        let conn = self.conn.lock();
        let row = with_retry("find checkpoint", || {
            conn.query_row(
                "SELECT c.run_id, c.created_at
                 FROM checkpoints c JOIN runs r ON r.id = c.run_id
                 WHERE c.name = ?1 AND r.status != 'archived'
                 ORDER BY r.started_at DESC LIMIT 1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
        })?;
        Ok(row)
    }

    /// One past the largest operation seq started at or before `cutoff`,
    /// or 0 when no operation qualifies.
    pub fn seq_after(&self, run_id: &str, cutoff: i64) -> Result<i64> {
        let conn = self.conn.lock();
        let max: Option<i64> = with_retry("max seq", || {
            conn.query_row(
                "SELECT MAX(seq) FROM operations WHERE run_id = ?1 AND started_at <= ?2",
                params![run_id, cutoff],
                |row| row.get(0),
            )
        })?;
        Ok(max.map(|m| m + 1).unwrap_or(0))
    }

    pub(crate) fn add_diagnostic_tx(
        &self,
        conn: &Connection,
        op_id: &str,
        severity: &str,
        code: &str,
        message: &str,
        location: Option<&str>,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO diagnostics (op_id, severity, code, message, location)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![op_id, severity, code, message, location],
        )
        .map_err(classify)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------

    /// Rotate to the next key version: derive it, mark every other row
    /// inactive, and prune versions past the key retention count.
    pub fn rotate_key(&self) -> Result<u32> {
        let master = self
            .master
            .as_ref()
            .ok_or_else(|| Error::Crypto("no master key configured".to_string()))?;
        let (algo, _) = self
            .cipher
            .read()
            .ok_or_else(|| Error::Crypto("encryption is not active".to_string()))?;

        let tx = self.begin()?;
        let max: Option<u32> = tx
            .query_row("SELECT MAX(version) FROM keys", [], |row| row.get(0))
            .map_err(classify)?;
        let next = max.unwrap_or(0) + 1;

        let key = derive_key(master.bytes(), next)?;
        let hash = key_hash(&key);
        tx.execute("UPDATE keys SET is_active = 0", [])
            .map_err(classify)?;
        tx.execute(
            "INSERT INTO keys (version, created_at, algo, key_hash, is_active, salt, info)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
            params![
                next,
                now_millis(),
                algo.as_str(),
                hash.as_slice(),
                HKDF_SALT,
                key_info(next),
            ],
        )
        .map_err(classify)?;

        let mut pruned: Vec<u32> = Vec::new();
        if self.retain_keys > 0 {
            let mut stmt = tx
                .prepare("SELECT version FROM keys ORDER BY version DESC LIMIT -1 OFFSET ?1")
                .map_err(classify)?;
            pruned = stmt
                .query_map(params![self.retain_keys], |row| row.get(0))
                .map_err(classify)?
                .collect::<rusqlite::Result<Vec<u32>>>()
                .map_err(classify)?;
            drop(stmt);
            for version in &pruned {
                tx.execute("DELETE FROM keys WHERE version = ?1", params![version])
                    .map_err(classify)?;
            }
        }
        tx.commit()?;

        self.keyring.insert(next, key);
        for version in pruned {
            self.keyring.remove(version);
        }
        *self.cipher.write() = Some((algo, next));
        tracing::info!(version = next, "key rotated");
        Ok(next)
    }

    pub fn list_keys(&self) -> Result<Vec<KeyRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT version, created_at, algo, is_active FROM keys ORDER BY version",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(KeyRow {
                    version: row.get(0)?,
                    created_at: row.get(1)?,
                    algo: row.get(2)?,
                    is_active: row.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Logs
    // ------------------------------------------------------------------

    pub fn append_log(&self, level: &str, text: &str) -> Result<()> {
        let conn = self.conn.lock();
        with_retry("append log", || {
            conn.execute(
                "INSERT INTO logs (ts, level, text) VALUES (?1, ?2, ?3)",
                params![now_millis(), level, text],
            )
        })?;
        if self.fts_enabled {
            let id = conn.last_insert_rowid();
            with_retry("append log fts", || {
                conn.execute(
                    "INSERT INTO logs_fts (rowid, text) VALUES (?1, ?2)",
                    params![id, text],
                )
            })?;
        }
        Ok(())
    }

    /// Search the log table. FTS is attempted first when available and
    /// requested; any FTS failure falls back to substring matching.
    pub fn search_logs(&self, query: &str, use_fts: bool) -> Result<Vec<LogEntry>> {
        let conn = self.conn.lock();
        if use_fts && self.fts_enabled {
            let attempt = (|| -> rusqlite::Result<Vec<LogEntry>> {
                let mut stmt = conn.prepare(
                    "SELECT l.ts, l.level, l.text
                     FROM logs_fts f JOIN logs l ON l.id = f.rowid
                     WHERE logs_fts MATCH ?1 ORDER BY l.ts DESC",
                )?;
                let rows = stmt
                    .query_map(params![query], log_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })();
            if let Ok(rows) = attempt {
                return Ok(rows);
            }
        }

        let mut stmt = conn.prepare(
            "SELECT ts, level, text FROM logs WHERE text LIKE ?1 ORDER BY ts DESC",
        )?;
        let rows = stmt
            .query_map(params![format!("%{query}%")], log_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    pub fn maintain(&self) -> Result<()> {
        let conn = self.conn.lock();
        schema::maintain_wal(&conn, &self.db_path)
    }
}

fn run_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRow> {
    Ok(RunRow {
        id: row.get(0)?,
        public_id: row.get(1)?,
        status: row.get(2)?,
        started_at: row.get(3)?,
        finished_at: row.get(4)?,
        next_op_seq: row.get(5)?,
    })
}

fn log_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LogEntry> {
    Ok(LogEntry {
        ts: row.get(0)?,
        level: row.get(1)?,
        text: row.get(2)?,
    })
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(mode);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::config::MasterKey;
    use crate::journal::*;

    fn plain_config() -> EngineConfig {
        EngineConfig::default()
    }

    fn encrypted_config() -> EngineConfig {
        EngineConfig {
            master_key: Some(MasterKey::from_hex(&"11".repeat(32)).unwrap()),
            ..EngineConfig::default()
        }
    }

    fn record_one_patch(journal: &Journal, forward: &[u8], reverse: &[u8]) -> (String, PatchRow) {
        let run = journal.begin_run(RunMeta::default()).unwrap();
        let tx = journal.begin().unwrap();
        let file_id = journal
            .ensure_file_tx(&tx, &run.id, "main.go", "go", 10, "hash")
            .unwrap();
        let op = journal
            .append_op_tx(&tx, &run.id, file_id, "replace")
            .unwrap();
        journal
            .record_patch_tx(
                &tx,
                &NewPatch {
                    op_id: op.id.clone(),
                    file_id,
                    algo: PATCH_ALGO_BINARY.to_string(),
                    forward: forward.to_vec(),
                    reverse: reverse.to_vec(),
                    bytes_added: forward.len() as u64,
                    bytes_removed: reverse.len() as u64,
                },
            )
            .unwrap();
        tx.commit().unwrap();

        let tx = journal.begin().unwrap();
        let patches = journal.pending_patches_tx(&tx, &run.id, 0).unwrap();
        tx.commit().unwrap();
        assert_eq!(patches.len(), 1);
        (run.id, patches[0].clone())
    }

    #[test]
    fn test_sequence_numbers_increase_from_one() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::open(dir.path(), &plain_config()).unwrap();
        let run = journal.begin_run(RunMeta::default()).unwrap();

        let tx = journal.begin().unwrap();
        let file_id = journal
            .ensure_file_tx(&tx, &run.id, "a.go", "go", 1, "h")
            .unwrap();
        let op1 = journal.append_op_tx(&tx, &run.id, file_id, "replace").unwrap();
        let op2 = journal.append_op_tx(&tx, &run.id, file_id, "delete").unwrap();
        tx.commit().unwrap();

        assert_eq!(op1.seq, 1);
        assert_eq!(op2.seq, 2);
        let refreshed = journal.find_run(&run.id).unwrap().unwrap();
        assert_eq!(refreshed.next_op_seq, 2);
    }

    #[test]
    fn test_duplicate_checkpoint_name_is_integrity_error() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::open(dir.path(), &plain_config()).unwrap();
        let run = journal.begin_run(RunMeta::default()).unwrap();
        journal.checkpoint(&run.id, "before-refactor", None).unwrap();
        let err = journal
            .checkpoint(&run.id, "before-refactor", None)
            .unwrap_err();
        assert!(matches!(err, Error::StoreIntegrity(_)));
    }

    #[test]
    fn test_plaintext_patch_roundtrip() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::open(dir.path(), &plain_config()).unwrap();
        let (_, patch) = record_one_patch(&journal, b"modified", b"original");
        assert_eq!(patch.enc_algo, "PLAINTEXT");
        assert_eq!(patch.key_version, 0);
        assert_eq!(journal.decrypt_forward(&patch).unwrap(), b"modified");
        assert_eq!(journal.decrypt_reverse(&patch).unwrap(), b"original");
    }

    #[test]
    fn test_encrypted_patch_roundtrip() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::open(dir.path(), &encrypted_config()).unwrap();
        assert!(journal.encryption_active());
        let (_, patch) = record_one_patch(&journal, b"modified", b"original");
        assert_eq!(patch.enc_algo, "XCHACHA20-POLY1305");
        assert_eq!(patch.key_version, 1);
        assert_ne!(patch.forward, b"modified");
        assert_eq!(journal.decrypt_forward(&patch).unwrap(), b"modified");
        assert_eq!(journal.decrypt_reverse(&patch).unwrap(), b"original");
    }

    #[test]
    fn test_missing_key_version_is_crypto_failure() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::open(dir.path(), &encrypted_config()).unwrap();
        let (_, mut patch) = record_one_patch(&journal, b"modified", b"original");
        // Forge a row that claims an unknown key version.
        patch.key_version = 9;
        patch.reverse[3] = 9; // versioned prefix big-endian low byte
        let err = journal.decrypt_reverse(&patch).unwrap_err();
        assert!(matches!(err, Error::Crypto(_)), "got {err:?}");
    }

    #[test]
    fn test_retention_leaves_n_runs() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig {
            retain_runs: 2,
            ..EngineConfig::default()
        };
        let journal = Journal::open(dir.path(), &config).unwrap();
        for _ in 0..5 {
            journal.begin_run(RunMeta::default()).unwrap();
        }
        journal.enforce_retention().unwrap();
        let runs = journal.list_runs(100).unwrap();
        let live = runs.iter().filter(|r| r.status != "archived").count();
        assert_eq!(live, 2);
    }

    #[test]
    fn test_key_rotation_with_retention() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig {
            retain_keys: 3,
            ..encrypted_config()
        };
        let journal = Journal::open(dir.path(), &config).unwrap();
        for _ in 0..4 {
            journal.rotate_key().unwrap();
        }
        // 1 initial + 4 rotations, capped at 3 by retention.
        let keys = journal.list_keys().unwrap();
        assert_eq!(keys.len(), 3);
        let versions: Vec<u32> = keys.iter().map(|k| k.version).collect();
        assert_eq!(versions, vec![3, 4, 5]);
        let active: Vec<u32> = keys.iter().filter(|k| k.is_active).map(|k| k.version).collect();
        assert_eq!(active, vec![5]);
        assert_eq!(journal.keyring().versions(), vec![3, 4, 5]);
    }

    #[test]
    fn test_tamper_detection_on_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let journal = Journal::open(dir.path(), &encrypted_config()).unwrap();
            let conn = journal.conn.lock();
            conn.execute("UPDATE keys SET key_hash = x'00112233445566778899aabbccddeeff'", [])
                .unwrap();
        }
        let err = Journal::open(dir.path(), &encrypted_config()).unwrap_err();
        assert!(matches!(err, Error::TamperDetection(1)), "got {err:?}");
    }

    #[test]
    fn test_log_search_like_fallback() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::open(dir.path(), &plain_config()).unwrap();
        journal.append_log("info", "applied replace to main.go").unwrap();
        journal.append_log("warn", "rename failed for util.go").unwrap();

        let hits = journal.search_logs("rename", false).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].level, "warn");

        let hits = journal.search_logs("rename", true).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_seq_after_checkpoint_cutoff() {
        let dir = TempDir::new().unwrap();
        let journal = Journal::open(dir.path(), &plain_config()).unwrap();
        let run = journal.begin_run(RunMeta::default()).unwrap();
        assert_eq!(journal.seq_after(&run.id, now_millis()).unwrap(), 0);

        let tx = journal.begin().unwrap();
        let file_id = journal
            .ensure_file_tx(&tx, &run.id, "a.go", "go", 1, "h")
            .unwrap();
        let op = journal.append_op_tx(&tx, &run.id, file_id, "replace").unwrap();
        tx.commit().unwrap();

        assert_eq!(journal.seq_after(&run.id, op.started_at).unwrap(), op.seq + 1);
    }
}
