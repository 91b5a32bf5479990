//! LIFO rollback driven by reverse patch blobs.
//!
//! The argument resolves either to an operation id (roll back that
//! operation and everything after it in its run) or to a checkpoint name
//! (roll back every operation started after the checkpoint). Patches apply
//! newest-first; the journal transaction commits once after all patches,
//! so a crash at any point leaves a state a fresh rollback call completes
//! from.

use std::path::{Path, PathBuf};

use crate::apply::atomic_write;
use crate::config::CrashPoint;
use crate::error::{Error, Result};
use crate::journal::Journal;

#[derive(Debug, Clone, Default)]
pub struct RollbackOptions {
    /// Report what would revert without touching disk or journal.
    pub dry_run: bool,
    /// Abort the whole rollback on the first rename failure instead of
    /// recording a warning and continuing.
    pub strict: bool,
    /// Test hook: abort at the named point inside the first patch.
    pub crash_point: Option<CrashPoint>,
}

#[derive(Debug, Clone)]
pub struct RollbackReport {
    pub run_id: String,
    pub reverted_operations: usize,
    pub reverted_files: Vec<PathBuf>,
    pub warnings: Vec<String>,
    pub dry_run: bool,
}

/// Roll back to an operation id or checkpoint name.
pub fn rollback(
    journal: &Journal,
    root: &Path,
    target: &str,
    options: &RollbackOptions,
) -> Result<RollbackReport> {
    let (run_id, start_seq) = resolve_target(journal, target)?;
    tracing::info!(run = %run_id, start_seq, dry_run = options.dry_run, "rollback");

    let tx = journal.begin()?;
    let patches = journal.pending_patches_tx(&tx, &run_id, start_seq)?;

    let mut reverted_files = Vec::new();
    let mut warnings = Vec::new();
    let mut touched_ops: Vec<String> = Vec::new();

    for patch in &patches {
        let reverse = journal.decrypt_reverse(patch)?;

        if options.crash_point == Some(CrashPoint::BeforeFile) {
            // Transaction drops uncommitted; no filesystem change yet.
            return Err(Error::CrashPoint(CrashPoint::BeforeFile));
        }

        if !options.dry_run {
            let path = root.join(&patch.path);
            if let Err(err) = atomic_write(&path, &reverse) {
                if options.strict {
                    return Err(err);
                }
                journal.add_diagnostic_tx(
                    &tx,
                    &patch.op_id,
                    "warning",
                    "rollback-write-failed",
                    &err.to_string(),
                    Some(&patch.path),
                )?;
                warnings.push(format!("{}: {err}", patch.path));
                continue;
            }
        }

        if options.crash_point == Some(CrashPoint::AfterFile) {
            // Filesystem reverted, journal not yet updated.
            return Err(Error::CrashPoint(CrashPoint::AfterFile));
        }

        if !options.dry_run {
            journal.mark_file_status_tx(&tx, patch.file_id, "rolled_back")?;
        }
        reverted_files.push(root.join(&patch.path));
        if !touched_ops.contains(&patch.op_id) {
            touched_ops.push(patch.op_id.clone());
        }
    }

    let reverted_operations = touched_ops.len();
    if options.dry_run {
        // Drop the transaction; nothing was written.
        return Ok(RollbackReport {
            run_id,
            reverted_operations,
            reverted_files,
            warnings,
            dry_run: true,
        });
    }

    journal.mark_ops_rolled_back_tx(&tx, &touched_ops)?;
    tx.commit()?;

    Ok(RollbackReport {
        run_id,
        reverted_operations,
        reverted_files,
        warnings,
        dry_run: false,
    })
}

/// An operation id wins over a checkpoint name; the checkpoint's run is
/// always resolved before the sequence cutoff is computed.
fn resolve_target(journal: &Journal, target: &str) -> Result<(String, i64)> {
    if let Some(op) = journal.find_operation(target)? {
        return Ok((op.run_id, op.seq));
    }
    if let Some((run_id, created_at)) = journal.find_checkpoint(target)? {
        let start_seq = journal.seq_after(&run_id, created_at)?;
        return Ok((run_id, start_seq));
    }
    Err(Error::QueryResolution(format!(
        "'{target}' is neither an operation id nor a checkpoint name"
    )))
}
