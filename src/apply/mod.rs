//! Crash-safe filesystem mutation.
//!
//! All writes go through write-temp-then-rename: the modified content is
//! written to a temporary file in the target's directory, synced, and
//! atomically renamed over the target. Combined with the journal's
//! commit-after-rename ordering, either both the file and the journal
//! reflect a change or neither does.

pub mod rollback;

use std::io::Write;
use std::path::Path;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

pub use rollback::{RollbackOptions, RollbackReport, rollback};

/// Write `bytes` to `path` via a synced temp file and atomic rename.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| Error::Rewrite {
        path: path.to_path_buf(),
        reason: format!("temp file create failed: {e}"),
    })?;
    tmp.write_all(bytes).map_err(|e| Error::Rewrite {
        path: path.to_path_buf(),
        reason: format!("temp file write failed: {e}"),
    })?;
    tmp.as_file().sync_all().map_err(|e| Error::Rewrite {
        path: path.to_path_buf(),
        reason: format!("temp file sync failed: {e}"),
    })?;
    tmp.persist(path).map_err(|e| Error::Rewrite {
        path: path.to_path_buf(),
        reason: format!("rename failed: {e}"),
    })?;
    Ok(())
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
