//! Error taxonomy for the morfx library.
//!
//! The CLI layer wraps these in `anyhow` for display; library callers match
//! on the variants to distinguish recoverable conditions (a query with no
//! matches) from fatal ones (tamper detection during keyring init).

use std::path::PathBuf;

use crate::config::CrashPoint;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The grammar rejected the source, or a rewrite produced bytes the
    /// grammar could no longer parse.
    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// Unknown kind, malformed compound expression, or no matching nodes
    /// when the verb requires at least one.
    #[error("{0}")]
    QueryResolution(String),

    /// Temp-file write or rename failed while applying a rewrite.
    #[error("rewrite failed for {path}: {reason}")]
    Rewrite { path: PathBuf, reason: String },

    /// Missing key version, AAD mismatch, or AEAD tag failure.
    #[error("crypto failure: {0}")]
    Crypto(String),

    /// The database stayed locked through every retry attempt.
    #[error("database is locked after {attempts} attempts")]
    StoreContention { attempts: u32 },

    /// Foreign-key violation, missing run, duplicate sequence number.
    #[error("store integrity: {0}")]
    StoreIntegrity(String),

    /// A persisted key hash does not match its re-derivation.
    #[error("Key hash mismatch for version {0}")]
    TamperDetection(u32),

    /// A configured crash point was reached (test hook). The surrounding
    /// transaction is dropped uncommitted, which is indistinguishable from
    /// the process dying at that point.
    #[error("crash point {0} reached")]
    CrashPoint(CrashPoint),

    #[error(transparent)]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// SQLite reports write contention as SQLITE_BUSY/SQLITE_LOCKED with the
/// message "database is locked". Anything else is surfaced immediately.
pub fn is_locked(err: &rusqlite::Error) -> bool {
    if let rusqlite::Error::SqliteFailure(code, message) = err {
        if matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ) {
            return true;
        }
        if let Some(message) = message {
            return message.contains("database is locked");
        }
    }
    false
}
