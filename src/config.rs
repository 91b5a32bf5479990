//! Engine configuration.
//!
//! All settings are read from `MORFX_*` environment variables exactly once,
//! at CLI startup, and carried into [`crate::engine::Engine::open`] as a
//! plain value. The library itself never consults the environment.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Directory morfx owns inside the working tree.
pub const WORKSPACE_DIR: &str = ".morfx";
/// Journal database file name inside [`WORKSPACE_DIR`].
pub const DB_FILE_NAME: &str = "run.db";

pub const ENV_MASTER_KEY: &str = "MORFX_MASTER_KEY";
pub const ENV_ENCRYPTION_MODE: &str = "MORFX_ENCRYPTION_MODE";
pub const ENV_ENCRYPTION_ALGO: &str = "MORFX_ENCRYPTION_ALGO";
pub const ENV_KEY_VERSION: &str = "MORFX_KEY_VERSION";
pub const ENV_RETAIN_RUNS: &str = "MORFX_RETAIN_RUNS";
pub const ENV_RETAIN_KEYS: &str = "MORFX_RETAIN_KEYS";
pub const ENV_CRASH_POINT: &str = "MORFX_CRASH_POINT";

/// Whether patch blobs are encrypted before they land in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionMode {
    /// Blobs are stored verbatim.
    Off,
    /// Encrypt when a master key is configured, store plaintext otherwise.
    Auto,
    /// Encrypt always; a missing master key is a configuration error.
    On,
}

impl EncryptionMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "auto" => Ok(Self::Auto),
            "on" | "force" => Ok(Self::On),
            other => Err(Error::Crypto(format!("unknown encryption mode '{other}'"))),
        }
    }
}

/// AEAD algorithm for patch blobs. Governs nonce size; keys are 32 bytes
/// for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionAlgo {
    XChaCha20Poly1305,
    Aes256Gcm,
}

impl EncryptionAlgo {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "xchacha20poly1305" | "xchacha20-poly1305" => Ok(Self::XChaCha20Poly1305),
            "aesgcm" | "aes-256-gcm" | "aes256gcm" => Ok(Self::Aes256Gcm),
            other => Err(Error::Crypto(format!(
                "unknown encryption algorithm '{other}'"
            ))),
        }
    }
}

/// Rollback crash points (test hook). `CP-A` aborts before any filesystem
/// change, `CP-B` aborts after the file is reverted but before the journal
/// is updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    BeforeFile,
    AfterFile,
}

impl CrashPoint {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_uppercase().as_str() {
            "CP-A" | "BEFORE-FILE" => Ok(Self::BeforeFile),
            "CP-B" | "AFTER-FILE" => Ok(Self::AfterFile),
            other => Err(Error::QueryResolution(format!(
                "unknown crash point '{other}'"
            ))),
        }
    }
}

impl fmt::Display for CrashPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeFile => write!(f, "CP-A"),
            Self::AfterFile => write!(f, "CP-B"),
        }
    }
}

/// 32-byte master secret. Wiped from memory on drop; never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    pub fn from_hex(value: &str) -> Result<Self> {
        let bytes = hex::decode(value.trim())
            .map_err(|e| Error::Crypto(format!("master key is not valid hex: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::Crypto("master key must be exactly 32 bytes".into()))?;
        Ok(Self(bytes))
    }

    pub fn bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Everything [`crate::engine::Engine::open`] needs to know.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub master_key: Option<MasterKey>,
    pub encryption_mode: EncryptionMode,
    pub encryption_algo: EncryptionAlgo,
    /// Active key version at open time.
    pub key_version: u32,
    /// Non-archived runs kept by the retention policy. 0 disables archival.
    pub retain_runs: u32,
    /// Key versions kept after rotation. 0 disables cleanup.
    pub retain_keys: u32,
    /// Rollback crash point (test hook).
    pub crash_point: Option<CrashPoint>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            master_key: None,
            encryption_mode: EncryptionMode::Auto,
            encryption_algo: EncryptionAlgo::XChaCha20Poly1305,
            key_version: 1,
            retain_runs: 0,
            retain_keys: 0,
            crash_point: None,
        }
    }
}

impl EngineConfig {
    /// Build a config from the `MORFX_*` environment variables. Called once
    /// from the CLI; tests construct configs directly instead.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var(ENV_MASTER_KEY) {
            if !value.is_empty() {
                config.master_key = Some(MasterKey::from_hex(&value)?);
            }
        }
        if let Ok(value) = std::env::var(ENV_ENCRYPTION_MODE) {
            config.encryption_mode = EncryptionMode::parse(&value)?;
        }
        if let Ok(value) = std::env::var(ENV_ENCRYPTION_ALGO) {
            config.encryption_algo = EncryptionAlgo::parse(&value)?;
        }
        if let Ok(value) = std::env::var(ENV_KEY_VERSION) {
            config.key_version = parse_positive(ENV_KEY_VERSION, &value)?;
        }
        if let Ok(value) = std::env::var(ENV_RETAIN_RUNS) {
            config.retain_runs = parse_count(ENV_RETAIN_RUNS, &value)?;
        }
        if let Ok(value) = std::env::var(ENV_RETAIN_KEYS) {
            config.retain_keys = parse_count(ENV_RETAIN_KEYS, &value)?;
        }
        if let Ok(value) = std::env::var(ENV_CRASH_POINT) {
            if !value.is_empty() {
                config.crash_point = Some(CrashPoint::parse(&value)?);
            }
        }

        Ok(config)
    }

    /// True when patch blobs will be encrypted under this config.
    pub fn encryption_enabled(&self) -> bool {
        match self.encryption_mode {
            EncryptionMode::Off => false,
            EncryptionMode::Auto => self.master_key.is_some(),
            EncryptionMode::On => true,
        }
    }
}

fn parse_positive(name: &str, value: &str) -> Result<u32> {
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::QueryResolution(format!(
            "{name} must be a positive integer, got '{value}'"
        ))),
    }
}

fn parse_count(name: &str, value: &str) -> Result<u32> {
    value.parse::<u32>().map_err(|_| {
        Error::QueryResolution(format!("{name} must be a non-negative integer, got '{value}'"))
    })
}
