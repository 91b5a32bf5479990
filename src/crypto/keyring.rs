//! Key derivation and the in-process keyring.
//!
//! Content-encryption keys are derived per version from the 32-byte master
//! secret with HKDF-SHA-256, constant salt, and `v<N>` as info. The first
//! 16 bytes of the derived key's SHA-256 are persisted alongside each key
//! row; a mismatch on re-derivation at open time is tamper detection and
//! refuses to open the store.

use std::collections::HashMap;

use hkdf::Hkdf;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

pub const HKDF_SALT: &str = "morfx-patches";

/// HKDF info string for a key version.
pub fn key_info(version: u32) -> String {
    format!("v{version}")
}

/// Derive the content-encryption key for `version`.
pub fn derive_key(master: &[u8; 32], version: u32) -> Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT.as_bytes()), master);
    let mut okm = [0u8; 32];
    hk.expand(key_info(version).as_bytes(), &mut okm)
        .map_err(|_| Error::Crypto(format!("HKDF expand failed for version {version}")))?;
    Ok(okm)
}

/// Truncated SHA-256 of a derived key, persisted for tamper detection.
pub fn key_hash(key: &[u8; 32]) -> [u8; 16] {
    let digest = Sha256::digest(key);
    let mut hash = [0u8; 16];
    hash.copy_from_slice(&digest[..16]);
    hash
}

/// Map from key version to derived key. Readers are the decrypt hot path;
/// writers are keyring init and rotation.
pub struct Keyring {
    keys: RwLock<HashMap<u32, Zeroizing<[u8; 32]>>>,
}

impl Keyring {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, version: u32, key: [u8; 32]) {
        self.keys.write().insert(version, Zeroizing::new(key));
    }

    pub fn get(&self, version: u32) -> Option<[u8; 32]> {
        self.keys.read().get(&version).map(|k| **k)
    }

    pub fn contains(&self, version: u32) -> bool {
        self.keys.read().contains_key(&version)
    }

    pub fn remove(&self, version: u32) {
        self.keys.write().remove(&version);
    }

    pub fn versions(&self) -> Vec<u32> {
        let mut versions: Vec<u32> = self.keys.read().keys().copied().collect();
        versions.sort_unstable();
        versions
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

impl Default for Keyring {
    fn default() -> Self {
        Self::new()
    }
}
