//! Patch blob encryption.
//!
//! Forward and reverse blobs are sealed with an AEAD (XChaCha20-Poly1305
//! or AES-256-GCM) under a per-version key derived by the keyring. The AAD
//! binds each blob to its operation, file, and blob format, so a patch row
//! cannot be replayed against a different operation.
//!
//! Two blob layouts exist on disk:
//!
//! - legacy: `nonce || ciphertext`
//! - versioned: `be32(key_version) || nonce || ciphertext`
//!
//! Decryption sniffs the first four bytes: a plausible key version that the
//! keyring actually holds selects the versioned layout, anything else is
//! treated as legacy and decrypted with the key version recorded on the
//! patch row.

pub mod keyring;

use aes_gcm::Aes256Gcm;
use chacha20poly1305::XChaCha20Poly1305;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};

use crate::config::EncryptionAlgo;
use crate::error::{Error, Result};

pub use keyring::{Keyring, derive_key, key_hash};

/// Versions above this are assumed to be legacy ciphertext bytes, not a
/// version prefix.
pub const MAX_KEY_VERSION: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeadAlgo {
    XChaCha20Poly1305,
    Aes256Gcm,
}

impl AeadAlgo {
    /// Wire value stored in the `enc_algo` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            AeadAlgo::XChaCha20Poly1305 => "XCHACHA20-POLY1305",
            AeadAlgo::Aes256Gcm => "AES-256-GCM",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "XCHACHA20-POLY1305" => Ok(AeadAlgo::XChaCha20Poly1305),
            "AES-256-GCM" => Ok(AeadAlgo::Aes256Gcm),
            other => Err(Error::Crypto(format!("unknown AEAD algorithm '{other}'"))),
        }
    }

    pub fn nonce_len(&self) -> usize {
        match self {
            AeadAlgo::XChaCha20Poly1305 => 24,
            AeadAlgo::Aes256Gcm => 12,
        }
    }
}

impl From<EncryptionAlgo> for AeadAlgo {
    fn from(algo: EncryptionAlgo) -> Self {
        match algo {
            EncryptionAlgo::XChaCha20Poly1305 => AeadAlgo::XChaCha20Poly1305,
            EncryptionAlgo::Aes256Gcm => AeadAlgo::Aes256Gcm,
        }
    }
}

/// How a patch row's blobs are protected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobCipher {
    Plain,
    Aead {
        algo: AeadAlgo,
        key_version: u32,
        nonce: Vec<u8>,
    },
}

impl BlobCipher {
    /// Wire value for the `enc_algo` column.
    pub fn enc_algo(&self) -> &'static str {
        match self {
            BlobCipher::Plain => "PLAINTEXT",
            BlobCipher::Aead { algo, .. } => algo.as_str(),
        }
    }

    pub fn key_version(&self) -> u32 {
        match self {
            BlobCipher::Plain => 0,
            BlobCipher::Aead { key_version, .. } => *key_version,
        }
    }

    /// Reconstruct from the persisted columns.
    pub fn from_columns(enc_algo: &str, key_version: u32, nonce: Option<Vec<u8>>) -> Result<Self> {
        if enc_algo == "PLAINTEXT" {
            return Ok(BlobCipher::Plain);
        }
        Ok(BlobCipher::Aead {
            algo: AeadAlgo::parse(enc_algo)?,
            key_version,
            nonce: nonce.unwrap_or_default(),
        })
    }
}

/// AAD binding a blob to its patch row. Recorded at encryption time and
/// rebuilt verbatim from the row at decryption time.
pub fn patch_aad(op_id: &str, file_id: i64, algo: &str) -> String {
    format!("{op_id}-{file_id}-{algo}")
}

pub fn generate_nonce(algo: AeadAlgo) -> Vec<u8> {
    match algo {
        AeadAlgo::XChaCha20Poly1305 => XChaCha20Poly1305::generate_nonce(&mut OsRng).to_vec(),
        AeadAlgo::Aes256Gcm => Aes256Gcm::generate_nonce(&mut OsRng).to_vec(),
    }
}

pub fn seal(
    algo: AeadAlgo,
    key: &[u8; 32],
    nonce: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    check_nonce(algo, nonce)?;
    let payload = Payload {
        msg: plaintext,
        aad,
    };
    let ciphertext = match algo {
        AeadAlgo::XChaCha20Poly1305 => {
            let cipher = XChaCha20Poly1305::new(key.into());
            cipher.encrypt(chacha20poly1305::XNonce::from_slice(nonce), payload)
        }
        AeadAlgo::Aes256Gcm => {
            let cipher = Aes256Gcm::new(key.into());
            cipher.encrypt(aes_gcm::Nonce::from_slice(nonce), payload)
        }
    };
    ciphertext.map_err(|_| Error::Crypto("encryption failed".to_string()))
}

pub fn open(
    algo: AeadAlgo,
    key: &[u8; 32],
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    check_nonce(algo, nonce)?;
    let payload = Payload {
        msg: ciphertext,
        aad,
    };
    let plaintext = match algo {
        AeadAlgo::XChaCha20Poly1305 => {
            let cipher = XChaCha20Poly1305::new(key.into());
            cipher.decrypt(chacha20poly1305::XNonce::from_slice(nonce), payload)
        }
        AeadAlgo::Aes256Gcm => {
            let cipher = Aes256Gcm::new(key.into());
            cipher.decrypt(aes_gcm::Nonce::from_slice(nonce), payload)
        }
    };
    plaintext.map_err(|_| Error::Crypto("AEAD tag verification failed".to_string()))
}

fn check_nonce(algo: AeadAlgo, nonce: &[u8]) -> Result<()> {
    if nonce.len() != algo.nonce_len() {
        return Err(Error::Crypto(format!(
            "{} requires a {}-byte nonce, got {}",
            algo.as_str(),
            algo.nonce_len(),
            nonce.len()
        )));
    }
    Ok(())
}

/// Versioned blob layout: `be32(key_version) || nonce || ciphertext`.
pub fn encode_versioned(key_version: u32, nonce: &[u8], ciphertext: &[u8]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(4 + nonce.len() + ciphertext.len());
    blob.extend_from_slice(&key_version.to_be_bytes());
    blob.extend_from_slice(nonce);
    blob.extend_from_slice(ciphertext);
    blob
}

/// A decoded encrypted blob.
#[derive(Debug, PartialEq, Eq)]
pub struct DecodedBlob<'a> {
    /// Version parsed from a versioned blob; `None` for legacy blobs.
    pub key_version: Option<u32>,
    pub nonce: &'a [u8],
    pub ciphertext: &'a [u8],
}

/// Decode a blob in either layout. `known_version` reports whether the
/// keyring holds a given version; only then is the version prefix trusted.
pub fn decode_blob<'a>(
    blob: &'a [u8],
    algo: AeadAlgo,
    known_version: impl Fn(u32) -> bool,
) -> Result<DecodedBlob<'a>> {
    let nonce_len = algo.nonce_len();

    if blob.len() >= 4 + nonce_len {
        let version = u32::from_be_bytes([blob[0], blob[1], blob[2], blob[3]]);
        if version > 0 && version <= MAX_KEY_VERSION && known_version(version) {
            return Ok(DecodedBlob {
                key_version: Some(version),
                nonce: &blob[4..4 + nonce_len],
                ciphertext: &blob[4 + nonce_len..],
            });
        }
    }

    if blob.len() < nonce_len {
        return Err(Error::Crypto(format!(
            "blob too short for {} nonce",
            algo.as_str()
        )));
    }
    Ok(DecodedBlob {
        key_version: None,
        nonce: &blob[..nonce_len],
        ciphertext: &blob[nonce_len..],
    })
}

#[cfg(test)]
mod tests {
    use crate::crypto::*;

    const KEY: [u8; 32] = [7u8; 32];

    #[test]
    fn test_seal_open_roundtrip_both_algos() {
        for algo in [AeadAlgo::XChaCha20Poly1305, AeadAlgo::Aes256Gcm] {
            let nonce = generate_nonce(algo);
            assert_eq!(nonce.len(), algo.nonce_len());
            let aad = patch_aad("op-1", 42, "binary");
            let sealed = seal(algo, &KEY, &nonce, aad.as_bytes(), b"original").unwrap();
            assert_ne!(sealed, b"original");
            let opened = open(algo, &KEY, &nonce, aad.as_bytes(), &sealed).unwrap();
            assert_eq!(opened, b"original");
        }
    }

    #[test]
    fn test_aad_mismatch_fails() {
        let algo = AeadAlgo::XChaCha20Poly1305;
        let nonce = generate_nonce(algo);
        let sealed = seal(algo, &KEY, &nonce, b"op-1-42-binary", b"data").unwrap();
        let err = open(algo, &KEY, &nonce, b"op-2-42-binary", &sealed).unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_deterministic_reencryption() {
        // Same key, nonce, and AAD reproduce the ciphertext byte for byte.
        let algo = AeadAlgo::Aes256Gcm;
        let nonce = generate_nonce(algo);
        let a = seal(algo, &KEY, &nonce, b"aad", b"blob").unwrap();
        let b = seal(algo, &KEY, &nonce, b"aad", b"blob").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_versioned_blob_roundtrip() {
        let algo = AeadAlgo::Aes256Gcm;
        let nonce = generate_nonce(algo);
        let blob = encode_versioned(3, &nonce, b"cipher");
        let decoded = decode_blob(&blob, algo, |v| v == 3).unwrap();
        assert_eq!(decoded.key_version, Some(3));
        assert_eq!(decoded.nonce, nonce.as_slice());
        assert_eq!(decoded.ciphertext, b"cipher");
    }

    #[test]
    fn test_unknown_version_falls_back_to_legacy_layout() {
        let algo = AeadAlgo::Aes256Gcm;
        let nonce = generate_nonce(algo);
        let blob = encode_versioned(3, &nonce, b"cipher");
        let decoded = decode_blob(&blob, algo, |_| false).unwrap();
        assert_eq!(decoded.key_version, None);
        assert_eq!(decoded.nonce.len(), algo.nonce_len());
    }

    #[test]
    fn test_wrong_nonce_length_rejected() {
        let err = seal(AeadAlgo::Aes256Gcm, &KEY, &[0u8; 24], b"", b"x").unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_blob_cipher_columns() {
        assert_eq!(BlobCipher::Plain.enc_algo(), "PLAINTEXT");
        assert_eq!(BlobCipher::Plain.key_version(), 0);
        let aead = BlobCipher::Aead {
            algo: AeadAlgo::XChaCha20Poly1305,
            key_version: 2,
            nonce: vec![0u8; 24],
        };
        assert_eq!(aead.enc_algo(), "XCHACHA20-POLY1305");
        let rebuilt =
            BlobCipher::from_columns("XCHACHA20-POLY1305", 2, Some(vec![0u8; 24])).unwrap();
        assert_eq!(rebuilt, aead);
    }
}
