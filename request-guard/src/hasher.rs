//! Digest capability used to condense canonical requests into keys.
//!
//! The guard only depends on [`KeyHasher`]. A deployment without a secure
//! hash available may return [`HashError::Unavailable`], in which case the
//! guard sends requests straight through. An implementation must never hand
//! back a constant or empty digest instead: every request would collapse onto
//! one key and callers would receive each other's responses.

use crate::error::HashError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

/// Deterministic digest of a byte sequence, rendered as a single-line string
pub trait KeyHasher: Send + Sync {
    fn hash(&self, bytes: &[u8]) -> Result<String, HashError>;
}

/// SHA-256 rendered as standard base64 with padding
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Hasher;

impl KeyHasher for Sha256Hasher {
    fn hash(&self, bytes: &[u8]) -> Result<String, HashError> {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Ok(STANDARD.encode(hasher.finalize()))
    }
}

impl<F> KeyHasher for F
where
    F: Fn(&[u8]) -> Result<String, HashError> + Send + Sync,
{
    fn hash(&self, bytes: &[u8]) -> Result<String, HashError> {
        self(bytes)
    }
}

/// Runs `hasher`, rejecting empty digests which would collapse keys
pub(crate) fn digest(hasher: &dyn KeyHasher, bytes: &[u8]) -> Result<String, HashError> {
    let digest = hasher.hash(bytes)?;
    if digest.is_empty() {
        return Err(HashError::Unavailable("hasher returned an empty digest".into()));
    }
    Ok(digest)
}
