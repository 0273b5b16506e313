//! Detached Ed25519 signature verification for the index file.
//!
//! Grounded in the same primitive the teacher uses to verify its own
//! release index (`ed25519-dalek` + base64), adapted to a detached
//! signature supplied alongside the index bytes rather than a literal
//! envelope prefix.

use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

/// Error returned while loading a trust anchor or verifying a signature.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// The base64-encoded public key did not decode to 32 bytes.
    #[error("invalid public key: {0}")]
    InvalidKey(String),
    /// The base64-encoded signature did not decode to 64 bytes.
    #[error("invalid signature encoding: {0}")]
    InvalidSignatureEncoding(String),
    /// The signature decoded but did not verify against the payload.
    #[error("signature verification failed")]
    Invalid,
}

/// A single Ed25519 verifying key used to check index signatures.
#[derive(Clone)]
pub struct TrustStore {
    key: VerifyingKey,
}

impl std::fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustStore").finish_non_exhaustive()
    }
}

impl TrustStore {
    /// Load a trust store from a base64-encoded Ed25519 public key.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::InvalidKey`] if `b64` does not decode to a
    /// valid 32-byte Ed25519 public key.
    pub fn from_base64(b64: &str) -> Result<Self, SignatureError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SignatureError::InvalidKey("expected 32 bytes".to_string()))?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
        Ok(Self { key })
    }

    /// Verify `payload` (the raw index JSON bytes) against a base64-encoded
    /// detached signature.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::InvalidSignatureEncoding`] if `signature_b64`
    /// does not decode to 64 bytes, or [`SignatureError::Invalid`] if it
    /// decodes but does not verify.
    pub fn verify(&self, payload: &[u8], signature_b64: &str) -> Result<(), SignatureError> {
        let sig_bytes = base64::engine::general_purpose::STANDARD
            .decode(signature_b64)
            .map_err(|e| SignatureError::InvalidSignatureEncoding(e.to_string()))?;
        let sig_bytes: [u8; 64] = sig_bytes
            .as_slice()
            .try_into()
            .map_err(|_| SignatureError::InvalidSignatureEncoding("expected 64 bytes".to_string()))?;
        let signature = Signature::from_bytes(&sig_bytes);
        self.key
            .verify(payload, &signature)
            .map_err(|_| SignatureError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn keypair() -> (SigningKey, String) {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let verifying = signing_key.verifying_key();
        let b64 = base64::engine::general_purpose::STANDARD.encode(verifying.as_bytes());
        (signing_key, b64)
    }

    #[test]
    fn verifies_genuine_signature() {
        let (signing_key, pub_b64) = keypair();
        let store = TrustStore::from_base64(&pub_b64).unwrap();
        let payload = b"index bytes";
        let sig = signing_key.sign(payload);
        let sig_b64 = base64::engine::general_purpose::STANDARD.encode(sig.to_bytes());
        assert!(store.verify(payload, &sig_b64).is_ok());
    }

    #[test]
    fn rejects_tampered_payload() {
        let (signing_key, pub_b64) = keypair();
        let store = TrustStore::from_base64(&pub_b64).unwrap();
        let sig = signing_key.sign(b"index bytes");
        let sig_b64 = base64::engine::general_purpose::STANDARD.encode(sig.to_bytes());
        assert!(store.verify(b"tampered bytes", &sig_b64).is_err());
    }

    #[test]
    fn rejects_malformed_key() {
        assert!(TrustStore::from_base64("not-base64!!").is_err());
    }
}
