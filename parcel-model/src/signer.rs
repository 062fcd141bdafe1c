//! Signing keys for sealing contracts
//!
//! A `SignerKey` is an Ed25519 keypair. The private half stays with the
//! process that seals a contract; only the public half travels in a package.

use crate::crypto;
use crate::types::{AnonymousId, Hash, PubKey, Signature};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use std::fmt;

/// An Ed25519 keypair a contract is meant to be signed with.
#[derive(Clone)]
pub struct SignerKey {
    signing_key: SigningKey,
}

impl SignerKey {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        Self { signing_key: SigningKey::generate(&mut OsRng) }
    }

    /// Create a keypair from raw secret bytes.
    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        Self { signing_key: SigningKey::from_bytes(secret) }
    }

    /// Public key as a strong type.
    pub fn public_key(&self) -> PubKey {
        PubKey::from(self.signing_key.verifying_key().to_bytes())
    }

    /// Anonymous identifier of the public key.
    pub fn anonymous_id(&self) -> AnonymousId {
        crypto::anonymous_id(&self.public_key())
    }

    /// Sign a content hash.
    pub fn sign_hash(&self, hash: &Hash) -> Signature {
        crypto::sign_hash(&self.signing_key, hash)
    }
}

impl fmt::Debug for SignerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_distinct() {
        let a = SignerKey::generate();
        let b = SignerKey::generate();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_sign_and_verify() {
        let key = SignerKey::from_bytes(&[9u8; 32]);
        let hash = crypto::content_hash(b"hello parcel");
        let sig = key.sign_hash(&hash);
        assert!(crypto::verify_hash(&key.public_key(), &hash, &sig).is_ok());
    }

    #[test]
    fn test_verify_with_different_key() {
        let key1 = SignerKey::from_bytes(&[1u8; 32]);
        let key2 = SignerKey::from_bytes(&[2u8; 32]);
        let hash = crypto::content_hash(b"message");
        let sig = key1.sign_hash(&hash);
        assert!(crypto::verify_hash(&key2.public_key(), &hash, &sig).is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let key = SignerKey::from_bytes(&[3u8; 32]);
        let debug = format!("{:?}", key);
        assert!(debug.contains("public_key"));
        assert!(!debug.contains(&hex::encode([3u8; 32])));
    }
}
