//! Centralized cryptographic operations for Parcel.
//!
//! All BLAKE3 hashing and Ed25519 signing/verification goes through this
//! module so there is a single audit surface.
//!
//! # Primitives
//!
//! | Primitive    | Algorithm      | Purpose                                      |
//! |--------------|----------------|----------------------------------------------|
//! | Hash         | BLAKE3 (32 B)  | Contract ids, dependency links               |
//! | Signature    | Ed25519 (64 B) | Contract sealing                             |
//! | AnonymousId  | BLAKE3 (32 B)  | Key hiding inside role definitions           |

use crate::types::{AnonymousId, Hash, PubKey, Signature};

// ---------------------------------------------------------------------------
// Content hashing (BLAKE3)
// ---------------------------------------------------------------------------

/// Compute the BLAKE3 content hash of arbitrary bytes.
///
/// A contract's id is the content hash of its sealed bytes.
#[inline]
pub fn content_hash(data: &[u8]) -> Hash {
    Hash(*blake3::hash(data).as_bytes())
}

/// Derive the anonymous identifier of a public key.
#[inline]
pub fn anonymous_id(key: &PubKey) -> AnonymousId {
    AnonymousId(*blake3::hash(key.as_bytes()).as_bytes())
}

// ---------------------------------------------------------------------------
// Ed25519 signing
// ---------------------------------------------------------------------------

/// Sign a BLAKE3 content hash with an Ed25519 signing key.
///
/// Contracts are sealed by signing `blake3(data)`, never the raw payload.
pub fn sign_hash(signing_key: &ed25519_dalek::SigningKey, hash: &Hash) -> Signature {
    use ed25519_dalek::Signer;
    let sig = signing_key.sign(hash.as_bytes());
    Signature(sig.to_bytes())
}

// ---------------------------------------------------------------------------
// Ed25519 verification
// ---------------------------------------------------------------------------

/// Verify an Ed25519 signature over a BLAKE3 content hash (strict).
///
/// Uses `verify_strict()` (rejects small-order keys, checks canonical S).
pub fn verify_hash(pubkey: &PubKey, hash: &Hash, signature: &Signature) -> Result<(), CryptoError> {
    let vk = verifying_key(pubkey)?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    vk.verify_strict(hash.as_bytes(), &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}

/// Deserialize a `PubKey` into an Ed25519 `VerifyingKey`.
///
/// Fails if the 32 bytes are not a valid curve point.
pub fn verifying_key(pubkey: &PubKey) -> Result<ed25519_dalek::VerifyingKey, CryptoError> {
    ed25519_dalek::VerifyingKey::from_bytes(&pubkey.0).map_err(|_| CryptoError::InvalidPublicKey)
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Cryptographic operation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid Ed25519 signature")]
    InvalidSignature,

    #[error("invalid Ed25519 public key")]
    InvalidPublicKey,
}
