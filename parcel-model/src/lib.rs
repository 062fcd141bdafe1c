//! Parcel Model
//!
//! Pure data types for Parcel, decoupled from the wire format and from
//! package reconstruction.

pub mod crypto;
pub mod role;
pub mod signer;
pub mod types;

// Re-exports
pub use crypto::CryptoError;
pub use role::{Role, RoleAlias, RoleError, RoleScope, SimpleRole, MAX_ALIAS_DEPTH};
pub use signer::SignerKey;
pub use types::{AnonymousId, Hash, PubKey, Signature};
