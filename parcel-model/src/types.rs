//! Strong types for byte arrays
//!
//! Semantic newtypes for the fixed-size identifiers used across Parcel:
//! content hashes, Ed25519 public keys and signatures, and anonymous key ids.

use std::fmt;

/// Fixed-size byte newtype: hex on display, serde as raw bytes, and
/// fallible conversion from wire-level `&[u8]` / `Vec<u8>`.
macro_rules! define_bytes {
    ($name:ident, $len:expr, $doc:expr, [$($derives:ident),*]) => {
        #[doc = $doc]
        #[derive(Clone, Copy, serde::Serialize, serde::Deserialize, $($derives),*)]
        #[repr(transparent)]
        pub struct $name(#[serde(with = "serde_bytes")] pub [u8; $len]);

        impl $name {
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn from_hex(hex_str: &str) -> Result<Self, String> {
                let bytes = hex::decode(hex_str).map_err(|e| format!("invalid hex: {}", e))?;
                Self::try_from(bytes)
                    .map_err(|b| format!("{}: expected {} bytes, got {}", stringify!($name), $len, b.len()))
            }

            /// First four bytes in hex, for log lines.
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl std::ops::Deref for $name {
            type Target = [u8; $len];
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = std::array::TryFromSliceError;
            fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
                <[u8; $len]>::try_from(slice).map(Self)
            }
        }

        impl TryFrom<Vec<u8>> for $name {
            type Error = Vec<u8>;
            fn try_from(vec: Vec<u8>) -> Result<Self, Self::Error> {
                <[u8; $len]>::try_from(vec).map(Self)
            }
        }
    };
}

// --- Type Definitions ---

define_bytes!(
    Hash,
    32,
    "32-byte content identity (BLAKE3 of the sealed bytes)",
    [PartialEq, Eq, Hash, Default, PartialOrd, Ord]
);

define_bytes!(
    PubKey,
    32,
    "32-byte Ed25519 public key",
    [PartialEq, Eq, Hash, Default, PartialOrd, Ord]
);

define_bytes!(
    Signature,
    64,
    "64-byte Ed25519 signature",
    [PartialEq, Eq]
);

define_bytes!(
    AnonymousId,
    32,
    "32-byte anonymous key identifier: BLAKE3 of a public key",
    [PartialEq, Eq, Hash, Default, PartialOrd, Ord]
);

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_display() {
        let hash = Hash([0xab; 32]);
        let expected = "ab".repeat(32);
        assert_eq!(format!("{}", hash), expected);
        assert_eq!(format!("{:?}", hash), format!("Hash({})", expected));
        assert_eq!(hash.short(), "abababab");
    }

    #[test]
    fn test_signature_display() {
        let sig = Signature([0xef; 64]);
        let expected = "ef".repeat(64);
        assert_eq!(format!("{}", sig), expected);
        assert_eq!(format!("{:?}", sig), format!("Signature({})", expected));
    }

    #[test]
    fn test_from_hex() {
        let hash = Hash([7u8; 32]);
        assert_eq!(Hash::from_hex(&hash.to_string()).unwrap(), hash);
        assert!(Hash::from_hex("0707").is_err());
        assert!(Hash::from_hex("zz").is_err());
    }

    #[test]
    fn test_try_from_wrong_length() {
        assert!(PubKey::try_from(vec![1u8; 31]).is_err());
        assert!(PubKey::try_from(&[1u8; 33][..]).is_err());
        assert_eq!(PubKey::try_from(vec![1u8; 32]).unwrap(), PubKey([1u8; 32]));
    }
}
