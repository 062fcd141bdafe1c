//! Wire messages for sealed contracts and packages
//!
//! Hand-derived prost messages. Field tags are part of the wire format and
//! must never be renumbered.
//!
//! `DependencyView` decodes only the `revoking`/`new` fields of
//! `ContractData`; prost skips every other field, which is what lets the
//! dependency extractor read a blob without materializing it.

use parcel_model::{AnonymousId, PubKey, Role, RoleAlias, SimpleRole};

/// Type tag carried by every packed package.
pub const PACKAGE_TYPE_TAG: &str = "TransactionPack";

/// Current package envelope version.
pub const PACKAGE_VERSION: u32 = 1;

/// Top-level package envelope.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PackageEnvelope {
    #[prost(string, tag = "1")]
    pub type_tag: String,

    #[prost(uint32, tag = "2")]
    pub version: u32,

    /// Sealed bytes of the primary contract (required).
    #[prost(bytes = "vec", tag = "3")]
    pub contract: Vec<u8>,

    /// Sealed bytes of every reference, unordered.
    #[prost(bytes = "vec", repeated, tag = "4")]
    pub references: Vec<Vec<u8>>,

    #[prost(message, repeated, tag = "5")]
    pub keys: Vec<KeyEntry>,
}

/// One entry of the package key list.
#[derive(Clone, PartialEq, prost::Message)]
pub struct KeyEntry {
    #[prost(oneof = "key_entry::Encoding", tags = "1, 2")]
    pub encoding: Option<key_entry::Encoding>,
}

pub mod key_entry {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Encoding {
        #[prost(bytes, tag = "1")]
        Raw(Vec<u8>),

        #[prost(message, tag = "2")]
        Wrapped(super::WrappedKey),
    }
}

/// A public key wrapped with its algorithm label.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WrappedKey {
    #[prost(string, tag = "1")]
    pub algorithm: String,

    #[prost(bytes = "vec", tag = "2")]
    pub key: Vec<u8>,
}

impl KeyEntry {
    pub fn raw(key: &PubKey) -> Self {
        Self { encoding: Some(key_entry::Encoding::Raw(key.to_vec())) }
    }

    pub fn wrapped(key: &PubKey) -> Self {
        Self {
            encoding: Some(key_entry::Encoding::Wrapped(WrappedKey {
                algorithm: "ed25519".to_string(),
                key: key.to_vec(),
            })),
        }
    }
}

/// Signed outer envelope of a contract. Its bytes are the contract's sealed
/// form and its BLAKE3 hash is the contract id.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SealedContract {
    #[prost(uint32, tag = "1")]
    pub version: u32,

    /// Encoded `ContractData` (required).
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,

    #[prost(message, repeated, tag = "3")]
    pub signatures: Vec<ContractSignature>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ContractSignature {
    #[prost(bytes = "vec", tag = "1")]
    pub signer: Vec<u8>,

    /// Ed25519 signature over `blake3(data)`.
    #[prost(bytes = "vec", tag = "2")]
    pub signature: Vec<u8>,
}

/// Signed body of a contract.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ContractData {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,

    #[prost(message, repeated, tag = "3")]
    pub roles: Vec<RoleRecord>,

    #[prost(message, repeated, tag = "4")]
    pub revoking: Vec<ItemRef>,

    #[prost(message, repeated, tag = "5")]
    pub new: Vec<ItemRef>,
}

/// Reference to a sub-contract: by hash (version 3+) or embedded (legacy).
#[derive(Clone, PartialEq, prost::Message)]
pub struct ItemRef {
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,

    #[prost(bytes = "vec", tag = "2")]
    pub sealed: Vec<u8>,
}

/// Narrow view of `ContractData` used for dependency extraction.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DependencyView {
    #[prost(message, repeated, tag = "4")]
    pub revoking: Vec<HashOnlyRef>,

    #[prost(message, repeated, tag = "5")]
    pub new: Vec<HashOnlyRef>,
}

/// `ItemRef` without the embedded body.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HashOnlyRef {
    #[prost(bytes = "vec", tag = "1")]
    pub hash: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message)]
pub struct RoleRecord {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(oneof = "role_record::Kind", tags = "2, 3")]
    pub kind: Option<role_record::Kind>,
}

pub mod role_record {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "2")]
        Simple(super::SimpleRoleRecord),

        #[prost(message, tag = "3")]
        Alias(super::AliasRoleRecord),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SimpleRoleRecord {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub keys: Vec<Vec<u8>>,

    #[prost(bytes = "vec", repeated, tag = "2")]
    pub anonymous_ids: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AliasRoleRecord {
    #[prost(string, tag = "1")]
    pub target_name: String,
}

impl From<&Role> for RoleRecord {
    fn from(role: &Role) -> Self {
        let kind = match role {
            Role::Simple(r) => role_record::Kind::Simple(SimpleRoleRecord {
                keys: r.keys().iter().map(|k| k.to_vec()).collect(),
                anonymous_ids: r.anonymous_ids().iter().map(|a| a.to_vec()).collect(),
            }),
            Role::Alias(a) => role_record::Kind::Alias(AliasRoleRecord {
                target_name: a.target_name().to_string(),
            }),
        };
        Self { name: role.name().to_string(), kind: Some(kind) }
    }
}

impl TryFrom<RoleRecord> for Role {
    type Error = String;

    fn try_from(record: RoleRecord) -> Result<Self, Self::Error> {
        match record.kind.ok_or("role record without kind")? {
            role_record::Kind::Simple(simple) => {
                let keys = simple
                    .keys
                    .into_iter()
                    .map(PubKey::try_from)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|v| format!("invalid role key length {}", v.len()))?;
                let anonymous_ids = simple
                    .anonymous_ids
                    .into_iter()
                    .map(AnonymousId::try_from)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|v| format!("invalid anonymous id length {}", v.len()))?;
                Ok(Role::Simple(SimpleRole::with_anonymous_ids(record.name, keys, anonymous_ids)))
            }
            role_record::Kind::Alias(alias) => Ok(Role::Alias(RoleAlias::from_parts(record.name, alias.target_name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn dependency_view_skips_other_fields() {
        let data = ContractData {
            name: "coin".into(),
            payload: vec![1, 2, 3],
            roles: vec![],
            revoking: vec![ItemRef { hash: vec![1u8; 32], sealed: vec![] }],
            new: vec![ItemRef { hash: vec![2u8; 32], sealed: vec![9; 10] }],
        };
        let view = DependencyView::decode(data.encode_to_vec().as_slice()).unwrap();
        assert_eq!(view.revoking[0].hash, vec![1u8; 32]);
        assert_eq!(view.new[0].hash, vec![2u8; 32]);
    }

    #[test]
    fn sealed_contract_is_not_a_package() {
        let sealed = SealedContract { version: 3, data: vec![1, 2, 3], signatures: vec![] };
        let bytes = sealed.encode_to_vec();
        match PackageEnvelope::decode(bytes.as_slice()) {
            Ok(envelope) => assert_ne!(envelope.type_tag, PACKAGE_TYPE_TAG),
            Err(_) => {}
        }
    }

    #[test]
    fn role_record_roundtrip_alias() {
        let role = Role::alias("manager", "owner").unwrap();
        let back = Role::try_from(RoleRecord::from(&role)).unwrap();
        assert_eq!(back.name(), "manager");
        assert_eq!(back.as_alias().unwrap().target_name(), "owner");
    }

    #[test]
    fn role_record_rejects_bad_key() {
        let record = RoleRecord {
            name: "owner".into(),
            kind: Some(role_record::Kind::Simple(SimpleRoleRecord {
                keys: vec![vec![1u8; 5]],
                anonymous_ids: vec![],
            })),
        };
        assert!(Role::try_from(record).is_err());
    }
}
