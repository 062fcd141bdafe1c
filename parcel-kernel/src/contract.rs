//! Contracts: sealing and materialization
//!
//! A contract is a signed, content-addressed unit. Its sealed bytes are a
//! `SealedContract` envelope; its id is `blake3(sealed)`.
//!
//! Sub-contracts (revoked predecessors and newly created siblings) are stored
//! by hash from format version 3 on, and looked up in a reference map while
//! materializing. Older versions embed the sub-contracts' sealed bytes.

use crate::error::ContractError;
use crate::meter::{decode_cost, signature_cost, ResourceMeter};
use crate::proto::{ContractData, ContractSignature, ItemRef, RoleRecord, SealedContract};
use parcel_model::crypto::{content_hash, verify_hash};
use parcel_model::{Hash, PubKey, Role, RoleScope, Signature, SignerKey};
use prost::Message;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::warn;

/// First format version that references sub-contracts by hash.
pub const REFERENCED_ITEMS_VERSION: u32 = 3;

/// Version written by `ContractBuilder` unless overridden.
pub const CURRENT_VERSION: u32 = REFERENCED_ITEMS_VERSION;

/// Maximum nesting of embedded sub-contracts in legacy blobs.
pub const MAX_EMBEDDED_DEPTH: usize = 32;

/// Contracts indexed by their own id.
pub type ReferenceMap = BTreeMap<Hash, Arc<Contract>>;

/// A revoked or new sub-contract of a contract.
#[derive(Clone)]
pub enum SubItem {
    /// Present in the reference map (or embedded) when materialized.
    Resolved(Arc<Contract>),
    /// Declared by hash but absent when materialized.
    Missing(Hash),
}

impl SubItem {
    pub fn id(&self) -> Hash {
        match self {
            SubItem::Resolved(c) => c.id(),
            SubItem::Missing(id) => *id,
        }
    }

    pub fn contract(&self) -> Option<&Arc<Contract>> {
        match self {
            SubItem::Resolved(c) => Some(c),
            SubItem::Missing(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, SubItem::Resolved(_))
    }
}

impl fmt::Debug for SubItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubItem::Resolved(c) => write!(f, "Resolved({})", c.id()),
            SubItem::Missing(id) => write!(f, "Missing({})", id),
        }
    }
}

/// A sealed contract with its sub-contracts and roles.
pub struct Contract {
    id: Hash,
    sealed: Vec<u8>,
    version: u32,
    name: String,
    payload: Vec<u8>,
    revoking: Vec<SubItem>,
    new_items: Vec<SubItem>,
    roles: BTreeMap<String, Arc<Role>>,
    signers: BTreeSet<PubKey>,
    keys_to_sign_with: Vec<SignerKey>,
    cost: u64,
}

/// Decoded pieces of a contract before its roles are bound.
struct Parts {
    id: Hash,
    sealed: Vec<u8>,
    version: u32,
    name: String,
    payload: Vec<u8>,
    revoking: Vec<SubItem>,
    new_items: Vec<SubItem>,
    roles: Vec<Role>,
    signers: BTreeSet<PubKey>,
    cost: u64,
}

impl Contract {
    /// Materialize a contract from its sealed bytes.
    ///
    /// Hash-referenced sub-contracts are looked up in `references`; those not
    /// present become `SubItem::Missing`. The materialization cost, including
    /// embedded legacy sub-contracts, is available through [`Contract::cost`].
    pub fn from_sealed(sealed: &[u8], references: &ReferenceMap) -> Result<Arc<Self>, ContractError> {
        Self::from_sealed_metered(sealed, references, &mut ResourceMeter::unlimited())
    }

    /// Like [`Contract::from_sealed`], charging `meter` as decoding proceeds.
    ///
    /// The size of each blob is charged before it is parsed and its
    /// signatures before any is verified, so an over-budget blob fails
    /// without doing that work.
    pub fn from_sealed_metered(
        sealed: &[u8],
        references: &ReferenceMap,
        meter: &mut ResourceMeter,
    ) -> Result<Arc<Self>, ContractError> {
        let parts = decode(sealed, references, 0, meter)?;
        Ok(Self::assemble(parts, Vec::new()))
    }

    fn assemble(parts: Parts, keys_to_sign_with: Vec<SignerKey>) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Contract>| {
            let scope: Weak<dyn RoleScope> = me.clone();
            let roles = parts
                .roles
                .into_iter()
                .map(|role| {
                    role.attach_weak(scope.clone());
                    (role.name().to_string(), Arc::new(role))
                })
                .collect();
            Contract {
                id: parts.id,
                sealed: parts.sealed,
                version: parts.version,
                name: parts.name,
                payload: parts.payload,
                revoking: parts.revoking,
                new_items: parts.new_items,
                roles,
                signers: parts.signers,
                keys_to_sign_with,
                cost: parts.cost,
            }
        })
    }

    pub fn id(&self) -> Hash {
        self.id
    }

    /// The immutable sealed bytes this contract was built from.
    pub fn sealed(&self) -> &[u8] {
        &self.sealed
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn revoking(&self) -> &[SubItem] {
        &self.revoking
    }

    pub fn new_items(&self) -> &[SubItem] {
        &self.new_items
    }

    /// Ids of every revoked and new sub-contract.
    pub fn dependency_ids(&self) -> BTreeSet<Hash> {
        self.revoking.iter().chain(&self.new_items).map(SubItem::id).collect()
    }

    pub fn role(&self, name: &str) -> Option<Arc<Role>> {
        self.roles.get(name).cloned()
    }

    pub fn roles(&self) -> impl Iterator<Item = &Arc<Role>> {
        self.roles.values()
    }

    /// True if the named role (aliases followed) is satisfied by `keys`.
    pub fn is_role_allowed(&self, name: &str, keys: &BTreeSet<PubKey>) -> bool {
        self.role(name).is_some_and(|role| role.is_allowed_for_keys(keys))
    }

    /// Keys whose signature over the contract data verified.
    pub fn signers(&self) -> &BTreeSet<PubKey> {
        &self.signers
    }

    /// Public halves of the keys this contract is meant to be signed with.
    /// Only known for contracts sealed in this process.
    pub fn keys_to_sign_with(&self) -> Vec<PubKey> {
        self.keys_to_sign_with.iter().map(SignerKey::public_key).collect()
    }

    /// Cost charged for materializing this contract.
    pub fn cost(&self) -> u64 {
        self.cost
    }
}

impl RoleScope for Contract {
    fn role(&self, name: &str) -> Option<Arc<Role>> {
        Contract::role(self, name)
    }
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("name", &self.name)
            .field("revoking", &self.revoking)
            .field("new_items", &self.new_items)
            .field("roles", &self.roles.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn decode(
    bytes: &[u8],
    references: &ReferenceMap,
    depth: usize,
    meter: &mut ResourceMeter,
) -> Result<Parts, ContractError> {
    let mut cost = decode_cost(bytes.len());
    meter.charge(cost)?;

    let id = content_hash(bytes);
    let sealed = SealedContract::decode(bytes)?;
    if sealed.data.is_empty() {
        return Err(ContractError::MissingRequiredField("data"));
    }
    let data = ContractData::decode(sealed.data.as_slice())?;

    let checks = signature_cost(sealed.signatures.len());
    meter.charge(checks)?;
    cost += checks;
    let signers = verified_signers(&id, &sealed.data, &sealed.signatures)?;

    let revoking = sub_items(sealed.version, data.revoking, references, depth, meter, &mut cost)?;
    let new_items = sub_items(sealed.version, data.new, references, depth, meter, &mut cost)?;

    let roles = data
        .roles
        .into_iter()
        .map(|record| Role::try_from(record).map_err(ContractError::InvalidRole))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Parts {
        id,
        sealed: bytes.to_vec(),
        version: sealed.version,
        name: data.name,
        payload: data.payload,
        revoking,
        new_items,
        roles,
        signers,
        cost,
    })
}

fn sub_items(
    version: u32,
    refs: Vec<ItemRef>,
    references: &ReferenceMap,
    depth: usize,
    meter: &mut ResourceMeter,
    cost: &mut u64,
) -> Result<Vec<SubItem>, ContractError> {
    let mut items = Vec::with_capacity(refs.len());
    for item in refs {
        if version >= REFERENCED_ITEMS_VERSION {
            let id = item_hash(&item.hash)?;
            items.push(match references.get(&id) {
                Some(contract) => SubItem::Resolved(contract.clone()),
                None => SubItem::Missing(id),
            });
        } else {
            if item.sealed.is_empty() {
                return Err(ContractError::MissingRequiredField("sealed"));
            }
            if depth + 1 >= MAX_EMBEDDED_DEPTH {
                return Err(ContractError::NestingTooDeep(MAX_EMBEDDED_DEPTH));
            }
            let parts = decode(&item.sealed, references, depth + 1, meter)?;
            *cost = cost.saturating_add(parts.cost);
            items.push(SubItem::Resolved(Contract::assemble(parts, Vec::new())));
        }
    }
    Ok(items)
}

/// Parse a 32-byte item hash; an absent hash is a missing required field.
pub(crate) fn item_hash(bytes: &[u8]) -> Result<Hash, ContractError> {
    if bytes.is_empty() {
        return Err(ContractError::MissingRequiredField("hash"));
    }
    Hash::try_from(bytes).map_err(|_| ContractError::InvalidHashLength(bytes.len()))
}

fn verified_signers(
    id: &Hash,
    data: &[u8],
    signatures: &[ContractSignature],
) -> Result<BTreeSet<PubKey>, ContractError> {
    let data_hash = content_hash(data);
    let mut signers = BTreeSet::new();
    for entry in signatures {
        let signer = PubKey::try_from(entry.signer.as_slice())
            .map_err(|_| ContractError::InvalidSignature(format!("signer length {}", entry.signer.len())))?;
        let signature = Signature::try_from(entry.signature.as_slice())
            .map_err(|_| ContractError::InvalidSignature(format!("signature length {}", entry.signature.len())))?;
        match verify_hash(&signer, &data_hash, &signature) {
            Ok(()) => {
                signers.insert(signer);
            }
            Err(e) => warn!(contract = %id.short(), signer = %signer.short(), error = %e, "Dropping signature"),
        }
    }
    Ok(signers)
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for creating and sealing contracts
pub struct ContractBuilder {
    version: u32,
    name: String,
    payload: Vec<u8>,
    roles: Vec<Role>,
    revoking: Vec<Arc<Contract>>,
    new_items: Vec<Arc<Contract>>,
    signers: Vec<SignerKey>,
}

impl ContractBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: CURRENT_VERSION,
            name: name.into(),
            payload: Vec::new(),
            roles: Vec::new(),
            revoking: Vec::new(),
            new_items: Vec::new(),
            signers: Vec::new(),
        }
    }

    /// Set the format version. Versions below 3 embed sub-contracts.
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    /// Revoke a predecessor contract
    pub fn revoke(mut self, contract: Arc<Contract>) -> Self {
        self.revoking.push(contract);
        self
    }

    /// Create a new sibling contract
    pub fn add_new(mut self, contract: Arc<Contract>) -> Self {
        self.new_items.push(contract);
        self
    }

    pub fn signer(mut self, key: SignerKey) -> Self {
        self.signers.push(key);
        self
    }

    /// Sign and encode the contract.
    pub fn seal(self) -> Result<Arc<Contract>, ContractError> {
        let item_ref = |c: &Arc<Contract>| {
            if self.version >= REFERENCED_ITEMS_VERSION {
                ItemRef { hash: c.id().to_vec(), sealed: Vec::new() }
            } else {
                ItemRef { hash: Vec::new(), sealed: c.sealed().to_vec() }
            }
        };
        let data = ContractData {
            name: self.name.clone(),
            payload: self.payload.clone(),
            roles: self.roles.iter().map(RoleRecord::from).collect(),
            revoking: self.revoking.iter().map(item_ref).collect(),
            new: self.new_items.iter().map(item_ref).collect(),
        }
        .encode_to_vec();

        let data_hash = content_hash(&data);
        let signatures = self
            .signers
            .iter()
            .map(|key| ContractSignature {
                signer: key.public_key().to_vec(),
                signature: key.sign_hash(&data_hash).to_vec(),
            })
            .collect();
        let sealed = SealedContract { version: self.version, data, signatures }.encode_to_vec();

        let references: ReferenceMap = self
            .revoking
            .iter()
            .chain(&self.new_items)
            .map(|c| (c.id(), c.clone()))
            .collect();
        let parts = decode(&sealed, &references, 0, &mut ResourceMeter::unlimited())?;
        Ok(Contract::assemble(parts, self.signers))
    }
}
