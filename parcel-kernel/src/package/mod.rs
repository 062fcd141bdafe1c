//! Package - a primary contract bundled with its dependency window
//!
//! A package carries the transaction contract submitted for approval, every
//! contract it revokes or creates (transitively), and the public keys that
//! match anonymous ids in its roles. The packed form is the canonical way
//! to move a transaction between processes; a bare sealed contract is still
//! readable when the caller allows the legacy form.
//!
//! Every mutation and every pack goes through one mutex per instance. Getters
//! hand out `Arc<Contract>` clones; the contracts themselves are immutable.

mod reconstruct;

use crate::config::PackConfig;
use crate::contract::{Contract, ReferenceMap};
use crate::error::{ContractError, PackError};
use crate::meter::ResourceMeter;
use crate::proto::{KeyEntry, PackageEnvelope, PACKAGE_TYPE_TAG, PACKAGE_VERSION};
use parcel_model::crypto::anonymous_id;
use parcel_model::{AnonymousId, Hash, PubKey};
use prost::Message;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Default, Debug)]
struct PackState {
    contract: Option<Arc<Contract>>,
    references: ReferenceMap,
    keys: BTreeSet<PubKey>,
    /// Cached packed form, cleared by every mutation.
    packed: Option<Vec<u8>>,
    reconstructed: bool,
    residual: BTreeSet<Hash>,
}

impl PackState {
    fn set_contract(&mut self, contract: Arc<Contract>) -> Result<(), PackError> {
        if self.contract.is_some() {
            return Err(PackError::DuplicatePrimary);
        }
        self.put_all_sub_items(&contract);
        self.contract = Some(contract);
        self.packed = None;
        Ok(())
    }

    /// Insert every revoked and new contract reachable from `root`.
    fn put_all_sub_items(&mut self, root: &Contract) {
        let mut stack: Vec<Arc<Contract>> = root
            .revoking()
            .iter()
            .chain(root.new_items())
            .filter_map(|item| item.contract().cloned())
            .collect();

        while let Some(contract) = stack.pop() {
            if self.references.contains_key(&contract.id()) {
                continue;
            }
            stack.extend(
                contract
                    .revoking()
                    .iter()
                    .chain(contract.new_items())
                    .filter_map(|item| item.contract().cloned()),
            );
            self.references.insert(contract.id(), contract);
        }
    }

    fn encode(&self) -> Result<Vec<u8>, PackError> {
        let contract = self
            .contract
            .as_ref()
            .ok_or(PackError::MissingRequiredField("contract"))?;
        let envelope = PackageEnvelope {
            type_tag: PACKAGE_TYPE_TAG.to_string(),
            version: PACKAGE_VERSION,
            contract: contract.sealed().to_vec(),
            references: self.references.values().map(|c| c.sealed().to_vec()).collect(),
            keys: self.keys.iter().map(KeyEntry::raw).collect(),
        };
        Ok(envelope.encode_to_vec())
    }
}

/// A primary contract with its references and keys.
#[derive(Default, Debug)]
pub struct Package {
    state: Mutex<PackState>,
}

impl Package {
    /// Empty package; set the primary with [`Package::set_contract`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Package a contract together with every sub-contract it reaches, and
    /// trust the public keys it is meant to be signed with.
    pub fn from_contract(contract: Arc<Contract>) -> Result<Self, PackError> {
        let package = Self::new();
        let keys = contract.keys_to_sign_with();
        package.set_contract(contract)?;
        package.add_keys(keys);
        Ok(package)
    }

    fn from_state(state: PackState) -> Self {
        Self { state: Mutex::new(state) }
    }

    fn lock(&self) -> MutexGuard<'_, PackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the primary contract. Fails if one is already set.
    pub fn set_contract(&self, contract: Arc<Contract>) -> Result<(), PackError> {
        self.lock().set_contract(contract)
    }

    /// Add a reference not reachable from the primary. Returns true if it
    /// was not present yet.
    pub fn add_reference(&self, reference: Arc<Contract>) -> bool {
        let mut state = self.lock();
        if state.references.contains_key(&reference.id()) {
            return false;
        }
        state.references.insert(reference.id(), reference);
        state.packed = None;
        true
    }

    /// Trust public keys for matching anonymous ids in roles.
    pub fn add_keys(&self, keys: impl IntoIterator<Item = PubKey>) {
        let mut state = self.lock();
        let before = state.keys.len();
        state.keys.extend(keys);
        if state.keys.len() != before {
            state.packed = None;
        }
    }

    pub fn contract(&self) -> Option<Arc<Contract>> {
        self.lock().contract.clone()
    }

    pub fn reference(&self, id: &Hash) -> Option<Arc<Contract>> {
        self.lock().references.get(id).cloned()
    }

    /// Snapshot of the reference map.
    pub fn references(&self) -> ReferenceMap {
        self.lock().references.clone()
    }

    pub fn reference_ids(&self) -> BTreeSet<Hash> {
        self.lock().references.keys().copied().collect()
    }

    pub fn keys(&self) -> BTreeSet<PubKey> {
        self.lock().keys.clone()
    }

    /// The trusted key hiding behind an anonymous role id, if any.
    pub fn key_for_anonymous_id(&self, id: &AnonymousId) -> Option<PubKey> {
        self.lock().keys.iter().find(|key| anonymous_id(key) == *id).copied()
    }

    /// True if this package was built from a bare legacy contract blob.
    pub fn is_reconstructed(&self) -> bool {
        self.lock().reconstructed
    }

    /// References that were materialized by the best-effort fallback after
    /// the dependency rounds stalled. Their links may be `SubItem::Missing`.
    pub fn residual_ids(&self) -> BTreeSet<Hash> {
        self.lock().residual.clone()
    }

    /// Packed binary form, cached until the next mutation.
    pub fn pack(&self) -> Result<Vec<u8>, PackError> {
        let mut state = self.lock();
        if let Some(packed) = &state.packed {
            return Ok(packed.clone());
        }
        let packed = state.encode()?;
        state.packed = Some(packed.clone());
        Ok(packed)
    }

    /// Unpack with the default configuration.
    pub fn unpack(bytes: &[u8], allow_legacy: bool) -> Result<Self, PackError> {
        Self::unpack_with_config(bytes, allow_legacy, &PackConfig::default())
    }

    /// Unpack a packed package or, if `allow_legacy`, a bare sealed contract.
    ///
    /// A payload that carries the package tag is always reconstructed as a
    /// package; its failures are returned as is.
    pub fn unpack_with_config(bytes: &[u8], allow_legacy: bool, config: &PackConfig) -> Result<Self, PackError> {
        if let Ok(envelope) = PackageEnvelope::decode(bytes) {
            if envelope.type_tag == PACKAGE_TYPE_TAG {
                let state = reconstruct::reconstruct(envelope, config)?;
                return Ok(Self::from_state(state));
            }
        }

        if !allow_legacy {
            return Err(PackError::UnrecognizedFormat("expected a transaction pack".to_string()));
        }

        // A legacy self-contained contract, or a root contract with no
        // revokes and no siblings.
        let mut meter = ResourceMeter::new(config.cost_limit);
        let contract = Contract::from_sealed_metered(bytes, &ReferenceMap::new(), &mut meter).map_err(|e| match e {
            ContractError::Decode(e) => PackError::UnrecognizedFormat(e.to_string()),
            ContractError::MissingRequiredField(field) => {
                PackError::UnrecognizedFormat(format!("not a sealed contract: no {}", field))
            }
            other => PackError::from(other),
        })?;
        debug!(contract = %contract.id().short(), version = contract.version(), "Unpacked legacy contract");

        Ok(Self::from_state(PackState {
            contract: Some(contract),
            packed: Some(bytes.to_vec()),
            reconstructed: true,
            ..PackState::default()
        }))
    }

    /// Human-readable tree of the primary contract and the references.
    pub fn trace(&self) -> String {
        let state = self.lock();
        let mut out = String::from("Transaction pack\n\tContract:\n");
        if let Some(contract) = &state.contract {
            let _ = writeln!(out, "\t\t{}", contract.id());
            for item in contract.new_items() {
                let _ = writeln!(out, "\t\t\tnew: {}", item.id());
            }
            for item in contract.revoking() {
                let _ = writeln!(out, "\t\t\trevoke: {}", item.id());
            }
        }
        out.push_str("\tReferences:\n");
        for (id, contract) in &state.references {
            let _ = writeln!(out, "\t\t{} -> {}", id, contract.name());
        }
        out
    }
}
