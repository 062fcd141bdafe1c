//! Dependency descriptors for sealed reference blobs
//!
//! A `ContractDependencies` holds a blob's id and the ids it declares in its
//! `revoking`/`new` lists, read without materializing the contract.
//! `DescriptorTable` is the id-indexed worklist the package reconstruction
//! drains round by round.

use crate::contract::{item_hash, REFERENCED_ITEMS_VERSION};
use crate::error::ContractError;
use crate::proto::{DependencyView, SealedContract};
use parcel_model::crypto::content_hash;
use parcel_model::Hash;
use prost::Message;
use std::collections::{BTreeMap, BTreeSet};

/// Id and declared dependencies of one sealed blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractDependencies {
    id: Hash,
    dependencies: BTreeSet<Hash>,
}

impl ContractDependencies {
    pub fn new(id: Hash, dependencies: impl IntoIterator<Item = Hash>) -> Self {
        Self { id, dependencies: dependencies.into_iter().collect() }
    }

    /// Extract the descriptor of a sealed contract.
    ///
    /// Versions before 3 embed their sub-contracts, so they declare no
    /// dependencies.
    pub fn from_sealed(sealed: &[u8]) -> Result<Self, ContractError> {
        let id = content_hash(sealed);
        let envelope = SealedContract::decode(sealed)?;
        if envelope.data.is_empty() {
            return Err(ContractError::MissingRequiredField("data"));
        }
        if envelope.version < REFERENCED_ITEMS_VERSION {
            return Ok(Self { id, dependencies: BTreeSet::new() });
        }

        let view = DependencyView::decode(envelope.data.as_slice())?;
        let dependencies = view
            .revoking
            .iter()
            .chain(&view.new)
            .map(|r| item_hash(&r.hash))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { id, dependencies })
    }

    pub fn id(&self) -> Hash {
        self.id
    }

    pub fn dependencies(&self) -> &BTreeSet<Hash> {
        &self.dependencies
    }
}

struct Pending {
    descriptor: ContractDependencies,
    sealed: Vec<u8>,
    /// Declared dependencies still pending in this table.
    blocking: usize,
}

/// Reference blobs awaiting materialization, keyed by id.
///
/// A blob is ready once none of its declared dependencies is pending; a
/// dependency that never entered the table is expected to resolve
/// elsewhere. Each pending blob carries a count of the pending blobs it
/// waits on, and `waiters` maps an id to the blobs that declared it, so a
/// round only touches the blobs that the previous round unblocked.
#[derive(Default)]
pub struct DescriptorTable {
    pending: BTreeMap<Hash, Pending>,
    waiters: BTreeMap<Hash, Vec<Hash>>,
    ready: BTreeSet<Hash>,
}

impl DescriptorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a blob. Returns false if a blob with the same id is already pending.
    pub fn insert(&mut self, descriptor: ContractDependencies, sealed: Vec<u8>) -> bool {
        let id = descriptor.id;
        if self.pending.contains_key(&id) {
            return false;
        }

        // Blobs that declared this id earlier now wait on it too.
        for waiter in self.waiters.get(&id).into_iter().flatten() {
            if let Some(p) = self.pending.get_mut(waiter) {
                p.blocking += 1;
                self.ready.remove(waiter);
            }
        }

        let mut blocking = 0;
        for dep in &descriptor.dependencies {
            if *dep == id || self.pending.contains_key(dep) {
                blocking += 1;
            }
            self.waiters.entry(*dep).or_default().push(id);
        }
        if blocking == 0 {
            self.ready.insert(id);
        }
        self.pending.insert(id, Pending { descriptor, sealed, blocking });
        true
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove and return every blob that is ready now, in id order.
    ///
    /// Removing them releases the blobs waiting on them for the next round.
    /// Returns an empty batch once the table is drained or stalled.
    pub fn next_round(&mut self) -> Vec<(Hash, Vec<u8>)> {
        let batch: Vec<Hash> = std::mem::take(&mut self.ready).into_iter().collect();
        let mut out = Vec::with_capacity(batch.len());
        for id in batch {
            let Some(p) = self.pending.remove(&id) else { continue };
            for waiter in self.waiters.remove(&id).into_iter().flatten() {
                if let Some(w) = self.pending.get_mut(&waiter) {
                    w.blocking = w.blocking.saturating_sub(1);
                    if w.blocking == 0 {
                        self.ready.insert(waiter);
                    }
                }
            }
            out.push((id, p.sealed));
        }
        out
    }

    /// Remove every remaining blob, in id order.
    pub fn drain_residual(&mut self) -> Vec<(Hash, Vec<u8>)> {
        self.waiters.clear();
        self.ready.clear();
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(id, p)| (id, p.sealed))
            .collect()
    }
}
