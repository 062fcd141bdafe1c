//! Package reconstruction from an unordered batch of sealed blobs
//!
//! Reference blobs arrive in no particular order, while materializing a
//! contract needs its hash-referenced sub-contracts already in the map. The
//! batch is drained in rounds: each round materializes every blob whose
//! dependencies are satisfied, until a round makes no progress. Whatever is
//! left (cycles, links into other stalled blobs) goes through the residual
//! fallback. The primary contract is materialized last.
//!
//! One `ResourceMeter` spans the whole call. Descriptor extraction and every
//! materialization charge it before doing the work; the first charge past
//! the ceiling aborts the call and nothing is returned.

use super::PackState;
use crate::config::PackConfig;
use crate::contract::{Contract, ReferenceMap};
use crate::dependencies::{ContractDependencies, DescriptorTable};
use crate::error::PackError;
use crate::meter::{decode_cost, ResourceMeter};
use crate::proto::{key_entry, KeyEntry, PackageEnvelope};
use parcel_model::{Hash, PubKey};
use std::collections::BTreeSet;
use tracing::{debug, warn};

pub(super) fn reconstruct(envelope: PackageEnvelope, config: &PackConfig) -> Result<PackState, PackError> {
    if envelope.contract.is_empty() {
        return Err(PackError::MissingRequiredField("contract"));
    }

    let mut meter = ResourceMeter::new(config.cost_limit);
    let mut references = ReferenceMap::new();

    let mut table = DescriptorTable::new();
    for sealed in envelope.references {
        meter.charge(decode_cost(sealed.len()))?;
        let descriptor = ContractDependencies::from_sealed(&sealed)?;
        table.insert(descriptor, sealed);
    }

    let mut round = 0usize;
    loop {
        let batch = table.next_round();
        if batch.is_empty() {
            break;
        }
        round += 1;
        debug!(round, ready = batch.len(), pending = table.len(), "Reconstruction round");
        for (_, sealed) in batch {
            materialize(&sealed, &mut references, &mut meter)?;
        }
    }

    // Residual fallback: the rounds stalled on these blobs. They are
    // materialized anyway, in id order, and any link that still is not in
    // the map stays a `SubItem::Missing`.
    let residual = table.drain_residual();
    let mut residual_ids = BTreeSet::new();
    if !residual.is_empty() {
        warn!(count = residual.len(), "Reference graph stalled, materializing the rest best-effort");
    }
    for (id, sealed) in residual {
        materialize(&sealed, &mut references, &mut meter)?;
        residual_ids.insert(id);
    }

    let keys = decode_keys(envelope.keys)?;

    let contract = Contract::from_sealed_metered(&envelope.contract, &references, &mut meter)?;

    debug!(
        contract = %contract.id().short(),
        references = references.len(),
        rounds = round,
        spent = meter.spent(),
        limit = meter.limit(),
        "Package reconstructed"
    );

    Ok(PackState {
        contract: Some(contract),
        references,
        keys,
        packed: None,
        reconstructed: false,
        residual: residual_ids,
    })
}

fn materialize(sealed: &[u8], references: &mut ReferenceMap, meter: &mut ResourceMeter) -> Result<Hash, PackError> {
    let contract = Contract::from_sealed_metered(sealed, references, meter)?;
    let id = contract.id();
    references.insert(id, contract);
    Ok(id)
}

/// Each entry must carry a public key, raw or wrapped.
fn decode_keys(entries: Vec<KeyEntry>) -> Result<BTreeSet<PubKey>, PackError> {
    entries
        .into_iter()
        .map(|entry| {
            let bytes = match entry.encoding {
                Some(key_entry::Encoding::Raw(bytes)) => bytes,
                Some(key_entry::Encoding::Wrapped(wrapped)) => wrapped.key,
                None => {
                    return Err(PackError::UnsupportedKeyEncoding("entry carries no key".to_string()))
                }
            };
            PubKey::try_from(bytes)
                .map_err(|b| PackError::UnsupportedKeyEncoding(format!("{}-byte key", b.len())))
        })
        .collect()
}
