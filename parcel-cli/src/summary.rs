//! Serializable view of an unpacked package

use parcel_kernel::{Contract, Package};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Serialize)]
pub struct ContractSummary {
    pub id: String,
    pub name: String,
    pub version: u32,
    pub cost: u64,
    pub signers: Vec<String>,
    pub roles: Vec<String>,
    /// Sub-contracts declared by hash but absent from the package.
    pub missing: Vec<String>,
}

impl ContractSummary {
    pub fn new(contract: &Contract) -> Self {
        Self {
            id: contract.id().to_string(),
            name: contract.name().to_string(),
            version: contract.version(),
            cost: contract.cost(),
            signers: contract.signers().iter().map(ToString::to_string).collect(),
            roles: contract.roles().map(|r| r.name().to_string()).collect(),
            missing: contract
                .revoking()
                .iter()
                .chain(contract.new_items())
                .filter(|item| !item.is_resolved())
                .map(|item| item.id().to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PackageSummary {
    pub contract: Option<ContractSummary>,
    pub references: Vec<ContractSummary>,
    pub keys: Vec<String>,
    pub reconstructed: bool,
    pub residual: Vec<String>,
}

impl PackageSummary {
    pub fn new(package: &Package) -> Self {
        Self {
            contract: package.contract().as_deref().map(ContractSummary::new),
            references: package.references().values().map(|c| ContractSummary::new(c)).collect(),
            keys: package.keys().iter().map(ToString::to_string).collect(),
            reconstructed: package.is_reconstructed(),
            residual: package.residual_ids().iter().map(ToString::to_string).collect(),
        }
    }

    /// Everything `verify` objects to: unresolved links and residual blobs.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let missing: BTreeSet<&String> = self
            .contract
            .iter()
            .chain(&self.references)
            .flat_map(|c| &c.missing)
            .collect();
        for id in missing {
            problems.push(format!("missing sub-contract {}", id));
        }
        for id in &self.residual {
            problems.push(format!("reference {} materialized out of dependency order", id));
        }
        problems
    }
}
