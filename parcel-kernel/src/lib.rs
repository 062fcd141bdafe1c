//! Parcel Kernel
//!
//! Transaction packages: a primary contract bundled with the contracts it
//! revokes or creates, serialized as one self-contained blob.
//!
//! - **Contract**: sealed, signed, content-addressed unit with roles
//! - **Package**: primary contract + reference window + trusted keys
//! - **Reconstruction**: dependency-ordered materialization of unpacked blobs
//! - **ResourceMeter**: per-call ceiling on materialization cost

pub mod config;
pub mod contract;
pub mod dependencies;
pub mod error;
pub mod meter;
pub mod package;
pub mod proto;

pub use config::{PackConfig, DEFAULT_COST_LIMIT};
pub use contract::{Contract, ContractBuilder, ReferenceMap, SubItem};
pub use dependencies::{ContractDependencies, DescriptorTable};
pub use error::{ContractError, PackError};
pub use meter::ResourceMeter;
pub use package::Package;

// Re-exports from the model
pub use parcel_model::{AnonymousId, Hash, PubKey, Role, SignerKey};
