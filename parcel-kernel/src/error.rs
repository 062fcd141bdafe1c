use thiserror::Error;

/// Errors that can occur while sealing or materializing a contract
#[derive(Error, Debug)]
pub enum ContractError {
    #[error("Decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("Invalid hash length: expected 32 bytes, got {0}")]
    InvalidHashLength(usize),

    #[error("Invalid signature entry: {0}")]
    InvalidSignature(String),

    #[error("Embedded sub-contracts nested deeper than {0}")]
    NestingTooDeep(usize),

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Resource limit exceeded: spent {spent} of {limit}")]
    ResourceLimitExceeded { spent: u64, limit: u64 },
}

/// Errors that can occur in Package operations
#[derive(Error, Debug)]
pub enum PackError {
    #[error("the package already has a primary contract")]
    DuplicatePrimary,

    #[error("Missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("Unsupported key encoding: {0}")]
    UnsupportedKeyEncoding(String),

    #[error("Resource limit exceeded: spent {spent} of {limit}")]
    ResourceLimitExceeded { spent: u64, limit: u64 },

    #[error("Unrecognized format: {0}")]
    UnrecognizedFormat(String),

    #[error("Contract error: {0}")]
    Contract(ContractError),
}

impl From<ContractError> for PackError {
    fn from(err: ContractError) -> Self {
        match err {
            ContractError::MissingRequiredField(field) => PackError::MissingRequiredField(field),
            ContractError::ResourceLimitExceeded { spent, limit } => PackError::ResourceLimitExceeded { spent, limit },
            other => PackError::Contract(other),
        }
    }
}
