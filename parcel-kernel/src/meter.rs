//! Call-scoped resource meter
//!
//! A reconstruction call owns one `ResourceMeter`, seeded from
//! `PackConfig::cost_limit`, and threads it through every contract it
//! materializes. Each blob is charged for its size before it is decoded and
//! for its signatures before any of them is verified, so an over-budget blob
//! is rejected before the expensive work starts. The meter is a plain value,
//! so concurrent reconstructions never share a budget.

use crate::error::ContractError;

/// Fixed cost of materializing any contract.
pub const BASE_CONTRACT_COST: u64 = 10;

/// Cost per started KiB of sealed bytes.
pub const COST_PER_KIB: u64 = 1;

/// Cost of checking one signature.
pub const SIGNATURE_CHECK_COST: u64 = 5;

/// Cost charged before a blob of `sealed_len` bytes is decoded.
pub fn decode_cost(sealed_len: usize) -> u64 {
    BASE_CONTRACT_COST + (sealed_len as u64).div_ceil(1024) * COST_PER_KIB
}

/// Cost charged before `signatures` signatures are verified.
pub fn signature_cost(signatures: usize) -> u64 {
    (signatures as u64).saturating_mul(SIGNATURE_CHECK_COST)
}

#[derive(Debug, Clone)]
pub struct ResourceMeter {
    limit: u64,
    spent: u64,
}

impl ResourceMeter {
    pub fn new(limit: u64) -> Self {
        Self { limit, spent: 0 }
    }

    /// A meter that never trips, for contracts sealed in this process.
    pub fn unlimited() -> Self {
        Self::new(u64::MAX)
    }

    /// Add `cost` to the running total, failing once it exceeds the limit.
    pub fn charge(&mut self, cost: u64) -> Result<(), ContractError> {
        self.spent = self.spent.saturating_add(cost);
        if self.spent > self.limit {
            return Err(ContractError::ResourceLimitExceeded { spent: self.spent, limit: self.limit });
        }
        Ok(())
    }

    pub fn spent(&self) -> u64 {
        self.spent
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.spent)
    }
}
