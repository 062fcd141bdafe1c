//! Package configuration

/// Default ceiling for the cost of one reconstruction call.
pub const DEFAULT_COST_LIMIT: u64 = 200_000;

/// Settings applied when packing and reconstructing packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackConfig {
    /// Ceiling for the resource meter of each reconstruction call.
    pub cost_limit: u64,
}

impl PackConfig {
    pub fn with_cost_limit(mut self, cost_limit: u64) -> Self {
        self.cost_limit = cost_limit;
        self
    }
}

impl Default for PackConfig {
    fn default() -> Self {
        Self { cost_limit: DEFAULT_COST_LIMIT }
    }
}
