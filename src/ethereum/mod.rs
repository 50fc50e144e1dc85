pub mod counter;
pub mod provider;
pub mod utils;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractInfo {
    pub address: String,
    pub network: String,
}

/// Normalized result of one state-changing call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutcome {
    pub tx_hash: String,
    pub new_count: u64,
    /// Decimal gas units.
    pub gas_used: String,
    /// Effective gas price, e.g. "1.5 gwei".
    pub gas_price: String,
    /// `gas_used * gas_price`, e.g. "0.000021 ETH".
    pub gas_cost_eth: String,
}
