use alloy::primitives::{
    utils::{format_units, UnitsError},
    U256,
};

use crate::error::CounterError;

/// Formats a base-unit amount at `decimals` places, trimming trailing zeros
/// down to a single fractional digit ("1.0", "0.000021"). Integer arithmetic only.
pub fn format_fixed(amount: U256, decimals: u8) -> Result<String, UnitsError> {
    let formatted = format_units(amount, decimals)?;
    Ok(trim_fraction(formatted))
}

fn trim_fraction(mut formatted: String) -> String {
    if let Some(dot) = formatted.find('.') {
        let keep = formatted.trim_end_matches('0').len().max(dot + 2);
        formatted.truncate(keep);
    } else {
        formatted.push_str(".0");
    }
    formatted
}

/// Gas price in gwei with unit suffix.
pub fn format_gwei(wei: U256) -> Result<String, CounterError> {
    format_fixed(wei, 9)
        .map(|s| format!("{} gwei", s))
        .map_err(|e| CounterError::ChainCall(format!("Failed to format gas price: {}", e)))
}

/// Native currency amount in ETH with unit suffix.
pub fn format_eth(wei: U256) -> Result<String, CounterError> {
    format_fixed(wei, 18)
        .map(|s| format!("{} ETH", s))
        .map_err(|e| CounterError::ChainCall(format!("Failed to format gas cost: {}", e)))
}

/// True when a node error message describes a contract revert.
pub fn is_revert(error: &str) -> bool {
    error.to_lowercase().contains("revert")
}

/// Maps a failed state-changing call onto the error taxonomy.
pub fn classify_rpc_error(context: &str, error: &str) -> CounterError {
    if is_revert(error) {
        CounterError::StateTransitionRejected(format!("{}: {}", context, error))
    } else {
        read_failure(context, error)
    }
}

/// Failed read. Always a `ChainCall`, even when the node reports a revert,
/// since no state transition was attempted.
pub fn read_failure(context: &str, error: &str) -> CounterError {
    CounterError::ChainCall(format!("{}: {}", context, interpret_rpc_error(error)))
}

/// Creates user-friendly error messages for common RPC errors
pub fn interpret_rpc_error(error: &str) -> String {
    if error.contains("insufficient funds") {
        "Insufficient funds to cover gas costs. Make sure the signing account holds enough ETH for gas fees.".to_string()
    } else if error.contains("nonce too low") {
        "Nonce too low. Another transaction from this account was already mined with this nonce."
            .to_string()
    } else if error.contains("replacement transaction underpriced") {
        "Gas price too low to replace a pending transaction from this account.".to_string()
    } else if error.contains("connection refused") || error.contains("network unreachable") {
        "Cannot connect to RPC endpoint. Check RPC_URL and that the node is running.".to_string()
    } else if error.contains("timeout") || error.contains("timed out") {
        "Request timed out. The RPC endpoint may be overloaded or unreachable.".to_string()
    } else {
        format!("RPC error: {}", error)
    }
}
