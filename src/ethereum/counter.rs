use alloy::{
    json_abi::JsonAbi,
    primitives::{Address, B256, U256},
    providers::Provider,
    sol,
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use std::fmt;

use super::utils::{classify_rpc_error, read_failure};
use crate::error::CounterError;

sol! {
    #[sol(rpc)]
    contract Counter {
        event CountChanged(uint256 newCount, address indexed changedBy);

        function getCount() external view returns (uint256 count);
        function increment() external;
        function decrement() external;
        function reset() external;
    }
}

/// Methods the service calls; a deployment ABI missing any of them is unusable.
const REQUIRED_FUNCTIONS: [&str; 4] = ["getCount", "increment", "decrement", "reset"];

pub fn ensure_counter_abi(abi: &JsonAbi) -> Result<(), CounterError> {
    let missing: Vec<&str> = REQUIRED_FUNCTIONS
        .iter()
        .copied()
        .filter(|name| abi.function(name).map_or(true, |f| f.is_empty()))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(CounterError::Configuration(format!(
            "Deployment ABI does not describe a Counter contract, missing: {}",
            missing.join(", ")
        )))
    }
}

/// State-changing calls the contract exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterCall {
    Increment,
    Decrement,
    Reset,
}

impl fmt::Display for CounterCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CounterCall::Increment => "increment",
            CounterCall::Decrement => "decrement",
            CounterCall::Reset => "reset",
        };
        f.write_str(name)
    }
}

/// What the binding keeps from a mined transaction.
#[derive(Debug, Clone)]
pub struct InclusionReceipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: U256,
    pub effective_gas_price: U256,
    pub succeeded: bool,
    /// `newCount` from the `CountChanged` event, if the transaction emitted one.
    pub emitted_count: Option<U256>,
}

/// Typed handle to a deployed Counter.
#[async_trait]
pub trait CounterChain: Send + Sync {
    fn address(&self) -> Address;

    /// Whether the handle was bound with a signer.
    fn can_sign(&self) -> bool;

    async fn count(&self) -> Result<U256, CounterError>;

    /// Submits `call` and waits until it is included in a block.
    async fn submit(&self, call: CounterCall) -> Result<InclusionReceipt, CounterError>;
}

pub struct AlloyCounter<P> {
    instance: Counter::CounterInstance<Http<Client>, P>,
    can_sign: bool,
}

impl<P> AlloyCounter<P>
where
    P: Provider<Http<Client>> + Clone,
{
    pub fn new(address: Address, provider: P, can_sign: bool) -> Self {
        Self {
            instance: Counter::new(address, provider),
            can_sign,
        }
    }
}

#[async_trait]
impl<P> CounterChain for AlloyCounter<P>
where
    P: Provider<Http<Client>> + Clone + 'static,
{
    fn address(&self) -> Address {
        *self.instance.address()
    }

    fn can_sign(&self) -> bool {
        self.can_sign
    }

    async fn count(&self) -> Result<U256, CounterError> {
        let Counter::getCountReturn { count } = self
            .instance
            .getCount()
            .call()
            .await
            .map_err(|e| read_failure("Failed to get count", &e.to_string()))?;
        Ok(count)
    }

    async fn submit(&self, call: CounterCall) -> Result<InclusionReceipt, CounterError> {
        let sent = match call {
            CounterCall::Increment => self.instance.increment().send().await,
            CounterCall::Decrement => self.instance.decrement().send().await,
            CounterCall::Reset => self.instance.reset().send().await,
        };
        let pending = sent.map_err(|e| {
            classify_rpc_error(&format!("Failed to send {} transaction", call), &e.to_string())
        })?;

        let tx_hash = *pending.tx_hash();
        tracing::info!("Sent {} transaction 0x{:x}, waiting for receipt", call, tx_hash);

        let receipt = pending.get_receipt().await.map_err(|e| {
            CounterError::ChainCall(format!(
                "Transaction 0x{:x} was sent but confirmation failed: {}",
                tx_hash, e
            ))
        })?;

        tracing::debug!(
            "{} transaction 0x{:x} included in block {:?}",
            call,
            tx_hash,
            receipt.block_number
        );

        let emitted_count = receipt
            .inner
            .logs()
            .iter()
            .find_map(|log| log.log_decode::<Counter::CountChanged>().ok())
            .map(|event| event.inner.data.newCount);

        Ok(InclusionReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            gas_used: U256::from(receipt.gas_used),
            effective_gas_price: U256::from(receipt.effective_gas_price),
            succeeded: receipt.status(),
            emitted_count,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::tests::COUNTER_ABI;

    #[test]
    fn test_counter_abi_accepted() {
        let abi: JsonAbi = serde_json::from_str(COUNTER_ABI).unwrap();
        assert!(ensure_counter_abi(&abi).is_ok());
    }

    #[test]
    fn test_foreign_abi_rejected() {
        let abi: JsonAbi = serde_json::from_str(
            r#"[{"type":"function","name":"balanceOf","inputs":[{"name":"owner","type":"address"}],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"}]"#,
        )
        .unwrap();

        match ensure_counter_abi(&abi) {
            Err(CounterError::Configuration(msg)) => {
                assert!(msg.contains("getCount"));
                assert!(msg.contains("reset"));
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_call_names_match_contract_methods() {
        assert_eq!(CounterCall::Increment.to_string(), "increment");
        assert_eq!(CounterCall::Decrement.to_string(), "decrement");
        assert_eq!(CounterCall::Reset.to_string(), "reset");
    }
}
