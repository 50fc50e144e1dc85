//! Counter binding: lifecycle of the bound contract and normalization of
//! transaction results.

use alloy::primitives::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::{
    deployment::{DeploymentStore, LoadOutcome},
    error::CounterError,
    ethereum::{
        counter::{CounterCall, CounterChain, InclusionReceipt},
        provider::ChainConnector,
        utils, ContractInfo, TransactionOutcome,
    },
};

enum BindingState {
    /// Terminal until restart; every operation fails with `NotInitialized`.
    Unloaded { reason: String },
    Loaded {
        address: Address,
        chain: Arc<dyn CounterChain>,
    },
}

pub struct CounterService {
    network: String,
    tx_timeout: Duration,
    state: BindingState,
}

impl CounterService {
    pub fn unloaded(network: impl Into<String>, reason: impl Into<String>, tx_timeout: Duration) -> Self {
        Self {
            network: network.into(),
            tx_timeout,
            state: BindingState::Unloaded {
                reason: reason.into(),
            },
        }
    }

    pub fn loaded(
        network: impl Into<String>,
        chain: Arc<dyn CounterChain>,
        tx_timeout: Duration,
    ) -> Self {
        Self {
            network: network.into(),
            tx_timeout,
            state: BindingState::Loaded {
                address: chain.address(),
                chain,
            },
        }
    }

    /// Reads the network's deployment record and binds it. Never fails: any
    /// problem leaves the service unloaded and is logged.
    pub async fn initialize(
        connector: &ChainConnector,
        store: &DeploymentStore,
        network: &str,
        tx_timeout: Duration,
    ) -> Self {
        let record = match store.load(network).await {
            Ok(LoadOutcome::Deployed(record)) => record,
            Ok(LoadOutcome::NotDeployed { path }) => {
                warn!("Counter deployment file not found: {:?}", path);
                warn!("Please deploy the contract first");
                return Self::unloaded(
                    network,
                    format!("no deployment record at {}", path.display()),
                    tx_timeout,
                );
            }
            Err(e) => {
                error!("Failed to load Counter contract: {}", e);
                return Self::unloaded(network, e.to_string(), tx_timeout);
            }
        };

        match connector.bind(record.contract_address, &record.abi, false) {
            Ok(chain) => {
                info!(
                    "Counter contract loaded: {} (network {}, deployed at block {})",
                    record.contract_address, network, record.block_number
                );
                if !chain.can_sign() {
                    warn!("Counter bound read-only, state-changing calls will be refused");
                }
                Self::loaded(network, chain, tx_timeout)
            }
            Err(e) => {
                error!("Failed to load Counter contract: {}", e);
                Self::unloaded(network, e.to_string(), tx_timeout)
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, BindingState::Loaded { .. })
    }

    fn chain(&self) -> Result<(&Address, &Arc<dyn CounterChain>), CounterError> {
        match &self.state {
            BindingState::Loaded { address, chain } => Ok((address, chain)),
            BindingState::Unloaded { reason } => Err(CounterError::NotInitialized(reason.clone())),
        }
    }

    pub async fn read_count(&self) -> Result<u64, CounterError> {
        let (_, chain) = self.chain()?;
        let count = chain.count().await?;
        u64::try_from(count).map_err(|_| {
            CounterError::ChainCall(format!("Count {} does not fit in a 64-bit integer", count))
        })
    }

    pub async fn increment(&self) -> Result<TransactionOutcome, CounterError> {
        self.transact(CounterCall::Increment).await
    }

    /// Fails with `StateTransitionRejected` when the count is already zero.
    pub async fn decrement(&self) -> Result<TransactionOutcome, CounterError> {
        self.transact(CounterCall::Decrement).await
    }

    pub async fn reset(&self) -> Result<TransactionOutcome, CounterError> {
        self.transact(CounterCall::Reset).await
    }

    async fn transact(&self, call: CounterCall) -> Result<TransactionOutcome, CounterError> {
        let (_, chain) = self.chain()?;
        if !chain.can_sign() {
            return Err(CounterError::signer_required());
        }

        let receipt = tokio::time::timeout(self.tx_timeout, chain.submit(call))
            .await
            .map_err(|_| {
                CounterError::ChainCall(format!(
                    "{} transaction was not included within {}s",
                    call,
                    self.tx_timeout.as_secs()
                ))
            })??;

        if !receipt.succeeded {
            return Err(CounterError::StateTransitionRejected(format!(
                "{} transaction 0x{:x} reverted",
                call, receipt.tx_hash
            )));
        }

        let new_count = self.read_count().await?;
        info!(
            "{} included in 0x{:x} (block {:?}), count is now {}",
            call, receipt.tx_hash, receipt.block_number, new_count
        );
        if let Some(emitted) = interleaved_write(receipt.emitted_count, new_count) {
            warn!(
                "{} in 0x{:x} set the count to {}, another write landed before the re-read",
                call, receipt.tx_hash, emitted
            );
        }
        normalize(&receipt, new_count)
    }

    /// Local state only, no chain call.
    pub fn contract_info(&self) -> Result<ContractInfo, CounterError> {
        let (address, _) = self.chain()?;
        Ok(ContractInfo {
            address: address.to_checksum(None),
            network: self.network.clone(),
        })
    }
}

/// The emitted count when it disagrees with the re-read one.
fn interleaved_write(emitted: Option<U256>, reread: u64) -> Option<U256> {
    emitted.filter(|count| *count != U256::from(reread))
}

fn normalize(receipt: &InclusionReceipt, new_count: u64) -> Result<TransactionOutcome, CounterError> {
    let gas_cost: U256 = receipt
        .gas_used
        .checked_mul(receipt.effective_gas_price)
        .ok_or_else(|| CounterError::ChainCall("Gas cost overflowed 256 bits".to_string()))?;

    Ok(TransactionOutcome {
        tx_hash: format!("0x{:x}", receipt.tx_hash),
        new_count,
        gas_used: receipt.gas_used.to_string(),
        gas_price: utils::format_gwei(receipt.effective_gas_price)?,
        gas_cost_eth: utils::format_eth(gas_cost)?,
    })
}
