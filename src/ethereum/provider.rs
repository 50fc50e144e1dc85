use alloy::{
    json_abi::JsonAbi,
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    transports::http::{Client, Http},
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::counter::{ensure_counter_abi, AlloyCounter, CounterChain};
use super::utils::{self, classify_rpc_error, read_failure};
use crate::error::CounterError;

/// Read connection to one node plus an optional signing identity.
#[derive(Debug)]
pub struct ChainConnector {
    rpc_url: String,
    provider: RootProvider<Http<Client>>,
    signer: Option<PrivateKeySigner>,
}

impl ChainConnector {
    /// Building the provider performs no I/O; a bad endpoint only shows up on first use.
    pub fn connect(rpc_url: Option<&str>, private_key: Option<&str>) -> Result<Self, CounterError> {
        let rpc_url = rpc_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                CounterError::Configuration(
                    "RPC_URL is not defined in environment variables".to_string(),
                )
            })?;

        let provider = ProviderBuilder::new().on_http(rpc_url.parse().map_err(|e| {
            CounterError::Configuration(format!("Invalid RPC URL '{}': {}", rpc_url, e))
        })?);
        tracing::info!("Connected to blockchain: {}", rpc_url);

        let signer = match private_key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => {
                let signer = Self::parse_signer(key)?;
                tracing::info!("Wallet loaded: {}", signer.address());
                Some(signer)
            }
            None => {
                tracing::warn!("PRIVATE_KEY not set - read-only mode");
                None
            }
        };

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            provider,
            signer,
        })
    }

    fn parse_signer(private_key: &str) -> Result<PrivateKeySigner, CounterError> {
        let key = private_key
            .strip_prefix("0x")
            .or_else(|| private_key.strip_prefix("0X"))
            .unwrap_or(private_key);

        PrivateKeySigner::from_str(key)
            .map_err(|e| CounterError::Configuration(format!("Invalid private key: {}", e)))
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    pub fn signer_address(&self) -> Result<Address, CounterError> {
        self.signer
            .as_ref()
            .map(|s| s.address())
            .ok_or_else(CounterError::signer_required)
    }

    /// Provider that fills nonce, gas and chain id and signs with the configured key.
    fn signing_provider(
        &self,
    ) -> Result<impl Provider<Http<Client>> + Clone + 'static, CounterError> {
        let signer = self.signer.clone().ok_or_else(CounterError::signer_required)?;
        let url = self.rpc_url.parse().map_err(|e| {
            CounterError::Configuration(format!("Invalid RPC URL '{}': {}", self.rpc_url, e))
        })?;

        Ok(ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(signer))
            .on_http(url))
    }

    /// Binds a Counter handle. Without a signer the handle is read-only,
    /// unless `require_signer` is set, in which case binding fails.
    pub fn bind(
        &self,
        address: Address,
        abi: &JsonAbi,
        require_signer: bool,
    ) -> Result<Arc<dyn CounterChain>, CounterError> {
        ensure_counter_abi(abi)?;

        if self.signer.is_some() {
            let provider = self.signing_provider()?;
            Ok(Arc::new(AlloyCounter::new(address, provider, true)))
        } else if require_signer {
            Err(CounterError::signer_required())
        } else {
            Ok(Arc::new(AlloyCounter::new(
                address,
                self.provider.clone(),
                false,
            )))
        }
    }

    pub async fn block_number(&self) -> Result<u64, CounterError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| read_failure("Failed to get block number", &e.to_string()))
    }

    /// Balance of `address`, formatted in ETH.
    pub async fn balance(&self, address: Address) -> Result<String, CounterError> {
        let balance = self
            .provider
            .get_balance(address)
            .await
            .map_err(|e| read_failure("Failed to get balance", &e.to_string()))?;
        utils::format_eth(balance)
    }

    /// Sends a contract-creation transaction and waits for its receipt.
    /// Returns the created address and the inclusion block.
    pub async fn deploy(
        &self,
        bytecode: Bytes,
        timeout: Duration,
    ) -> Result<(Address, Option<u64>), CounterError> {
        let provider = self.signing_provider()?;
        let tx = TransactionRequest::default().with_deploy_code(bytecode);

        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| classify_rpc_error("Failed to send deployment", &e.to_string()))?;
        let tx_hash = *pending.tx_hash();
        tracing::info!("Deployment transaction sent with hash: 0x{:x}", tx_hash);

        let receipt = tokio::time::timeout(timeout, pending.get_receipt())
            .await
            .map_err(|_| {
                CounterError::ChainCall(format!(
                    "Deployment 0x{:x} was not included within {}s",
                    tx_hash,
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                CounterError::ChainCall(format!(
                    "Deployment 0x{:x} was sent but confirmation failed: {}",
                    tx_hash, e
                ))
            })?;

        if !receipt.status() {
            return Err(CounterError::StateTransitionRejected(format!(
                "Deployment 0x{:x} reverted",
                tx_hash
            )));
        }

        let address = receipt.contract_address.ok_or_else(|| {
            CounterError::ChainCall(format!(
                "Receipt for 0x{:x} carries no contract address",
                tx_hash
            ))
        })?;

        Ok((address, receipt.block_number))
    }
}
