//! `deploy` subcommand: publishes the Counter from a compiled artifact and
//! records the deployment for the service to pick up.

use alloy::{json_abi::JsonAbi, primitives::Bytes};
use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use tracing::info;

use crate::{
    config::Config,
    deployment::{DeploymentRecord, DeploymentStore},
    ethereum::{counter::ensure_counter_abi, provider::ChainConnector},
};

/// Hardhat and Foundry both emit `abi` + `bytecode`; Foundry nests the hex under `object`.
#[derive(Debug, Deserialize)]
struct CompiledArtifact {
    abi: JsonAbi,
    bytecode: ArtifactBytecode,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ArtifactBytecode {
    Hex(String),
    Object { object: String },
}

impl ArtifactBytecode {
    fn hex(&self) -> &str {
        match self {
            ArtifactBytecode::Hex(hex) => hex,
            ArtifactBytecode::Object { object } => object,
        }
    }
}

async fn load_artifact(path: &Path) -> Result<CompiledArtifact> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("Failed to read artifact {:?}: {}", path, e))?;
    serde_json::from_str(&content).map_err(|e| anyhow!("Failed to parse artifact {:?}: {}", path, e))
}

fn decode_bytecode(hex_code: &str) -> Result<Bytes> {
    let hex_code = hex_code.trim();
    let hex_code = hex_code.strip_prefix("0x").unwrap_or(hex_code);
    if hex_code.is_empty() {
        return Err(anyhow!(
            "Artifact has no creation bytecode (abstract contract or interface?)"
        ));
    }

    let bytes = hex::decode(hex_code).map_err(|e| anyhow!("Invalid artifact bytecode: {}", e))?;
    Ok(Bytes::from(bytes))
}

pub async fn run(config: &Config, artifact_path: &Path) -> Result<()> {
    let artifact = load_artifact(artifact_path).await?;
    // Nothing is sent or written for an artifact the service could not bind
    ensure_counter_abi(&artifact.abi)?;
    let bytecode = decode_bytecode(artifact.bytecode.hex())?;

    let connector = ChainConnector::connect(
        config.chain.rpc_url.as_deref(),
        config.chain.private_key.as_deref(),
    )?;
    let deployer = connector.signer_address()?;

    info!("Deploying Counter contract to {}...", config.network);
    info!("Deploying with account: {}", deployer);
    info!("Account balance: {}", connector.balance(deployer).await?);

    let (address, block) = connector.deploy(bytecode, config.tx_timeout()).await?;
    info!("Counter deployed to: {}", address);

    let block_number = match block {
        Some(block) => block,
        None => connector.block_number().await?,
    };

    let record = DeploymentRecord {
        network: config.network.clone(),
        contract_address: address,
        deployer,
        deployed_at: Utc::now(),
        block_number,
        abi: artifact.abi,
    };
    let path = DeploymentStore::new(&config.deployments.dir).save(&record)?;
    info!("Deployment info saved to: {}", path.display());

    info!("Verifying deployment...");
    let counter = connector.bind(address, &record.abi, true)?;
    info!("Initial count: {}", counter.count().await?);

    info!("Deployment completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::tests::COUNTER_ABI;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_hardhat_artifact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Counter.json");
        std::fs::write(
            &path,
            format!(
                r#"{{"contractName":"Counter","abi":{},"bytecode":"0x6080604052"}}"#,
                COUNTER_ABI
            ),
        )
        .unwrap();

        let artifact = load_artifact(&path).await.unwrap();
        assert_eq!(artifact.abi.functions().count(), 5);
        let code = decode_bytecode(artifact.bytecode.hex()).unwrap();
        assert_eq!(code.to_vec(), vec![0x60u8, 0x80, 0x60, 0x40, 0x52]);
    }

    #[tokio::test]
    async fn test_load_foundry_artifact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Counter.json");
        std::fs::write(
            &path,
            format!(
                r#"{{"abi":{},"bytecode":{{"object":"0x6080","sourceMap":""}}}}"#,
                COUNTER_ABI
            ),
        )
        .unwrap();

        let artifact = load_artifact(&path).await.unwrap();
        assert_eq!(artifact.bytecode.hex(), "0x6080");
    }

    #[test]
    fn test_empty_bytecode_rejected() {
        assert!(decode_bytecode("0x").is_err());
        assert!(decode_bytecode("").is_err());
        assert!(decode_bytecode("0xzz").is_err());
    }

    #[tokio::test]
    async fn test_deploy_requires_signer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Counter.json");
        std::fs::write(
            &path,
            format!(r#"{{"abi":{},"bytecode":"0x6080"}}"#, COUNTER_ABI),
        )
        .unwrap();

        let mut config = Config::default();
        config.chain.rpc_url = Some("http://127.0.0.1:8545".to_string());
        config.deployments.dir = dir.path().join("deployments");

        let err = run(&config, &path).await.unwrap_err();
        assert!(err.to_string().contains("signer required"));
        assert!(!config.deployments.dir.exists());
    }

    #[tokio::test]
    async fn test_deploy_rejects_foreign_abi() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Token.json");
        std::fs::write(
            &path,
            r#"{"abi":[{"type":"function","name":"balanceOf","inputs":[{"name":"owner","type":"address"}],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"}],"bytecode":"0x6080"}"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.chain.rpc_url = Some("http://127.0.0.1:8545".to_string());
        config.chain.private_key = Some(
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".to_string(),
        );
        config.deployments.dir = dir.path().join("deployments");

        let err = run(&config, &path).await.unwrap_err();
        assert!(err.to_string().contains("does not describe a Counter"));
        assert!(!config.deployments.dir.exists());
    }
}
