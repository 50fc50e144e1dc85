//! Per-network deployment records written by the deploy tool and read at startup.

use alloy::{json_abi::JsonAbi, primitives::Address};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tokio::fs;

const CONTRACT_NAME: &str = "Counter";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub network: String,
    pub contract_address: Address,
    pub deployer: Address,
    pub deployed_at: DateTime<Utc>,
    pub block_number: u64,
    pub abi: JsonAbi,
}

/// Result of looking up a network's record. A missing file is not an error.
#[derive(Debug)]
pub enum LoadOutcome {
    Deployed(DeploymentRecord),
    NotDeployed { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct DeploymentStore {
    dir: PathBuf,
}

impl DeploymentStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn record_path(&self, network: &str) -> PathBuf {
        self.dir.join(format!("{}-{}.json", CONTRACT_NAME, network))
    }

    pub async fn load(&self, network: &str) -> Result<LoadOutcome> {
        let path = self.record_path(network);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LoadOutcome::NotDeployed { path });
            }
            Err(e) => return Err(anyhow!("Failed to read deployment file {:?}: {}", path, e)),
        };

        let record: DeploymentRecord = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse deployment file {:?}: {}", path, e))?;

        if record.network != network {
            tracing::warn!(
                "Deployment file {:?} was recorded for network '{}', loading it for '{}'",
                path,
                record.network,
                network
            );
        }

        Ok(LoadOutcome::Deployed(record))
    }

    /// Write the record to a temp file beside the target, then rename it into place.
    pub fn save(&self, record: &DeploymentRecord) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create deployments directory {:?}", self.dir))?;

        let path = self.record_path(&record.network);
        let content = serde_json::to_string_pretty(record)
            .map_err(|e| anyhow!("Failed to serialize deployment record: {}", e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("Failed to create temp file in {:?}", self.dir))?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)
            .map_err(|e| anyhow!("Failed to move deployment record into {:?}: {}", path, e))?;

        tracing::debug!("Saved deployment record to {:?}", path);
        Ok(path)
    }
}
