use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub const DEFAULT_NETWORK: &str = "localhost";

/// Sections or keys missing from a config file keep their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: String,
    pub chain: ChainConfig,
    pub deployments: DeploymentsConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub rpc_url: Option<String>,
    #[serde(skip_serializing)]
    pub private_key: Option<String>,
    /// Upper bound on waiting for a transaction receipt.
    pub tx_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentsConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: DEFAULT_NETWORK.to_string(),
            chain: ChainConfig::default(),
            deployments: DeploymentsConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            private_key: None,
            tx_timeout_secs: 60,
        }
    }
}

impl Default for DeploymentsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("deployments"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        Ok(config)
    }

    /// Load configuration with fallback to default, then apply the environment
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        dotenvy::dotenv().ok();
        config.apply_env_vars(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment variable overrides. `lookup` is `std::env::var` outside tests.
    fn apply_env_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(rpc_url) = non_empty("RPC_URL") {
            self.chain.rpc_url = Some(rpc_url);
        }
        if let Some(private_key) = non_empty("PRIVATE_KEY") {
            self.chain.private_key = Some(private_key);
        }
        if let Some(network) = non_empty("NETWORK") {
            self.network = network;
        }
        if let Some(dir) = non_empty("DEPLOYMENTS_DIR") {
            self.deployments.dir = PathBuf::from(dir);
        }
        if let Some(host) = non_empty("HOST") {
            self.server.host = host;
        }
        if let Some(port) = non_empty("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| anyhow!("Invalid PORT value: '{}'", port))?;
        }
        if let Some(secs) = non_empty("TX_TIMEOUT_SECS") {
            self.chain.tx_timeout_secs = secs
                .parse()
                .map_err(|_| anyhow!("Invalid TX_TIMEOUT_SECS value: '{}'", secs))?;
        }

        Ok(())
    }

    pub fn tx_timeout(&self) -> Duration {
        Duration::from_secs(self.chain.tx_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("counter-service").join("config.toml"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let sample_config = r#"# Counter Service Configuration File

# Selects deployments/Counter-<network>.json
network = "localhost"

[chain]
rpc_url = "http://127.0.0.1:8545"
# Seconds to wait for a transaction to be included before giving up
tx_timeout_secs = 60

[deployments]
dir = "deployments"

[server]
host = "0.0.0.0"
port = 3000

# Environment variables override the values above:
# RPC_URL, PRIVATE_KEY, NETWORK, PORT, HOST, DEPLOYMENTS_DIR, TX_TIMEOUT_SECS
# Keep PRIVATE_KEY in the environment; without it the service is read-only.
"#;
        sample_config.to_string()
    }
}
