mod config;
mod deploy;
mod deployment;
mod error;
mod ethereum;
mod server;
mod service;

use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use config::Config;
use deployment::DeploymentStore;
use ethereum::provider::ChainConnector;
use server::AppState;
use service::CounterService;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

fn cli() -> Command {
    Command::new("counter-service")
        .version("0.1.0")
        .about("HTTP backend for an on-chain Counter contract")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("network")
                .short('n')
                .long("network")
                .value_name("NETWORK")
                .global(true)
                .help("Network whose deployment record is used (default: localhost)"),
        )
        .arg(
            Arg::new("rpc-url")
                .short('r')
                .long("rpc-url")
                .value_name("URL")
                .global(true)
                .help("RPC endpoint URL"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a sample configuration file and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-path")
                .long("config-path")
                .help("Print the default configuration file path and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("serve").about("Serve the counter HTTP API (default)").arg(
                Arg::new("port")
                    .short('p')
                    .long("port")
                    .value_name("PORT")
                    .value_parser(clap::value_parser!(u16))
                    .help("Port to listen on"),
            ),
        )
        .subcommand(
            Command::new("deploy")
                .about("Deploy the Counter contract and write its deployment record")
                .arg(
                    Arg::new("artifact")
                        .short('a')
                        .long("artifact")
                        .value_name("FILE")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Compiled contract artifact (Hardhat or Foundry JSON)"),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let matches = cli().get_matches();

    // Handle special commands first
    if matches.get_flag("generate-config") {
        println!("{}", Config::generate_sample());
        return Ok(());
    }

    if matches.get_flag("config-path") {
        match Config::default_config_path() {
            Ok(path) => {
                println!("{}", path.display());
                return Ok(());
            }
            Err(e) => {
                error!("Could not determine default config path: {}", e);
                return Err(e);
            }
        }
    }

    let config = load_config(&matches).await?;

    match matches.subcommand() {
        Some(("deploy", sub)) => {
            let artifact = sub
                .get_one::<PathBuf>("artifact")
                .ok_or_else(|| anyhow::anyhow!("--artifact is required"))?;
            deploy::run(&config, artifact).await
        }
        Some(("serve", sub)) => {
            let mut config = config;
            if let Some(port) = sub.get_one::<u16>("port") {
                config.server.port = *port;
            }
            serve(config).await
        }
        _ => serve(config).await,
    }
}

async fn load_config(matches: &ArgMatches) -> Result<Config> {
    let config_path = matches.get_one::<String>("config").map(|s| s.as_str());
    let mut config = Config::load_or_default(config_path).await?;

    // Override with command line arguments
    if let Some(network) = matches.get_one::<String>("network") {
        config.network = network.clone();
    }
    if let Some(rpc_url) = matches.get_one::<String>("rpc-url") {
        config.chain.rpc_url = Some(rpc_url.clone());
    }

    Ok(config)
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting Counter service");
    info!("Network: {}", config.network);

    // Missing RPC_URL is fatal here rather than per request
    let connector = ChainConnector::connect(
        config.chain.rpc_url.as_deref(),
        config.chain.private_key.as_deref(),
    )?;

    info!("Write operations allowed: {}", connector.has_signer());

    match connector.block_number().await {
        Ok(block) => info!("Chain head at block {}", block),
        Err(e) => warn!("Node not reachable yet: {}", e),
    }

    let store = DeploymentStore::new(&config.deployments.dir);
    let counter =
        CounterService::initialize(&connector, &store, &config.network, config.tx_timeout()).await;
    if !counter.is_loaded() {
        warn!("Serving in degraded mode: counter endpoints answer 400 until a deployment record exists and the service restarts");
    }

    let state = AppState {
        counter: Arc::new(counter),
    };

    if let Err(e) = server::start_server(&config.bind_addr(), state).await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}
