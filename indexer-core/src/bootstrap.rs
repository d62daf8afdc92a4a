//! Process wiring: CLI, configuration, logging, store, chain client, the
//! version row and finally the engine itself.

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{info, warn};

use crate::build_info::read_build_info;
use crate::chain::ChainClient;
use crate::config::{BaseConfig, ChainConfig};
use crate::database::Database;
use crate::entities::{ChainBlock, Entity, Version};
use crate::error::{IndexerError, Result};
use crate::indexer::Indexer;
use crate::logging;

#[derive(Debug, Parser)]
#[command(about = "Ledger history indexer", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "CONFIG_FILE", default_value = "config.toml")]
    config: PathBuf,
}

/// Wire everything together and drive the engine to completion.
///
/// `new_chain_client` builds the chain adapter from the `[blockchain]`
/// config section. Returns `Ok` on clean end-block termination or shutdown
/// signal; any error is fatal and the binary should exit non-zero.
pub async fn run<C, CC, B, T>(new_chain_client: impl FnOnce(&CC) -> Result<C>) -> Result<()>
where
    C: ChainClient<B, T>,
    CC: ChainConfig,
    B: ChainBlock + Entity,
    T: Entity,
{
    let cli = Cli::parse();

    let (mut base, mut chain_config) = load_config::<CC>(&cli.config)?;
    base.apply_env_overrides();
    chain_config.apply_env_overrides();
    base.validate()?;

    let _log_guard = logging::init(&base.logger);

    run_with(&base, &chain_config, new_chain_client).await
}

/// [`run`] without CLI parsing and logging setup, for callers that already
/// hold a validated configuration.
pub async fn run_with<C, CC, B, T>(
    config: &BaseConfig,
    chain_config: &CC,
    new_chain_client: impl FnOnce(&CC) -> Result<C>,
) -> Result<()>
where
    C: ChainClient<B, T>,
    CC: ChainConfig,
    B: ChainBlock + Entity,
    T: Entity,
{
    let db = Database::<B, T>::new(&config.db).await?;
    let chain = new_chain_client(chain_config)?;

    save_version(&db, &chain, config).await?;

    let mut indexer = Indexer::new(config, db, chain);

    tokio::select! {
        result = indexer.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
    }
}

fn load_config<CC: ChainConfig>(path: &Path) -> Result<(BaseConfig, CC)> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        IndexerError::Config(format!("cannot read config file {}: {err}", path.display()))
    })?;
    let value: toml::Value = toml::from_str(&text).map_err(|err| {
        IndexerError::Config(format!("invalid config file {}: {err}", path.display()))
    })?;

    let base: BaseConfig = value
        .clone()
        .try_into()
        .map_err(|err| IndexerError::Config(err.to_string()))?;

    let chain_config = match value.get("blockchain") {
        Some(section) => section.clone().try_into().map_err(|err| {
            IndexerError::Config(format!("invalid [blockchain] section: {err}"))
        })?,
        None => CC::default(),
    };

    Ok((base, chain_config))
}

/// Overwrite the singleton version row. Missing build metadata or an
/// unreachable node only warn; the row is written regardless.
async fn save_version<C, B, T>(db: &Database<B, T>, chain: &C, config: &BaseConfig) -> Result<()>
where
    C: ChainClient<B, T>,
    B: ChainBlock + Entity,
    T: Entity,
{
    let mut version = Version::initial();
    version.num_confirmations = config.indexer.confirmations;
    version.history_seconds = config.db.history_drop;

    match read_build_info(".") {
        Ok(build) => {
            version.git_tag = build.git_tag;
            version.git_hash = build.git_hash;
            version.build_date = build.build_date;
        }
        Err(err) => warn!("failed to read the project build info: {err}"),
    }

    match chain.get_server_info().await {
        Ok(node_version) => version.node_version = node_version,
        Err(err) => warn!("failed to fetch blockchain node info: {err}"),
    }

    db.save_version(&version).await
}
