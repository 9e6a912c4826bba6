use crate::config::{IdentityConfig, NodeConfig};
use crate::service::{pending_payouts, RewardService};
use anyhow::{Context, Result};
use attest_storage::FileRewardStorage;
use attest_types::TransactionId;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "./attest-config.toml";

#[derive(Parser)]
#[command(name = "attest-node")]
#[command(about = "Forum attestation reward engine", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the retry and funds-sweep loops until interrupted
    Start {
        /// Data directory for storage
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// JSON ledger fixture to preload
        #[arg(long)]
        ledger_fixture: Option<PathBuf>,
    },

    /// Write a default configuration file
    Init {
        /// Output directory for configuration
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Node name, also seeds the development identity
        #[arg(long)]
        name: Option<String>,
    },

    /// Run the reward flow for one recorded transaction
    Issue {
        transaction_id: u64,
    },

    /// List rewards that have not been paid yet
    Pending,
}

impl Cli {
    /// Explicit `--config`, else the default file if present.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(|| {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.exists().then_some(default)
        })
    }

    pub fn load_config(&self) -> Result<NodeConfig> {
        NodeConfig::load(self.config_path().as_deref())
    }
}

pub async fn run_start(
    mut config: NodeConfig,
    data_dir: Option<PathBuf>,
    ledger_fixture: Option<PathBuf>,
) -> Result<()> {
    // CLI arguments override file and environment
    if let Some(data_dir) = data_dir {
        config.node.data_dir = data_dir;
    }
    if let Some(fixture) = ledger_fixture {
        config.node.ledger_fixture = Some(fixture);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        name = %config.node.name,
        data_dir = ?config.node.data_dir,
        attestor = %config.identity.attestor_address,
        "🚀 Starting attestation reward node"
    );

    let service = RewardService::new(&config).await?;
    let retry_handle = service.spawn_retry_loop();
    let sweep_handle = service.spawn_sweep_loop();

    info!(
        retry_interval_secs = config.scheduler.retry_interval_secs,
        sweep_interval_secs = config.scheduler.sweep_interval_secs,
        "✅ Node ready"
    );

    tokio::signal::ctrl_c().await?;
    info!("🛑 Shutting down gracefully");

    retry_handle.abort();
    sweep_handle.abort();
    Ok(())
}

pub fn run_init(output: &Path, name: Option<String>) -> Result<PathBuf> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("creating {}", output.display()))?;

    let mut config = NodeConfig::default();
    if let Some(name) = name {
        config.identity = IdentityConfig::dev(&name);
        config.node.name = name;
    }

    let path = output.join("attest-config.toml");
    config.save_to_file(&path)?;
    info!(path = %path.display(), name = %config.node.name, "✨ Configuration written");
    Ok(path)
}

pub async fn run_issue(config: NodeConfig, transaction_id: u64) -> Result<()> {
    let service = RewardService::new(&config).await?;
    let report = service
        .engine
        .issue_rewards(TransactionId(transaction_id))
        .await?;

    println!("transaction {}", report.transaction_id);
    println!("  first-time reward: {:?}", report.first_time);
    match (&report.referrer, &report.referral) {
        (Some(referrer), Some(referral)) => {
            println!("  referrer: {} ({})", referrer.user_address, referrer.user_id);
            println!("  referral reward: {:?}", referral);
        }
        _ => println!("  no referrer"),
    }
    Ok(())
}

pub async fn run_pending(config: NodeConfig) -> Result<()> {
    let storage = FileRewardStorage::open(config.storage_path()).await?;
    let payouts = pending_payouts(&storage).await?;

    if payouts.is_empty() {
        println!("No pending rewards");
        return Ok(());
    }
    for payout in payouts {
        println!(
            "{:<12} tx {:<8} {} cash {} contract {}",
            payout.kind.to_string(),
            payout.transaction_id,
            payout.beneficiary_address,
            payout.reward,
            payout.contract_reward,
        );
    }
    Ok(())
}
