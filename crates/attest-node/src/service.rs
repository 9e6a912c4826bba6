use crate::config::NodeConfig;
use anyhow::{Context, Result};
use attest_rewards::{
    FundsSweeper, KeyedLockTable, LogMessenger, LogOperatorNotifier, ReceivingAddressAssigner,
    RewardEngine,
};
use attest_storage::{FileRewardStorage, LedgerFixture, MemoryLedger, RewardStorage};
use attest_types::{RewardKind, RewardPayout};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// The reward engine and its collaborators, wired for one process.
pub struct RewardService {
    pub storage: Arc<FileRewardStorage>,
    pub ledger: Arc<MemoryLedger>,
    pub engine: Arc<RewardEngine>,
    pub sweeper: Arc<FundsSweeper>,
    pub assigner: Arc<ReceivingAddressAssigner>,
    retry_interval: Duration,
    sweep_interval: Duration,
}

impl RewardService {
    pub async fn new(config: &NodeConfig) -> Result<Self> {
        let context = Arc::new(config.to_context()?);

        tokio::fs::create_dir_all(&config.node.data_dir)
            .await
            .with_context(|| format!("creating {}", config.node.data_dir.display()))?;
        let storage = Arc::new(FileRewardStorage::open(config.storage_path()).await?);

        let ledger = match &config.node.ledger_fixture {
            Some(path) => {
                let fixture = LedgerFixture::load_from_file(path)
                    .await
                    .with_context(|| format!("loading ledger fixture {}", path.display()))?;
                info!(
                    path = %path.display(),
                    units = fixture.units.len(),
                    attestations = fixture.attestations.len(),
                    "📂 Ledger fixture loaded"
                );
                MemoryLedger::from_fixture(fixture).await
            }
            None => MemoryLedger::new(),
        };
        let ledger = Arc::new(ledger);

        let locks = Arc::new(KeyedLockTable::new());
        let operator = Arc::new(LogOperatorNotifier);
        let engine = Arc::new(RewardEngine::new(
            storage.clone(),
            ledger.clone(),
            ledger.clone(),
            Arc::new(LogMessenger),
            operator.clone(),
            context.clone(),
            locks.clone(),
        ));
        let sweeper = Arc::new(FundsSweeper::new(
            storage.clone(),
            ledger.clone(),
            ledger.clone(),
            operator,
            context,
            locks.clone(),
        ));
        let assigner = Arc::new(ReceivingAddressAssigner::new(
            storage.clone(),
            ledger.clone(),
            locks,
        ));

        Ok(Self {
            storage,
            ledger,
            engine,
            sweeper,
            assigner,
            retry_interval: Duration::from_secs(config.scheduler.retry_interval_secs),
            sweep_interval: Duration::from_secs(config.scheduler.sweep_interval_secs),
        })
    }

    /// Periodically retry unsent rewards.
    pub fn spawn_retry_loop(&self) -> JoinHandle<()> {
        let engine = self.engine.clone();
        let period = self.retry_interval;
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match engine.retry_pending_rewards().await {
                    Ok(summary) => debug!(
                        sent = summary.sent,
                        failed = summary.failed,
                        "Retry pass finished"
                    ),
                    Err(e) => warn!(error = %e, "⚠️ Retry pass failed"),
                }
            }
        })
    }

    /// Periodically move paid-in fees to the attestor address.
    pub fn spawn_sweep_loop(&self) -> JoinHandle<()> {
        let sweeper = self.sweeper.clone();
        let period = self.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = sweeper.sweep().await {
                    warn!(error = %e, "⚠️ Funds sweep failed");
                }
            }
        })
    }

    /// Every unsent reward row, both kinds.
    pub async fn pending_payouts(&self) -> Result<Vec<RewardPayout>> {
        pending_payouts(self.storage.as_ref()).await
    }
}

pub async fn pending_payouts(storage: &dyn RewardStorage) -> Result<Vec<RewardPayout>> {
    let mut payouts = Vec::new();
    for kind in RewardKind::ALL {
        for transaction_id in storage.pending_rewards(kind, usize::MAX).await? {
            if let Some(payout) = storage.get_reward_payout(kind, transaction_id).await? {
                payouts.push(payout);
            }
        }
    }
    Ok(payouts)
}
