use crate::config::RewardContext;
use crate::error::{Result, RewardError};
use crate::locks::{KeyedLockTable, MOVE_FUNDS_KEY};
use crate::notify::OperatorNotifier;
use crate::texts;
use attest_storage::{LedgerReader, RewardStorage, Wallet};
use attest_types::UnitId;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Most addresses one unit may spend from.
pub const MAX_AUTHORS_PER_UNIT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The ledger is still syncing.
    Skipped,
    NothingToMove,
    Moved { unit: UnitId, addresses: usize },
}

/// Consolidates paid-in attestation fees into the attestor address.
pub struct FundsSweeper {
    storage: Arc<dyn RewardStorage>,
    ledger: Arc<dyn LedgerReader>,
    wallet: Arc<dyn Wallet>,
    operator: Arc<dyn OperatorNotifier>,
    context: Arc<RewardContext>,
    locks: Arc<KeyedLockTable>,
}

impl FundsSweeper {
    pub fn new(
        storage: Arc<dyn RewardStorage>,
        ledger: Arc<dyn LedgerReader>,
        wallet: Arc<dyn Wallet>,
        operator: Arc<dyn OperatorNotifier>,
        context: Arc<RewardContext>,
        locks: Arc<KeyedLockTable>,
    ) -> Self {
        Self {
            storage,
            ledger,
            wallet,
            operator,
            context,
            locks,
        }
    }

    pub async fn sweep(&self) -> Result<SweepOutcome> {
        if self.ledger.is_catching_up().await? {
            debug!("Ledger catching up, funds sweep skipped");
            return Ok(SweepOutcome::Skipped);
        }

        let _guard = self.locks.acquire(MOVE_FUNDS_KEY).await;

        let candidates = self.storage.list_receiving_addresses().await?;
        let funded = self
            .ledger
            .addresses_with_stable_funds(&candidates, MAX_AUTHORS_PER_UNIT)
            .await?;
        if funded.is_empty() {
            return Ok(SweepOutcome::NothingToMove);
        }

        let attestor = &self.context.attestor_address;
        match self.wallet.send_all(&funded, attestor).await {
            Ok(unit) => {
                info!(
                    unit = %unit,
                    addresses = funded.len(),
                    to = %attestor,
                    "🧹 Moved funds to attestor address"
                );
                Ok(SweepOutcome::Moved {
                    unit,
                    addresses: funded.len(),
                })
            }
            Err(e) => {
                warn!(error = %e, addresses = funded.len(), "❌ Failed to move funds");
                let balance = self.wallet.read_balance(&funded[0]).await.ok();
                self.operator
                    .notify_operator(
                        "failed to move funds",
                        &texts::payment_failed_body(&e.to_string(), balance),
                    )
                    .await;
                Err(RewardError::Dispatch(e.to_string()))
            }
        }
    }
}
