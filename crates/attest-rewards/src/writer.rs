use crate::config::RewardContext;
use crate::contract::VestingContractManager;
use crate::error::{Result, RewardError};
use crate::locks::KeyedLockTable;
use crate::notify::{Messenger, OperatorNotifier};
use crate::texts;
use attest_storage::{InsertOutcome, RewardStorage, Wallet};
use attest_types::{
    Address, PaymentOutput, ReferralRewardUnit, RewardKind, RewardPayout, RewardUnit,
    TransactionId, UnitId,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(UnitId),
    /// The row already carries a reward unit; nothing was dispatched.
    AlreadySent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrySummary {
    pub sent: usize,
    pub already_sent: usize,
    pub failed: usize,
}

/// Records reward rows and pays them out.
pub struct RewardLedgerWriter {
    storage: Arc<dyn RewardStorage>,
    wallet: Arc<dyn Wallet>,
    contracts: Arc<VestingContractManager>,
    messenger: Arc<dyn Messenger>,
    operator: Arc<dyn OperatorNotifier>,
    context: Arc<RewardContext>,
    locks: Arc<KeyedLockTable>,
}

impl RewardLedgerWriter {
    pub fn new(
        storage: Arc<dyn RewardStorage>,
        wallet: Arc<dyn Wallet>,
        contracts: Arc<VestingContractManager>,
        messenger: Arc<dyn Messenger>,
        operator: Arc<dyn OperatorNotifier>,
        context: Arc<RewardContext>,
        locks: Arc<KeyedLockTable>,
    ) -> Self {
        Self {
            storage,
            wallet,
            contracts,
            messenger,
            operator,
            context,
            locks,
        }
    }

    /// Insert a first-time reward row. Callers hold the transaction's lock.
    pub async fn record_reward(&self, row: RewardUnit) -> Result<InsertOutcome> {
        let transaction_id = row.transaction_id;
        let user_address = row.user_address.clone();
        let user_id = row.user_id.clone();
        let outcome = self.storage.insert_reward_unit(row).await?;

        if outcome == InsertOutcome::Duplicate {
            info!(
                transaction_id = %transaction_id,
                user_address = %user_address,
                user_id = %user_id,
                "♻️ User already rewarded under another transaction"
            );
        }
        Ok(outcome)
    }

    /// Insert a referral reward row. Callers hold the transaction's lock.
    pub async fn record_referral_reward(&self, row: ReferralRewardUnit) -> Result<InsertOutcome> {
        let transaction_id = row.transaction_id;
        let referred_address = row.referred_user_address.clone();
        let referred_id = row.referred_user_id.clone();
        let outcome = self.storage.insert_referral_reward_unit(row).await?;

        if outcome == InsertOutcome::Duplicate {
            warn!(
                transaction_id = %transaction_id,
                referred = %referred_address,
                "♻️ Referral reward for this user already written"
            );
            self.operator
                .notify_operator(
                    texts::duplicate_referral_subject(),
                    &texts::duplicate_referral_body(referred_address.as_str(), referred_id.as_str()),
                )
                .await;
        }
        Ok(outcome)
    }

    /// Tell the operator about a failed ledger call, with the distribution balance.
    async fn report_failure(&self, subject: &str, error: &str) {
        let balance = match self.context.distribution_address() {
            Ok(distribution) => self.wallet.read_balance(distribution).await.ok(),
            Err(_) => None,
        };
        self.operator
            .notify_operator(subject, &texts::payment_failed_body(error, balance))
            .await;
    }

    /// Vesting contract for a row recorded before its contract existed.
    async fn create_missing_contract(&self, payout: &RewardPayout) -> Result<Address> {
        let device = payout.beneficiary_device.as_ref().ok_or_else(|| {
            RewardError::MissingContractAddress {
                user_address: payout.beneficiary_address.to_string(),
                contract_reward: payout.contract_reward.to_units(),
            }
        })?;

        match self
            .contracts
            .get_or_create(&payout.beneficiary_address, device)
            .await
        {
            Ok(contract) => Ok(contract.contract_address),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(
                    kind = %payout.kind,
                    transaction_id = %payout.transaction_id,
                    beneficiary = %payout.beneficiary_address,
                    error = %e,
                    "❌ Failed to create vesting contract"
                );
                self.report_failure(texts::contract_failed_subject(), &e.to_string())
                    .await;
                Err(RewardError::Dispatch(e.to_string()))
            }
        }
    }

    /// Pay out the `kind` reward of `transaction_id` unless it was already paid.
    ///
    /// A failed dispatch, including a failed creation of a missing vesting
    /// contract, is reported to the operator and leaves the row pending for
    /// [`retry_pending`](Self::retry_pending).
    pub async fn send_and_write_reward(
        &self,
        kind: RewardKind,
        transaction_id: TransactionId,
    ) -> Result<SendOutcome> {
        let _guard = self.locks.acquire(transaction_id.lock_key()).await;

        let payout = self
            .storage
            .get_reward_payout(kind, transaction_id)
            .await?
            .ok_or_else(|| {
                RewardError::Invariant(format!("no {} reward for tx {}", kind, transaction_id))
            })?;
        if payout.is_sent() {
            debug!(kind = %kind, transaction_id = %transaction_id, "Reward already sent");
            return Ok(SendOutcome::AlreadySent);
        }

        let mut outputs = Vec::with_capacity(2);
        if !payout.reward.is_zero() {
            outputs.push(PaymentOutput {
                address: payout.beneficiary_address.clone(),
                amount: payout.reward,
            });
        }
        if !payout.contract_reward.is_zero() {
            let contract_address = match payout.contract_address.clone() {
                Some(address) => address,
                None => self.create_missing_contract(&payout).await?,
            };
            outputs.push(PaymentOutput {
                address: contract_address,
                amount: payout.contract_reward,
            });
        }
        if outputs.is_empty() {
            return Err(RewardError::Invariant(format!(
                "no rewards in {} tx {}",
                kind, transaction_id
            )));
        }

        let distribution = self.context.distribution_address()?;
        let result = self
            .wallet
            .compose_and_broadcast_payment(
                &outputs,
                std::slice::from_ref(distribution),
                payout.beneficiary_device.as_ref(),
            )
            .await;

        let unit = match result {
            Ok(unit) => unit,
            Err(e) => {
                warn!(
                    kind = %kind,
                    transaction_id = %transaction_id,
                    error = %e,
                    "❌ Failed to send reward"
                );
                self.report_failure(texts::payment_failed_subject(), &e.to_string())
                    .await;
                return Err(RewardError::Dispatch(e.to_string()));
            }
        };

        self.storage
            .mark_reward_sent(kind, transaction_id, unit, Utc::now())
            .await?;
        if let Some(device) = &payout.beneficiary_device {
            self.messenger
                .send_message_to_device(device, &texts::reward_sent(kind))
                .await;
        }

        info!(
            kind = %kind,
            transaction_id = %transaction_id,
            beneficiary = %payout.beneficiary_address,
            reward = payout.reward.to_units(),
            contract_reward = payout.contract_reward.to_units(),
            unit = %unit,
            "💰 Reward sent"
        );
        Ok(SendOutcome::Sent(unit))
    }

    /// Attempt a bounded batch of unsent rows of each kind.
    ///
    /// Failed rows move to the back of the queue, so a few rows that keep
    /// failing do not starve the rest.
    pub async fn retry_pending(&self) -> Result<RetrySummary> {
        let mut summary = RetrySummary::default();
        let batch = self.context.config.retry_batch_size;

        for kind in RewardKind::ALL {
            for transaction_id in self.storage.pending_rewards(kind, batch).await? {
                let error = match self.send_and_write_reward(kind, transaction_id).await {
                    Ok(SendOutcome::Sent(_)) => {
                        summary.sent += 1;
                        continue;
                    }
                    Ok(SendOutcome::AlreadySent) => {
                        summary.already_sent += 1;
                        continue;
                    }
                    Err(e) => e,
                };

                if error.is_fatal() {
                    error!(
                        kind = %kind,
                        transaction_id = %transaction_id,
                        error = %error,
                        "🛑 Pending reward is inconsistent"
                    );
                } else {
                    debug!(kind = %kind, transaction_id = %transaction_id, error = %error, "Retry failed");
                }
                summary.failed += 1;
                self.storage
                    .record_retry_attempt(kind, transaction_id, Utc::now())
                    .await?;
            }
        }

        if summary != RetrySummary::default() {
            info!(
                sent = summary.sent,
                already_sent = summary.already_sent,
                failed = summary.failed,
                "🔁 Pending rewards retried"
            );
        }
        Ok(summary)
    }
}
