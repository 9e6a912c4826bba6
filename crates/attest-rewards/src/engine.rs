use crate::calculator::{first_time_reward, referral_reward, RewardSplit};
use crate::config::RewardContext;
use crate::contract::{VestingContract, VestingContractManager};
use crate::error::{Result, RewardError};
use crate::link_referral::record_link_referral;
use crate::locks::KeyedLockTable;
use crate::lookup::ReferrerInfo;
use crate::notify::{Messenger, OperatorNotifier};
use crate::resolver::ReferralResolver;
use crate::texts;
use crate::writer::{RetrySummary, RewardLedgerWriter, SendOutcome};
use attest_storage::{InsertOutcome, LedgerReader, RewardStorage, Wallet};
use attest_types::{
    Address, AttestedProfile, DeviceAddress, LinkReferralKind, ProofType, ReceivingAddress,
    ReferralRewardUnit, RewardKind, RewardUnit, Transaction, TransactionId, UnitId,
};
use std::sync::Arc;
use tracing::{info, warn};

/// What happened to one reward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    /// The rank earns nothing; no row was written.
    NoReward,
    /// The user was already rewarded under another transaction.
    Duplicate,
    Sent(UnitId),
    AlreadySent,
    /// Dispatch failed; the row stays pending for the retry sweep.
    Pending(String),
}

impl IssueOutcome {
    /// True when a reward row exists for this transaction.
    pub fn is_recorded(&self) -> bool {
        matches!(
            self,
            IssueOutcome::Sent(_) | IssueOutcome::AlreadySent | IssueOutcome::Pending(_)
        )
    }
}

/// Result of the full issuance flow for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceReport {
    pub transaction_id: TransactionId,
    pub first_time: IssueOutcome,
    pub referrer: Option<ReferrerInfo>,
    pub referral: Option<IssueOutcome>,
}

/// The transaction together with the session and verified profile it belongs to.
struct AttestedSession {
    transaction: Transaction,
    receiving: ReceivingAddress,
    profile: AttestedProfile,
}

pub struct RewardEngine {
    storage: Arc<dyn RewardStorage>,
    ledger: Arc<dyn LedgerReader>,
    context: Arc<RewardContext>,
    locks: Arc<KeyedLockTable>,
    messenger: Arc<dyn Messenger>,
    resolver: ReferralResolver,
    contracts: Arc<VestingContractManager>,
    writer: RewardLedgerWriter,
}

impl RewardEngine {
    pub fn new(
        storage: Arc<dyn RewardStorage>,
        ledger: Arc<dyn LedgerReader>,
        wallet: Arc<dyn Wallet>,
        messenger: Arc<dyn Messenger>,
        operator: Arc<dyn OperatorNotifier>,
        context: Arc<RewardContext>,
        locks: Arc<KeyedLockTable>,
    ) -> Self {
        let resolver = ReferralResolver::new(storage.clone(), ledger.clone(), context.clone());
        let contracts = Arc::new(VestingContractManager::new(
            storage.clone(),
            wallet.clone(),
            context.clone(),
            locks.clone(),
        ));
        let writer = RewardLedgerWriter::new(
            storage.clone(),
            wallet,
            contracts.clone(),
            messenger.clone(),
            operator,
            context.clone(),
            locks.clone(),
        );

        Self {
            storage,
            ledger,
            context,
            locks,
            messenger,
            resolver,
            contracts,
            writer,
        }
    }

    pub fn context(&self) -> &RewardContext {
        &self.context
    }

    pub fn locks(&self) -> Arc<KeyedLockTable> {
        self.locks.clone()
    }

    pub async fn resolve_referrer(
        &self,
        payment_unit: Option<UnitId>,
        user_address: &Address,
        device_address: &DeviceAddress,
    ) -> Result<Option<ReferrerInfo>> {
        self.resolver
            .resolve(payment_unit, user_address, device_address)
            .await
    }

    pub async fn record_link_referral(
        &self,
        referrer: &str,
        device_address: &DeviceAddress,
        kind: LinkReferralKind,
    ) -> Result<bool> {
        record_link_referral(
            self.storage.as_ref(),
            self.ledger.as_ref(),
            &self.context.attestor_address,
            referrer,
            device_address,
            kind,
        )
        .await
    }

    async fn load_session(&self, transaction_id: TransactionId) -> Result<AttestedSession> {
        let transaction = self
            .storage
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| RewardError::Invariant(format!("no transaction {}", transaction_id)))?;
        let receiving = self
            .storage
            .get_receiving_address(&transaction.receiving_address)
            .await?
            .ok_or_else(|| {
                RewardError::Invariant(format!(
                    "no receiving address {} for tx {}",
                    transaction.receiving_address, transaction_id
                ))
            })?;
        let profile = receiving.profile.clone().ok_or_else(|| {
            RewardError::Invariant(format!("no verified profile for tx {}", transaction_id))
        })?;

        Ok(AttestedSession {
            transaction,
            receiving,
            profile,
        })
    }

    /// Vesting contract for the contract share of `split`, if there is one.
    ///
    /// A transient ledger failure yields `None`: the send phase creates the
    /// contract itself and reports the failure if it persists.
    async fn contract_for(
        &self,
        split: &RewardSplit,
        beneficiary: &Address,
        beneficiary_device: &DeviceAddress,
    ) -> Result<Option<VestingContract>> {
        if split.contract.is_zero() {
            return Ok(None);
        }
        match self
            .contracts
            .get_or_create(beneficiary, beneficiary_device)
            .await
        {
            Ok(contract) => Ok(Some(contract)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(
                    beneficiary = %beneficiary,
                    error = %e,
                    "⏳ Vesting contract not created yet"
                );
                Ok(None)
            }
        }
    }

    async fn send(&self, kind: RewardKind, transaction_id: TransactionId) -> Result<IssueOutcome> {
        match self.writer.send_and_write_reward(kind, transaction_id).await {
            Ok(SendOutcome::Sent(unit)) => Ok(IssueOutcome::Sent(unit)),
            Ok(SendOutcome::AlreadySent) => Ok(IssueOutcome::AlreadySent),
            Err(RewardError::Dispatch(reason)) => Ok(IssueOutcome::Pending(reason)),
            Err(e) => Err(e),
        }
    }

    /// Compute, record and pay the first-time bonus for `transaction_id`.
    pub async fn issue_first_time_reward(
        &self,
        transaction_id: TransactionId,
        rank: &str,
        proof_type: ProofType,
    ) -> Result<IssueOutcome> {
        let Some(split) = first_time_reward(&self.context.config, rank, proof_type) else {
            info!(transaction_id = %transaction_id, rank = %rank, "No first-time reward for rank");
            return Ok(IssueOutcome::NoReward);
        };
        let session = self.load_session(transaction_id).await?;
        let user_address = &session.receiving.user_address;
        let device_address = &session.receiving.device_address;

        let guard = self.locks.acquire(transaction_id.lock_key()).await;
        let outcome = self
            .writer
            .record_reward(RewardUnit {
                transaction_id,
                device_address: device_address.clone(),
                user_address: user_address.clone(),
                user_id: session.profile.user_id(&self.context.config.profile_salt),
                reward: split.cash,
                contract_reward: split.contract,
                reward_unit: None,
                reward_date: None,
            })
            .await?;

        match outcome {
            InsertOutcome::Duplicate => return Ok(IssueOutcome::Duplicate),
            InsertOutcome::Inserted => {
                let contract = self.contract_for(&split, user_address, device_address).await?;
                self.messenger
                    .send_message_to_device(
                        device_address,
                        &texts::first_time_bonus(
                            split.usd,
                            split.cash,
                            split.contract,
                            contract.map(|c| c.vesting_date),
                            &session.profile.forum_username,
                            session.profile.forum_user_id,
                        ),
                    )
                    .await;
            }
            // The send phase creates a contract a previous attempt left missing.
            InsertOutcome::AlreadyRecorded => {}
        }
        drop(guard);

        self.send(RewardKind::Attestation, transaction_id).await
    }

    /// Compute, record and pay the bonus `referrer` earns for the user of `transaction_id`.
    pub async fn issue_referral_reward(
        &self,
        transaction_id: TransactionId,
        referrer: &ReferrerInfo,
        rank: &str,
    ) -> Result<IssueOutcome> {
        let Some(split) = referral_reward(&self.context.config, rank) else {
            info!(transaction_id = %transaction_id, rank = %rank, "No referral reward for rank");
            return Ok(IssueOutcome::NoReward);
        };
        let session = self.load_session(transaction_id).await?;
        if referrer.user_address == session.receiving.user_address {
            return Err(RewardError::Invariant(format!(
                "user {} cannot refer themselves",
                referrer.user_address
            )));
        }

        let guard = self.locks.acquire(transaction_id.lock_key()).await;
        let outcome = self
            .writer
            .record_referral_reward(ReferralRewardUnit {
                transaction_id,
                referrer_user_address: referrer.user_address.clone(),
                referrer_user_id: referrer.user_id.clone(),
                referred_user_address: session.receiving.user_address.clone(),
                referred_user_id: session.profile.user_id(&self.context.config.profile_salt),
                reward: split.cash,
                contract_reward: split.contract,
                reward_unit: None,
                reward_date: None,
            })
            .await?;

        match outcome {
            InsertOutcome::Duplicate => return Ok(IssueOutcome::Duplicate),
            InsertOutcome::Inserted => {
                let contract = self
                    .contract_for(&split, &referrer.user_address, &referrer.device_address)
                    .await?;
                self.messenger
                    .send_message_to_device(
                        &referrer.device_address,
                        &texts::referral_bonus(
                            split.usd,
                            split.cash,
                            split.contract,
                            contract.map(|c| c.vesting_date),
                            &session.profile.forum_username,
                            session.profile.forum_user_id,
                        ),
                    )
                    .await;
            }
            InsertOutcome::AlreadyRecorded => {}
        }
        drop(guard);

        self.send(RewardKind::Referral, transaction_id).await
    }

    /// First-time reward, then referrer resolution and referral reward.
    pub async fn issue_rewards(&self, transaction_id: TransactionId) -> Result<IssuanceReport> {
        let session = self.load_session(transaction_id).await?;
        let rank = session.profile.rank.clone();

        let first_time = self
            .issue_first_time_reward(transaction_id, &rank, session.transaction.proof_type)
            .await?;
        if let IssueOutcome::Pending(reason) = &first_time {
            warn!(transaction_id = %transaction_id, reason = %reason, "⏳ First-time reward left pending");
        }

        let mut report = IssuanceReport {
            transaction_id,
            first_time,
            referrer: None,
            referral: None,
        };
        if !report.first_time.is_recorded() {
            return Ok(report);
        }

        let referrer = self
            .resolve_referrer(
                session.transaction.payment_unit,
                &session.receiving.user_address,
                &session.receiving.device_address,
            )
            .await?;
        let Some(referrer) = referrer else {
            info!(
                transaction_id = %transaction_id,
                user_address = %session.receiving.user_address,
                "No referrer"
            );
            return Ok(report);
        };

        let referral = self
            .issue_referral_reward(transaction_id, &referrer, &rank)
            .await?;
        if let IssueOutcome::Pending(reason) = &referral {
            warn!(transaction_id = %transaction_id, reason = %reason, "⏳ Referral reward left pending");
        }
        report.referrer = Some(referrer);
        report.referral = Some(referral);
        Ok(report)
    }

    /// Sweep a bounded batch of unsent rewards of both kinds.
    pub async fn retry_pending_rewards(&self) -> Result<RetrySummary> {
        self.writer.retry_pending().await
    }
}
