use crate::backend::{InsertOutcome, Result, RewardStorage};
use crate::memory::MemoryRewardStorage;
use crate::snapshot::StorageSnapshot;
use async_trait::async_trait;
use attest_types::{
    Address, AttestedProfile, Contract, DeviceAddress, LinkReferral, ProofType, ReceivingAddress,
    ReferralRewardUnit, RewardKind, RewardPayout, RewardUnit, Transaction, TransactionId, UnitId,
};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// [`RewardStorage`] backed by a JSON snapshot file.
///
/// Reads are served from memory. Every mutation that changes a table is
/// followed by a full snapshot write before the call returns.
pub struct FileRewardStorage {
    inner: MemoryRewardStorage,
    path: PathBuf,
    persist_lock: Mutex<()>,
}

impl FileRewardStorage {
    /// Open the snapshot at `path`, starting empty if the file does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = if tokio::fs::try_exists(&path).await? {
            let snapshot = StorageSnapshot::load_from_file(&path).await?;
            info!(
                path = %path.display(),
                transactions = snapshot.metadata.transaction_count,
                rewards = snapshot.metadata.reward_count,
                referral_rewards = snapshot.metadata.referral_reward_count,
                "📂 Reward storage loaded"
            );
            MemoryRewardStorage::from_snapshot(snapshot)
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            info!(path = %path.display(), "📂 Reward storage created");
            MemoryRewardStorage::new()
        };

        Ok(Self {
            inner,
            path,
            persist_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.inner.snapshot().await;
        snapshot.save_to_file(&self.path).await?;
        debug!(path = %self.path.display(), hash = %snapshot.metadata.hash, "💾 Snapshot written");
        Ok(())
    }

    async fn persist_if_inserted(&self, outcome: InsertOutcome) -> Result<InsertOutcome> {
        if outcome.is_inserted() {
            self.persist().await?;
        }
        Ok(outcome)
    }
}

#[async_trait]
impl RewardStorage for FileRewardStorage {
    async fn insert_receiving_address(&self, record: ReceivingAddress) -> Result<InsertOutcome> {
        let outcome = self.inner.insert_receiving_address(record).await?;
        self.persist_if_inserted(outcome).await
    }

    async fn find_receiving_address(
        &self,
        device_address: &DeviceAddress,
        user_address: &Address,
        forum_user_id: u64,
    ) -> Result<Option<ReceivingAddress>> {
        self.inner
            .find_receiving_address(device_address, user_address, forum_user_id)
            .await
    }

    async fn get_receiving_address(
        &self,
        receiving_address: &Address,
    ) -> Result<Option<ReceivingAddress>> {
        self.inner.get_receiving_address(receiving_address).await
    }

    async fn update_profile(
        &self,
        receiving_address: &Address,
        profile: AttestedProfile,
    ) -> Result<()> {
        self.inner.update_profile(receiving_address, profile).await?;
        self.persist().await
    }

    async fn latest_device_for_user(
        &self,
        user_address: &Address,
    ) -> Result<Option<DeviceAddress>> {
        self.inner.latest_device_for_user(user_address).await
    }

    async fn list_receiving_addresses(&self) -> Result<Vec<Address>> {
        self.inner.list_receiving_addresses().await
    }

    async fn insert_transaction(
        &self,
        receiving_address: &Address,
        proof_type: ProofType,
        payment_unit: Option<UnitId>,
    ) -> Result<Transaction> {
        let transaction = self
            .inner
            .insert_transaction(receiving_address, proof_type, payment_unit)
            .await?;
        self.persist().await?;
        Ok(transaction)
    }

    async fn get_transaction(&self, transaction_id: TransactionId) -> Result<Option<Transaction>> {
        self.inner.get_transaction(transaction_id).await
    }

    async fn insert_reward_unit(&self, row: RewardUnit) -> Result<InsertOutcome> {
        let outcome = self.inner.insert_reward_unit(row).await?;
        self.persist_if_inserted(outcome).await
    }

    async fn get_reward_unit(&self, transaction_id: TransactionId) -> Result<Option<RewardUnit>> {
        self.inner.get_reward_unit(transaction_id).await
    }

    async fn insert_referral_reward_unit(&self, row: ReferralRewardUnit) -> Result<InsertOutcome> {
        let outcome = self.inner.insert_referral_reward_unit(row).await?;
        self.persist_if_inserted(outcome).await
    }

    async fn get_referral_reward_unit(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<ReferralRewardUnit>> {
        self.inner.get_referral_reward_unit(transaction_id).await
    }

    async fn get_reward_payout(
        &self,
        kind: RewardKind,
        transaction_id: TransactionId,
    ) -> Result<Option<RewardPayout>> {
        self.inner.get_reward_payout(kind, transaction_id).await
    }

    async fn mark_reward_sent(
        &self,
        kind: RewardKind,
        transaction_id: TransactionId,
        reward_unit: UnitId,
        reward_date: DateTime<Utc>,
    ) -> Result<()> {
        self.inner
            .mark_reward_sent(kind, transaction_id, reward_unit, reward_date)
            .await?;
        self.persist().await
    }

    async fn pending_rewards(
        &self,
        kind: RewardKind,
        limit: usize,
    ) -> Result<Vec<TransactionId>> {
        self.inner.pending_rewards(kind, limit).await
    }

    async fn record_retry_attempt(
        &self,
        kind: RewardKind,
        transaction_id: TransactionId,
        attempted_at: DateTime<Utc>,
    ) -> Result<()> {
        self.inner
            .record_retry_attempt(kind, transaction_id, attempted_at)
            .await?;
        self.persist().await
    }

    async fn get_contract(&self, user_address: &Address) -> Result<Option<Contract>> {
        self.inner.get_contract(user_address).await
    }

    async fn insert_contract(&self, contract: Contract) -> Result<InsertOutcome> {
        let outcome = self.inner.insert_contract(contract).await?;
        self.persist_if_inserted(outcome).await
    }

    async fn insert_link_referral(&self, referral: LinkReferral) -> Result<InsertOutcome> {
        let outcome = self.inner.insert_link_referral(referral).await?;
        self.persist_if_inserted(outcome).await
    }

    async fn link_referrals_for_device(
        &self,
        device_address: &DeviceAddress,
    ) -> Result<Vec<LinkReferral>> {
        self.inner.link_referrals_for_device(device_address).await
    }
}
