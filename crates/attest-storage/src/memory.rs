use crate::backend::{InsertOutcome, Result, RewardStorage, StorageError};
use crate::snapshot::StorageSnapshot;
use async_trait::async_trait;
use attest_types::{
    Address, AttestedProfile, Contract, DeviceAddress, LinkReferral, ProofType, ReceivingAddress,
    ReferralRewardUnit, RewardKind, RewardPayout, RewardUnit, Transaction, TransactionId, UnitId,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Default, Clone)]
pub(crate) struct MemoryState {
    pub(crate) next_transaction_id: u64,
    /// In issue order; later entries win "most recent" lookups.
    pub(crate) receiving_addresses: Vec<ReceivingAddress>,
    pub(crate) transactions: BTreeMap<TransactionId, Transaction>,
    pub(crate) reward_units: BTreeMap<TransactionId, RewardUnit>,
    pub(crate) referral_reward_units: BTreeMap<TransactionId, ReferralRewardUnit>,
    pub(crate) contracts: HashMap<Address, Contract>,
    pub(crate) link_referrals: Vec<LinkReferral>,
    /// Last failed retry per unsent reward row.
    pub(crate) retry_attempts: HashMap<(RewardKind, TransactionId), DateTime<Utc>>,
}

impl MemoryState {
    fn latest_device_for_user(&self, user_address: &Address) -> Option<DeviceAddress> {
        self.receiving_addresses
            .iter()
            .rev()
            .find(|r| &r.user_address == user_address)
            .map(|r| r.device_address.clone())
    }

    fn contract_address(&self, user_address: &Address) -> Option<Address> {
        self.contracts
            .get(user_address)
            .map(|c| c.contract_address.clone())
    }
}

/// In-memory implementation of [`RewardStorage`] for tests and development.
pub struct MemoryRewardStorage {
    state: Arc<RwLock<MemoryState>>,
}

impl Default for MemoryRewardStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRewardStorage {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState {
                next_transaction_id: 1,
                ..Default::default()
            })),
        }
    }

    pub fn from_snapshot(snapshot: StorageSnapshot) -> Self {
        Self {
            state: Arc::new(RwLock::new(snapshot.into_state())),
        }
    }

    /// Consistent copy of every table.
    pub async fn snapshot(&self) -> StorageSnapshot {
        let state = self.state.read().await;
        StorageSnapshot::from_state(&state)
    }
}

#[async_trait]
impl RewardStorage for MemoryRewardStorage {
    async fn insert_receiving_address(&self, record: ReceivingAddress) -> Result<InsertOutcome> {
        let mut state = self.state.write().await;
        if state
            .receiving_addresses
            .iter()
            .any(|r| r.receiving_address == record.receiving_address)
        {
            return Ok(InsertOutcome::AlreadyRecorded);
        }
        if state.receiving_addresses.iter().any(|r| {
            r.device_address == record.device_address
                && r.user_address == record.user_address
                && r.forum_user_id == record.forum_user_id
        }) {
            return Ok(InsertOutcome::Duplicate);
        }

        debug!(
            receiving_address = %record.receiving_address,
            device = %record.device_address,
            storage_type = "memory",
            "💾 Receiving address stored"
        );
        state.receiving_addresses.push(record);
        Ok(InsertOutcome::Inserted)
    }

    async fn find_receiving_address(
        &self,
        device_address: &DeviceAddress,
        user_address: &Address,
        forum_user_id: u64,
    ) -> Result<Option<ReceivingAddress>> {
        let state = self.state.read().await;
        Ok(state
            .receiving_addresses
            .iter()
            .find(|r| {
                &r.device_address == device_address
                    && &r.user_address == user_address
                    && r.forum_user_id == forum_user_id
            })
            .cloned())
    }

    async fn get_receiving_address(
        &self,
        receiving_address: &Address,
    ) -> Result<Option<ReceivingAddress>> {
        let state = self.state.read().await;
        Ok(state
            .receiving_addresses
            .iter()
            .find(|r| &r.receiving_address == receiving_address)
            .cloned())
    }

    async fn update_profile(
        &self,
        receiving_address: &Address,
        profile: AttestedProfile,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let record = state
            .receiving_addresses
            .iter_mut()
            .find(|r| &r.receiving_address == receiving_address)
            .ok_or_else(|| StorageError::NotFound(format!("receiving address {}", receiving_address)))?;
        record.profile = Some(profile);
        Ok(())
    }

    async fn latest_device_for_user(
        &self,
        user_address: &Address,
    ) -> Result<Option<DeviceAddress>> {
        let state = self.state.read().await;
        Ok(state.latest_device_for_user(user_address))
    }

    async fn list_receiving_addresses(&self) -> Result<Vec<Address>> {
        let state = self.state.read().await;
        Ok(state
            .receiving_addresses
            .iter()
            .map(|r| r.receiving_address.clone())
            .collect())
    }

    async fn insert_transaction(
        &self,
        receiving_address: &Address,
        proof_type: ProofType,
        payment_unit: Option<UnitId>,
    ) -> Result<Transaction> {
        let mut state = self.state.write().await;
        if !state
            .receiving_addresses
            .iter()
            .any(|r| &r.receiving_address == receiving_address)
        {
            return Err(StorageError::NotFound(format!(
                "receiving address {}",
                receiving_address
            )));
        }

        let transaction_id = TransactionId(state.next_transaction_id);
        state.next_transaction_id += 1;
        let transaction = Transaction {
            transaction_id,
            receiving_address: receiving_address.clone(),
            proof_type,
            payment_unit,
            created_at: Utc::now(),
        };
        state.transactions.insert(transaction_id, transaction.clone());

        info!(
            transaction_id = %transaction_id,
            receiving_address = %receiving_address,
            proof_type = %proof_type,
            storage_type = "memory",
            "📝 Transaction recorded"
        );
        Ok(transaction)
    }

    async fn get_transaction(&self, transaction_id: TransactionId) -> Result<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state.transactions.get(&transaction_id).cloned())
    }

    async fn insert_reward_unit(&self, row: RewardUnit) -> Result<InsertOutcome> {
        let mut state = self.state.write().await;
        if state.reward_units.contains_key(&row.transaction_id) {
            return Ok(InsertOutcome::AlreadyRecorded);
        }
        if state
            .reward_units
            .values()
            .any(|r| r.user_address == row.user_address && r.user_id == row.user_id)
        {
            return Ok(InsertOutcome::Duplicate);
        }

        info!(
            transaction_id = %row.transaction_id,
            user_address = %row.user_address,
            reward = row.reward.to_units(),
            contract_reward = row.contract_reward.to_units(),
            storage_type = "memory",
            "💾 Reward unit stored"
        );
        state.reward_units.insert(row.transaction_id, row);
        Ok(InsertOutcome::Inserted)
    }

    async fn get_reward_unit(&self, transaction_id: TransactionId) -> Result<Option<RewardUnit>> {
        let state = self.state.read().await;
        Ok(state.reward_units.get(&transaction_id).cloned())
    }

    async fn insert_referral_reward_unit(&self, row: ReferralRewardUnit) -> Result<InsertOutcome> {
        let mut state = self.state.write().await;
        if state.referral_reward_units.contains_key(&row.transaction_id) {
            return Ok(InsertOutcome::AlreadyRecorded);
        }
        if state.referral_reward_units.values().any(|r| {
            r.referred_user_address == row.referred_user_address
                && r.referred_user_id == row.referred_user_id
        }) {
            return Ok(InsertOutcome::Duplicate);
        }

        info!(
            transaction_id = %row.transaction_id,
            referrer = %row.referrer_user_address,
            referred = %row.referred_user_address,
            reward = row.reward.to_units(),
            contract_reward = row.contract_reward.to_units(),
            storage_type = "memory",
            "💾 Referral reward unit stored"
        );
        state.referral_reward_units.insert(row.transaction_id, row);
        Ok(InsertOutcome::Inserted)
    }

    async fn get_referral_reward_unit(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<ReferralRewardUnit>> {
        let state = self.state.read().await;
        Ok(state.referral_reward_units.get(&transaction_id).cloned())
    }

    async fn get_reward_payout(
        &self,
        kind: RewardKind,
        transaction_id: TransactionId,
    ) -> Result<Option<RewardPayout>> {
        let state = self.state.read().await;
        let payout = match kind {
            RewardKind::Attestation => state.reward_units.get(&transaction_id).map(|row| {
                RewardPayout {
                    kind,
                    transaction_id,
                    beneficiary_address: row.user_address.clone(),
                    beneficiary_device: Some(row.device_address.clone()),
                    reward: row.reward,
                    contract_reward: row.contract_reward,
                    contract_address: state.contract_address(&row.user_address),
                    reward_unit: row.reward_unit,
                    reward_date: row.reward_date,
                }
            }),
            RewardKind::Referral => state.referral_reward_units.get(&transaction_id).map(|row| {
                RewardPayout {
                    kind,
                    transaction_id,
                    beneficiary_address: row.referrer_user_address.clone(),
                    beneficiary_device: state.latest_device_for_user(&row.referrer_user_address),
                    reward: row.reward,
                    contract_reward: row.contract_reward,
                    contract_address: state.contract_address(&row.referrer_user_address),
                    reward_unit: row.reward_unit,
                    reward_date: row.reward_date,
                }
            }),
        };
        Ok(payout)
    }

    async fn mark_reward_sent(
        &self,
        kind: RewardKind,
        transaction_id: TransactionId,
        reward_unit: UnitId,
        reward_date: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let not_found = || StorageError::NotFound(format!("{} reward for tx {}", kind, transaction_id));
        match kind {
            RewardKind::Attestation => {
                let row = state.reward_units.get_mut(&transaction_id).ok_or_else(not_found)?;
                row.reward_unit = Some(reward_unit);
                row.reward_date = Some(reward_date);
            }
            RewardKind::Referral => {
                let row = state
                    .referral_reward_units
                    .get_mut(&transaction_id)
                    .ok_or_else(not_found)?;
                row.reward_unit = Some(reward_unit);
                row.reward_date = Some(reward_date);
            }
        }
        state.retry_attempts.remove(&(kind, transaction_id));

        info!(
            kind = %kind,
            transaction_id = %transaction_id,
            reward_unit = %reward_unit,
            storage_type = "memory",
            "✅ Reward marked as sent"
        );
        Ok(())
    }

    async fn pending_rewards(
        &self,
        kind: RewardKind,
        limit: usize,
    ) -> Result<Vec<TransactionId>> {
        let state = self.state.read().await;
        let mut pending: Vec<TransactionId> = match kind {
            RewardKind::Attestation => state
                .reward_units
                .values()
                .filter(|r| r.reward_unit.is_none())
                .map(|r| r.transaction_id)
                .collect(),
            RewardKind::Referral => state
                .referral_reward_units
                .values()
                .filter(|r| r.reward_unit.is_none())
                .map(|r| r.transaction_id)
                .collect(),
        };
        // None sorts before any attempt time.
        pending.sort_by_key(|id| (state.retry_attempts.get(&(kind, *id)).copied(), *id));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn record_retry_attempt(
        &self,
        kind: RewardKind,
        transaction_id: TransactionId,
        attempted_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.retry_attempts.insert((kind, transaction_id), attempted_at);
        debug!(
            kind = %kind,
            transaction_id = %transaction_id,
            storage_type = "memory",
            "Retry attempt recorded"
        );
        Ok(())
    }

    async fn get_contract(&self, user_address: &Address) -> Result<Option<Contract>> {
        let state = self.state.read().await;
        Ok(state.contracts.get(user_address).cloned())
    }

    async fn insert_contract(&self, contract: Contract) -> Result<InsertOutcome> {
        let mut state = self.state.write().await;
        if state.contracts.contains_key(&contract.user_address) {
            return Ok(InsertOutcome::AlreadyRecorded);
        }

        info!(
            user_address = %contract.user_address,
            contract_address = %contract.contract_address,
            vesting_date = %contract.contract_vesting_date,
            storage_type = "memory",
            "🔒 Contract stored"
        );
        state.contracts.insert(contract.user_address.clone(), contract);
        Ok(InsertOutcome::Inserted)
    }

    async fn insert_link_referral(&self, referral: LinkReferral) -> Result<InsertOutcome> {
        let mut state = self.state.write().await;
        if state.link_referrals.iter().any(|r| {
            r.referring_user_address == referral.referring_user_address
                && r.device_address == referral.device_address
                && r.kind == referral.kind
        }) {
            return Ok(InsertOutcome::AlreadyRecorded);
        }

        debug!(
            referrer = %referral.referring_user_address,
            device = %referral.device_address,
            kind = %referral.kind,
            storage_type = "memory",
            "🔗 Link referral stored"
        );
        state.link_referrals.push(referral);
        Ok(InsertOutcome::Inserted)
    }

    async fn link_referrals_for_device(
        &self,
        device_address: &DeviceAddress,
    ) -> Result<Vec<LinkReferral>> {
        let state = self.state.read().await;
        // Reverse first so that, on equal dates, the later append comes first.
        let mut referrals: Vec<LinkReferral> = state
            .link_referrals
            .iter()
            .rev()
            .filter(|r| &r.device_address == device_address)
            .cloned()
            .collect();
        referrals.sort_by(|a, b| b.creation_date.cmp(&a.creation_date));
        Ok(referrals)
    }
}
