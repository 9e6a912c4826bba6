use async_trait::async_trait;
use attest_types::{
    Address, AttestedProfile, Contract, DeviceAddress, LinkReferral, ProofType, ReceivingAddress,
    ReferralRewardUnit, RewardKind, RewardPayout, RewardUnit, Transaction, TransactionId, UnitId,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Result of an insert guarded by uniqueness constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The row was written.
    Inserted,
    /// A row with the same primary key already exists; nothing was written.
    AlreadyRecorded,
    /// A secondary uniqueness constraint rejected the row; nothing was written.
    Duplicate,
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted)
    }
}

/// Persistence of the bot's own tables.
///
/// Every insert is atomic with respect to its uniqueness constraints: two
/// concurrent inserts of conflicting rows yield exactly one `Inserted`.
#[async_trait]
pub trait RewardStorage: Send + Sync {
    /// Store a newly issued receiving address.
    async fn insert_receiving_address(&self, record: ReceivingAddress) -> Result<InsertOutcome>;

    /// Receiving address issued to a (device, user address, forum id) session.
    async fn find_receiving_address(
        &self,
        device_address: &DeviceAddress,
        user_address: &Address,
        forum_user_id: u64,
    ) -> Result<Option<ReceivingAddress>>;

    async fn get_receiving_address(&self, receiving_address: &Address)
        -> Result<Option<ReceivingAddress>>;

    /// Attach the verified forum profile to a receiving address.
    async fn update_profile(&self, receiving_address: &Address, profile: AttestedProfile)
        -> Result<()>;

    /// Device of the most recently issued receiving address for `user_address`.
    async fn latest_device_for_user(&self, user_address: &Address)
        -> Result<Option<DeviceAddress>>;

    async fn list_receiving_addresses(&self) -> Result<Vec<Address>>;

    /// Record a proof for a receiving address, allocating a new transaction id.
    async fn insert_transaction(
        &self,
        receiving_address: &Address,
        proof_type: ProofType,
        payment_unit: Option<UnitId>,
    ) -> Result<Transaction>;

    async fn get_transaction(&self, transaction_id: TransactionId) -> Result<Option<Transaction>>;

    /// Insert a first-time reward; unique on transaction id and on (user_address, user_id).
    async fn insert_reward_unit(&self, row: RewardUnit) -> Result<InsertOutcome>;

    async fn get_reward_unit(&self, transaction_id: TransactionId) -> Result<Option<RewardUnit>>;

    /// Insert a referral reward; unique on transaction id and on the referred (address, user_id).
    async fn insert_referral_reward_unit(&self, row: ReferralRewardUnit) -> Result<InsertOutcome>;

    async fn get_referral_reward_unit(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<ReferralRewardUnit>>;

    /// Reward row of `kind` joined with beneficiary device and vesting contract.
    async fn get_reward_payout(
        &self,
        kind: RewardKind,
        transaction_id: TransactionId,
    ) -> Result<Option<RewardPayout>>;

    /// Stamp the payment unit and date on a reward row.
    async fn mark_reward_sent(
        &self,
        kind: RewardKind,
        transaction_id: TransactionId,
        reward_unit: UnitId,
        reward_date: DateTime<Utc>,
    ) -> Result<()>;

    /// Up to `limit` transaction ids of rows of `kind` with no reward unit yet.
    ///
    /// Rows never retried come first, then the least recently retried, so
    /// rows that keep failing cannot hold the whole batch.
    async fn pending_rewards(&self, kind: RewardKind, limit: usize)
        -> Result<Vec<TransactionId>>;

    /// Remember that a retry of the `kind` row of `transaction_id` failed at `attempted_at`.
    async fn record_retry_attempt(
        &self,
        kind: RewardKind,
        transaction_id: TransactionId,
        attempted_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn get_contract(&self, user_address: &Address) -> Result<Option<Contract>>;

    /// Insert a contract; unique on the beneficiary address.
    async fn insert_contract(&self, contract: Contract) -> Result<InsertOutcome>;

    /// Append a referral hint; an identical (referrer, device, kind) hint is ignored.
    async fn insert_link_referral(&self, referral: LinkReferral) -> Result<InsertOutcome>;

    /// Referral hints for a device, newest first.
    async fn link_referrals_for_device(&self, device_address: &DeviceAddress)
        -> Result<Vec<LinkReferral>>;
}
