use crate::backend::{Result, StorageError};
use crate::memory::MemoryState;
use attest_types::{
    Contract, LinkReferral, ReceivingAddress, ReferralRewardUnit, RewardKind, RewardUnit,
    Transaction, TransactionId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub transaction_count: usize,
    pub reward_count: usize,
    pub referral_reward_count: usize,
    /// Hex blake3 of the serialized tables.
    pub hash: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotTables {
    pub next_transaction_id: u64,
    pub receiving_addresses: Vec<ReceivingAddress>,
    pub transactions: Vec<Transaction>,
    pub reward_units: Vec<RewardUnit>,
    pub referral_reward_units: Vec<ReferralRewardUnit>,
    pub contracts: Vec<Contract>,
    pub link_referrals: Vec<LinkReferral>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry_attempts: Vec<RetryAttempt>,
}

/// Last failed retry of an unsent reward row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAttempt {
    pub kind: RewardKind,
    pub transaction_id: TransactionId,
    pub attempted_at: DateTime<Utc>,
}

/// Full copy of the reward tables, persisted as one JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSnapshot {
    pub metadata: SnapshotMetadata,
    pub tables: SnapshotTables,
}

impl StorageSnapshot {
    pub(crate) fn from_state(state: &MemoryState) -> Self {
        let mut contracts: Vec<Contract> = state.contracts.values().cloned().collect();
        contracts.sort_by(|a, b| a.user_address.cmp(&b.user_address));
        let mut retry_attempts: Vec<RetryAttempt> = state
            .retry_attempts
            .iter()
            .map(|(&(kind, transaction_id), &attempted_at)| RetryAttempt {
                kind,
                transaction_id,
                attempted_at,
            })
            .collect();
        retry_attempts.sort_by_key(|a| (a.transaction_id, a.kind == RewardKind::Referral));

        let tables = SnapshotTables {
            next_transaction_id: state.next_transaction_id,
            receiving_addresses: state.receiving_addresses.clone(),
            transactions: state.transactions.values().cloned().collect(),
            reward_units: state.reward_units.values().cloned().collect(),
            referral_reward_units: state.referral_reward_units.values().cloned().collect(),
            contracts,
            link_referrals: state.link_referrals.clone(),
            retry_attempts,
        };

        let metadata = SnapshotMetadata {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            transaction_count: tables.transactions.len(),
            reward_count: tables.reward_units.len(),
            referral_reward_count: tables.referral_reward_units.len(),
            hash: Self::calculate_hash(&tables),
        };

        Self { metadata, tables }
    }

    pub(crate) fn into_state(self) -> MemoryState {
        let tables = self.tables;
        MemoryState {
            next_transaction_id: tables.next_transaction_id.max(1),
            receiving_addresses: tables.receiving_addresses,
            transactions: tables
                .transactions
                .into_iter()
                .map(|t| (t.transaction_id, t))
                .collect(),
            reward_units: tables
                .reward_units
                .into_iter()
                .map(|r| (r.transaction_id, r))
                .collect(),
            referral_reward_units: tables
                .referral_reward_units
                .into_iter()
                .map(|r| (r.transaction_id, r))
                .collect(),
            contracts: tables
                .contracts
                .into_iter()
                .map(|c| (c.user_address.clone(), c))
                .collect(),
            link_referrals: tables.link_referrals,
            retry_attempts: tables
                .retry_attempts
                .into_iter()
                .map(|a| ((a.kind, a.transaction_id), a.attempted_at))
                .collect(),
        }
    }

    fn calculate_hash(tables: &SnapshotTables) -> String {
        // Serializing plain vectors of owned records cannot fail.
        let bytes = serde_json::to_vec(tables).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }

    pub fn verify(&self) -> bool {
        self.metadata.version == SNAPSHOT_VERSION
            && Self::calculate_hash(&self.tables) == self.metadata.hash
    }

    /// Write to `path` through a sibling temp file and rename, so a crash
    /// never leaves a half-written snapshot behind.
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        let tmp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, path).await?;
        Ok(())
    }

    pub async fn load_from_file(path: &Path) -> Result<Self> {
        let data = fs::read(path).await?;
        let snapshot: Self = serde_json::from_slice(&data)?;

        if !snapshot.verify() {
            return Err(StorageError::BackendError(format!(
                "Snapshot verification failed: {}",
                path.display()
            )));
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RewardStorage;
    use crate::memory::MemoryRewardStorage;
    use attest_types::{Address, DeviceAddress, NativeAmount, ProofType};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_snapshot_save_load() {
        let storage = MemoryRewardStorage::new();
        let receiving = Address::derive(b"receiving");
        storage
            .insert_receiving_address(ReceivingAddress {
                receiving_address: receiving.clone(),
                device_address: DeviceAddress::derive(b"device"),
                user_address: Address::derive(b"user"),
                forum_user_id: 1,
                price: NativeAmount::from_units(49_000),
                profile: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        storage
            .insert_transaction(&receiving, ProofType::Signature, None)
            .await
            .unwrap();

        let snapshot = storage.snapshot().await;
        assert!(snapshot.verify());
        assert_eq!(snapshot.metadata.transaction_count, 1);

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rewards.json");
        snapshot.save_to_file(&path).await.unwrap();
        assert!(!path.with_extension("tmp").exists());

        let loaded = StorageSnapshot::load_from_file(&path).await.unwrap();
        assert_eq!(loaded.tables.next_transaction_id, 2);
        assert_eq!(loaded.tables.receiving_addresses.len(), 1);
    }

    #[tokio::test]
    async fn test_tampered_snapshot_rejected() {
        let mut snapshot = MemoryRewardStorage::new().snapshot().await;
        snapshot.tables.next_transaction_id = 99;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rewards.json");
        snapshot.save_to_file(&path).await.unwrap();

        assert!(StorageSnapshot::load_from_file(&path).await.is_err());
    }
}
