use crate::error::{Result, RewardError};
use crate::locks::KeyedLockTable;
use attest_storage::{InsertOutcome, RewardStorage, Wallet};
use attest_types::{Address, DeviceAddress, NativeAmount, ReceivingAddress};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Hands out one payment address per (device, user address, forum id) session.
pub struct ReceivingAddressAssigner {
    storage: Arc<dyn RewardStorage>,
    wallet: Arc<dyn Wallet>,
    locks: Arc<KeyedLockTable>,
}

impl ReceivingAddressAssigner {
    pub fn new(
        storage: Arc<dyn RewardStorage>,
        wallet: Arc<dyn Wallet>,
        locks: Arc<KeyedLockTable>,
    ) -> Self {
        Self {
            storage,
            wallet,
            locks,
        }
    }

    /// The session's receiving address, issuing and storing a new one on first request.
    pub async fn read_or_assign(
        &self,
        device_address: &DeviceAddress,
        user_address: &Address,
        forum_user_id: u64,
        price: NativeAmount,
    ) -> Result<ReceivingAddress> {
        let _guard = self.locks.acquire(device_address.as_str()).await;

        if let Some(existing) = self
            .storage
            .find_receiving_address(device_address, user_address, forum_user_id)
            .await?
        {
            return Ok(existing);
        }

        let record = ReceivingAddress {
            receiving_address: self.wallet.issue_next_address().await?,
            device_address: device_address.clone(),
            user_address: user_address.clone(),
            forum_user_id,
            price,
            profile: None,
            created_at: Utc::now(),
        };
        match self.storage.insert_receiving_address(record.clone()).await? {
            InsertOutcome::Inserted => {
                info!(
                    device = %device_address,
                    user_address = %user_address,
                    receiving_address = %record.receiving_address,
                    "📬 Receiving address assigned"
                );
                Ok(record)
            }
            outcome => Err(RewardError::Invariant(format!(
                "receiving address insert for device {} returned {:?}",
                device_address, outcome
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_storage::{MemoryLedger, MemoryRewardStorage};

    #[tokio::test]
    async fn test_concurrent_requests_share_one_address() {
        let assigner = Arc::new(ReceivingAddressAssigner::new(
            Arc::new(MemoryRewardStorage::new()),
            Arc::new(MemoryLedger::new()),
            Arc::new(KeyedLockTable::new()),
        ));
        let device = DeviceAddress::derive(b"device");
        let user = Address::derive(b"user");
        let price = NativeAmount::from_units(49_000);

        let mut handles = Vec::new();
        for _ in 0..5 {
            let assigner = assigner.clone();
            let device = device.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                assigner.read_or_assign(&device, &user, 7, price).await.unwrap()
            }));
        }

        let mut addresses = Vec::new();
        for handle in handles {
            addresses.push(handle.await.unwrap().receiving_address);
        }
        addresses.dedup();
        assert_eq!(addresses.len(), 1);

        let other = assigner.read_or_assign(&device, &user, 8, price).await.unwrap();
        assert_ne!(other.receiving_address, addresses[0]);
    }
}
