#![allow(dead_code)]

use attest_rewards::{KeyedLockTable, MemoryMessenger, RewardConfig, RewardContext, RewardEngine};
use attest_storage::{LedgerUnit, MemoryLedger, MemoryRewardStorage, RewardStorage, UnitInput};
use attest_types::{
    Address, AttestationPayload, AttestationRecord, AttestedProfile, DeviceAddress, NativeAmount,
    PaymentOutput, ProofType, ReceivingAddress, TransactionId, UnitId, ATTESTATION_APP,
};
use chrono::Utc;
use std::sync::Arc;

pub const SALT: &str = "test-salt";

pub struct Harness {
    pub storage: Arc<MemoryRewardStorage>,
    pub ledger: Arc<MemoryLedger>,
    pub messenger: Arc<MemoryMessenger>,
    pub engine: Arc<RewardEngine>,
    pub attestor: Address,
    pub distribution: Address,
}

pub fn test_config() -> RewardConfig {
    let mut config = RewardConfig::new(Address::derive(b"timestamp-oracle"));
    config.profile_salt = SALT.to_string();
    config
}

pub fn device(name: &str) -> DeviceAddress {
    DeviceAddress::derive(name.as_bytes())
}

pub fn user(name: &str) -> Address {
    Address::derive(name.as_bytes())
}

pub fn unit_id(name: &str) -> UnitId {
    UnitId::new(name.as_bytes())
}

pub fn profile(name: &str, rank: &str) -> AttestedProfile {
    AttestedProfile {
        user_address: user(name),
        forum_user_id: name.len() as u64 * 1000,
        forum_username: name.to_string(),
        rank: rank.to_string(),
        rank_index: 6,
        activity: 300,
        posts: 900,
        is_public: true,
    }
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: RewardConfig) -> Self {
        let storage = Arc::new(MemoryRewardStorage::new());
        let ledger = Arc::new(MemoryLedger::new());
        let messenger = Arc::new(MemoryMessenger::new());
        let attestor = Address::derive(b"attestor");
        let distribution = Address::derive(b"distribution");
        ledger
            .credit(&distribution, NativeAmount::from_units(1_000_000_000_000))
            .await;

        let context = Arc::new(
            RewardContext::new(
                config,
                attestor.clone(),
                Some(distribution.clone()),
                device("bot"),
            )
            .unwrap(),
        );
        let engine = Arc::new(RewardEngine::new(
            storage.clone(),
            ledger.clone(),
            ledger.clone(),
            messenger.clone(),
            messenger.clone(),
            context,
            Arc::new(KeyedLockTable::new()),
        ));

        Self {
            storage,
            ledger,
            messenger,
            engine,
            attestor,
            distribution,
        }
    }

    /// A verified session for `name` with one recorded proof.
    pub async fn attested_session(
        &self,
        name: &str,
        rank: &str,
        proof_type: ProofType,
        payment_unit: Option<UnitId>,
    ) -> TransactionId {
        self.attested_session_on(name, &device(name), rank, proof_type, payment_unit)
            .await
    }

    pub async fn attested_session_on(
        &self,
        name: &str,
        device_address: &DeviceAddress,
        rank: &str,
        proof_type: ProofType,
        payment_unit: Option<UnitId>,
    ) -> TransactionId {
        let receiving = Address::derive(format!("receiving-{}-{}", name, device_address).as_bytes());
        let existing = self.storage.get_receiving_address(&receiving).await.unwrap();
        if existing.is_none() {
            self.storage
                .insert_receiving_address(ReceivingAddress {
                    receiving_address: receiving.clone(),
                    device_address: device_address.clone(),
                    user_address: user(name),
                    forum_user_id: name.len() as u64 * 1000,
                    price: NativeAmount::from_units(49_000),
                    profile: None,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        self.storage
            .update_profile(&receiving, profile(name, rank))
            .await
            .unwrap();
        self.storage
            .insert_transaction(&receiving, proof_type, payment_unit)
            .await
            .unwrap()
            .transaction_id
    }

    /// Post an attestation by this bot's attestor for `name`, requested from `device_address`.
    pub async fn attest(&self, name: &str, device_address: &DeviceAddress, payment_unit: Option<UnitId>) {
        let profile = profile(name, "Member");
        let (payload, _) = AttestationPayload::build(&profile, SALT);
        self.ledger
            .add_attestation(AttestationRecord {
                address: user(name),
                attestor_address: self.attestor.clone(),
                attestation_unit: unit_id(&format!("attestation-{}", name)),
                app: ATTESTATION_APP.to_string(),
                payload: payload.to_json().unwrap(),
                user_address: user(name),
                device_address: device_address.clone(),
                forum_user_id: profile.forum_user_id,
                payment_unit,
            })
            .await;
    }

    /// `funder` pays `payer` (funding unit at `mci`), then `payer` pays the bot
    /// in `payment`. Returns the payment unit.
    pub async fn funded_payment(&self, funder: &str, payer: &str, mci: u64, payment: &str) -> UnitId {
        let funder_source = unit_id(&format!("{}-source-{}", funder, mci));
        let transfer = unit_id(&format!("{}-to-{}-{}", funder, payer, mci));
        let payment_unit = unit_id(payment);

        self.ledger
            .add_unit(LedgerUnit {
                unit: funder_source,
                main_chain_index: mci,
                inputs: vec![],
                outputs: vec![PaymentOutput {
                    address: user(funder),
                    amount: NativeAmount::from_units(1_000_000),
                }],
            })
            .await;
        self.ledger
            .add_unit(LedgerUnit {
                unit: transfer,
                main_chain_index: mci + 1,
                inputs: vec![UnitInput {
                    address: user(funder),
                    src_unit: funder_source,
                    asset: None,
                }],
                outputs: vec![PaymentOutput {
                    address: user(payer),
                    amount: NativeAmount::from_units(100_000),
                }],
            })
            .await;
        self.ledger
            .add_unit(LedgerUnit {
                unit: payment_unit,
                main_chain_index: mci + 100,
                inputs: vec![UnitInput {
                    address: user(payer),
                    src_unit: transfer,
                    asset: None,
                }],
                outputs: vec![],
            })
            .await;
        payment_unit
    }
}
