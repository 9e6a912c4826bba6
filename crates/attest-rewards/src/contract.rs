use crate::config::RewardContext;
use crate::error::{Result, RewardError};
use crate::locks::KeyedLockTable;
use attest_storage::{
    InsertOutcome, Relation, RewardStorage, SignerAssignment, SpendingCondition, Wallet,
};
use attest_types::{Address, Contract, DeviceAddress};
use chrono::{DateTime, Months, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

const TIMESTAMP_FEED: &str = "timestamp";

/// A beneficiary's vesting contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VestingContract {
    pub contract_address: Address,
    pub vesting_date: DateTime<Utc>,
}

impl From<Contract> for VestingContract {
    fn from(contract: Contract) -> Self {
        Self {
            contract_address: contract.contract_address,
            vesting_date: contract.contract_vesting_date,
        }
    }
}

/// Vesting and claim-back dates counted from midnight UTC of `now`.
pub fn vesting_schedule(
    now: DateTime<Utc>,
    term_years: u32,
    unclaimed_term_years: u32,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| RewardError::Invariant("midnight is not a valid time".into()))?
        .and_utc();
    let add_years = |years: u32| {
        midnight
            .checked_add_months(Months::new(years.saturating_mul(12)))
            .ok_or_else(|| RewardError::Invariant(format!("date overflow adding {} years", years)))
    };
    Ok((add_years(term_years)?, add_years(unclaimed_term_years)?))
}

/// Spendable by `beneficiary` after `vesting`, or by `distribution` after `claim_back`.
pub fn vesting_definition(
    beneficiary: &Address,
    distribution: &Address,
    oracle: &Address,
    vesting: DateTime<Utc>,
    claim_back: DateTime<Utc>,
) -> SpendingCondition {
    let after = |ts: DateTime<Utc>| SpendingCondition::DataFeed {
        oracles: vec![oracle.clone()],
        feed_name: TIMESTAMP_FEED.to_string(),
        relation: Relation::Gt,
        value: ts.timestamp_millis(),
    };
    SpendingCondition::Or(vec![
        SpendingCondition::And(vec![
            SpendingCondition::Address(beneficiary.clone()),
            after(vesting),
        ]),
        SpendingCondition::And(vec![
            SpendingCondition::Address(distribution.clone()),
            after(claim_back),
        ]),
    ])
}

/// Creates and remembers one vesting contract per beneficiary.
pub struct VestingContractManager {
    storage: Arc<dyn RewardStorage>,
    wallet: Arc<dyn Wallet>,
    context: Arc<RewardContext>,
    locks: Arc<KeyedLockTable>,
}

impl VestingContractManager {
    pub fn new(
        storage: Arc<dyn RewardStorage>,
        wallet: Arc<dyn Wallet>,
        context: Arc<RewardContext>,
        locks: Arc<KeyedLockTable>,
    ) -> Self {
        Self {
            storage,
            wallet,
            context,
            locks,
        }
    }

    /// The stored contract of `beneficiary`, creating it on first use.
    pub async fn get_or_create(
        &self,
        beneficiary: &Address,
        beneficiary_device: &DeviceAddress,
    ) -> Result<VestingContract> {
        if let Some(existing) = self.storage.get_contract(beneficiary).await? {
            return Ok(existing.into());
        }

        let _guard = self.locks.acquire(format!("contract-{}", beneficiary)).await;
        if let Some(existing) = self.storage.get_contract(beneficiary).await? {
            return Ok(existing.into());
        }

        let distribution = self.context.distribution_address()?;
        let config = &self.context.config;
        let (vesting, claim_back) = vesting_schedule(
            Utc::now(),
            config.contract_term_years,
            config.contract_unclaimed_term_years,
        )?;
        let definition = vesting_definition(
            beneficiary,
            distribution,
            &config.timestamp_oracle_address,
            vesting,
            claim_back,
        );

        let signers = BTreeMap::from([
            (
                "r.0.0".to_string(),
                SignerAssignment {
                    address: beneficiary.clone(),
                    member_signing_path: "r".to_string(),
                    device_address: beneficiary_device.clone(),
                },
            ),
            (
                "r.1.0".to_string(),
                SignerAssignment {
                    address: distribution.clone(),
                    member_signing_path: "r".to_string(),
                    device_address: self.context.bot_device_address.clone(),
                },
            ),
        ]);

        let contract_address = self.wallet.create_shared_address(&definition, &signers).await?;
        let outcome = self
            .storage
            .insert_contract(Contract {
                user_address: beneficiary.clone(),
                contract_address: contract_address.clone(),
                contract_vesting_date: vesting,
            })
            .await?;

        if outcome == InsertOutcome::Inserted {
            info!(
                beneficiary = %beneficiary,
                contract_address = %contract_address,
                vesting_date = %vesting,
                claim_back_date = %claim_back,
                "🔒 Vesting contract created"
            );
            return Ok(VestingContract {
                contract_address,
                vesting_date: vesting,
            });
        }

        let stored = self.storage.get_contract(beneficiary).await?.ok_or_else(|| {
            RewardError::Invariant(format!("contract for {} vanished after insert", beneficiary))
        })?;
        Ok(stored.into())
    }
}
