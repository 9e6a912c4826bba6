use crate::error::{Result, RewardError};
use attest_types::{Address, DeviceAddress};
use std::collections::BTreeMap;

pub const DEFAULT_MAX_REFERRAL_DEPTH: u32 = 5;
pub const DEFAULT_RETRY_BATCH_SIZE: usize = 5;

/// Forum rank name to first-time reward in USD.
pub fn default_rank_rewards() -> BTreeMap<String, f64> {
    [
        ("Brand New", 0.025),
        ("Newbie", 0.05),
        ("Jr. Member", 0.075),
        ("Member", 0.1),
        ("Full Member", 0.125),
        ("Sr. Member", 0.15),
        ("Hero Member", 0.175),
        ("Legendary", 0.175),
        ("Donator", 0.2),
        ("VIP", 0.225),
        ("Staff", 0.25),
        ("Moderator", 0.275),
        ("Global Moderator", 0.3),
        ("Administrator", 0.4),
        ("Founder", 0.5),
    ]
    .into_iter()
    .map(|(rank, usd)| (rank.to_string(), usd))
    .collect()
}

/// Reward policy, fixed at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardConfig {
    pub max_referral_depth: u32,
    pub rank_rewards_usd: BTreeMap<String, f64>,
    /// Multiplier applied to rewards of signature-proven attestations.
    pub signing_reward_share: f64,
    /// Vesting share of a first-time reward.
    pub reward_contract_share: f64,
    /// Vesting share of a referral reward.
    pub referral_reward_contract_share: f64,
    pub native_units_per_usd: f64,
    pub contract_term_years: u32,
    pub contract_unclaimed_term_years: u32,
    pub timestamp_oracle_address: Address,
    pub retry_batch_size: usize,
    pub profile_salt: String,
}

impl RewardConfig {
    pub fn new(timestamp_oracle_address: Address) -> Self {
        Self {
            max_referral_depth: DEFAULT_MAX_REFERRAL_DEPTH,
            rank_rewards_usd: default_rank_rewards(),
            signing_reward_share: 1.0,
            reward_contract_share: 0.5,
            referral_reward_contract_share: 0.75,
            native_units_per_usd: 50_000_000.0,
            contract_term_years: 1,
            contract_unclaimed_term_years: 2,
            timestamp_oracle_address,
            retry_batch_size: DEFAULT_RETRY_BATCH_SIZE,
            profile_salt: String::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_referral_depth == 0 {
            return Err(RewardError::Config("max_referral_depth must be at least 1".into()));
        }
        for (name, share) in [
            ("signing_reward_share", self.signing_reward_share),
            ("reward_contract_share", self.reward_contract_share),
            ("referral_reward_contract_share", self.referral_reward_contract_share),
        ] {
            if !(0.0..=1.0).contains(&share) {
                return Err(RewardError::Config(format!("{} must be within [0, 1], got {}", name, share)));
            }
        }
        if !(self.native_units_per_usd > 0.0 && self.native_units_per_usd.is_finite()) {
            return Err(RewardError::Config(format!(
                "native_units_per_usd must be positive, got {}",
                self.native_units_per_usd
            )));
        }
        if let Some((rank, usd)) = self
            .rank_rewards_usd
            .iter()
            .find(|(_, usd)| !(**usd >= 0.0 && usd.is_finite()))
        {
            return Err(RewardError::Config(format!("reward for rank {} is invalid: {}", rank, usd)));
        }
        if self.contract_unclaimed_term_years <= self.contract_term_years {
            return Err(RewardError::Config(
                "contract_unclaimed_term_years must exceed contract_term_years".into(),
            ));
        }
        if self.retry_batch_size == 0 {
            return Err(RewardError::Config("retry_batch_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Identity constants and policy shared by every reward operation.
#[derive(Debug, Clone)]
pub struct RewardContext {
    pub config: RewardConfig,
    pub attestor_address: Address,
    /// Pays rewards and receives claimed-back contract funds.
    pub distribution_address: Option<Address>,
    pub bot_device_address: DeviceAddress,
}

impl RewardContext {
    pub fn new(
        config: RewardConfig,
        attestor_address: Address,
        distribution_address: Option<Address>,
        bot_device_address: DeviceAddress,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            attestor_address,
            distribution_address,
            bot_device_address,
        })
    }

    pub fn distribution_address(&self) -> Result<&Address> {
        self.distribution_address
            .as_ref()
            .ok_or(RewardError::MissingDistributionAddress)
    }
}
