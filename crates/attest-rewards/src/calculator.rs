use crate::config::RewardConfig;
use attest_types::{NativeAmount, ProofType};

/// A reward converted to native units and split into its two portions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardSplit {
    pub usd: f64,
    pub full: NativeAmount,
    /// Paid straight to the beneficiary.
    pub cash: NativeAmount,
    /// Paid to the beneficiary's vesting contract.
    pub contract: NativeAmount,
}

/// USD reward for a forum rank; zero for ranks missing from the table.
pub fn reward_for_rank(config: &RewardConfig, rank: &str) -> f64 {
    config.rank_rewards_usd.get(rank).copied().unwrap_or(0.0)
}

fn to_units(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

/// Convert `usd` at `native_units_per_usd` and split it by `cash_share`.
///
/// Both portions are rounded independently. Should rounding push their sum
/// past the rounded full amount, the excess comes off the cash portion.
pub fn split_reward(usd: f64, cash_share: f64, native_units_per_usd: f64) -> RewardSplit {
    let exact = usd * native_units_per_usd;
    let full = to_units(exact);
    let mut cash = to_units(exact * cash_share);
    let contract = to_units(exact * (1.0 - cash_share)).min(full);

    let total = cash.saturating_add(contract);
    if total > full {
        cash = cash.saturating_sub(total - full);
    }

    RewardSplit {
        usd,
        full: NativeAmount::from_units(full),
        cash: NativeAmount::from_units(cash),
        contract: NativeAmount::from_units(contract),
    }
}

/// First-time bonus for `rank`, or `None` when the rank earns nothing.
pub fn first_time_reward(
    config: &RewardConfig,
    rank: &str,
    proof_type: ProofType,
) -> Option<RewardSplit> {
    let mut usd = reward_for_rank(config, rank);
    if usd <= 0.0 {
        return None;
    }
    if proof_type == ProofType::Signature {
        usd *= config.signing_reward_share;
    }
    let split = split_reward(
        usd,
        1.0 - config.reward_contract_share,
        config.native_units_per_usd,
    );
    (!split.full.is_zero()).then_some(split)
}

/// Referral bonus owed for bringing in a user of `rank`, or `None` when it is nothing.
pub fn referral_reward(config: &RewardConfig, rank: &str) -> Option<RewardSplit> {
    let usd = reward_for_rank(config, rank);
    if usd <= 0.0 {
        return None;
    }
    let split = split_reward(
        usd,
        1.0 - config.referral_reward_contract_share,
        config.native_units_per_usd,
    );
    (!split.full.is_zero()).then_some(split)
}
