//! Messages sent to beneficiaries and the operator.

use attest_types::{NativeAmount, RewardKind};
use chrono::{DateTime, Utc};

fn format_usd(usd: f64) -> String {
    format!("${:.3}", usd)
}

fn format_native(amount: NativeAmount) -> String {
    format!("{} bytes", amount.to_units())
}

fn vesting_clause(contract: NativeAmount, vesting_date: Option<DateTime<Utc>>) -> String {
    if contract.is_zero() {
        return String::new();
    }
    match vesting_date {
        Some(date) => format!(
            " {} will be locked on a smart contract and can be spent after {}.",
            format_native(contract),
            date.format("%Y-%m-%d")
        ),
        None => format!(
            " {} will be locked on a smart contract, we'll send its terms once it is created.",
            format_native(contract)
        ),
    }
}

pub fn first_time_bonus(
    usd: f64,
    cash: NativeAmount,
    contract: NativeAmount,
    vesting_date: Option<DateTime<Utc>>,
    forum_username: &str,
    forum_user_id: u64,
) -> String {
    format!(
        "You attested {} (forum id {}) for the first time and will receive a welcome bonus of {} from the distribution fund. {} will be paid to your address right away.{}",
        forum_username,
        forum_user_id,
        format_usd(usd),
        format_native(cash),
        vesting_clause(contract, vesting_date)
    )
}

pub fn referral_bonus(
    usd: f64,
    cash: NativeAmount,
    contract: NativeAmount,
    vesting_date: Option<DateTime<Utc>>,
    referred_username: &str,
    referred_user_id: u64,
) -> String {
    format!(
        "You referred {} (forum id {}) who has just verified their forum account. You will receive a referral bonus of {}. {} will be paid to your address right away.{}",
        referred_username,
        referred_user_id,
        format_usd(usd),
        format_native(cash),
        vesting_clause(contract, vesting_date)
    )
}

pub fn reward_sent(kind: RewardKind) -> String {
    format!("Sent the {} reward", kind)
}

pub fn payment_failed_subject() -> &'static str {
    "failed to send reward"
}

pub fn payment_failed_body(error: &str, distribution_balance: Option<NativeAmount>) -> String {
    match distribution_balance {
        Some(balance) => format!("{}, balance: {}", error, format_native(balance)),
        None => format!("{}, balance: unknown", error),
    }
}

pub fn contract_failed_subject() -> &'static str {
    "failed to create vesting contract"
}

pub fn duplicate_referral_subject() -> &'static str {
    "duplicate referral reward"
}

pub fn duplicate_referral_body(user_address: &str, user_id: &str) -> String {
    format!("referral reward for new user {} {} already written", user_address, user_id)
}
