use crate::amount::NativeAmount;
use crate::error::TypesError;
use crate::id::{Address, DeviceAddress, TransactionId, UnitId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the user proved control of their address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofType {
    Payment,
    Signature,
}

impl fmt::Display for ProofType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProofType::Payment => f.write_str("payment"),
            ProofType::Signature => f.write_str("signature"),
        }
    }
}

impl FromStr for ProofType {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment" => Ok(ProofType::Payment),
            "signature" => Ok(ProofType::Signature),
            other => Err(TypesError::UnknownVariant {
                kind: "proof type",
                value: other.to_string(),
            }),
        }
    }
}

/// Source of a low-confidence referral hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkReferralKind {
    Pairing,
    Cookie,
}

impl fmt::Display for LinkReferralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkReferralKind::Pairing => f.write_str("pairing"),
            LinkReferralKind::Cookie => f.write_str("cookie"),
        }
    }
}

impl FromStr for LinkReferralKind {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pairing" => Ok(LinkReferralKind::Pairing),
            "cookie" => Ok(LinkReferralKind::Cookie),
            other => Err(TypesError::UnknownVariant {
                kind: "link referral type",
                value: other.to_string(),
            }),
        }
    }
}

/// Which reward table a payout lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardKind {
    /// First-time bonus paid to the attested user.
    Attestation,
    /// Bonus paid to whoever referred the attested user.
    Referral,
}

impl RewardKind {
    pub const ALL: [RewardKind; 2] = [RewardKind::Attestation, RewardKind::Referral];
}

impl fmt::Display for RewardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewardKind::Attestation => f.write_str("attestation"),
            RewardKind::Referral => f.write_str("referral"),
        }
    }
}

/// Forum profile verified for a user address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestedProfile {
    pub user_address: Address,
    pub forum_user_id: u64,
    pub forum_username: String,
    pub rank: String,
    pub rank_index: u32,
    pub activity: u64,
    pub posts: u64,
    pub is_public: bool,
}

/// Payment address handed out to one (device, user address, forum id) session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivingAddress {
    pub receiving_address: Address,
    pub device_address: DeviceAddress,
    pub user_address: Address,
    pub forum_user_id: u64,
    pub price: NativeAmount,
    pub profile: Option<AttestedProfile>,
    pub created_at: DateTime<Utc>,
}

/// A payment or signed message accepted as proof for a receiving address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub receiving_address: Address,
    pub proof_type: ProofType,
    /// Unit that carried the payment; `None` for signature proofs.
    pub payment_unit: Option<UnitId>,
    pub created_at: DateTime<Utc>,
}

/// First-time bonus owed to an attested user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardUnit {
    pub transaction_id: TransactionId,
    pub device_address: DeviceAddress,
    pub user_address: Address,
    pub user_id: UserId,
    pub reward: NativeAmount,
    pub contract_reward: NativeAmount,
    pub reward_unit: Option<UnitId>,
    pub reward_date: Option<DateTime<Utc>>,
}

impl RewardUnit {
    pub fn is_sent(&self) -> bool {
        self.reward_date.is_some()
    }
}

/// Bonus owed to the referrer of a newly attested user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralRewardUnit {
    pub transaction_id: TransactionId,
    pub referrer_user_address: Address,
    pub referrer_user_id: UserId,
    pub referred_user_address: Address,
    pub referred_user_id: UserId,
    pub reward: NativeAmount,
    pub contract_reward: NativeAmount,
    pub reward_unit: Option<UnitId>,
    pub reward_date: Option<DateTime<Utc>>,
}

impl ReferralRewardUnit {
    pub fn is_sent(&self) -> bool {
        self.reward_date.is_some()
    }
}

/// Vesting contract owned by one beneficiary address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub user_address: Address,
    pub contract_address: Address,
    pub contract_vesting_date: DateTime<Utc>,
}

/// Append-only referral hint recorded from a pairing code or tracking cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReferral {
    pub referring_user_address: Address,
    pub device_address: DeviceAddress,
    pub kind: LinkReferralKind,
    pub creation_date: DateTime<Utc>,
}

/// Kind-independent view of a reward row joined with what is needed to pay it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardPayout {
    pub kind: RewardKind,
    pub transaction_id: TransactionId,
    pub beneficiary_address: Address,
    /// Device to notify; for referral rewards the referrer's most recent device.
    pub beneficiary_device: Option<DeviceAddress>,
    pub reward: NativeAmount,
    pub contract_reward: NativeAmount,
    /// Vesting contract of the beneficiary, if one was created.
    pub contract_address: Option<Address>,
    pub reward_unit: Option<UnitId>,
    pub reward_date: Option<DateTime<Utc>>,
}

impl RewardPayout {
    pub fn is_sent(&self) -> bool {
        self.reward_date.is_some()
    }
}

/// One output of a payment composed by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOutput {
    pub address: Address,
    pub amount: NativeAmount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proof_type_round_trip_text() {
        assert_eq!("payment".parse::<ProofType>().unwrap(), ProofType::Payment);
        assert_eq!(ProofType::Signature.to_string(), "signature");
        assert!("cash".parse::<ProofType>().is_err());
    }

    #[test]
    fn test_link_referral_kind_serde() {
        let json = serde_json::to_string(&LinkReferralKind::Cookie).unwrap();
        assert_eq!(json, "\"cookie\"");
        assert_eq!("pairing".parse::<LinkReferralKind>().unwrap(), LinkReferralKind::Pairing);
    }

    #[test]
    fn test_reward_unit_sent_flag() {
        let mut row = RewardUnit {
            transaction_id: TransactionId(1),
            device_address: DeviceAddress::derive(b"d"),
            user_address: Address::derive(b"u"),
            user_id: UserId::new("id").unwrap(),
            reward: NativeAmount::from_units(10),
            contract_reward: NativeAmount::from_units(10),
            reward_unit: None,
            reward_date: None,
        };
        assert!(!row.is_sent());
        row.reward_date = Some(Utc::now());
        assert!(row.is_sent());
    }
}
