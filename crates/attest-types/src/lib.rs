pub mod amount;
pub mod attestation;
pub mod error;
pub mod id;
pub mod records;

pub use amount::NativeAmount;
pub use attestation::{
    AncestorInput, AttestationPayload, AttestationRecord, ProfileClaims, SourceProfile,
    ATTESTATION_APP,
};
pub use error::{Result, TypesError};
pub use id::{is_valid_address, Address, DeviceAddress, TransactionId, UnitId, UserId, ADDRESS_LEN};
pub use records::{
    AttestedProfile, Contract, LinkReferral, LinkReferralKind, PaymentOutput, ProofType,
    ReceivingAddress, ReferralRewardUnit, RewardKind, RewardPayout, RewardUnit, Transaction,
};
