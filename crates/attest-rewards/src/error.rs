use attest_storage::{LedgerError, StorageError};
use attest_types::TypesError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RewardError {
    /// Persisted or ledger state contradicts itself; retrying cannot help.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("Distribution address is not configured")]
    MissingDistributionAddress,

    #[error("No contract address for {user_address} but contract reward {contract_reward}")]
    MissingContractAddress {
        user_address: String,
        contract_reward: u64,
    },

    #[error("Malformed attestation {unit}: {reason}")]
    MalformedAttestation { unit: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    /// The ledger call failed; the row stays pending for the retry sweep.
    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Invalid value: {0}")]
    Types(#[from] TypesError),
}

impl RewardError {
    /// Fatal errors halt the handling of the event; others leave state retriable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RewardError::Invariant(_)
                | RewardError::MissingDistributionAddress
                | RewardError::MissingContractAddress { .. }
                | RewardError::MalformedAttestation { .. }
                | RewardError::Config(_)
                | RewardError::Types(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RewardError>;
