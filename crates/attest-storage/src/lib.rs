pub mod backend;
pub mod file;
pub mod ledger;
pub mod memory;
pub mod memory_ledger;
pub mod snapshot;

pub use backend::{InsertOutcome, RewardStorage, StorageError};
pub use file::FileRewardStorage;
pub use ledger::{
    LedgerError, LedgerReader, LedgerResult, Relation, SignerAssignment, SpendingCondition, Wallet,
};
pub use memory::MemoryRewardStorage;
pub use memory_ledger::{
    FixtureBalance, LedgerFixture, LedgerUnit, MemoryLedger, PaymentRecord, UnitInput,
};
pub use snapshot::{RetryAttempt, SnapshotMetadata, StorageSnapshot};
