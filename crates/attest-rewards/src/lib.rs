pub mod ancestry;
pub mod calculator;
pub mod config;
pub mod contract;
pub mod engine;
pub mod error;
pub mod link_referral;
pub mod locks;
pub mod lookup;
pub mod notify;
pub mod receiving;
pub mod resolver;
pub mod sweep;
pub mod texts;
pub mod writer;

pub use ancestry::AncestryWalker;
pub use calculator::{first_time_reward, referral_reward, reward_for_rank, split_reward, RewardSplit};
pub use config::{default_rank_rewards, RewardConfig, RewardContext};
pub use contract::{vesting_definition, vesting_schedule, VestingContract, VestingContractManager};
pub use engine::{IssuanceReport, IssueOutcome, RewardEngine};
pub use error::{Result, RewardError};
pub use locks::{KeyGuard, KeyedLockTable, MOVE_FUNDS_KEY};
pub use lookup::{find_best_attested_ancestor, ReferrerInfo};
pub use notify::{LogMessenger, LogOperatorNotifier, MemoryMessenger, Messenger, OperatorNotifier};
pub use receiving::ReceivingAddressAssigner;
pub use resolver::{ReferralResolver, ResolverState};
pub use sweep::{FundsSweeper, SweepOutcome};
pub use writer::{RetrySummary, RewardLedgerWriter, SendOutcome};
