use async_trait::async_trait;
use attest_types::{
    is_valid_address, Address, AncestorInput, AttestationRecord, DeviceAddress, NativeAmount,
    PaymentOutput, UnitId,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    #[error("Invalid shared address definition: {0}")]
    InvalidDefinition(String),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Payment rejected: {0}")]
    Rejected(String),
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Comparison used by a data-feed condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Gt => ">",
            Relation::Ge => ">=",
            Relation::Lt => "<",
            Relation::Le => "<=",
            Relation::Eq => "=",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Spending condition of a shared address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpendingCondition {
    Or(Vec<SpendingCondition>),
    And(Vec<SpendingCondition>),
    /// Spendable by a signature of this address.
    Address(Address),
    /// Satisfied once one of `oracles` has posted `feed_name <relation> value`.
    DataFeed {
        oracles: Vec<Address>,
        feed_name: String,
        relation: Relation,
        value: i64,
    },
}

impl SpendingCondition {
    /// Ledger-native JSON form of the definition.
    pub fn to_definition(&self) -> Value {
        match self {
            SpendingCondition::Or(branches) => {
                json!(["or", branches.iter().map(Self::to_definition).collect::<Vec<_>>()])
            }
            SpendingCondition::And(branches) => {
                json!(["and", branches.iter().map(Self::to_definition).collect::<Vec<_>>()])
            }
            SpendingCondition::Address(address) => json!(["address", address.as_str()]),
            SpendingCondition::DataFeed {
                oracles,
                feed_name,
                relation,
                value,
            } => json!([
                "in data feed",
                [
                    oracles.iter().map(|o| o.as_str()).collect::<Vec<_>>(),
                    feed_name,
                    relation.as_str(),
                    value.to_string()
                ]
            ]),
        }
    }

    /// Every address that can sign some branch of the condition.
    pub fn signing_addresses(&self) -> Vec<&Address> {
        match self {
            SpendingCondition::Or(branches) | SpendingCondition::And(branches) => branches
                .iter()
                .flat_map(|b| b.signing_addresses())
                .collect(),
            SpendingCondition::Address(address) => vec![address],
            SpendingCondition::DataFeed { .. } => Vec::new(),
        }
    }
}

/// Which device signs for one member of a shared address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerAssignment {
    pub address: Address,
    pub member_signing_path: String,
    pub device_address: DeviceAddress,
}

/// Read-only queries against the DAG ledger and the attestations posted on it.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Native-asset transfer inputs of `units`, each with the main-chain index of its source unit.
    async fn lookup_ancestor_inputs(&self, units: &[UnitId]) -> LedgerResult<Vec<AncestorInput>>;

    /// Attestations by `attestor` about any of `addresses`, joined with the
    /// session that requested each of them.
    async fn lookup_attestations(
        &self,
        addresses: &[Address],
        attestor: &Address,
    ) -> LedgerResult<Vec<AttestationRecord>>;

    /// Up to `limit` of `candidates` holding stable, unspent native funds.
    async fn addresses_with_stable_funds(
        &self,
        candidates: &[Address],
        limit: usize,
    ) -> LedgerResult<Vec<Address>>;

    /// True while the node is still syncing history.
    async fn is_catching_up(&self) -> LedgerResult<bool>;

    fn is_address_valid(&self, address: &str) -> bool {
        is_valid_address(address)
    }
}

/// Composition and broadcast of the bot's own units.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Pay `outputs` from `paying_addresses`, using the first paying address for change.
    async fn compose_and_broadcast_payment(
        &self,
        outputs: &[PaymentOutput],
        paying_addresses: &[Address],
        recipient_device: Option<&DeviceAddress>,
    ) -> LedgerResult<UnitId>;

    async fn create_shared_address(
        &self,
        definition: &SpendingCondition,
        signers: &BTreeMap<String, SignerAssignment>,
    ) -> LedgerResult<Address>;

    async fn read_balance(&self, address: &Address) -> LedgerResult<NativeAmount>;

    /// Issue a fresh address of the bot's wallet.
    async fn issue_next_address(&self) -> LedgerResult<Address>;

    /// Move the full balance of `paying_addresses` to `to`.
    async fn send_all(&self, paying_addresses: &[Address], to: &Address) -> LedgerResult<UnitId>;
}
