use crate::ledger::{
    LedgerError, LedgerReader, LedgerResult, SignerAssignment, SpendingCondition, Wallet,
};
use async_trait::async_trait;
use attest_types::{
    Address, AncestorInput, AttestationRecord, DeviceAddress, NativeAmount, PaymentOutput, UnitId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// One input of a ledger unit. `asset` is `None` for the native asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitInput {
    pub address: Address,
    pub src_unit: UnitId,
    #[serde(default)]
    pub asset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerUnit {
    pub unit: UnitId,
    pub main_chain_index: u64,
    #[serde(default)]
    pub inputs: Vec<UnitInput>,
    #[serde(default)]
    pub outputs: Vec<PaymentOutput>,
}

/// A broadcast payment, kept for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub unit: UnitId,
    pub outputs: Vec<PaymentOutput>,
    pub paying_addresses: Vec<Address>,
    pub recipient_device: Option<DeviceAddress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureBalance {
    pub address: Address,
    pub amount: NativeAmount,
}

/// Initial ledger contents, loadable from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerFixture {
    #[serde(default)]
    pub units: Vec<LedgerUnit>,
    #[serde(default)]
    pub attestations: Vec<AttestationRecord>,
    #[serde(default)]
    pub balances: Vec<FixtureBalance>,
}

impl LedgerFixture {
    pub async fn load_from_file(path: &Path) -> crate::backend::Result<Self> {
        let data = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&data)?)
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    units: HashMap<UnitId, LedgerUnit>,
    attestations: Vec<AttestationRecord>,
    balances: HashMap<Address, NativeAmount>,
    /// Last unit that credited each address, used as the source of its next spend.
    funding_units: HashMap<Address, UnitId>,
    shared_addresses: HashMap<Address, (SpendingCondition, BTreeMap<String, SignerAssignment>)>,
    payments: Vec<PaymentRecord>,
    issued_addresses: u64,
    fail_payments: bool,
    fail_shared_addresses: bool,
    catching_up: bool,
}

impl LedgerState {
    fn next_mci(&self) -> u64 {
        self.units
            .values()
            .map(|u| u.main_chain_index)
            .max()
            .map_or(1, |mci| mci + 1)
    }

    fn credit(&mut self, address: &Address, amount: NativeAmount, unit: UnitId) {
        let balance = self.balances.entry(address.clone()).or_default();
        *balance = balance.saturating_add(amount);
        self.funding_units.insert(address.clone(), unit);
    }

    fn available(&self, addresses: &[Address]) -> NativeAmount {
        addresses.iter().fold(NativeAmount::ZERO, |acc, a| {
            acc.saturating_add(self.balances.get(a).copied().unwrap_or_default())
        })
    }

    /// Spend `needed` from `paying_addresses` in order, appending a unit that pays `outputs`.
    fn apply_payment(
        &mut self,
        outputs: &[PaymentOutput],
        paying_addresses: &[Address],
        needed: NativeAmount,
    ) -> UnitId {
        let main_chain_index = self.next_mci();
        let unit = UnitId::new(format!("unit-{}-{}", main_chain_index, self.payments.len()).as_bytes());

        let mut inputs = Vec::new();
        let mut remaining = needed;
        for address in paying_addresses {
            if remaining.is_zero() {
                break;
            }
            let balance = self.balances.get(address).copied().unwrap_or_default();
            if balance.is_zero() {
                continue;
            }
            let spent = balance.min(remaining);
            self.balances.insert(address.clone(), balance.saturating_sub(spent));
            remaining = remaining.saturating_sub(spent);
            if let Some(src_unit) = self.funding_units.get(address) {
                inputs.push(UnitInput {
                    address: address.clone(),
                    src_unit: *src_unit,
                    asset: None,
                });
            }
        }

        for output in outputs {
            self.credit(&output.address, output.amount, unit);
        }
        self.units.insert(
            unit,
            LedgerUnit {
                unit,
                main_chain_index,
                inputs,
                outputs: outputs.to_vec(),
            },
        );
        unit
    }
}

/// In-process DAG ledger and wallet.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn from_fixture(fixture: LedgerFixture) -> Self {
        let ledger = Self::new();
        for unit in fixture.units {
            ledger.add_unit(unit).await;
        }
        for attestation in fixture.attestations {
            ledger.add_attestation(attestation).await;
        }
        for balance in fixture.balances {
            ledger.credit(&balance.address, balance.amount).await;
        }
        ledger
    }

    pub async fn add_unit(&self, unit: LedgerUnit) {
        let mut state = self.state.write().await;
        for output in &unit.outputs {
            state.funding_units.insert(output.address.clone(), unit.unit);
        }
        state.units.insert(unit.unit, unit);
    }

    pub async fn add_attestation(&self, attestation: AttestationRecord) {
        self.state.write().await.attestations.push(attestation);
    }

    /// Give `address` spendable funds without recording a unit.
    pub async fn credit(&self, address: &Address, amount: NativeAmount) {
        let mut state = self.state.write().await;
        let balance = state.balances.entry(address.clone()).or_default();
        *balance = balance.saturating_add(amount);
    }

    /// Make every subsequent payment fail as if the network call had failed.
    pub async fn set_fail_payments(&self, fail: bool) {
        self.state.write().await.fail_payments = fail;
    }

    /// Make shared-address creation fail as if the hub were unreachable.
    pub async fn set_fail_shared_addresses(&self, fail: bool) {
        self.state.write().await.fail_shared_addresses = fail;
    }

    pub async fn set_catching_up(&self, catching_up: bool) {
        self.state.write().await.catching_up = catching_up;
    }

    pub async fn payments(&self) -> Vec<PaymentRecord> {
        self.state.read().await.payments.clone()
    }

    pub async fn shared_address_definition(&self, address: &Address) -> Option<SpendingCondition> {
        self.state
            .read()
            .await
            .shared_addresses
            .get(address)
            .map(|(definition, _)| definition.clone())
    }

    pub async fn balance(&self, address: &Address) -> NativeAmount {
        self.state
            .read()
            .await
            .balances
            .get(address)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl LedgerReader for MemoryLedger {
    async fn lookup_ancestor_inputs(&self, units: &[UnitId]) -> LedgerResult<Vec<AncestorInput>> {
        let state = self.state.read().await;
        let mut ancestors = Vec::new();
        for unit_id in units {
            let Some(unit) = state.units.get(unit_id) else {
                debug!(unit = %unit_id, "Unit not on ledger, no ancestors");
                continue;
            };
            for input in unit.inputs.iter().filter(|i| i.asset.is_none()) {
                if let Some(src) = state.units.get(&input.src_unit) {
                    ancestors.push(AncestorInput {
                        address: input.address.clone(),
                        src_unit: input.src_unit,
                        main_chain_index: src.main_chain_index,
                    });
                }
            }
        }
        Ok(ancestors)
    }

    async fn lookup_attestations(
        &self,
        addresses: &[Address],
        attestor: &Address,
    ) -> LedgerResult<Vec<AttestationRecord>> {
        let state = self.state.read().await;
        Ok(state
            .attestations
            .iter()
            .filter(|a| &a.attestor_address == attestor && addresses.contains(&a.address))
            .cloned()
            .collect())
    }

    async fn addresses_with_stable_funds(
        &self,
        candidates: &[Address],
        limit: usize,
    ) -> LedgerResult<Vec<Address>> {
        let state = self.state.read().await;
        Ok(candidates
            .iter()
            .filter(|a| state.balances.get(*a).is_some_and(|b| !b.is_zero()))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn is_catching_up(&self) -> LedgerResult<bool> {
        Ok(self.state.read().await.catching_up)
    }
}

#[async_trait]
impl Wallet for MemoryLedger {
    async fn compose_and_broadcast_payment(
        &self,
        outputs: &[PaymentOutput],
        paying_addresses: &[Address],
        recipient_device: Option<&DeviceAddress>,
    ) -> LedgerResult<UnitId> {
        let mut state = self.state.write().await;
        if state.fail_payments {
            warn!(outputs = outputs.len(), "⚠️ Payment broadcast failed");
            return Err(LedgerError::Unavailable("broadcast failed".to_string()));
        }
        if outputs.is_empty() {
            return Err(LedgerError::Rejected("no outputs".to_string()));
        }

        let needed = outputs
            .iter()
            .try_fold(NativeAmount::ZERO, |acc, o| acc.checked_add(o.amount))
            .ok_or_else(|| LedgerError::Rejected("output total overflows".to_string()))?;
        let available = state.available(paying_addresses);
        if available < needed {
            return Err(LedgerError::InsufficientFunds {
                needed: needed.to_units(),
                available: available.to_units(),
            });
        }

        let unit = state.apply_payment(outputs, paying_addresses, needed);
        state.payments.push(PaymentRecord {
            unit,
            outputs: outputs.to_vec(),
            paying_addresses: paying_addresses.to_vec(),
            recipient_device: recipient_device.cloned(),
        });

        info!(
            unit = %unit,
            outputs = outputs.len(),
            amount = needed.to_units(),
            "💸 Payment broadcast"
        );
        Ok(unit)
    }

    async fn create_shared_address(
        &self,
        definition: &SpendingCondition,
        signers: &BTreeMap<String, SignerAssignment>,
    ) -> LedgerResult<Address> {
        if signers.is_empty() {
            return Err(LedgerError::InvalidDefinition("no signers".to_string()));
        }
        for address in definition.signing_addresses() {
            if !signers.values().any(|s| &s.address == address) {
                return Err(LedgerError::InvalidDefinition(format!(
                    "no signer assigned for {}",
                    address
                )));
            }
        }

        let mut state = self.state.write().await;
        if state.fail_shared_addresses {
            warn!(signers = signers.len(), "⚠️ Shared address creation failed");
            return Err(LedgerError::Unavailable("hub timeout".to_string()));
        }
        let rendered = definition.to_definition().to_string();
        let address = Address::derive(rendered.as_bytes());
        state
            .shared_addresses
            .insert(address.clone(), (definition.clone(), signers.clone()));

        info!(address = %address, signers = signers.len(), "🤝 Shared address created");
        Ok(address)
    }

    async fn read_balance(&self, address: &Address) -> LedgerResult<NativeAmount> {
        Ok(self.balance(address).await)
    }

    async fn issue_next_address(&self) -> LedgerResult<Address> {
        let mut state = self.state.write().await;
        state.issued_addresses += 1;
        let address = Address::derive(format!("wallet-{}", state.issued_addresses).as_bytes());
        debug!(address = %address, "Issued wallet address");
        Ok(address)
    }

    async fn send_all(&self, paying_addresses: &[Address], to: &Address) -> LedgerResult<UnitId> {
        let mut state = self.state.write().await;
        if state.fail_payments {
            return Err(LedgerError::Unavailable("broadcast failed".to_string()));
        }
        let total = state.available(paying_addresses);
        if total.is_zero() {
            return Err(LedgerError::InsufficientFunds {
                needed: 1,
                available: 0,
            });
        }

        let outputs = vec![PaymentOutput {
            address: to.clone(),
            amount: total,
        }];
        let unit = state.apply_payment(&outputs, paying_addresses, total);
        state.payments.push(PaymentRecord {
            unit,
            outputs,
            paying_addresses: paying_addresses.to_vec(),
            recipient_device: None,
        });

        info!(unit = %unit, to = %to, amount = total.to_units(), "💸 Funds moved");
        Ok(unit)
    }
}
