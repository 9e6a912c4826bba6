use crate::error::Result;
use attest_storage::LedgerReader;
use attest_types::{Address, AncestorInput, UnitId};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Breadth-first walk over native-asset transfer inputs, starting at a payment unit.
///
/// Each call to [`next_level`](Self::next_level) queries one level of inputs.
/// The walk ends after `max_depth` levels or when the frontier is empty, and
/// cannot be restarted.
pub struct AncestryWalker<'a> {
    ledger: &'a dyn LedgerReader,
    excluded_address: Address,
    frontier: Vec<UnitId>,
    depth: u32,
    max_depth: u32,
}

impl<'a> AncestryWalker<'a> {
    pub fn new(
        ledger: &'a dyn LedgerReader,
        payment_unit: UnitId,
        excluded_address: Address,
        max_depth: u32,
    ) -> Self {
        Self {
            ledger,
            excluded_address,
            frontier: vec![payment_unit],
            depth: 0,
            max_depth,
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_finished(&self) -> bool {
        self.frontier.is_empty() || self.depth >= self.max_depth
    }

    /// Inputs of the next level, with the excluded address filtered out.
    pub async fn next_level(&mut self) -> Result<Option<Vec<AncestorInput>>> {
        if self.is_finished() {
            return Ok(None);
        }
        self.depth += 1;

        let units = std::mem::take(&mut self.frontier);
        let inputs = self.ledger.lookup_ancestor_inputs(&units).await?;

        // Source units are followed even through the excluded address.
        let next: BTreeSet<UnitId> = inputs.iter().map(|i| i.src_unit).collect();
        self.frontier = next.into_iter().collect();

        let candidates: Vec<AncestorInput> = inputs
            .into_iter()
            .filter(|i| i.address != self.excluded_address)
            .collect();

        debug!(
            depth = self.depth,
            candidates = candidates.len(),
            frontier = self.frontier.len(),
            "🔎 Ancestry level walked"
        );
        Ok(Some(candidates))
    }

    /// Drain the walk into address -> highest main-chain index seen.
    pub async fn collect(mut self) -> Result<BTreeMap<Address, u64>> {
        let mut best: BTreeMap<Address, u64> = BTreeMap::new();
        while let Some(level) = self.next_level().await? {
            for input in level {
                let mci = best.entry(input.address).or_insert(input.main_chain_index);
                if *mci < input.main_chain_index {
                    *mci = input.main_chain_index;
                }
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_storage::{LedgerUnit, MemoryLedger, UnitInput};

    fn unit(id: &str, mci: u64, inputs: Vec<(&Address, &str)>) -> LedgerUnit {
        LedgerUnit {
            unit: UnitId::new(id.as_bytes()),
            main_chain_index: mci,
            inputs: inputs
                .into_iter()
                .map(|(address, src)| UnitInput {
                    address: address.clone(),
                    src_unit: UnitId::new(src.as_bytes()),
                    asset: None,
                })
                .collect(),
            outputs: vec![],
        }
    }

    #[tokio::test]
    async fn test_keeps_max_mci_and_excludes_payer() {
        let ledger = MemoryLedger::new();
        let user = Address::derive(b"user");
        let a = Address::derive(b"a");
        let b = Address::derive(b"b");

        ledger.add_unit(unit("root-a", 3, vec![])).await;
        ledger.add_unit(unit("src-a", 10, vec![(&a, "root-a")])).await;
        ledger.add_unit(unit("src-b", 25, vec![])).await;
        ledger
            .add_unit(unit("payment", 30, vec![(&a, "src-a"), (&b, "src-b"), (&user, "src-b")]))
            .await;

        let walker = AncestryWalker::new(&ledger, UnitId::new(b"payment"), user.clone(), 5);
        let found = walker.collect().await.unwrap();

        assert_eq!(found.get(&a), Some(&10));
        assert_eq!(found.get(&b), Some(&25));
        assert!(!found.contains_key(&user));
    }

    #[tokio::test]
    async fn test_unknown_payment_yields_nothing() {
        let ledger = MemoryLedger::new();
        let walker =
            AncestryWalker::new(&ledger, UnitId::new(b"missing"), Address::derive(b"user"), 5);
        assert!(walker.collect().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_native_asset_only() {
        let ledger = MemoryLedger::new();
        let token_payer = Address::derive(b"token");
        ledger.add_unit(unit("src", 1, vec![])).await;
        let mut payment = unit("payment", 2, vec![(&token_payer, "src")]);
        payment.inputs[0].asset = Some("some-asset".to_string());
        ledger.add_unit(payment).await;

        let walker =
            AncestryWalker::new(&ledger, UnitId::new(b"payment"), Address::derive(b"user"), 5);
        assert!(walker.collect().await.unwrap().is_empty());
    }
}
