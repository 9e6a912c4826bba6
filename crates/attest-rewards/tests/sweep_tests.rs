mod common;

use attest_rewards::{FundsSweeper, KeyedLockTable, RewardContext, RewardError, SweepOutcome};
use attest_storage::RewardStorage;
use attest_types::{NativeAmount, ProofType};
use common::{device, test_config, Harness};
use std::sync::Arc;

fn sweeper(harness: &Harness, locks: Arc<KeyedLockTable>) -> FundsSweeper {
    let context = RewardContext::new(
        test_config(),
        harness.attestor.clone(),
        Some(harness.distribution.clone()),
        device("bot"),
    )
    .unwrap();
    FundsSweeper::new(
        harness.storage.clone(),
        harness.ledger.clone(),
        harness.ledger.clone(),
        harness.messenger.clone(),
        Arc::new(context),
        locks,
    )
}

async fn funded_receiving_addresses(harness: &Harness, names: &[&str]) {
    for name in names {
        harness
            .attested_session(name, "Member", ProofType::Payment, None)
            .await;
    }
    for address in harness.storage.list_receiving_addresses().await.unwrap() {
        harness
            .ledger
            .credit(&address, NativeAmount::from_units(49_000))
            .await;
    }
}

#[tokio::test]
async fn test_sweep_moves_paid_fees_to_attestor() {
    let harness = Harness::new().await;
    funded_receiving_addresses(&harness, &["ada", "ben", "cy"]).await;
    let sweeper = sweeper(&harness, Arc::new(KeyedLockTable::new()));

    let outcome = sweeper.sweep().await.unwrap();
    assert!(matches!(outcome, SweepOutcome::Moved { addresses: 3, .. }));
    assert_eq!(
        harness.ledger.balance(&harness.attestor).await,
        NativeAmount::from_units(147_000)
    );

    // Nothing left to move
    assert_eq!(sweeper.sweep().await.unwrap(), SweepOutcome::NothingToMove);
}

#[tokio::test]
async fn test_sweep_skipped_while_catching_up() {
    let harness = Harness::new().await;
    funded_receiving_addresses(&harness, &["ada"]).await;
    harness.ledger.set_catching_up(true).await;

    let outcome = sweeper(&harness, Arc::new(KeyedLockTable::new()))
        .sweep()
        .await
        .unwrap();
    assert_eq!(outcome, SweepOutcome::Skipped);
    assert!(harness.ledger.payments().await.is_empty());
}

#[tokio::test]
async fn test_sweep_is_capped_per_unit() {
    let harness = Harness::new().await;
    let names: Vec<String> = (0..20).map(|i| format!("user-{}", i)).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    funded_receiving_addresses(&harness, &names).await;
    let sweeper = sweeper(&harness, Arc::new(KeyedLockTable::new()));

    assert!(matches!(
        sweeper.sweep().await.unwrap(),
        SweepOutcome::Moved { addresses: 16, .. }
    ));
    assert!(matches!(
        sweeper.sweep().await.unwrap(),
        SweepOutcome::Moved { addresses: 4, .. }
    ));
}

#[tokio::test]
async fn test_failed_sweep_notifies_operator() {
    let harness = Harness::new().await;
    funded_receiving_addresses(&harness, &["ada"]).await;
    harness.ledger.set_fail_payments(true).await;
    let locks = Arc::new(KeyedLockTable::new());

    let err = sweeper(&harness, locks.clone()).sweep().await.unwrap_err();
    assert!(matches!(err, RewardError::Dispatch(_)));
    let notifications = harness.messenger.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].0, "failed to move funds");
    assert!(notifications[0].1.contains("49000 bytes"));
    assert_eq!(locks.active_keys(), 0);
}
