mod common;

use attest_storage::{LedgerUnit, RewardStorage, UnitInput};
use attest_types::{LinkReferralKind, NativeAmount, PaymentOutput, ProofType};
use common::{device, unit_id, user, Harness};

// ========== Ancestry ==========

#[tokio::test]
async fn test_latest_attested_ancestor_wins() {
    let harness = Harness::new().await;
    harness.attest("anna", &device("anna"), None).await;
    harness.attest("boris", &device("boris"), None).await;

    let anna_source = unit_id("anna-source");
    let boris_source = unit_id("boris-source");
    for (name, unit, mci) in [("anna", anna_source, 10), ("boris", boris_source, 25)] {
        harness
            .ledger
            .add_unit(LedgerUnit {
                unit,
                main_chain_index: mci,
                inputs: vec![],
                outputs: vec![PaymentOutput {
                    address: user(name),
                    amount: NativeAmount::from_units(1_000),
                }],
            })
            .await;
    }
    let payment = unit_id("newbie-payment");
    harness
        .ledger
        .add_unit(LedgerUnit {
            unit: payment,
            main_chain_index: 40,
            inputs: vec![
                UnitInput {
                    address: user("anna"),
                    src_unit: anna_source,
                    asset: None,
                },
                UnitInput {
                    address: user("boris"),
                    src_unit: boris_source,
                    asset: None,
                },
            ],
            outputs: vec![],
        })
        .await;

    let referrer = harness
        .engine
        .resolve_referrer(Some(payment), &user("newbie"), &device("newbie"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(referrer.user_address, user("boris"));
    assert_eq!(referrer.device_address, device("boris"));
}

#[tokio::test]
async fn test_ancestry_beats_link_hint() {
    let harness = Harness::new().await;
    harness.attest("carl", &device("carl"), None).await;
    harness.attest("dora", &device("dora"), None).await;

    let stored = harness
        .engine
        .record_link_referral(user("dora").as_str(), &device("emil"), LinkReferralKind::Pairing)
        .await
        .unwrap();
    assert!(stored);

    let payment = harness.funded_payment("carl", "emil", 10, "emil-payment").await;
    let referrer = harness
        .engine
        .resolve_referrer(Some(payment), &user("emil"), &device("emil"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(referrer.user_address, user("carl"));
}

#[tokio::test]
async fn test_unattested_ancestry_falls_back_to_link_hint() {
    let harness = Harness::new().await;
    harness.attest("dora", &device("dora"), None).await;
    harness
        .engine
        .record_link_referral(user("dora").as_str(), &device("emil"), LinkReferralKind::Cookie)
        .await
        .unwrap();

    let payment = harness.funded_payment("stranger", "emil", 10, "emil-payment").await;
    let referrer = harness
        .engine
        .resolve_referrer(Some(payment), &user("emil"), &device("emil"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(referrer.user_address, user("dora"));
}

#[tokio::test]
async fn test_ancestor_on_same_device_is_not_a_referrer() {
    let harness = Harness::new().await;
    // A second wallet of the same person, attested from the same phone
    harness.attest("felix-old", &device("felix"), None).await;

    let payment = harness.funded_payment("felix-old", "felix", 10, "felix-payment").await;
    let referrer = harness
        .engine
        .resolve_referrer(Some(payment), &user("felix"), &device("felix"))
        .await
        .unwrap();
    assert!(referrer.is_none());
}

#[tokio::test]
async fn test_attestation_paid_by_this_payment_is_ignored() {
    let harness = Harness::new().await;
    let payment = harness.funded_payment("gina", "hugo", 10, "hugo-payment").await;
    // gina's only attestation was paid for by the very unit under inspection
    harness.attest("gina", &device("gina"), Some(payment)).await;

    let referrer = harness
        .engine
        .resolve_referrer(Some(payment), &user("hugo"), &device("hugo"))
        .await
        .unwrap();
    assert!(referrer.is_none());
}

#[tokio::test]
async fn test_walk_stops_at_max_depth() {
    let mut config = common::test_config();
    config.max_referral_depth = 1;
    let harness = Harness::with_config(config).await;
    harness.attest("ines", &device("ines"), None).await;

    // ines is two levels behind the payment
    let payment = harness.funded_payment("ines", "jon", 10, "jon-payment").await;
    let referrer = harness
        .engine
        .resolve_referrer(Some(payment), &user("jon"), &device("jon"))
        .await
        .unwrap();
    assert!(referrer.is_none());
}

// ========== Link hints ==========

#[tokio::test]
async fn test_link_fallback_without_payment() {
    let harness = Harness::new().await;
    harness.attest("kate", &device("kate"), None).await;
    harness
        .engine
        .record_link_referral(user("kate").as_str(), &device("leo"), LinkReferralKind::Pairing)
        .await
        .unwrap();

    let referrer = harness
        .engine
        .resolve_referrer(None, &user("leo"), &device("leo"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(referrer.user_address, user("kate"));
    assert_eq!(referrer.device_address, device("kate"));
}

#[tokio::test]
async fn test_newest_link_hint_wins() {
    let harness = Harness::new().await;
    harness.attest("kate", &device("kate"), None).await;
    harness.attest("mia", &device("mia"), None).await;
    for referrer in ["kate", "mia"] {
        harness
            .engine
            .record_link_referral(user(referrer).as_str(), &device("leo"), LinkReferralKind::Cookie)
            .await
            .unwrap();
    }

    let referrer = harness
        .engine
        .resolve_referrer(None, &user("leo"), &device("leo"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(referrer.user_address, user("mia"));
}

#[tokio::test]
async fn test_self_referral_hint_is_ignored() {
    let harness = Harness::new().await;
    // nora attested earlier from a laptop, now attests again from a phone
    harness.attest("nora", &device("nora-laptop"), None).await;
    harness
        .engine
        .record_link_referral(user("nora").as_str(), &device("nora"), LinkReferralKind::Pairing)
        .await
        .unwrap();

    let referrer = harness
        .engine
        .resolve_referrer(None, &user("nora"), &device("nora"))
        .await
        .unwrap();
    assert!(referrer.is_none());
}

#[tokio::test]
async fn test_hint_attested_from_same_device_is_ignored() {
    let harness = Harness::new().await;
    harness.attest("otto", &device("shared"), None).await;
    harness
        .engine
        .record_link_referral(user("otto").as_str(), &device("shared"), LinkReferralKind::Cookie)
        .await
        .unwrap();

    let referrer = harness
        .engine
        .resolve_referrer(None, &user("pia"), &device("shared"))
        .await
        .unwrap();
    assert!(referrer.is_none());
}

#[tokio::test]
async fn test_record_link_referral_filters_hints() {
    let harness = Harness::new().await;
    harness.attest("quinn", &device("quinn"), None).await;
    let target = device("rosa");

    let not_an_address = harness
        .engine
        .record_link_referral("hello there", &target, LinkReferralKind::Pairing)
        .await
        .unwrap();
    assert!(!not_an_address);

    let unattested = harness
        .engine
        .record_link_referral(user("nobody").as_str(), &target, LinkReferralKind::Pairing)
        .await
        .unwrap();
    assert!(!unattested);

    let stored = harness
        .engine
        .record_link_referral(user("quinn").as_str(), &target, LinkReferralKind::Pairing)
        .await
        .unwrap();
    assert!(stored);

    let repeated = harness
        .engine
        .record_link_referral(user("quinn").as_str(), &target, LinkReferralKind::Pairing)
        .await
        .unwrap();
    assert!(!repeated);

    let hints = harness.storage.link_referrals_for_device(&target).await.unwrap();
    assert_eq!(hints.len(), 1);
    assert_eq!(hints[0].referring_user_address, user("quinn"));
}

// ========== End to end ==========

#[tokio::test]
async fn test_link_referrer_is_paid() {
    let harness = Harness::new().await;
    harness.attest("sven", &device("sven"), None).await;
    harness.attested_session("sven", "Member", ProofType::Payment, None).await;
    harness
        .engine
        .record_link_referral(user("sven").as_str(), &device("tina"), LinkReferralKind::Pairing)
        .await
        .unwrap();

    let tx = harness
        .attested_session("tina", "Jr. Member", ProofType::Signature, None)
        .await;
    let report = harness.engine.issue_rewards(tx).await.unwrap();

    assert_eq!(report.referrer.map(|r| r.user_address), Some(user("sven")));
    let referral = harness.storage.get_referral_reward_unit(tx).await.unwrap().unwrap();
    assert!(referral.is_sent());
    assert!(harness.storage.get_contract(&user("sven")).await.unwrap().is_some());
}
