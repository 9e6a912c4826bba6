use crate::error::{Result, RewardError};
use attest_storage::LedgerReader;
use attest_types::{
    Address, AttestationPayload, AttestationRecord, DeviceAddress, UnitId, UserId, ATTESTATION_APP,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// An attested user credited with bringing in a new user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferrerInfo {
    pub user_id: UserId,
    pub user_address: Address,
    pub device_address: DeviceAddress,
    pub forum_user_id: u64,
}

/// Check that an attestation row is internally consistent and extract the
/// referrer it describes. Any mismatch means corrupted data.
pub(crate) fn validate_attestation(
    record: &AttestationRecord,
    expected_address: &Address,
) -> Result<ReferrerInfo> {
    let malformed = |reason: String| RewardError::MalformedAttestation {
        unit: record.attestation_unit.to_hex(),
        reason,
    };

    if record.app != ATTESTATION_APP {
        return Err(malformed(format!("unexpected app {}", record.app)));
    }
    if &record.address != expected_address || record.user_address != record.address {
        return Err(malformed(format!(
            "different addresses: attested {}, session {}, expected {}",
            record.address, record.user_address, expected_address
        )));
    }

    let payload = AttestationPayload::parse(&record.payload)
        .map_err(|e| malformed(format!("unparsable payload: {}", e)))?;
    if payload.address != record.address {
        return Err(malformed(format!(
            "payload address {} differs from attested {}",
            payload.address, record.address
        )));
    }
    let user_id = payload
        .profile
        .user_id
        .ok_or_else(|| malformed("no user_id in profile".to_string()))?;

    Ok(ReferrerInfo {
        user_id,
        user_address: record.user_address.clone(),
        device_address: record.device_address.clone(),
        forum_user_id: record.forum_user_id,
    })
}

/// Pick the attested ancestor with the highest main-chain index.
///
/// Attestations paid for by `payment_unit` are ignored. Equal indices go to
/// the lexicographically smallest address. A winner on `referred_device` is
/// not a referrer.
pub async fn find_best_attested_ancestor(
    ledger: &dyn LedgerReader,
    attestor: &Address,
    candidates: &BTreeMap<Address, u64>,
    payment_unit: &UnitId,
    referred_device: &DeviceAddress,
) -> Result<Option<ReferrerInfo>> {
    if candidates.is_empty() {
        return Ok(None);
    }

    let addresses: Vec<Address> = candidates.keys().cloned().collect();
    let records = ledger.lookup_attestations(&addresses, attestor).await?;

    let mut best: Option<(u64, &Address, ReferrerInfo)> = None;
    for record in records
        .iter()
        .filter(|r| r.payment_unit.as_ref() != Some(payment_unit))
    {
        let referrer = validate_attestation(record, &record.address)?;
        let Some(&mci) = candidates.get(&record.address) else {
            continue;
        };
        let better = match &best {
            None => true,
            Some((best_mci, best_address, _)) => {
                mci > *best_mci || (mci == *best_mci && &record.address < *best_address)
            }
        };
        if better {
            best = Some((mci, &record.address, referrer));
        }
    }

    let Some((mci, _, referrer)) = best else {
        debug!(payment_unit = %payment_unit, "No attested ancestors");
        return Ok(None);
    };

    if &referrer.device_address == referred_device {
        info!(
            payment_unit = %payment_unit,
            referrer = %referrer.user_address,
            "🚫 Ancestor is on the referred user's device"
        );
        return Ok(None);
    }

    info!(
        payment_unit = %payment_unit,
        referrer = %referrer.user_address,
        main_chain_index = mci,
        "🔗 Payment referrer found"
    );
    Ok(Some(referrer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_storage::MemoryLedger;
    use attest_types::{AttestedProfile, ProfileClaims};

    fn attestation(
        address: &Address,
        attestor: &Address,
        device: &DeviceAddress,
        payment_unit: Option<UnitId>,
    ) -> AttestationRecord {
        let profile = AttestedProfile {
            user_address: address.clone(),
            forum_user_id: 11,
            forum_username: "referrer".to_string(),
            rank: "Member".to_string(),
            rank_index: 3,
            activity: 50,
            posts: 80,
            is_public: true,
        };
        let (payload, _) = AttestationPayload::build(&profile, "salt");
        AttestationRecord {
            address: address.clone(),
            attestor_address: attestor.clone(),
            attestation_unit: UnitId::new(address.as_str().as_bytes()),
            app: ATTESTATION_APP.to_string(),
            payload: payload.to_json().unwrap(),
            user_address: address.clone(),
            device_address: device.clone(),
            forum_user_id: 11,
            payment_unit,
        }
    }

    #[tokio::test]
    async fn test_highest_mci_wins() {
        let ledger = MemoryLedger::new();
        let attestor = Address::derive(b"attestor");
        let a = Address::derive(b"a");
        let b = Address::derive(b"b");
        ledger.add_attestation(attestation(&a, &attestor, &DeviceAddress::derive(b"da"), None)).await;
        ledger.add_attestation(attestation(&b, &attestor, &DeviceAddress::derive(b"db"), None)).await;

        let candidates = BTreeMap::from([(a.clone(), 10), (b.clone(), 25)]);
        let best = find_best_attested_ancestor(
            &ledger,
            &attestor,
            &candidates,
            &UnitId::new(b"payment"),
            &DeviceAddress::derive(b"new-user"),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(best.user_address, b);
    }

    #[tokio::test]
    async fn test_tie_goes_to_smallest_address() {
        let ledger = MemoryLedger::new();
        let attestor = Address::derive(b"attestor");
        let a = Address::derive(b"a");
        let b = Address::derive(b"b");
        ledger.add_attestation(attestation(&a, &attestor, &DeviceAddress::derive(b"da"), None)).await;
        ledger.add_attestation(attestation(&b, &attestor, &DeviceAddress::derive(b"db"), None)).await;

        let candidates = BTreeMap::from([(a.clone(), 7), (b.clone(), 7)]);
        let best = find_best_attested_ancestor(
            &ledger,
            &attestor,
            &candidates,
            &UnitId::new(b"payment"),
            &DeviceAddress::derive(b"new-user"),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(best.user_address, std::cmp::min(a, b));
    }

    #[tokio::test]
    async fn test_excludes_current_payment_other_attestors_and_same_device() {
        let ledger = MemoryLedger::new();
        let attestor = Address::derive(b"attestor");
        let payment = UnitId::new(b"payment");
        let device = DeviceAddress::derive(b"shared-device");

        let paid_by_this = Address::derive(b"paid");
        let foreign = Address::derive(b"foreign");
        let same_device = Address::derive(b"same");
        ledger
            .add_attestation(attestation(&paid_by_this, &attestor, &DeviceAddress::derive(b"x"), Some(payment)))
            .await;
        ledger
            .add_attestation(attestation(&foreign, &Address::derive(b"other"), &DeviceAddress::derive(b"y"), None))
            .await;
        ledger
            .add_attestation(attestation(&same_device, &attestor, &device, None))
            .await;

        let candidates = BTreeMap::from([
            (paid_by_this, 50),
            (foreign, 40),
            (same_device, 30),
        ]);
        let best = find_best_attested_ancestor(&ledger, &attestor, &candidates, &payment, &device)
            .await
            .unwrap();
        assert!(best.is_none());
    }

    #[tokio::test]
    async fn test_payload_mismatch_is_fatal() {
        let ledger = MemoryLedger::new();
        let attestor = Address::derive(b"attestor");
        let a = Address::derive(b"a");
        let mut record = attestation(&a, &attestor, &DeviceAddress::derive(b"da"), None);
        let other = AttestationPayload {
            address: Address::derive(b"someone-else"),
            profile: ProfileClaims {
                user_id: Some(UserId::new("u").unwrap()),
                fields: BTreeMap::new(),
            },
        };
        record.payload = other.to_json().unwrap();
        ledger.add_attestation(record).await;

        let err = find_best_attested_ancestor(
            &ledger,
            &attestor,
            &BTreeMap::from([(a, 1)]),
            &UnitId::new(b"payment"),
            &DeviceAddress::derive(b"new-user"),
        )
        .await
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_user_id_is_fatal() {
        let attestor = Address::derive(b"attestor");
        let a = Address::derive(b"a");
        let mut record = attestation(&a, &attestor, &DeviceAddress::derive(b"da"), None);
        record.payload = serde_json::json!({ "address": a.as_str(), "profile": {} }).to_string();
        assert!(matches!(
            validate_attestation(&record, &a),
            Err(RewardError::MalformedAttestation { .. })
        ));
    }
}
