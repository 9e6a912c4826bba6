use crate::error::Result;
use crate::lookup::{validate_attestation, ReferrerInfo};
use attest_storage::{LedgerReader, RewardStorage};
use attest_types::{Address, DeviceAddress, LinkReferral, LinkReferralKind};
use chrono::Utc;
use tracing::{debug, info};

/// Most recent referral hint for `device_address` whose referrer is attested,
/// is not `excluded_address`, and was attested from a different device.
pub async fn find_link_referrer(
    storage: &dyn RewardStorage,
    ledger: &dyn LedgerReader,
    attestor: &Address,
    device_address: &DeviceAddress,
    excluded_address: &Address,
) -> Result<Option<ReferrerInfo>> {
    let referrals = storage.link_referrals_for_device(device_address).await?;

    for referral in referrals
        .iter()
        .filter(|r| &r.referring_user_address != excluded_address)
    {
        let attestations = ledger
            .lookup_attestations(std::slice::from_ref(&referral.referring_user_address), attestor)
            .await?;
        let Some(record) = attestations
            .iter()
            .find(|a| &a.device_address != device_address)
        else {
            continue;
        };

        let referrer = validate_attestation(record, &referral.referring_user_address)?;
        info!(
            kind = %referral.kind,
            device = %device_address,
            referrer = %referrer.user_address,
            "🔗 Link referrer found"
        );
        return Ok(Some(referrer));
    }

    debug!(device = %device_address, "No link referrer");
    Ok(None)
}

/// Remember that `referrer` invited `device_address`.
///
/// Hints that are not addresses, or whose address holds no attestation from
/// `attestor`, are dropped. Returns true when a new hint was stored.
pub async fn record_link_referral(
    storage: &dyn RewardStorage,
    ledger: &dyn LedgerReader,
    attestor: &Address,
    referrer: &str,
    device_address: &DeviceAddress,
    kind: LinkReferralKind,
) -> Result<bool> {
    if !ledger.is_address_valid(referrer) {
        debug!(hint = %referrer, kind = %kind, "Referral hint is not an address");
        return Ok(false);
    }
    let referrer = Address::parse(referrer)?;

    let attestations = ledger
        .lookup_attestations(std::slice::from_ref(&referrer), attestor)
        .await?;
    if attestations.is_empty() {
        debug!(referrer = %referrer, kind = %kind, "Referrer is not attested");
        return Ok(false);
    }

    let outcome = storage
        .insert_link_referral(LinkReferral {
            referring_user_address: referrer.clone(),
            device_address: device_address.clone(),
            kind,
            creation_date: Utc::now(),
        })
        .await?;

    if outcome.is_inserted() {
        info!(
            referrer = %referrer,
            device = %device_address,
            kind = %kind,
            "📎 Link referral recorded"
        );
    }
    Ok(outcome.is_inserted())
}
