use crate::ancestry::AncestryWalker;
use crate::config::RewardContext;
use crate::error::Result;
use crate::link_referral::find_link_referrer;
use crate::lookup::{find_best_attested_ancestor, ReferrerInfo};
use attest_storage::{LedgerReader, RewardStorage};
use attest_types::{Address, DeviceAddress, UnitId};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverState {
    /// Walk the ledger ancestry of the payment unit.
    AncestrySearch(UnitId),
    /// Fall back to pairing and cookie hints for the device.
    LinkFallback,
    Resolved(ReferrerInfo),
    NoReferrer,
}

/// Finds who referred a newly attested user.
///
/// Payment ancestry is consulted first; link hints only when the payment
/// ancestry yields nothing or there was no payment. Resolution reads storage
/// and the ledger but never writes.
pub struct ReferralResolver {
    storage: Arc<dyn RewardStorage>,
    ledger: Arc<dyn LedgerReader>,
    context: Arc<RewardContext>,
}

impl ReferralResolver {
    pub fn new(
        storage: Arc<dyn RewardStorage>,
        ledger: Arc<dyn LedgerReader>,
        context: Arc<RewardContext>,
    ) -> Self {
        Self {
            storage,
            ledger,
            context,
        }
    }

    pub async fn resolve(
        &self,
        payment_unit: Option<UnitId>,
        user_address: &Address,
        device_address: &DeviceAddress,
    ) -> Result<Option<ReferrerInfo>> {
        let mut state = match payment_unit {
            Some(unit) => ResolverState::AncestrySearch(unit),
            None => ResolverState::LinkFallback,
        };

        loop {
            debug!(user_address = %user_address, state = ?state, "Referral resolution step");
            state = match state {
                ResolverState::AncestrySearch(unit) => {
                    self.search_ancestry(unit, user_address, device_address).await?
                }
                ResolverState::LinkFallback => {
                    self.search_links(user_address, device_address).await?
                }
                ResolverState::Resolved(referrer) => return Ok(Some(referrer)),
                ResolverState::NoReferrer => return Ok(None),
            };
        }
    }

    async fn search_ancestry(
        &self,
        payment_unit: UnitId,
        user_address: &Address,
        device_address: &DeviceAddress,
    ) -> Result<ResolverState> {
        let walker = AncestryWalker::new(
            self.ledger.as_ref(),
            payment_unit,
            user_address.clone(),
            self.context.config.max_referral_depth,
        );
        let candidates = walker.collect().await?;
        debug!(
            payment_unit = %payment_unit,
            candidates = candidates.len(),
            "Ancestor addresses collected"
        );

        let best = find_best_attested_ancestor(
            self.ledger.as_ref(),
            &self.context.attestor_address,
            &candidates,
            &payment_unit,
            device_address,
        )
        .await?;

        Ok(match best {
            Some(referrer) => ResolverState::Resolved(referrer),
            None => ResolverState::LinkFallback,
        })
    }

    async fn search_links(
        &self,
        user_address: &Address,
        device_address: &DeviceAddress,
    ) -> Result<ResolverState> {
        let found = find_link_referrer(
            self.storage.as_ref(),
            self.ledger.as_ref(),
            &self.context.attestor_address,
            device_address,
            user_address,
        )
        .await?;

        Ok(match found {
            Some(referrer) => ResolverState::Resolved(referrer),
            None => ResolverState::NoReferrer,
        })
    }
}
