use std::collections::BTreeMap;

use chrono::Utc;
use flightsure_types::{
    Affiliate, AffiliateStatus, ApprovalOutcome, ConsortiumError, ConsortiumEvent,
    ConsortiumResult, Guard, Principal,
};
use tracing::debug;

/// Governance Ledger: affiliate lifecycle and multi-party voting.
///
/// Operational status is derived, never stored: the consortium is
/// operational while the affiliates voting "suspend" are not a strict
/// majority of the funded affiliates. Approved and unapproved funded
/// affiliates both count toward that population.
#[derive(Clone, Debug)]
pub struct GovernanceLedger {
    affiliates: BTreeMap<Principal, Affiliate>,
    /// Funded affiliates admitted without an approval vote.
    bootstrap_affiliates: usize,
}

impl GovernanceLedger {
    pub fn new(bootstrap_affiliates: usize) -> Self {
        Self {
            affiliates: BTreeMap::new(),
            bootstrap_affiliates,
        }
    }

    pub fn affiliate(&self, principal: &Principal) -> Option<&Affiliate> {
        self.affiliates.get(principal)
    }

    pub fn affiliates(&self) -> impl Iterator<Item = &Affiliate> {
        self.affiliates.values()
    }

    pub fn funded_count(&self) -> usize {
        self.affiliates.values().filter(|a| a.is_funded()).count()
    }

    pub fn suspend_votes(&self) -> usize {
        self.affiliates
            .values()
            .filter(|a| a.is_funded() && a.votes_suspend)
            .count()
    }

    pub fn is_operational(&self) -> bool {
        self.suspend_votes() * 2 <= self.funded_count()
    }

    /// `OnlyOperational` guard.
    pub fn require_operational(&self) -> ConsortiumResult<()> {
        if self.is_operational() {
            Ok(())
        } else {
            Err(ConsortiumError::NotOperational)
        }
    }

    /// `OnlyConsortiumAffiliate` guard: funded, approved or not.
    pub fn require_consortium_affiliate(&self, caller: &Principal) -> ConsortiumResult<&Affiliate> {
        self.affiliates
            .get(caller)
            .filter(|a| a.is_funded())
            .ok_or_else(|| ConsortiumError::unauthorized(caller, Guard::OnlyConsortiumAffiliate))
    }

    /// `OnlyApprovedAffiliate` guard: funded and holding voting rights.
    pub fn require_approved_affiliate(&self, caller: &Principal) -> ConsortiumResult<&Affiliate> {
        self.affiliates
            .get(caller)
            .filter(|a| a.is_voting_member())
            .ok_or_else(|| ConsortiumError::unauthorized(caller, Guard::OnlyApprovedAffiliate))
    }

    /// Register a new affiliate in `Created` state.
    pub fn register(
        &mut self,
        principal: &Principal,
        title: &str,
        events: &mut Vec<ConsortiumEvent>,
    ) -> ConsortiumResult<()> {
        if self.affiliates.contains_key(principal) {
            return Err(ConsortiumError::AlreadyExists(format!("affiliate {}", principal)));
        }
        self.affiliates
            .insert(principal.clone(), Affiliate::new(principal.clone(), title));
        debug!(affiliate = %principal, title = %title, "Affiliate registered");
        events.push(ConsortiumEvent::AffiliateRegistered {
            affiliate: principal.clone(),
            title: title.to_string(),
        });
        Ok(())
    }

    /// Move a `Created` affiliate to `Funded`. Fee and operational checks are
    /// the caller's; this only enforces the membership state machine and
    /// admission rules. Returns whether the affiliate holds voting rights.
    pub fn mark_funded(
        &mut self,
        caller: &Principal,
        events: &mut Vec<ConsortiumEvent>,
    ) -> ConsortiumResult<bool> {
        let funded_before = self.funded_count();
        let bootstrap = funded_before < self.bootstrap_affiliates;
        // The candidate counts toward FundedCount once funded
        let required = Self::approval_threshold(funded_before + 1);

        let affiliate = self
            .affiliates
            .get_mut(caller)
            .ok_or_else(|| ConsortiumError::unauthorized(caller, Guard::OnlyAffiliate))?;
        if affiliate.status != AffiliateStatus::Created {
            return Err(ConsortiumError::AlreadyExists(format!(
                "membership of {}",
                caller
            )));
        }

        affiliate.status = AffiliateStatus::Funded;
        affiliate.funded_at = Some(Utc::now());

        let newly_approved =
            !affiliate.approved && (bootstrap || affiliate.approvals() >= required);
        if newly_approved {
            affiliate.approved = true;
        }
        let approved = affiliate.approved;
        let approvals = affiliate.approvals();

        debug!(
            affiliate = %caller,
            bootstrap,
            approved,
            "Affiliate funded"
        );
        if newly_approved && !bootstrap {
            events.push(ConsortiumEvent::AffiliateApproved {
                affiliate: caller.clone(),
                approvals,
            });
        }
        Ok(approved)
    }

    /// Record `approver`'s vote to admit `candidate`.
    ///
    /// The threshold is `ceil(FundedCount / 2)`, so a candidate approved
    /// before funding needs one vote fewer than after. A second vote from
    /// the same approver is not counted again.
    pub fn approve(
        &mut self,
        approver: &Principal,
        candidate: &Principal,
        events: &mut Vec<ConsortiumEvent>,
    ) -> ConsortiumResult<ApprovalOutcome> {
        self.require_approved_affiliate(approver)?;

        let required = Self::approval_threshold(self.funded_count());

        let affiliate = self
            .affiliates
            .get_mut(candidate)
            .ok_or_else(|| ConsortiumError::NotFound(format!("affiliate {}", candidate)))?;
        if affiliate.approved {
            return Ok(ApprovalOutcome::Approved);
        }

        affiliate.approvers.insert(approver.clone());
        let approvals = affiliate.approvals();
        debug!(
            candidate = %candidate,
            approver = %approver,
            approvals,
            required,
            "Affiliate approval recorded"
        );

        if approvals < required {
            return Ok(ApprovalOutcome::Pending {
                approvals,
                required,
            });
        }

        affiliate.approved = true;
        events.push(ConsortiumEvent::AffiliateApproved {
            affiliate: candidate.clone(),
            approvals,
        });
        Ok(ApprovalOutcome::Approved)
    }

    /// Set the caller's operational vote. Returns the operational status
    /// after the vote.
    pub fn cast_operational_vote(
        &mut self,
        caller: &Principal,
        suspend: bool,
    ) -> ConsortiumResult<bool> {
        self.require_approved_affiliate(caller)?;
        if let Some(affiliate) = self.affiliates.get_mut(caller) {
            affiliate.votes_suspend = suspend;
        }
        let operational = self.is_operational();
        debug!(
            affiliate = %caller,
            suspend,
            suspend_votes = self.suspend_votes(),
            funded = self.funded_count(),
            operational,
            "Operational vote cast"
        );
        Ok(operational)
    }

    fn approval_threshold(funded: usize) -> usize {
        funded.div_ceil(2).max(1)
    }
}
