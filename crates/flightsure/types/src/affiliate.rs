use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::Principal;

/// Membership lifecycle of an affiliate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AffiliateStatus {
    /// Registered by the admin, membership fee not yet paid.
    Created,
    /// Membership fee paid.
    Funded,
}

/// A consortium member.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Affiliate {
    pub principal: Principal,
    pub title: String,
    pub status: AffiliateStatus,
    /// Voting rights active. Bootstrap members get this on funding; later
    /// members need a majority of the funded consortium.
    pub approved: bool,
    /// Approved affiliates that voted to admit this one.
    pub approvers: BTreeSet<Principal>,
    /// Current operational vote: `true` means this affiliate wants the
    /// service suspended.
    pub votes_suspend: bool,
    pub registered_at: DateTime<Utc>,
    pub funded_at: Option<DateTime<Utc>>,
}

impl Affiliate {
    pub fn new(principal: Principal, title: impl Into<String>) -> Self {
        Self {
            principal,
            title: title.into(),
            status: AffiliateStatus::Created,
            approved: false,
            approvers: BTreeSet::new(),
            votes_suspend: false,
            registered_at: Utc::now(),
            funded_at: None,
        }
    }

    pub fn is_funded(&self) -> bool {
        self.status == AffiliateStatus::Funded
    }

    /// Funded and holding voting rights.
    pub fn is_voting_member(&self) -> bool {
        self.is_funded() && self.approved
    }

    pub fn approvals(&self) -> usize {
        self.approvers.len()
    }
}

/// Result of one `approve_affiliate` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalOutcome {
    /// Vote recorded; the candidate is still below the threshold.
    Pending { approvals: usize, required: usize },
    /// The candidate holds voting rights.
    Approved,
}
