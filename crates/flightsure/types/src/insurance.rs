use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{InsuranceKey, Principal, Units};

/// Lifecycle of an insurance record. Only `Pending` records can be settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsuranceState {
    Pending,
    /// Airline not liable: the deposit was kept by the consortium.
    SettledToConsortium,
    /// Airline liable: deposit plus premium credited to the payer.
    SettledToInsuree,
}

/// How a pending record is settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementRoute {
    ToConsortium,
    ToInsuree,
}

/// One insurance deposit held in escrow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InsuranceRecord {
    pub key: InsuranceKey,
    pub payer: Principal,
    pub amount: Units,
    pub state: InsuranceState,
    pub deposited_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl InsuranceRecord {
    pub fn is_pending(&self) -> bool {
        self.state == InsuranceState::Pending
    }
}
