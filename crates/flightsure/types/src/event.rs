use serde::{Deserialize, Serialize};

use crate::flight::{FlightStatusCode, OracleIndex, INDICES_PER_ORACLE};
use crate::ids::{FlightKey, InsuranceKey, Principal, RequestKey, Units};
use crate::role::Role;

/// Notifications emitted for off-chain observers. Generated keys and indices
/// are both returned by the operation and carried here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConsortiumEvent {
    RoleGranted {
        principal: Principal,
        role: Role,
    },
    RoleRevoked {
        principal: Principal,
        role: Role,
    },
    AffiliateRegistered {
        affiliate: Principal,
        title: String,
    },
    AffiliateFunded {
        affiliate: Principal,
        amount: Units,
    },
    AffiliateApproved {
        affiliate: Principal,
        approvals: usize,
    },
    ConsortiumCredited {
        amount: Units,
        balance: Units,
    },
    ConsortiumDebited {
        amount: Units,
        balance: Units,
    },
    EscrowCredited {
        amount: Units,
        escrow: Units,
    },
    EscrowDebited {
        amount: Units,
        escrow: Units,
    },
    InsuranceRegistered {
        key: InsuranceKey,
        payer: Principal,
        amount: Units,
    },
    InsureeCredited {
        key: InsuranceKey,
        payer: Principal,
        amount: Units,
    },
    PaymentWithdrawn {
        payee: Principal,
        amount: Units,
    },
    OracleRegistered {
        oracle: Principal,
        indexes: [OracleIndex; INDICES_PER_ORACLE],
    },
    FlightRegistered {
        key: FlightKey,
        airline: Principal,
        code: String,
        departure: u64,
    },
    FlightInsuranceRegistered {
        flight: FlightKey,
        key: InsuranceKey,
        passenger: Principal,
        amount: Units,
    },
    FlightStatusRequested {
        request: RequestKey,
        index: OracleIndex,
        airline: Principal,
        code: String,
        departure: u64,
    },
    OracleReport {
        oracle: Principal,
        request: RequestKey,
        status: FlightStatusCode,
        count: u32,
    },
    FlightStatus {
        request: RequestKey,
        airline: Principal,
        code: String,
        departure: u64,
        status: FlightStatusCode,
    },
    FlightStatusProcessed {
        flight: FlightKey,
        status: FlightStatusCode,
        settled: usize,
    },
}

impl ConsortiumEvent {
    /// Stable event name, as observers filter on it.
    pub fn name(&self) -> &'static str {
        match self {
            ConsortiumEvent::RoleGranted { .. } => "RoleGranted",
            ConsortiumEvent::RoleRevoked { .. } => "RoleRevoked",
            ConsortiumEvent::AffiliateRegistered { .. } => "AffiliateRegistered",
            ConsortiumEvent::AffiliateFunded { .. } => "AffiliateFunded",
            ConsortiumEvent::AffiliateApproved { .. } => "AffiliateApproved",
            ConsortiumEvent::ConsortiumCredited { .. } => "ConsortiumCredited",
            ConsortiumEvent::ConsortiumDebited { .. } => "ConsortiumDebited",
            ConsortiumEvent::EscrowCredited { .. } => "EscrowCredited",
            ConsortiumEvent::EscrowDebited { .. } => "EscrowDebited",
            ConsortiumEvent::InsuranceRegistered { .. } => "InsuranceRegistered",
            ConsortiumEvent::InsureeCredited { .. } => "InsureeCredited",
            ConsortiumEvent::PaymentWithdrawn { .. } => "PaymentWithdrawn",
            ConsortiumEvent::OracleRegistered { .. } => "OracleRegistered",
            ConsortiumEvent::FlightRegistered { .. } => "FlightRegistered",
            ConsortiumEvent::FlightInsuranceRegistered { .. } => "FlightInsuranceRegistered",
            ConsortiumEvent::FlightStatusRequested { .. } => "FlightStatusRequested",
            ConsortiumEvent::OracleReport { .. } => "OracleReport",
            ConsortiumEvent::FlightStatus { .. } => "FlightStatus",
            ConsortiumEvent::FlightStatusProcessed { .. } => "FlightStatusProcessed",
        }
    }
}
