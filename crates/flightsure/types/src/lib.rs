//! # flightsure-types
//!
//! Shared data model of the FlightSure consortium:
//!
//! - **Identities**: principals, monetary units, and the BLAKE3-derived
//!   insurance, flight and status-request keys
//! - **Roles & guards**: Admin / Delegate / Affiliate capability sets and
//!   the named guards every mutating operation evaluates
//! - **Records**: affiliates, insurance records, flights, status codes
//! - **Events**: notifications emitted for off-chain observers
//! - **Configuration**: fees, premium factor, consensus threshold
//! - **Errors**: the `ConsortiumError` taxonomy

pub mod affiliate;
pub mod config;
pub mod error;
pub mod event;
pub mod flight;
pub mod ids;
pub mod insurance;
pub mod role;

pub use affiliate::{Affiliate, AffiliateStatus, ApprovalOutcome};
pub use config::ConsortiumConfig;
pub use error::{ConsortiumError, ConsortiumResult};
pub use event::ConsortiumEvent;
pub use flight::{Flight, FlightInsurance, FlightStatusCode, OracleIndex, INDICES_PER_ORACLE};
pub use ids::{FlightKey, InsuranceKey, Principal, RequestKey, Units, UNIT};
pub use insurance::{InsuranceRecord, InsuranceState, SettlementRoute};
pub use role::{Guard, Role};
