//! # flightsure-oracle
//!
//! Oracle consensus for FlightSure. Registered oracles hold three
//! pseudo-random responsibility indices; each status request targets one
//! index, and only owners of that index may answer. The first status to
//! collect `consensus_threshold` matching answers resolves the request and
//! settles every pending insurance of the flight through the consortium.
//!
//! ```text
//! airline ──register_flight──▶ FlightInsuranceHandler
//! passenger ─insure─▶ handler ─deposit_insurance─▶ ConsortiumAlliance
//! anyone ─request_flight_status─▶ handler ─FlightStatusRequested─▶ oracles
//! oracles ─submit_oracle_response─▶ handler ─settle_pending─▶ ConsortiumAlliance
//! ```

#![deny(unsafe_code)]

pub mod flights;
pub mod handler;
pub mod index;
pub mod registry;
pub mod request;

pub use flights::FlightRegistry;
pub use handler::{FlightInsuranceHandler, ResponseOutcome};
pub use index::IndexDeriver;
pub use registry::{OracleRegistration, OracleRegistry};
pub use request::{RequestBook, StatusRequest, Tally};
