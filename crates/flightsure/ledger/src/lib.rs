//! # flightsure-ledger
//!
//! The consortium side of FlightSure. [`ConsortiumAlliance`] owns three
//! ledgers behind a single lock:
//!
//! - [`RoleRegistry`]: Admin / Delegate / Affiliate capability sets
//! - [`GovernanceLedger`]: affiliate lifecycle, admission votes and the
//!   suspend/resume quorum
//! - [`EscrowLedger`] and [`PaymentEscrow`]: custody of funds through
//!   deposit, settlement and pull-payment withdrawal
//!
//! Every mutating call is all-or-nothing. Committed events land in an
//! [`EventLog`] and are broadcast to subscribers.
//!
//! ## Invariant
//!
//! After every operation `custody == balance + escrow`. Amounts owed to
//! insurees sit in the payment escrow, outside custody, until withdrawn
//! through a [`ValueTransfer`].

#![deny(unsafe_code)]

pub mod consortium;
pub mod escrow;
pub mod events;
pub mod governance;
pub mod roles;
pub mod transfer;

pub use consortium::ConsortiumAlliance;
pub use escrow::{EscrowLedger, PaymentEscrow};
pub use events::{EventLog, EventRecord};
pub use governance::GovernanceLedger;
pub use roles::{RevocationRecord, RoleRegistry};
pub use transfer::{InMemoryWallets, TransferError, ValueTransfer};
