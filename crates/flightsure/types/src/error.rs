use thiserror::Error;

use crate::flight::OracleIndex;
use crate::ids::{InsuranceKey, Principal, RequestKey, Units};
use crate::role::Guard;

/// Errors from the consortium core. Every error rejects the whole operation:
/// no partial state change survives a failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsortiumError {
    // --- Authorization ---
    #[error("unauthorized: {principal}: {guard}")]
    Unauthorized { principal: Principal, guard: Guard },

    #[error("consortium is currently not operational")]
    NotOperational,

    // --- Settlement ---
    #[error("invalid insurance key: {0}")]
    InvalidKey(InsuranceKey),

    #[error("insufficient consortium funds: required {required}, available {available}")]
    InsufficientFunds { required: Units, available: Units },

    #[error("no payments to withdraw for {0}")]
    NothingToWithdraw(Principal),

    #[error("value transfer to {payee} failed: {reason}")]
    Transfer { payee: Principal, reason: String },

    // --- Lookups ---
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    // --- Value checks ---
    #[error("insufficient value: expected {expected}, received {received}")]
    InsufficientValue { expected: Units, received: Units },

    #[error("arithmetic overflow in {0}")]
    Arithmetic(&'static str),

    // --- Oracle consensus ---
    #[error("oracle index mismatch: request targets {expected}, response carries {actual}")]
    IndexMismatch {
        expected: OracleIndex,
        actual: OracleIndex,
    },

    #[error("invalid flight status code: {0}")]
    InvalidStatusCode(u8),

    #[error("status request already resolved: {0}")]
    AlreadyResolved(RequestKey),

    // --- Host ---
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ConsortiumError {
    pub fn unauthorized(principal: &Principal, guard: Guard) -> Self {
        ConsortiumError::Unauthorized {
            principal: principal.clone(),
            guard,
        }
    }

    /// The guard that rejected the call, if this is an authorization error.
    pub fn guard(&self) -> Option<Guard> {
        match self {
            ConsortiumError::Unauthorized { guard, .. } => Some(*guard),
            _ => None,
        }
    }
}

pub type ConsortiumResult<T> = Result<T, ConsortiumError>;
