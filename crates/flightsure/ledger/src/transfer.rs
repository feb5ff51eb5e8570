use std::collections::HashMap;
use std::sync::Mutex;

use flightsure_types::{Principal, Units};
use thiserror::Error;

/// Failure reported by an external value transfer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("payee rejected the transfer: {0}")]
    Rejected(String),

    #[error("transfer rail unavailable: {0}")]
    Unavailable(String),
}

/// Port for moving value out of the consortium to a payee.
///
/// Implementations may run arbitrary code, including calling back into the
/// consortium. `withdraw_payments` releases every lock before invoking it.
pub trait ValueTransfer: Send + Sync {
    fn transfer(&self, payee: &Principal, amount: Units) -> Result<(), TransferError>;
}

/// In-memory wallet book, used by the demo and tests.
#[derive(Debug, Default)]
pub struct InMemoryWallets {
    balances: Mutex<HashMap<Principal, Units>>,
}

impl InMemoryWallets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, principal: &Principal) -> Units {
        self.balances
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(principal)
            .copied()
            .unwrap_or(0)
    }
}

impl ValueTransfer for InMemoryWallets {
    fn transfer(&self, payee: &Principal, amount: Units) -> Result<(), TransferError> {
        let mut balances = self
            .balances
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = balances.entry(payee.clone()).or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or_else(|| TransferError::Rejected("wallet overflow".into()))?;
        Ok(())
    }
}
