use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use flightsure_types::{
    ConsortiumError, ConsortiumResult, Guard, OracleIndex, Principal, Units, INDICES_PER_ORACLE,
};
use serde::{Deserialize, Serialize};

/// A registered oracle and the indices it may answer for.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OracleRegistration {
    pub oracle: Principal,
    pub indexes: [OracleIndex; INDICES_PER_ORACLE],
    pub fee_paid: Units,
    pub registered_at: DateTime<Utc>,
}

impl OracleRegistration {
    pub fn owns(&self, index: OracleIndex) -> bool {
        self.indexes.contains(&index)
    }
}

/// Oracle registry with fee accounting.
#[derive(Clone, Debug, Default)]
pub struct OracleRegistry {
    registrations: BTreeMap<Principal, OracleRegistration>,
    /// Registrations so far; seeds the next index draw
    nonce: u64,
    fees_collected: Units,
}

impl OracleRegistry {
    pub fn contains(&self, oracle: &Principal) -> bool {
        self.registrations.contains_key(oracle)
    }

    pub fn get(&self, oracle: &Principal) -> Option<&OracleRegistration> {
        self.registrations.get(oracle)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn next_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn fees_collected(&self) -> Units {
        self.fees_collected
    }

    /// Check that `oracle` may register paying `fee`. Returns the fee total
    /// after registration.
    pub fn check(&self, oracle: &Principal, fee: Units) -> ConsortiumResult<Units> {
        if self.contains(oracle) {
            return Err(ConsortiumError::AlreadyExists(format!("oracle {}", oracle)));
        }
        self.fees_collected
            .checked_add(fee)
            .ok_or(ConsortiumError::Arithmetic("oracle fees"))
    }

    pub fn register(
        &mut self,
        oracle: &Principal,
        indexes: [OracleIndex; INDICES_PER_ORACLE],
        fee: Units,
    ) -> ConsortiumResult<()> {
        self.fees_collected = self.check(oracle, fee)?;
        self.nonce += 1;
        self.registrations.insert(
            oracle.clone(),
            OracleRegistration {
                oracle: oracle.clone(),
                indexes,
                fee_paid: fee,
                registered_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// `OnlyOracle` guard: the caller is registered and owns `index`.
    pub fn require_owner(&self, oracle: &Principal, index: OracleIndex) -> ConsortiumResult<()> {
        match self.registrations.get(oracle) {
            Some(registration) if registration.owns(index) => Ok(()),
            _ => Err(ConsortiumError::unauthorized(oracle, Guard::OnlyOracle)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_collects_fee_once() {
        let mut registry = OracleRegistry::default();
        let oracle = Principal::new("oracle-1");
        registry.register(&oracle, [1, 4, 4], 5).unwrap();
        assert_eq!(registry.fees_collected(), 5);
        assert_eq!(registry.next_nonce(), 1);

        assert!(registry.check(&oracle, 5).is_err());
        let err = registry.register(&oracle, [2, 3, 5], 5).unwrap_err();
        assert!(matches!(err, ConsortiumError::AlreadyExists(_)));
        assert_eq!(registry.fees_collected(), 5);
        assert_eq!(registry.get(&oracle).unwrap().indexes, [1, 4, 4]);
    }

    #[test]
    fn only_owned_indexes_pass_the_guard() {
        let mut registry = OracleRegistry::default();
        let oracle = Principal::new("oracle-1");
        registry.register(&oracle, [1, 4, 4], 5).unwrap();

        assert!(registry.require_owner(&oracle, 4).is_ok());
        let err = registry.require_owner(&oracle, 2).unwrap_err();
        assert_eq!(err.guard(), Some(Guard::OnlyOracle));
        let err = registry.require_owner(&Principal::new("ghost"), 1).unwrap_err();
        assert_eq!(err.guard(), Some(Guard::OnlyOracle));
    }
}
