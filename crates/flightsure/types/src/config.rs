//! Consortium configuration.
//!
//! All fee and consensus constants live here so a host can tune them
//! without touching the ledgers. Defaults reproduce the production values.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConsortiumError, ConsortiumResult};
use crate::ids::{Units, UNIT};

/// Tunable constants of a consortium instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsortiumConfig {
    /// Exact membership fee an affiliate deposits to become funded.
    pub membership_fee: Units,
    /// Exact fee an oracle pays to register.
    pub oracle_fee: Units,
    /// Premium paid by the consortium on top of the deposit when the airline
    /// is liable, in percent of the deposit.
    pub premium_percent: u32,
    /// Matching oracle responses required to resolve a status request.
    pub consensus_threshold: u32,
    /// Oracle indices are drawn from `[0, oracle_index_range)`.
    pub oracle_index_range: u8,
    /// Number of funded affiliates admitted without an approval vote.
    pub bootstrap_affiliates: usize,
}

impl Default for ConsortiumConfig {
    fn default() -> Self {
        Self {
            membership_fee: 10 * UNIT,
            oracle_fee: UNIT,
            premium_percent: 50,
            consensus_threshold: 3,
            oracle_index_range: 10,
            bootstrap_affiliates: 4,
        }
    }
}

impl ConsortiumConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> ConsortiumResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConsortiumError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> ConsortiumResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConsortiumError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> ConsortiumResult<()> {
        if self.membership_fee == 0 {
            return Err(ConsortiumError::InvalidConfig(
                "membership_fee must be positive".into(),
            ));
        }
        if self.consensus_threshold == 0 {
            return Err(ConsortiumError::InvalidConfig(
                "consensus_threshold must be at least 1".into(),
            ));
        }
        if self.oracle_index_range == 0 {
            return Err(ConsortiumError::InvalidConfig(
                "oracle_index_range must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Premium owed on a deposit of `amount`.
    pub fn premium_for(&self, amount: Units) -> ConsortiumResult<Units> {
        amount
            .checked_mul(Units::from(self.premium_percent))
            .map(|scaled| scaled / 100)
            .ok_or(ConsortiumError::Arithmetic("premium"))
    }
}
