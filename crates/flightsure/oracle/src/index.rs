//! Responsibility index derivation.
//!
//! Indices are BLAKE3 draws over a per-instance seed, the subject (oracle
//! principal or flight tuple), a monotonic nonce and a slot number, reduced
//! modulo the configured range. They are unpredictable without the seed
//! and reproducible with it.

use flightsure_types::{OracleIndex, Principal, INDICES_PER_ORACLE};

const ORACLE_DOMAIN: &[u8] = b"flightsure-oracle-index-v1:";
const REQUEST_DOMAIN: &[u8] = b"flightsure-request-index-v1:";

#[derive(Clone, Debug)]
pub struct IndexDeriver {
    seed: [u8; 32],
    range: u8,
}

impl IndexDeriver {
    /// `range` must be non-zero; configuration validation guarantees it.
    pub fn new(seed: [u8; 32], range: u8) -> Self {
        Self {
            seed,
            range: range.max(1),
        }
    }

    /// The three indices of an oracle registered with `nonce`. Repeats
    /// within the triple are possible.
    pub fn oracle_indexes(
        &self,
        oracle: &Principal,
        nonce: u64,
    ) -> [OracleIndex; INDICES_PER_ORACLE] {
        let mut indexes = [0; INDICES_PER_ORACLE];
        for (slot, index) in indexes.iter_mut().enumerate() {
            *index = self.draw(ORACLE_DOMAIN, &[oracle.as_str().as_bytes()], nonce, slot as u8);
        }
        indexes
    }

    /// Target index of the status request opened with `nonce`.
    pub fn request_index(
        &self,
        airline: &Principal,
        code: &str,
        departure: u64,
        nonce: u64,
    ) -> OracleIndex {
        self.draw(
            REQUEST_DOMAIN,
            &[
                airline.as_str().as_bytes(),
                code.as_bytes(),
                &departure.to_le_bytes(),
            ],
            nonce,
            0,
        )
    }

    fn draw(&self, domain: &[u8], parts: &[&[u8]], nonce: u64, slot: u8) -> OracleIndex {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain);
        hasher.update(&self.seed);
        for part in parts {
            hasher.update(&(part.len() as u32).to_le_bytes());
            hasher.update(part);
        }
        hasher.update(&nonce.to_le_bytes());
        hasher.update(&[slot]);

        let digest = hasher.finalize();
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest.as_bytes()[..8]);
        (u64::from_le_bytes(word) % u64::from(self.range)) as OracleIndex
    }
}
