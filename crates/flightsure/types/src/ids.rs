use serde::{Deserialize, Serialize};

/// Monetary amount in base units of the host's native currency.
pub type Units = u128;

/// One whole unit of the native currency (10^18 base units).
pub const UNIT: Units = 1_000_000_000_000_000_000;

/// Principal: an address-like identity supplied by the host as the caller
/// of every operation.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Principal(pub String);

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Principal {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

macro_rules! digest_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Lowercase hex rendering of the full digest.
            pub fn to_hex(&self) -> String {
                blake3::Hash::from(self.0).to_hex().to_string()
            }

            /// Short prefix for log lines.
            pub fn short(&self) -> String {
                self.to_hex()[..12].to_string()
            }
        }

        impl From<blake3::Hash> for $name {
            fn from(hash: blake3::Hash) -> Self {
                Self(*hash.as_bytes())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "0x{}", self.to_hex())
            }
        }
    };
}

digest_key!(
    /// Single-use settlement key of one insurance record.
    InsuranceKey
);

digest_key!(
    /// Identity of a flight: BLAKE3 of (airline, code, departure).
    FlightKey
);

digest_key!(
    /// Identity of a flight-status request: BLAKE3 of (airline, code, departure).
    RequestKey
);

impl FlightKey {
    /// Derive the key of a flight from its natural identity.
    pub fn derive(airline: &Principal, code: &str, departure: u64) -> Self {
        Self::from(flight_digest(b"flightsure-flight-v1:", airline, code, departure))
    }
}

impl RequestKey {
    /// Derive the key of the status request for a flight tuple.
    pub fn derive(airline: &Principal, code: &str, departure: u64) -> Self {
        Self::from(flight_digest(b"flightsure-request-v1:", airline, code, departure))
    }
}

fn flight_digest(domain: &[u8], airline: &Principal, code: &str, departure: u64) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    hasher.update(&(airline.0.len() as u32).to_le_bytes());
    hasher.update(airline.0.as_bytes());
    hasher.update(&(code.len() as u32).to_le_bytes());
    hasher.update(code.as_bytes());
    hasher.update(&departure.to_le_bytes());
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_display() {
        assert_eq!(Principal::new("0xabc").to_string(), "0xabc");
    }

    #[test]
    fn flight_key_is_deterministic_and_field_sensitive() {
        let airline = Principal::new("wright-brothers");
        let a = FlightKey::derive(&airline, "WB1111", 1111);
        let b = FlightKey::derive(&airline, "WB1111", 1111);
        let c = FlightKey::derive(&airline, "WB1111", 1112);
        let d = FlightKey::derive(&airline, "WB111", 11111);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn flight_and_request_keys_are_domain_separated() {
        let airline = Principal::new("kitty-hawk");
        let flight = FlightKey::derive(&airline, "KH1111", 1);
        let request = RequestKey::derive(&airline, "KH1111", 1);
        assert_ne!(flight.0, request.0);
    }

    #[test]
    fn key_display_is_prefixed_hex() {
        let key = InsuranceKey([0xab; 32]);
        let shown = key.to_string();
        assert!(shown.starts_with("0xabab"));
        assert_eq!(shown.len(), 2 + 64);
        assert_eq!(key.short().len(), 12);
    }
}
