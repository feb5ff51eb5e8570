use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConsortiumError;
use crate::ids::{FlightKey, InsuranceKey, Principal, Units};
use crate::insurance::SettlementRoute;

/// Index slot in `[0, oracle_index_range)`.
pub type OracleIndex = u8;

/// Number of indices assigned to every oracle.
pub const INDICES_PER_ORACLE: usize = 3;

/// Flight status codes reported by oracles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FlightStatusCode {
    Unknown = 0,
    OnTime = 1,
    LateAirline = 2,
    LateWeather = 3,
    LateTechnical = 4,
    LateOther = 5,
}

impl FlightStatusCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Settlement route for every pending insurance of a flight resolved
    /// with this status. `Unknown` never settles.
    pub fn settlement_route(self) -> Option<SettlementRoute> {
        match self {
            FlightStatusCode::Unknown => None,
            FlightStatusCode::LateAirline => Some(SettlementRoute::ToInsuree),
            _ => Some(SettlementRoute::ToConsortium),
        }
    }
}

impl TryFrom<u8> for FlightStatusCode {
    type Error = ConsortiumError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(FlightStatusCode::Unknown),
            1 => Ok(FlightStatusCode::OnTime),
            2 => Ok(FlightStatusCode::LateAirline),
            3 => Ok(FlightStatusCode::LateWeather),
            4 => Ok(FlightStatusCode::LateTechnical),
            5 => Ok(FlightStatusCode::LateOther),
            other => Err(ConsortiumError::InvalidStatusCode(other)),
        }
    }
}

impl std::fmt::Display for FlightStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlightStatusCode::Unknown => "UNKNOWN",
            FlightStatusCode::OnTime => "ON_TIME",
            FlightStatusCode::LateAirline => "LATE_AIRLINE",
            FlightStatusCode::LateWeather => "LATE_WEATHER",
            FlightStatusCode::LateTechnical => "LATE_TECHNICAL",
            FlightStatusCode::LateOther => "LATE_OTHER",
        };
        f.write_str(name)
    }
}

/// A passenger's insurance on a specific flight.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlightInsurance {
    pub passenger: Principal,
    pub key: InsuranceKey,
    pub amount: Units,
}

/// A flight registered by an airline affiliate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Flight {
    pub key: FlightKey,
    pub airline: Principal,
    pub code: String,
    /// Departure, unix seconds.
    pub departure: u64,
    pub insurances: Vec<FlightInsurance>,
    pub status: FlightStatusCode,
    pub registered_at: DateTime<Utc>,
}

impl Flight {
    pub fn new(airline: Principal, code: impl Into<String>, departure: u64) -> Self {
        let code = code.into();
        Self {
            key: FlightKey::derive(&airline, &code, departure),
            airline,
            code,
            departure,
            insurances: Vec::new(),
            status: FlightStatusCode::Unknown,
            registered_at: Utc::now(),
        }
    }

    pub fn insurance_keys(&self) -> Vec<InsuranceKey> {
        self.insurances.iter().map(|i| i.key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip_through_u8() {
        for code in 0u8..=5 {
            let status = FlightStatusCode::try_from(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert!(matches!(
            FlightStatusCode::try_from(6),
            Err(ConsortiumError::InvalidStatusCode(6))
        ));
    }

    #[test]
    fn only_late_airline_pays_the_insuree() {
        assert_eq!(
            FlightStatusCode::LateAirline.settlement_route(),
            Some(SettlementRoute::ToInsuree)
        );
        for status in [
            FlightStatusCode::OnTime,
            FlightStatusCode::LateWeather,
            FlightStatusCode::LateTechnical,
            FlightStatusCode::LateOther,
        ] {
            assert_eq!(status.settlement_route(), Some(SettlementRoute::ToConsortium));
        }
        assert_eq!(FlightStatusCode::Unknown.settlement_route(), None);
    }

    #[test]
    fn new_flight_derives_its_key() {
        let airline = Principal::new("wright-brothers");
        let flight = Flight::new(airline.clone(), "WB1111", 1111);
        assert_eq!(flight.key, FlightKey::derive(&airline, "WB1111", 1111));
        assert_eq!(flight.status, FlightStatusCode::Unknown);
        assert!(flight.insurance_keys().is_empty());
    }
}
