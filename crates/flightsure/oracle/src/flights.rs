use std::collections::HashMap;

use flightsure_types::{ConsortiumError, ConsortiumResult, Flight, FlightInsurance, FlightKey};

/// Flights registered by airline affiliates.
#[derive(Clone, Debug, Default)]
pub struct FlightRegistry {
    flights: HashMap<FlightKey, Flight>,
}

impl FlightRegistry {
    pub fn get(&self, key: &FlightKey) -> Option<&Flight> {
        self.flights.get(key)
    }

    pub fn get_mut(&mut self, key: &FlightKey) -> Option<&mut Flight> {
        self.flights.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }

    pub fn flights(&self) -> impl Iterator<Item = &Flight> {
        self.flights.values()
    }

    /// Check that `flight` is not registered yet.
    pub fn check_new(&self, flight: &Flight) -> ConsortiumResult<()> {
        if self.flights.contains_key(&flight.key) {
            return Err(ConsortiumError::AlreadyExists(format!(
                "flight {} of {}",
                flight.code, flight.airline
            )));
        }
        Ok(())
    }

    pub fn register(&mut self, flight: Flight) -> ConsortiumResult<FlightKey> {
        self.check_new(&flight)?;
        let key = flight.key;
        self.flights.insert(key, flight);
        Ok(key)
    }

    pub fn add_insurance(
        &mut self,
        key: &FlightKey,
        insurance: FlightInsurance,
    ) -> ConsortiumResult<()> {
        let flight = self
            .flights
            .get_mut(key)
            .ok_or_else(|| ConsortiumError::NotFound(format!("flight {}", key)))?;
        flight.insurances.push(insurance);
        Ok(())
    }
}
