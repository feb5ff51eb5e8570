use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use flightsure_types::{FlightStatusCode, OracleIndex, Principal, RequestKey};
use serde::{Deserialize, Serialize};

/// An open or resolved flight-status request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusRequest {
    pub key: RequestKey,
    pub airline: Principal,
    pub code: String,
    pub departure: u64,
    /// Only oracles owning this index may respond
    pub index: OracleIndex,
    pub responses: BTreeMap<FlightStatusCode, u32>,
    pub responders: BTreeSet<Principal>,
    pub resolved: Option<FlightStatusCode>,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Effect of one oracle response on a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tally {
    /// The oracle already responded; nothing counted.
    Duplicate,
    /// Counted; no consensus yet.
    Counted(u32),
    /// Counted and this response completed consensus.
    Reached(u32),
    /// Counted after the request was already resolved.
    Late(u32),
}

impl StatusRequest {
    pub fn new(
        airline: &Principal,
        code: &str,
        departure: u64,
        index: OracleIndex,
    ) -> Self {
        Self {
            key: RequestKey::derive(airline, code, departure),
            airline: airline.clone(),
            code: code.to_string(),
            departure,
            index,
            responses: BTreeMap::new(),
            responders: BTreeSet::new(),
            resolved: None,
            opened_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.resolved.is_none()
    }

    pub fn count(&self, status: FlightStatusCode) -> u32 {
        self.responses.get(&status).copied().unwrap_or(0)
    }

    /// What counting `oracle`'s response would do, without counting it.
    /// `Unknown` is counted but never resolves.
    pub fn tally(&self, oracle: &Principal, status: FlightStatusCode, threshold: u32) -> Tally {
        if self.responders.contains(oracle) {
            return Tally::Duplicate;
        }
        let count = self.count(status).saturating_add(1);
        if !self.is_open() {
            Tally::Late(count)
        } else if count >= threshold && status.settlement_route().is_some() {
            Tally::Reached(count)
        } else {
            Tally::Counted(count)
        }
    }

    /// Count `oracle`'s response. Resolves the request the first time a
    /// settling status reaches `threshold`.
    pub fn record(
        &mut self,
        oracle: &Principal,
        status: FlightStatusCode,
        threshold: u32,
    ) -> Tally {
        let tally = self.tally(oracle, status, threshold);
        match tally {
            Tally::Duplicate => {}
            Tally::Counted(count) | Tally::Late(count) => {
                self.responders.insert(oracle.clone());
                self.responses.insert(status, count);
            }
            Tally::Reached(count) => {
                self.responders.insert(oracle.clone());
                self.responses.insert(status, count);
                self.resolve(status);
            }
        }
        tally
    }

    pub fn resolve(&mut self, status: FlightStatusCode) {
        self.resolved = Some(status);
        self.resolved_at = Some(Utc::now());
    }
}

/// Status requests keyed by flight tuple.
#[derive(Clone, Debug, Default)]
pub struct RequestBook {
    requests: HashMap<RequestKey, StatusRequest>,
    /// Requests opened so far; seeds the next index draw
    nonce: u64,
}

impl RequestBook {
    pub fn get(&self, key: &RequestKey) -> Option<&StatusRequest> {
        self.requests.get(key)
    }

    pub fn get_mut(&mut self, key: &RequestKey) -> Option<&mut StatusRequest> {
        self.requests.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn next_nonce(&self) -> u64 {
        self.nonce
    }

    /// Open `request` unless one exists for the same flight; returns the
    /// request in effect.
    pub fn open(&mut self, request: StatusRequest) -> &StatusRequest {
        let key = request.key;
        if !self.requests.contains_key(&key) {
            self.nonce += 1;
        }
        self.requests.entry(key).or_insert(request)
    }
}
