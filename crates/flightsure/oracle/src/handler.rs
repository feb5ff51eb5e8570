use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use flightsure_ledger::ConsortiumAlliance;
use flightsure_types::{
    ConsortiumConfig, ConsortiumError, ConsortiumEvent, ConsortiumResult, Flight, FlightInsurance,
    FlightKey, FlightStatusCode, InsuranceKey, OracleIndex, Principal, RequestKey, Units,
    INDICES_PER_ORACLE,
};
use tracing::{debug, info, warn};

use crate::flights::FlightRegistry;
use crate::index::IndexDeriver;
use crate::registry::{OracleRegistration, OracleRegistry};
use crate::request::{RequestBook, StatusRequest, Tally};

/// Result of an accepted oracle response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// Counted; the request is still open.
    Recorded { count: u32 },
    /// This response completed consensus and the flight was settled.
    Resolved {
        status: FlightStatusCode,
        count: u32,
        settled: usize,
    },
    /// Counted after resolution; no settlement.
    Late { count: u32 },
    /// The oracle already answered this request; ignored.
    Duplicate,
}

#[derive(Debug, Default)]
struct HandlerState {
    oracles: OracleRegistry,
    flights: FlightRegistry,
    requests: RequestBook,
}

impl HandlerState {
    /// Store the resolved status on the request's flight.
    fn mark_flight(&mut self, request: &RequestKey, status: FlightStatusCode) {
        let flight = match self.requests.get(request) {
            Some(r) => FlightKey::derive(&r.airline, &r.code, r.departure),
            None => return,
        };
        match self.flights.get_mut(&flight) {
            Some(record) => record.status = status,
            None => warn!(request = %request.short(), "Resolved status for an unregistered flight"),
        }
    }
}

/// Flight registration, insurance purchase and oracle consensus.
///
/// The handler acts on the consortium as a Delegate under its own
/// principal, which the admin must grant before use. Calls into the
/// consortium happen while the handler's lock is held; the consortium
/// never calls back, so the lock order is always handler then consortium.
///
/// Every operation runs its checks and its consortium call before writing
/// handler state. A rejected consortium call leaves the handler unchanged.
#[derive(Debug)]
pub struct FlightInsuranceHandler {
    principal: Principal,
    consortium: Arc<ConsortiumAlliance>,
    config: ConsortiumConfig,
    indexes: IndexDeriver,
    state: Mutex<HandlerState>,
}

impl FlightInsuranceHandler {
    pub fn new(
        principal: Principal,
        consortium: Arc<ConsortiumAlliance>,
        config: ConsortiumConfig,
    ) -> ConsortiumResult<Self> {
        Self::with_seed(principal, consortium, config, rand::random())
    }

    /// Handler with a fixed index seed, for reproducible draws.
    pub fn with_seed(
        principal: Principal,
        consortium: Arc<ConsortiumAlliance>,
        config: ConsortiumConfig,
        seed: [u8; 32],
    ) -> ConsortiumResult<Self> {
        config.validate()?;
        info!(
            handler = %principal,
            threshold = config.consensus_threshold,
            index_range = config.oracle_index_range,
            "Flight insurance handler created"
        );
        Ok(Self {
            indexes: IndexDeriver::new(seed, config.oracle_index_range),
            principal,
            consortium,
            config,
            state: Mutex::new(HandlerState::default()),
        })
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn consortium(&self) -> &Arc<ConsortiumAlliance> {
        &self.consortium
    }

    // ── Oracles ────────────────────────────────────────────────────────

    /// Register the caller as an oracle for exactly `oracle_fee`. Returns its
    /// three indices.
    pub fn register_oracle(
        &self,
        caller: &Principal,
        value: Units,
    ) -> ConsortiumResult<[OracleIndex; INDICES_PER_ORACLE]> {
        let fee = self.config.oracle_fee;
        let indexes = self.transact("register_oracle", |s| {
            if value != fee {
                return Err(ConsortiumError::InsufficientValue {
                    expected: fee,
                    received: value,
                });
            }
            s.oracles.check(caller, value)?;
            let indexes = self.indexes.oracle_indexes(caller, s.oracles.next_nonce());
            self.consortium.publish(
                &self.principal,
                vec![ConsortiumEvent::OracleRegistered {
                    oracle: caller.clone(),
                    indexes,
                }],
            )?;
            s.oracles.register(caller, indexes, value)?;
            Ok(indexes)
        })?;
        info!(oracle = %caller, indexes = ?indexes, "Oracle registered");
        Ok(indexes)
    }

    pub fn get_my_indexes(
        &self,
        caller: &Principal,
    ) -> ConsortiumResult<[OracleIndex; INDICES_PER_ORACLE]> {
        self.read(|s| {
            s.oracles
                .get(caller)
                .map(|r| r.indexes)
                .ok_or_else(|| ConsortiumError::NotFound(format!("oracle {}", caller)))
        })
    }

    pub fn oracle(&self, oracle: &Principal) -> Option<OracleRegistration> {
        self.read(|s| s.oracles.get(oracle).cloned())
    }

    pub fn oracle_count(&self) -> usize {
        self.read(|s| s.oracles.len())
    }

    pub fn collected_oracle_fees(&self) -> Units {
        self.read(|s| s.oracles.fees_collected())
    }

    // ── Flights ────────────────────────────────────────────────────────

    /// Register a flight operated by the calling airline affiliate.
    pub fn register_flight(
        &self,
        caller: &Principal,
        code: &str,
        departure: u64,
    ) -> ConsortiumResult<FlightKey> {
        let key = self.transact("register_flight", |s| {
            self.consortium.ensure_consortium_affiliate(caller)?;
            self.consortium.ensure_operational()?;
            let flight = Flight::new(caller.clone(), code, departure);
            s.flights.check_new(&flight)?;
            self.consortium.publish(
                &self.principal,
                vec![ConsortiumEvent::FlightRegistered {
                    key: flight.key,
                    airline: caller.clone(),
                    code: code.to_string(),
                    departure,
                }],
            )?;
            s.flights.register(flight)
        })?;
        info!(
            flight = %key.short(),
            airline = %caller,
            code = %code,
            departure,
            "Flight registered"
        );
        Ok(key)
    }

    /// Buy insurance on a registered flight. The caller becomes the payer of
    /// the escrow record. A flight whose status is already resolved takes no
    /// new insurance.
    pub fn register_flight_insurance(
        &self,
        caller: &Principal,
        flight: &FlightKey,
        value: Units,
    ) -> ConsortiumResult<InsuranceKey> {
        let key = self.transact("register_flight_insurance", |s| {
            let record = s
                .flights
                .get(flight)
                .ok_or_else(|| ConsortiumError::NotFound(format!("flight {}", flight)))?;
            let request = RequestKey::derive(&record.airline, &record.code, record.departure);
            let resolved = record.status != FlightStatusCode::Unknown
                || s.requests.get(&request).is_some_and(|r| !r.is_open());
            if resolved {
                return Err(ConsortiumError::AlreadyResolved(request));
            }

            let flight_key = *flight;
            let passenger = caller.clone();
            let key = self.consortium.deposit_insurance_with(
                &self.principal,
                caller,
                value,
                move |key| {
                    vec![ConsortiumEvent::FlightInsuranceRegistered {
                        flight: flight_key,
                        key,
                        passenger,
                        amount: value,
                    }]
                },
            )?;
            s.flights.add_insurance(
                flight,
                FlightInsurance {
                    passenger: caller.clone(),
                    key,
                    amount: value,
                },
            )?;
            Ok(key)
        })?;
        info!(
            flight = %flight.short(),
            passenger = %caller,
            amount = %value,
            "Flight insurance registered"
        );
        Ok(key)
    }

    pub fn flight(&self, key: &FlightKey) -> Option<Flight> {
        self.read(|s| s.flights.get(key).cloned())
    }

    pub fn flights(&self) -> Vec<Flight> {
        self.read(|s| s.flights.flights().cloned().collect())
    }

    // ── Status requests ────────────────────────────────────────────────

    /// Ask oracles for a flight's status. Returns the request key and the
    /// index whose owners may respond. Asking again for the same flight
    /// returns the existing request and announces it again.
    pub fn request_flight_status(
        &self,
        caller: &Principal,
        airline: &Principal,
        code: &str,
        departure: u64,
    ) -> ConsortiumResult<(RequestKey, OracleIndex)> {
        let (key, index) = self.transact("request_flight_status", |s| {
            let key = RequestKey::derive(airline, code, departure);
            let existing = s.requests.get(&key).map(|r| r.index);
            let index = existing.unwrap_or_else(|| {
                self.indexes.request_index(airline, code, departure, s.requests.next_nonce())
            });
            self.consortium.publish(
                &self.principal,
                vec![ConsortiumEvent::FlightStatusRequested {
                    request: key,
                    index,
                    airline: airline.clone(),
                    code: code.to_string(),
                    departure,
                }],
            )?;
            if existing.is_none() {
                s.requests.open(StatusRequest::new(airline, code, departure, index));
            }
            Ok((key, index))
        })?;
        info!(
            request = %key.short(),
            index,
            requester = %caller,
            code = %code,
            "Flight status requested"
        );
        Ok((key, index))
    }

    /// Accept one oracle's report on a flight. The response that brings a
    /// status to the consensus threshold resolves the request and settles
    /// every pending insurance of the flight in the same unit.
    pub fn submit_oracle_response(
        &self,
        caller: &Principal,
        index: OracleIndex,
        airline: &Principal,
        code: &str,
        departure: u64,
        status: u8,
    ) -> ConsortiumResult<ResponseOutcome> {
        let threshold = self.config.consensus_threshold;
        let outcome = self.transact("submit_oracle_response", |s| {
            s.oracles.require_owner(caller, index)?;
            let key = RequestKey::derive(airline, code, departure);
            let request = s
                .requests
                .get(&key)
                .ok_or_else(|| ConsortiumError::NotFound(format!("status request {}", key)))?;
            if request.index != index {
                return Err(ConsortiumError::IndexMismatch {
                    expected: request.index,
                    actual: index,
                });
            }
            let status = FlightStatusCode::try_from(status)?;

            let report = |count: u32| ConsortiumEvent::OracleReport {
                oracle: caller.clone(),
                request: key,
                status,
                count,
            };
            let outcome = match request.tally(caller, status, threshold) {
                Tally::Duplicate => return Ok(ResponseOutcome::Duplicate),
                Tally::Counted(count) => {
                    self.consortium.publish(&self.principal, vec![report(count)])?;
                    ResponseOutcome::Recorded { count }
                }
                Tally::Late(count) => {
                    self.consortium.publish(&self.principal, vec![report(count)])?;
                    ResponseOutcome::Late { count }
                }
                Tally::Reached(count) => {
                    let settled = self.settle_flight(s, &key, status, Some(report(count)))?;
                    ResponseOutcome::Resolved {
                        status,
                        count,
                        settled,
                    }
                }
            };

            if let Some(request) = s.requests.get_mut(&key) {
                request.record(caller, status, threshold);
            }
            if let ResponseOutcome::Resolved { .. } = outcome {
                s.mark_flight(&key, status);
            }
            Ok(outcome)
        })?;

        match outcome {
            ResponseOutcome::Resolved { status, settled, .. } => info!(
                oracle = %caller,
                code = %code,
                status = %status,
                settled,
                "Flight status resolved"
            ),
            ResponseOutcome::Duplicate => {
                debug!(oracle = %caller, code = %code, "Duplicate oracle response ignored")
            }
            ResponseOutcome::Late { count } => {
                debug!(oracle = %caller, code = %code, count, "Late oracle response")
            }
            ResponseOutcome::Recorded { count } => {
                debug!(oracle = %caller, code = %code, count, "Oracle response recorded")
            }
        }
        Ok(outcome)
    }

    /// Admin resolution of an open request without oracle consensus.
    /// Returns the number of insurances settled.
    pub fn process_flight_status(
        &self,
        caller: &Principal,
        airline: &Principal,
        code: &str,
        departure: u64,
        status: FlightStatusCode,
    ) -> ConsortiumResult<usize> {
        let settled = self.transact("process_flight_status", |s| {
            self.consortium.ensure_admin(caller)?;
            let key = RequestKey::derive(airline, code, departure);
            let request = s
                .requests
                .get(&key)
                .ok_or_else(|| ConsortiumError::NotFound(format!("status request {}", key)))?;
            if !request.is_open() {
                return Err(ConsortiumError::AlreadyResolved(key));
            }
            let settled = self.settle_flight(s, &key, status, None)?;

            if let Some(request) = s.requests.get_mut(&key) {
                request.resolve(status);
            }
            s.mark_flight(&key, status);
            Ok(settled)
        })?;
        info!(
            admin = %caller,
            code = %code,
            status = %status,
            settled,
            "Flight status processed"
        );
        Ok(settled)
    }

    pub fn status_request(&self, key: &RequestKey) -> Option<StatusRequest> {
        self.read(|s| s.requests.get(key).cloned())
    }

    // ── Internals ──────────────────────────────────────────────────────

    /// Settle every pending insurance of the request's flight along the
    /// route of `status`, committing the resolution events with it. Handler
    /// state is left for the caller to update.
    fn settle_flight(
        &self,
        s: &HandlerState,
        request: &RequestKey,
        status: FlightStatusCode,
        report: Option<ConsortiumEvent>,
    ) -> ConsortiumResult<usize> {
        let route = status
            .settlement_route()
            .ok_or(ConsortiumError::InvalidStatusCode(status.code()))?;
        let (airline, code, departure) = s
            .requests
            .get(request)
            .map(|r| (r.airline.clone(), r.code.clone(), r.departure))
            .ok_or_else(|| ConsortiumError::NotFound(format!("status request {}", request)))?;

        let flight = FlightKey::derive(&airline, &code, departure);
        let keys = s
            .flights
            .get(&flight)
            .map(Flight::insurance_keys)
            .unwrap_or_default();

        let mut preamble: Vec<ConsortiumEvent> = report.into_iter().collect();
        preamble.push(ConsortiumEvent::FlightStatus {
            request: *request,
            airline,
            code,
            departure,
            status,
        });

        let settled = self.consortium.settle_pending_with(
            &self.principal,
            &keys,
            route,
            preamble,
            |settled| {
                vec![ConsortiumEvent::FlightStatusProcessed {
                    flight,
                    status,
                    settled: settled.len(),
                }]
            },
        )?;
        Ok(settled.len())
    }

    fn lock(&self) -> MutexGuard<'_, HandlerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<T>(&self, f: impl FnOnce(&HandlerState) -> T) -> T {
        f(&self.lock())
    }

    fn transact<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut HandlerState) -> ConsortiumResult<T>,
    ) -> ConsortiumResult<T> {
        f(&mut self.lock()).inspect_err(|err| warn!(op, error = %err, "Handler operation rejected"))
    }
}
