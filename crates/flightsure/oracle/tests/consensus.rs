//! Oracle consensus end to end: registration, flight insurance, status
//! requests and settlement on consensus.

use std::sync::Arc;

use flightsure_ledger::ConsortiumAlliance;
use flightsure_oracle::{FlightInsuranceHandler, ResponseOutcome};
use flightsure_types::{
    ConsortiumConfig, ConsortiumError, FlightKey, FlightStatusCode, Guard, InsuranceState,
    OracleIndex, Principal, Role, UNIT,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const DEPARTURE: u64 = 1_700_000_000;

fn admin() -> Principal {
    Principal::new("admin")
}

fn handler_principal() -> Principal {
    Principal::new("flight-handler")
}

fn airline() -> Principal {
    Principal::new("airline-0")
}

fn passenger() -> Principal {
    Principal::new("passenger")
}

fn oracle(i: usize) -> Principal {
    Principal::new(format!("oracle-{}", i))
}

/// Consortium with four funded airlines and a handler holding the
/// delegate role. With `index_range == 1` every index is 0.
fn setup(index_range: u8) -> FlightInsuranceHandler {
    let config = ConsortiumConfig {
        oracle_index_range: index_range,
        ..ConsortiumConfig::default()
    };
    let consortium =
        Arc::new(ConsortiumAlliance::with_salt(admin(), config.clone(), [1u8; 32]).unwrap());
    for i in 0..4 {
        let member = Principal::new(format!("airline-{}", i));
        consortium
            .create_affiliate(&admin(), &member, &format!("Airline {}", i))
            .unwrap();
        consortium.deposit_membership(&member, 10 * UNIT).unwrap();
    }
    consortium
        .add_delegate_role(&admin(), &handler_principal())
        .unwrap();
    FlightInsuranceHandler::with_seed(handler_principal(), consortium, config, [2u8; 32]).unwrap()
}

fn register_oracles(handler: &FlightInsuranceHandler, count: usize) {
    for i in 0..count {
        handler.register_oracle(&oracle(i), UNIT).unwrap();
    }
}

/// Registered flight with one 1-unit insurance.
fn insured_flight(handler: &FlightInsuranceHandler) -> (FlightKey, flightsure_types::InsuranceKey) {
    let flight = handler.register_flight(&airline(), "WB1111", DEPARTURE).unwrap();
    let key = handler
        .register_flight_insurance(&passenger(), &flight, UNIT)
        .unwrap();
    (flight, key)
}

fn respond(
    handler: &FlightInsuranceHandler,
    i: usize,
    index: OracleIndex,
    status: FlightStatusCode,
) -> Result<ResponseOutcome, ConsortiumError> {
    handler.submit_oracle_response(
        &oracle(i),
        index,
        &airline(),
        "WB1111",
        DEPARTURE,
        status.code(),
    )
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

#[test]
fn oracle_registration_requires_exact_fee() {
    let handler = setup(10);
    let err = handler.register_oracle(&oracle(0), UNIT / 2).unwrap_err();
    assert!(matches!(err, ConsortiumError::InsufficientValue { .. }));

    let indexes = handler.register_oracle(&oracle(0), UNIT).unwrap();
    assert!(indexes.iter().all(|i| *i < 10));
    assert_eq!(handler.get_my_indexes(&oracle(0)).unwrap(), indexes);
    assert_eq!(handler.collected_oracle_fees(), UNIT);

    let err = handler.register_oracle(&oracle(0), UNIT).unwrap_err();
    assert!(matches!(err, ConsortiumError::AlreadyExists(_)));
    assert_eq!(handler.collected_oracle_fees(), UNIT);
}

#[test]
fn unknown_oracle_has_no_indexes() {
    let handler = setup(10);
    assert!(matches!(
        handler.get_my_indexes(&oracle(42)),
        Err(ConsortiumError::NotFound(_))
    ));
}

#[test]
fn oracle_fees_stay_outside_custody() {
    let handler = setup(1);
    let custody = handler.consortium().custody();
    register_oracles(&handler, 3);
    assert_eq!(handler.consortium().custody(), custody);
    assert_eq!(handler.collected_oracle_fees(), 3 * UNIT);
}

#[test]
fn hundred_oracles_spread_over_all_indexes() {
    let handler = setup(10);
    register_oracles(&handler, 100);
    let mut seen = [0usize; 10];
    for i in 0..100 {
        for index in handler.get_my_indexes(&oracle(i)).unwrap() {
            seen[index as usize] += 1;
        }
    }
    assert!(seen.iter().all(|count| *count > 0));
    assert_eq!(seen.iter().sum::<usize>(), 300);
}

#[test]
fn only_funded_airlines_register_flights() {
    let handler = setup(1);
    let err = handler
        .register_flight(&Principal::new("charter"), "CH1", DEPARTURE)
        .unwrap_err();
    assert_eq!(err.guard(), Some(Guard::OnlyConsortiumAffiliate));

    handler.register_flight(&airline(), "WB1111", DEPARTURE).unwrap();
    let err = handler
        .register_flight(&airline(), "WB1111", DEPARTURE)
        .unwrap_err();
    assert!(matches!(err, ConsortiumError::AlreadyExists(_)));
}

#[test]
fn insurance_needs_a_registered_flight() {
    let handler = setup(1);
    let missing = FlightKey::derive(&airline(), "NOPE", DEPARTURE);
    let err = handler
        .register_flight_insurance(&passenger(), &missing, UNIT)
        .unwrap_err();
    assert!(matches!(err, ConsortiumError::NotFound(_)));
    assert_eq!(handler.consortium().consortium_escrow(), 0);
}

#[test]
fn flight_insurance_is_held_in_escrow() {
    let handler = setup(1);
    let (flight, key) = insured_flight(&handler);
    let record = handler.consortium().insurance(&key).unwrap();
    assert_eq!(record.payer, passenger());
    assert_eq!(record.amount, UNIT);
    assert_eq!(handler.consortium().consortium_escrow(), UNIT);
    assert_eq!(handler.flight(&flight).unwrap().insurance_keys(), vec![key]);
}

// ---------------------------------------------------------------------------
// Consensus
// ---------------------------------------------------------------------------

#[test]
fn late_airline_consensus_pays_the_insuree() {
    let handler = setup(1);
    register_oracles(&handler, 5);
    let (flight, key) = insured_flight(&handler);
    let (_, index) = handler
        .request_flight_status(&passenger(), &airline(), "WB1111", DEPARTURE)
        .unwrap();
    assert_eq!(index, 0);

    let late = FlightStatusCode::LateAirline;
    assert_eq!(
        respond(&handler, 0, index, late).unwrap(),
        ResponseOutcome::Recorded { count: 1 }
    );
    assert_eq!(
        respond(&handler, 1, index, late).unwrap(),
        ResponseOutcome::Recorded { count: 2 }
    );
    assert_eq!(
        respond(&handler, 2, index, late).unwrap(),
        ResponseOutcome::Resolved {
            status: late,
            count: 3,
            settled: 1
        }
    );

    let consortium = handler.consortium();
    assert_eq!(consortium.payments(&passenger()), UNIT + UNIT / 2);
    assert_eq!(consortium.consortium_escrow(), 0);
    assert_eq!(consortium.consortium_balance(), 40 * UNIT - UNIT / 2);
    assert_eq!(
        consortium.insurance(&key).unwrap().state,
        InsuranceState::SettledToInsuree
    );
    assert_eq!(handler.flight(&flight).unwrap().status, late);

    // Fourth response, identical or not, settles nothing
    assert_eq!(
        respond(&handler, 3, index, late).unwrap(),
        ResponseOutcome::Late { count: 4 }
    );
    assert_eq!(
        respond(&handler, 4, index, FlightStatusCode::OnTime).unwrap(),
        ResponseOutcome::Late { count: 1 }
    );
    assert_eq!(consortium.payments(&passenger()), UNIT + UNIT / 2);

    assert_eq!(
        consortium
            .credit_insuree(&handler_principal(), &key)
            .unwrap_err(),
        ConsortiumError::InvalidKey(key)
    );
}

#[test]
fn on_time_consensus_credits_the_consortium() {
    let handler = setup(1);
    register_oracles(&handler, 3);
    let (_, key) = insured_flight(&handler);
    let (_, index) = handler
        .request_flight_status(&passenger(), &airline(), "WB1111", DEPARTURE)
        .unwrap();

    for i in 0..3 {
        respond(&handler, i, index, FlightStatusCode::OnTime).unwrap();
    }
    let consortium = handler.consortium();
    assert_eq!(consortium.consortium_balance(), 41 * UNIT);
    assert_eq!(consortium.payments(&passenger()), 0);
    assert_eq!(
        consortium.insurance(&key).unwrap().state,
        InsuranceState::SettledToConsortium
    );
}

#[test]
fn split_votes_need_three_of_a_kind() {
    let handler = setup(1);
    register_oracles(&handler, 6);
    insured_flight(&handler);
    let (request, index) = handler
        .request_flight_status(&passenger(), &airline(), "WB1111", DEPARTURE)
        .unwrap();

    respond(&handler, 0, index, FlightStatusCode::LateWeather).unwrap();
    respond(&handler, 1, index, FlightStatusCode::OnTime).unwrap();
    respond(&handler, 2, index, FlightStatusCode::LateWeather).unwrap();
    respond(&handler, 3, index, FlightStatusCode::OnTime).unwrap();
    assert!(handler.status_request(&request).unwrap().is_open());

    let outcome = respond(&handler, 4, index, FlightStatusCode::OnTime).unwrap();
    assert!(matches!(
        outcome,
        ResponseOutcome::Resolved {
            status: FlightStatusCode::OnTime,
            ..
        }
    ));
}

#[test]
fn repeated_oracle_response_is_ignored() {
    let handler = setup(1);
    register_oracles(&handler, 3);
    insured_flight(&handler);
    let (request, index) = handler
        .request_flight_status(&passenger(), &airline(), "WB1111", DEPARTURE)
        .unwrap();

    respond(&handler, 0, index, FlightStatusCode::LateAirline).unwrap();
    for _ in 0..3 {
        assert_eq!(
            respond(&handler, 0, index, FlightStatusCode::LateAirline).unwrap(),
            ResponseOutcome::Duplicate
        );
    }
    let req = handler.status_request(&request).unwrap();
    assert!(req.is_open());
    assert_eq!(req.count(FlightStatusCode::LateAirline), 1);
}

#[test]
fn unknown_status_never_resolves() {
    let handler = setup(1);
    register_oracles(&handler, 4);
    insured_flight(&handler);
    let (request, index) = handler
        .request_flight_status(&passenger(), &airline(), "WB1111", DEPARTURE)
        .unwrap();

    for i in 0..4 {
        respond(&handler, i, index, FlightStatusCode::Unknown).unwrap();
    }
    assert!(handler.status_request(&request).unwrap().is_open());
    assert_eq!(handler.consortium().consortium_escrow(), UNIT);
}

#[test]
fn response_guards() {
    let handler = setup(10);
    register_oracles(&handler, 20);
    insured_flight(&handler);
    let (_, index) = handler
        .request_flight_status(&passenger(), &airline(), "WB1111", DEPARTURE)
        .unwrap();

    // Not registered
    let err = handler
        .submit_oracle_response(&oracle(99), index, &airline(), "WB1111", DEPARTURE, 1)
        .unwrap_err();
    assert_eq!(err.guard(), Some(Guard::OnlyOracle));

    // Registered, but answering with an index it does not own
    let (stranger, foreign) = (0..20)
        .find_map(|i| {
            let owned = handler.get_my_indexes(&oracle(i)).unwrap();
            (0..10u8).find(|x| !owned.contains(x)).map(|x| (i, x))
        })
        .unwrap();
    let err = respond(&handler, stranger, foreign, FlightStatusCode::OnTime).unwrap_err();
    assert_eq!(err.guard(), Some(Guard::OnlyOracle));

    // Owns an index, but not the one the request targets
    let (mismatched, owned) = (0..20)
        .find_map(|i| {
            let owned = handler.get_my_indexes(&oracle(i)).unwrap();
            owned.iter().find(|x| **x != index).map(|x| (i, *x))
        })
        .unwrap();
    let err = respond(&handler, mismatched, owned, FlightStatusCode::OnTime).unwrap_err();
    assert_eq!(
        err,
        ConsortiumError::IndexMismatch {
            expected: index,
            actual: owned
        }
    );

    // Right index, unknown request
    let responder = (0..20)
        .find(|i| handler.get_my_indexes(&oracle(*i)).unwrap().contains(&index))
        .unwrap();
    let err = handler
        .submit_oracle_response(&oracle(responder), index, &airline(), "WB2222", DEPARTURE, 1)
        .unwrap_err();
    assert!(matches!(err, ConsortiumError::NotFound(_)));

    // Right index, bad status code
    let err = handler
        .submit_oracle_response(&oracle(responder), index, &airline(), "WB1111", DEPARTURE, 9)
        .unwrap_err();
    assert_eq!(err, ConsortiumError::InvalidStatusCode(9));
}

#[test]
fn repeated_request_keeps_counts() {
    let handler = setup(1);
    register_oracles(&handler, 3);
    insured_flight(&handler);
    let first = handler
        .request_flight_status(&passenger(), &airline(), "WB1111", DEPARTURE)
        .unwrap();
    respond(&handler, 0, first.1, FlightStatusCode::OnTime).unwrap();

    let events_before = handler.consortium().event_count();
    let second = handler
        .request_flight_status(&airline(), &airline(), "WB1111", DEPARTURE)
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(handler.consortium().event_count(), events_before + 1);
    assert_eq!(
        handler
            .status_request(&first.0)
            .unwrap()
            .count(FlightStatusCode::OnTime),
        1
    );
}

#[test]
fn resolution_events_are_ordered() {
    let handler = setup(1);
    register_oracles(&handler, 3);
    insured_flight(&handler);
    let (_, index) = handler
        .request_flight_status(&passenger(), &airline(), "WB1111", DEPARTURE)
        .unwrap();
    respond(&handler, 0, index, FlightStatusCode::LateAirline).unwrap();
    respond(&handler, 1, index, FlightStatusCode::LateAirline).unwrap();

    let mark = handler.consortium().event_count() as u64;
    respond(&handler, 2, index, FlightStatusCode::LateAirline).unwrap();
    let names: Vec<&str> = handler
        .consortium()
        .events_since(mark)
        .iter()
        .map(|r| r.event.name())
        .collect();
    assert_eq!(
        names,
        vec![
            "OracleReport",
            "FlightStatus",
            "ConsortiumDebited",
            "EscrowDebited",
            "InsureeCredited",
            "FlightStatusProcessed",
        ]
    );
}

#[test]
fn failed_settlement_rejects_the_deciding_response() {
    let handler = setup(1);
    register_oracles(&handler, 3);
    insured_flight(&handler);
    let (request, index) = handler
        .request_flight_status(&passenger(), &airline(), "WB1111", DEPARTURE)
        .unwrap();
    respond(&handler, 0, index, FlightStatusCode::LateAirline).unwrap();
    respond(&handler, 1, index, FlightStatusCode::LateAirline).unwrap();

    for i in 0..3 {
        handler
            .consortium()
            .suspend_service(&Principal::new(format!("airline-{}", i)))
            .unwrap();
    }
    let err = respond(&handler, 2, index, FlightStatusCode::LateAirline).unwrap_err();
    assert_eq!(err, ConsortiumError::NotOperational);

    let req = handler.status_request(&request).unwrap();
    assert!(req.is_open());
    assert_eq!(req.count(FlightStatusCode::LateAirline), 2);
    assert!(!req.responders.contains(&oracle(2)));

    // Once resumed, the same oracle can deliver the deciding response
    handler.consortium().resume_service(&airline()).unwrap();
    assert!(matches!(
        respond(&handler, 2, index, FlightStatusCode::LateAirline).unwrap(),
        ResponseOutcome::Resolved { settled: 1, .. }
    ));
}

#[test]
fn resolved_flight_takes_no_new_insurance() {
    let handler = setup(1);
    register_oracles(&handler, 3);
    let (flight, _) = insured_flight(&handler);
    let (request, index) = handler
        .request_flight_status(&passenger(), &airline(), "WB1111", DEPARTURE)
        .unwrap();
    for i in 0..3 {
        respond(&handler, i, index, FlightStatusCode::LateAirline).unwrap();
    }
    let consortium = handler.consortium();
    let events = consortium.event_count();

    let latecomer = Principal::new("late-passenger");
    let err = handler
        .register_flight_insurance(&latecomer, &flight, UNIT)
        .unwrap_err();
    assert_eq!(err, ConsortiumError::AlreadyResolved(request));
    assert_eq!(consortium.consortium_escrow(), 0);
    assert_eq!(consortium.pending_insurance_count(), 0);
    assert_eq!(consortium.event_count(), events);
    assert_eq!(handler.flight(&flight).unwrap().insurances.len(), 1);
}

#[test]
fn rejected_consortium_call_leaves_handler_unchanged() {
    let handler = setup(1);
    let consortium = Arc::clone(handler.consortium());
    consortium
        .revoke_role(&admin(), &handler_principal(), Role::Delegate)
        .unwrap();

    let err = handler.register_oracle(&oracle(0), UNIT).unwrap_err();
    assert_eq!(err.guard(), Some(Guard::OnlyDelegate));
    assert_eq!(handler.oracle_count(), 0);
    assert_eq!(handler.collected_oracle_fees(), 0);

    let err = handler
        .register_flight(&airline(), "WB1111", DEPARTURE)
        .unwrap_err();
    assert_eq!(err.guard(), Some(Guard::OnlyDelegate));
    assert!(handler.flights().is_empty());

    let err = handler
        .request_flight_status(&passenger(), &airline(), "WB1111", DEPARTURE)
        .unwrap_err();
    assert_eq!(err.guard(), Some(Guard::OnlyDelegate));

    // Nothing half-registered blocks the retry
    consortium
        .add_delegate_role(&admin(), &handler_principal())
        .unwrap();
    register_oracles(&handler, 1);
    assert_eq!(handler.collected_oracle_fees(), UNIT);
    insured_flight(&handler);
    assert_eq!(handler.flights().len(), 1);
}

// ---------------------------------------------------------------------------
// Manual processing
// ---------------------------------------------------------------------------

#[test]
fn admin_processes_flight_status() {
    let handler = setup(1);
    let (_, key) = insured_flight(&handler);
    let (request, _) = handler
        .request_flight_status(&passenger(), &airline(), "WB1111", DEPARTURE)
        .unwrap();

    let err = handler
        .process_flight_status(
            &airline(),
            &airline(),
            "WB1111",
            DEPARTURE,
            FlightStatusCode::OnTime,
        )
        .unwrap_err();
    assert_eq!(err.guard(), Some(Guard::OnlyAdmin));

    let settled = handler
        .process_flight_status(
            &admin(),
            &airline(),
            "WB1111",
            DEPARTURE,
            FlightStatusCode::LateAirline,
        )
        .unwrap();
    assert_eq!(settled, 1);
    assert_eq!(handler.consortium().payments(&passenger()), UNIT + UNIT / 2);
    assert_eq!(
        handler.consortium().insurance(&key).unwrap().state,
        InsuranceState::SettledToInsuree
    );

    let err = handler
        .process_flight_status(&admin(), &airline(), "WB1111", DEPARTURE, FlightStatusCode::OnTime)
        .unwrap_err();
    assert_eq!(err, ConsortiumError::AlreadyResolved(request));
}

#[test]
fn resolving_an_unregistered_flight_settles_nothing() {
    let handler = setup(1);
    register_oracles(&handler, 3);
    let ghost = Principal::new("ghost-air");
    let (_, index) = handler
        .request_flight_status(&passenger(), &ghost, "GH1", DEPARTURE)
        .unwrap();
    let mut last = None;
    for i in 0..3 {
        last = Some(
            handler
                .submit_oracle_response(&oracle(i), index, &ghost, "GH1", DEPARTURE, 1)
                .unwrap(),
        );
    }
    assert_eq!(
        last,
        Some(ResponseOutcome::Resolved {
            status: FlightStatusCode::OnTime,
            count: 3,
            settled: 0
        })
    );
}

#[test]
fn manually_resolved_flight_takes_no_new_insurance() {
    let handler = setup(1);
    let (flight, _) = insured_flight(&handler);
    let (request, _) = handler
        .request_flight_status(&passenger(), &airline(), "WB1111", DEPARTURE)
        .unwrap();
    handler
        .process_flight_status(
            &admin(),
            &airline(),
            "WB1111",
            DEPARTURE,
            FlightStatusCode::OnTime,
        )
        .unwrap();
    assert_eq!(handler.flight(&flight).unwrap().status, FlightStatusCode::OnTime);

    let err = handler
        .register_flight_insurance(&Principal::new("late-passenger"), &flight, UNIT)
        .unwrap_err();
    assert_eq!(err, ConsortiumError::AlreadyResolved(request));
    assert_eq!(handler.consortium().consortium_escrow(), 0);
}
