//! FlightSure walkthrough
//!
//! Runs a whole consortium lifecycle in one process:
//!
//! 1. **Bootstrap**: four founding airlines join and pay the membership fee
//! 2. **Admission**: a fifth airline is voted in by the founders
//! 3. **Oracles**: twenty oracles register and receive their indices
//! 4. **Insurance**: passengers insure two flights
//! 5. **Consensus**: oracles report; one flight is late by the airline's
//!    fault, the other on time
//! 6. **Payout**: insured passengers withdraw deposit plus premium
//! 7. **Governance**: a majority suspends and then resumes the service
//!
//! Set `FLIGHTSURE_CONFIG` to a JSON file to override the defaults.

use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use flightsure_ledger::{ConsortiumAlliance, InMemoryWallets};
use flightsure_oracle::{FlightInsuranceHandler, ResponseOutcome};
use flightsure_types::{ApprovalOutcome, ConsortiumConfig, FlightStatusCode, Principal, Units, UNIT};
use tracing::debug;

const ORACLES: usize = 20;
const DEPARTURE: u64 = 1_767_225_600;

fn header(title: &str) {
    println!();
    println!("{}", "═".repeat(72).cyan());
    println!("  {}", title.cyan().bold());
    println!("{}", "═".repeat(72).cyan());
}

fn units(amount: Units) -> String {
    format!("{}.{:02}", amount / UNIT, (amount % UNIT) * 100 / UNIT)
}

fn load_config() -> anyhow::Result<ConsortiumConfig> {
    match std::env::var("FLIGHTSURE_CONFIG") {
        Ok(path) => ConsortiumConfig::from_path(&path)
            .with_context(|| format!("loading configuration from {}", path)),
        Err(_) => Ok(ConsortiumConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .init();

    println!();
    println!("{}", "╔══════════════════════════════════════════════════════════════╗".cyan());
    println!("{}", "║    FlightSure: Flight Delay Insurance Consortium            ║".cyan().bold());
    println!("{}", "╚══════════════════════════════════════════════════════════════╝".cyan());

    let config = load_config()?;
    let admin = Principal::new("consortium-admin");
    let consortium = Arc::new(ConsortiumAlliance::new(admin.clone(), config.clone())?);

    let mut observer = consortium.subscribe();
    tokio::spawn(async move {
        while let Ok(record) = observer.recv().await {
            debug!(sequence = record.sequence, event = record.event.name(), "Observed");
        }
    });

    // ── Part 1: Bootstrap ──────────────────────────────────────────
    header("Part 1: Founding airlines");

    let founders: Vec<(Principal, &str)> = vec![
        (Principal::new("airline-wb"), "Wright Brothers"),
        (Principal::new("airline-kh"), "Kitty Hawk Air"),
        (Principal::new("airline-dl"), "Dayton Lines"),
        (Principal::new("airline-ka"), "Kill Devil Airways"),
    ];
    for (airline, title) in &founders {
        consortium.create_affiliate(&admin, airline, title)?;
        let approved = consortium.deposit_membership(airline, config.membership_fee)?;
        println!(
            "  {} {} funded ({}), voting: {}",
            "├".dimmed(),
            title.bold(),
            units(config.membership_fee),
            if approved { "yes".green() } else { "no".red() }
        );
    }
    println!(
        "  {} Consortium balance: {}",
        "└".dimmed(),
        units(consortium.consortium_balance()).green().bold()
    );

    // ── Part 2: Admission vote ─────────────────────────────────────
    header("Part 2: Admitting a fifth airline");

    let newcomer = Principal::new("airline-oh");
    consortium.create_affiliate(&admin, &newcomer, "Ohio Airways")?;
    let approved = consortium.deposit_membership(&newcomer, config.membership_fee)?;
    println!("  {} Ohio Airways funded, voting: {}", "├".dimmed(), approved);
    for (voter, title) in &founders {
        match consortium.approve_affiliate(voter, &newcomer)? {
            ApprovalOutcome::Pending { approvals, required } => {
                println!("  {} {} approves: {}/{}", "├".dimmed(), title, approvals, required)
            }
            ApprovalOutcome::Approved => {
                println!("  {} {} approves: {}", "└".dimmed(), title, "admitted".green().bold());
                break;
            }
        }
    }

    // ── Part 3: Oracles ────────────────────────────────────────────
    header("Part 3: Oracle registration");

    let handler_principal = Principal::new("flight-handler");
    consortium.add_delegate_role(&admin, &handler_principal)?;
    let handler =
        FlightInsuranceHandler::new(handler_principal, Arc::clone(&consortium), config.clone())?;

    let oracles: Vec<Principal> = (0..ORACLES)
        .map(|i| Principal::new(format!("oracle-{:02}", i)))
        .collect();
    for oracle in &oracles {
        let indexes = handler.register_oracle(oracle, config.oracle_fee)?;
        debug!(oracle = %oracle, indexes = ?indexes, "Indices assigned");
    }
    println!(
        "  {} {} oracles registered, fees collected: {}",
        "└".dimmed(),
        handler.oracle_count(),
        units(handler.collected_oracle_fees())
    );

    // ── Part 4: Insurance ──────────────────────────────────────────
    header("Part 4: Flights and insurance");

    let wright = &founders[0].0;
    let kitty = &founders[1].0;
    let delayed = ("WB1111", wright, FlightStatusCode::LateAirline);
    let punctual = ("KH2222", kitty, FlightStatusCode::OnTime);

    let alice = Principal::new("passenger-alice");
    let bob = Principal::new("passenger-bob");
    for ((code, airline, _), passenger) in [(delayed, &alice), (punctual, &bob)] {
        let flight = handler.register_flight(airline, code, DEPARTURE)?;
        let key = handler.register_flight_insurance(passenger, &flight, UNIT)?;
        println!(
            "  {} {} insures {} (key {})",
            "├".dimmed(),
            passenger,
            code.bold(),
            key.short().dimmed()
        );
    }
    println!(
        "  {} Escrow: {}  Balance: {}",
        "└".dimmed(),
        units(consortium.consortium_escrow()).yellow(),
        units(consortium.consortium_balance()).green()
    );

    // ── Part 5: Consensus ──────────────────────────────────────────
    header("Part 5: Oracle consensus");

    for (code, airline, truth) in [delayed, punctual] {
        let (_, index) = handler.request_flight_status(&alice, airline, code, DEPARTURE)?;
        let responders: Vec<&Principal> = oracles
            .iter()
            .filter(|o| {
                handler
                    .get_my_indexes(o)
                    .map(|owned| owned.contains(&index))
                    .unwrap_or(false)
            })
            .collect();
        println!(
            "  {} {} targets index {} ({} oracles eligible)",
            "├".dimmed(),
            code.bold(),
            index,
            responders.len()
        );

        let mut resolved = false;
        for oracle in responders {
            let outcome = handler.submit_oracle_response(
                oracle,
                index,
                airline,
                code,
                DEPARTURE,
                truth.code(),
            )?;
            if let ResponseOutcome::Resolved { status, count, settled } = outcome {
                println!(
                    "  {} resolved {} after {} reports, {} insurance settled",
                    "├".dimmed(),
                    status.to_string().green().bold(),
                    count,
                    settled
                );
                resolved = true;
            }
        }
        if !resolved {
            let settled = handler.process_flight_status(&admin, airline, code, DEPARTURE, truth)?;
            println!(
                "  {} too few oracles; admin resolved {} ({} settled)",
                "├".dimmed(),
                truth.to_string().yellow(),
                settled
            );
        }
    }

    // ── Part 6: Payout ─────────────────────────────────────────────
    header("Part 6: Withdrawals");

    let wallets = InMemoryWallets::new();
    for passenger in [&alice, &bob] {
        match consortium.withdraw_payments(passenger, &wallets) {
            Ok(amount) => println!(
                "  {} {} withdrew {}",
                "├".dimmed(),
                passenger,
                units(amount).green().bold()
            ),
            Err(e) => println!("  {} {}: {}", "├".dimmed(), passenger, e.to_string().dimmed()),
        }
    }
    println!(
        "  {} custody {} = balance {} + escrow {}: {}",
        "└".dimmed(),
        units(consortium.custody()),
        units(consortium.consortium_balance()),
        units(consortium.consortium_escrow()),
        if consortium.custody_balanced() { "OK".green() } else { "BROKEN".red() }
    );

    // ── Part 7: Governance ─────────────────────────────────────────
    header("Part 7: Suspend and resume");

    for (airline, title) in founders.iter().take(3) {
        let operational = consortium.suspend_service(airline)?;
        println!("  {} {} votes suspend, operational: {}", "├".dimmed(), title, operational);
    }
    let (first, title) = &founders[0];
    let operational = consortium.resume_service(first)?;
    println!("  {} {} resumes, operational: {}", "└".dimmed(), title, operational);

    println!();
    println!(
        "  {} events recorded",
        consortium.event_count().to_string().bold()
    );
    Ok(())
}
