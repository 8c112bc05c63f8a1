//! Contention drill for the booking coordinator.
//!
//! Builds an auditorium with a few events, fires one batch of random,
//! overlapping multi-seat requests at it, and logs what was sold. Reads the
//! coordinator configuration from `BOXOFFICE_*` environment variables and the
//! log filter from `RUST_LOG` (default: `info`).

use std::collections::HashSet;
use std::sync::Arc;

use clap::Parser;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use boxoffice_booking::{BookingConfig, BookingCoordinator, BookingRequest, InventoryRegistry};
use boxoffice_core::{Event, EventId, Guest, RowTierPrice, SeatLayout, Ticket};

const VENUE: &str = "Kino am See";

const TITLES: [&str; 7] = [
    "The Avengers",
    "Age of Ultron",
    "Captain America - Civil War",
    "Infinity War",
    "Captain Marvel",
    "Endgame",
    "Doctor Strange in the Multiverse of Madness",
];

const SHOW_TIMES: [&str; 4] = ["09:00", "12:00", "16:30", "19:30"];

const GUESTS: [&str; 6] = [
    "Nick Fury",
    "Tony Stark",
    "Steve Rogers",
    "Bruce Banner",
    "Natasha Romanoff",
    "Thor Odinson",
];

/// Fire a batch of overlapping seat bookings at a simulated auditorium.
#[derive(Parser)]
#[command(name = "boxoffice-drill", about = "Seat booking contention drill")]
struct Cli {
    /// Rows in the auditorium (1-26).
    #[arg(long, default_value_t = 5)]
    rows: u32,

    /// Seats in every row.
    #[arg(long, default_value_t = 10)]
    seats_per_row: u32,

    /// Number of events on sale.
    #[arg(long, default_value_t = 2)]
    events: u32,

    /// Booking requests in the batch.
    #[arg(long, default_value_t = 40)]
    requests: usize,

    /// Upper bound on seats per request.
    #[arg(long, default_value_t = 4)]
    max_seats: usize,

    /// RNG seed for a reproducible batch.
    #[arg(long)]
    seed: Option<u64>,

    /// Print the sold tickets as JSON on stdout.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct DrillReport<'a> {
    requests: usize,
    confirmed: usize,
    rejected: usize,
    tickets: &'a [Ticket],
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    if cli.events == 0 || cli.max_seats == 0 {
        return Err("--events and --max-seats must be at least 1".into());
    }

    let config = BookingConfig::from_env()?;
    tracing::info!(?config, "starting drill");

    let registry = Arc::new(build_auditorium(&cli)?);
    let coordinator = BookingCoordinator::new(Arc::clone(&registry), config)?;

    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut requests = random_requests(&registry, &cli, &mut rng)?;

    let tickets = coordinator.book(&mut requests).await?;

    let distinct: HashSet<_> = tickets.iter().map(|t| t.key()).collect();
    if distinct.len() != tickets.len() {
        return Err(format!(
            "double booking detected: {} tickets for {} seats",
            tickets.len(),
            distinct.len()
        )
        .into());
    }

    for request in requests.iter().filter(|r| r.is_rejected()) {
        if let Some(reason) = request.rejection() {
            tracing::debug!(request = %request, %reason, "rejected");
        }
    }

    for event in registry.events() {
        let sold = registry.registered_tickets(event.id);
        let revenue: u64 = sold.iter().map(|t| u64::from(t.price())).sum();
        tracing::info!(
            event = %event,
            sold = sold.len(),
            available = registry.available_seats(event.id).len(),
            revenue,
            "event summary"
        );
    }

    let confirmed = requests.iter().filter(|r| r.is_confirmed()).count();
    tracing::info!(
        requests = requests.len(),
        confirmed,
        rejected = requests.len() - confirmed,
        tickets = tickets.len(),
        "drill finished"
    );

    if cli.json {
        let report = DrillReport {
            requests: requests.len(),
            confirmed,
            rejected: requests.len() - confirmed,
            tickets: &tickets,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn build_auditorium(cli: &Cli) -> Result<InventoryRegistry, Box<dyn std::error::Error>> {
    let seats = SeatLayout::rectangle(cli.rows, cli.seats_per_row)?;
    let pricing = RowTierPrice {
        premium_rows: vec!['A', 'B', 'C'],
        premium: 1850,
        standard: 925,
    };

    let mut builder = InventoryRegistry::builder(pricing);
    for n in 0..cli.events {
        let title = TITLES[n as usize % TITLES.len()];
        let time = SHOW_TIMES[n as usize % SHOW_TIMES.len()];
        let event = Event::new(EventId(n + 1), title, VENUE, time)?;
        builder = builder.event(event, seats.iter().copied())?;
    }
    Ok(builder.build())
}

fn random_requests(
    registry: &InventoryRegistry,
    cli: &Cli,
    rng: &mut StdRng,
) -> Result<Vec<BookingRequest>, Box<dyn std::error::Error>> {
    let events: Vec<EventId> = registry.events().map(|e| e.id).collect();
    let mut requests = Vec::with_capacity(cli.requests);

    for _ in 0..cli.requests {
        let Some(&event) = events.choose(rng) else {
            break;
        };
        let pool: Vec<_> = registry
            .resources()
            .filter(|r| r.key().event == event)
            .cloned()
            .collect();
        let count = rng.gen_range(1..=cli.max_seats.min(pool.len()));
        let seats = pool.choose_multiple(rng, count).cloned().collect();

        let guest = GUESTS.choose(rng).copied().unwrap_or(GUESTS[0]);
        requests.push(BookingRequest::new(seats, Guest::new(guest)?));
    }
    Ok(requests)
}
