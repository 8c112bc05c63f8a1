//! Integration tests for concurrent batch booking.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use boxoffice_booking::concurrency::{BookingState, RejectReason};
use boxoffice_booking::{
    BookingConfig, BookingCoordinator, BookingError, BookingRequest, InventoryRegistry,
    SeatResource,
};
use boxoffice_core::{Event, EventId, FlatPrice, Guest, Seat, SeatKey, SeatLayout};

const POETRY_SLAM: EventId = EventId(1);
const OPEN_MIC: EventId = EventId(2);

fn tiny_hall() -> Arc<InventoryRegistry> {
    let slam = Event::new(POETRY_SLAM, "Poetry Slam", "The Tiny Hall", "20:00").unwrap();
    let mic = Event::new(OPEN_MIC, "Open Mic", "The Tiny Hall", "22:00").unwrap();
    let registry = InventoryRegistry::builder(FlatPrice(1500))
        .event(slam, SeatLayout::rectangle(5, 3).unwrap())
        .unwrap()
        .event(mic, SeatLayout::rectangle(2, 2).unwrap())
        .unwrap()
        .build();
    Arc::new(registry)
}

fn coordinator(registry: &Arc<InventoryRegistry>, config: BookingConfig) -> BookingCoordinator {
    BookingCoordinator::new(Arc::clone(registry), config).unwrap()
}

fn seat(registry: &InventoryRegistry, row: char, column: u32) -> Arc<SeatResource> {
    registry.seat(POETRY_SLAM, row, column).unwrap()
}

fn booking(registry: &InventoryRegistry, seats: &[(char, u32)], who: &str) -> BookingRequest {
    let seats = seats
        .iter()
        .map(|&(row, column)| seat(registry, row, column))
        .collect();
    BookingRequest::new(seats, Guest::new(who).unwrap())
}

fn key(registry: &InventoryRegistry, row: char, column: u32) -> SeatKey {
    seat(registry, row, column).key()
}

async fn wait_until_unlocked(resource: &SeatResource) {
    for _ in 0..200 {
        if !resource.is_locked() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("seat {} stayed locked", resource.key());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposite_seat_order_does_not_deadlock() {
    let registry = tiny_hall();
    // The pause after each lock makes the two tasks interleave their
    // acquisitions, which deadlocks under request-order locking.
    let config = BookingConfig::default().with_hold_delay(Duration::from_millis(50));
    let c = coordinator(&registry, config);

    let mut batch = vec![
        booking(&registry, &[('A', 1), ('A', 2), ('B', 3)], "Queen Elizabeth"),
        booking(&registry, &[('A', 2), ('A', 1)], "Prince Charles"),
    ];

    let tickets = tokio::time::timeout(Duration::from_secs(5), c.book(&mut batch))
        .await
        .expect("batch deadlocked")
        .unwrap();

    assert!(batch[0].is_processed(), "booking 1 was never processed");
    assert!(batch[1].is_processed(), "booking 2 was never processed");
    assert_eq!(
        batch.iter().filter(|r| r.is_confirmed()).count(),
        1,
        "the two bookings share A1 and A2, exactly one may win"
    );

    let a1 = registry.ticket_for(&key(&registry, 'A', 1)).unwrap();
    let a2 = registry.ticket_for(&key(&registry, 'A', 2)).unwrap();
    assert_eq!(a1.owner(), a2.owner());

    let b3 = key(&registry, 'B', 3);
    if batch[0].is_confirmed() {
        assert_eq!(tickets.len(), 3);
        assert_eq!(a1.owner().name(), "Queen Elizabeth");
        assert!(!registry.is_available(&b3));
    } else {
        assert_eq!(tickets.len(), 2);
        assert_eq!(a1.owner().name(), "Prince Charles");
        assert!(registry.is_available(&b3));
        assert!(registry.ticket_for(&b3).is_none());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn non_conflicting_bookings_are_all_issued() {
    let registry = tiny_hall();
    let c = coordinator(&registry, BookingConfig::default());

    let mut batch = vec![
        booking(&registry, &[('A', 1), ('A', 2)], "Queen Elizabeth"),
        booking(&registry, &[('B', 3)], "Prince Charles"),
    ];
    let tickets = c.book(&mut batch).await.unwrap();

    assert!(batch[0].is_confirmed());
    assert!(batch[1].is_confirmed());
    assert_eq!(tickets.len(), 3);

    // Tickets come back grouped by request, in submission order.
    let owners: Vec<&str> = tickets.iter().map(|t| t.owner().name()).collect();
    assert_eq!(owners, ["Queen Elizabeth", "Queen Elizabeth", "Prince Charles"]);
    assert_eq!(batch[0].tickets().unwrap(), &tickets[..2]);
    assert_eq!(batch[1].tickets().unwrap(), &tickets[2..]);

    assert_eq!(registry.ticket_count(), 3);
    assert_eq!(registry.available_seats(POETRY_SLAM).len(), 15 - 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn already_sold_seat_is_rejected() {
    let registry = tiny_hall();
    let c = coordinator(&registry, BookingConfig::default());

    let mut first = vec![booking(&registry, &[('C', 2)], "Nick Fury")];
    let sold = c.book(&mut first).await.unwrap();
    assert_eq!(sold.len(), 1);

    let mut second = vec![booking(&registry, &[('C', 2)], "Tony Stark")];
    let tickets = c.book(&mut second).await.unwrap();

    assert!(tickets.is_empty());
    assert!(second[0].is_rejected());
    assert!(second[0].tickets().is_none());
    assert_eq!(
        second[0].rejection(),
        Some(&RejectReason::SeatTaken {
            seat: key(&registry, 'C', 2),
            holder: sold[0].id(),
        })
    );

    let still = registry.ticket_for(&key(&registry, 'C', 2)).unwrap();
    assert_eq!(still, sold[0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn partial_conflict_rolls_back_every_seat() {
    let registry = tiny_hall();
    let c = coordinator(&registry, BookingConfig::default());

    let mut first = vec![booking(&registry, &[('D', 2)], "Bruce Banner")];
    c.book(&mut first).await.unwrap();

    // D1 is issued before D2 conflicts, so D1 has to be revoked again.
    let mut second = vec![booking(&registry, &[('D', 1), ('D', 2), ('D', 3)], "Thor Odinson")];
    let tickets = c.book(&mut second).await.unwrap();

    assert!(tickets.is_empty());
    assert!(second[0].is_rejected());
    for column in [1, 3] {
        let k = key(&registry, 'D', column);
        assert!(registry.is_available(&k), "D{column} should be back on sale");
        assert!(registry.ticket_for(&k).is_none());
    }
    assert_eq!(registry.ticket_count(), 1);

    // The released seats can be booked right away.
    let mut third = vec![booking(&registry, &[('D', 3), ('D', 1)], "Natasha Romanoff")];
    assert_eq!(c.book(&mut third).await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn heavy_contention_sells_each_seat_once() {
    let registry = tiny_hall();
    let config = BookingConfig::default().with_hold_delay(Duration::from_millis(1));
    let c = coordinator(&registry, config);

    let patterns: [&[(char, u32)]; 4] = [
        &[('E', 1), ('E', 2), ('E', 3)],
        &[('E', 3), ('E', 2), ('E', 1)],
        &[('E', 2), ('E', 1)],
        &[('E', 3), ('E', 1), ('E', 2)],
    ];
    let mut batch: Vec<BookingRequest> = (0..40)
        .map(|i| booking(&registry, patterns[i % patterns.len()], &format!("Guest {i}")))
        .collect();

    let tickets = tokio::time::timeout(Duration::from_secs(10), c.book(&mut batch))
        .await
        .expect("batch deadlocked")
        .unwrap();

    assert!(batch.iter().all(BookingRequest::is_processed));
    let winners: Vec<&BookingRequest> = batch.iter().filter(|r| r.is_confirmed()).collect();
    assert!(!winners.is_empty());

    let keys: HashSet<SeatKey> = tickets.iter().map(|t| t.key()).collect();
    assert_eq!(keys.len(), tickets.len(), "a seat was sold twice");
    assert!(tickets.len() <= 3);

    for winner in winners {
        assert_eq!(winner.tickets().unwrap().len(), winner.seats().len());
    }
}

#[tokio::test]
async fn malformed_batch_is_refused_before_dispatch() {
    let registry = tiny_hall();
    let c = coordinator(&registry, BookingConfig::default());

    let mut batch = vec![
        booking(&registry, &[('A', 1)], "Steve Rogers"),
        BookingRequest::new(Vec::new(), Guest::new("Nobody").unwrap()),
    ];
    let err = c.book(&mut batch).await.unwrap_err();

    assert!(matches!(err, BookingError::InvalidRequest { index: 1, .. }));
    assert!(!err.is_fatal());
    assert_eq!(batch[0].state(), BookingState::Pending);
    assert_eq!(registry.ticket_count(), 0);
    assert!(registry.is_available(&key(&registry, 'A', 1)));
}

#[tokio::test]
async fn seats_from_another_inventory_are_refused() {
    let registry = tiny_hall();
    let elsewhere = tiny_hall();
    let c = coordinator(&registry, BookingConfig::default());

    let mut batch = vec![booking(&elsewhere, &[('A', 1)], "Steve Rogers")];
    let err = c.book(&mut batch).await.unwrap_err();
    assert!(err.to_string().contains("not part of this inventory"));
    assert!(!batch[0].is_processed());
}

#[tokio::test]
async fn resolved_requests_cannot_be_rebooked() {
    let registry = tiny_hall();
    let c = coordinator(&registry, BookingConfig::default());

    let mut batch = vec![booking(&registry, &[('B', 1)], "Tony Stark")];
    c.book(&mut batch).await.unwrap();
    assert!(batch[0].is_confirmed());

    let err = c.book(&mut batch).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidRequest { index: 0, .. }));
    assert_eq!(batch[0].tickets().map(<[_]>::len), Some(1));
}

#[tokio::test]
async fn empty_batch_issues_nothing() {
    let registry = tiny_hall();
    let c = coordinator(&registry, BookingConfig::default());
    let tickets = c.book(&mut []).await.unwrap();
    assert!(tickets.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lock_timeout_rejects_and_releases_partial_locks() {
    let registry = tiny_hall();
    let config = BookingConfig::default().with_lock_wait_timeout(Duration::from_millis(50));
    let c = coordinator(&registry, config);

    // A1 sorts before B1: the task takes A1, then waits on B1 until it times out.
    let a1 = seat(&registry, 'A', 1);
    let b1 = seat(&registry, 'B', 1);
    let blocker = b1.acquire().await;

    let mut batch = vec![booking(&registry, &[('B', 1), ('A', 1)], "Bruce Banner")];
    let tickets = c.book(&mut batch).await.unwrap();

    assert!(tickets.is_empty());
    assert_eq!(batch[0].rejection(), Some(&RejectReason::LockTimeout));
    assert!(!a1.is_locked(), "A1 must be released after the timeout");
    assert!(registry.is_available(&a1.key()));

    blocker.release();
    assert!(!b1.is_locked());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_batch_releases_held_locks() {
    let registry = tiny_hall();
    let c = coordinator(&registry, BookingConfig::default());

    let a1 = seat(&registry, 'A', 1);
    let b1 = seat(&registry, 'B', 1);
    let c3 = seat(&registry, 'C', 3);
    let blocker = b1.acquire().await;

    // The first request stalls on B1; the second finishes long before the drop.
    let mut batch = vec![
        booking(&registry, &[('A', 1), ('B', 1)], "Thor Odinson"),
        booking(&registry, &[('C', 3)], "Nick Fury"),
    ];
    let outcome = tokio::time::timeout(Duration::from_millis(100), c.book(&mut batch)).await;
    assert!(outcome.is_err(), "booking should still be waiting on B1");

    // Dropping the batch future stops the waiting task, which gives A1 back.
    wait_until_unlocked(&a1).await;
    wait_until_unlocked(&c3).await;
    assert!(!batch[0].is_processed());
    assert!(registry.ticket_for(&a1.key()).is_none());
    assert!(registry.is_available(&a1.key()));

    // The finished request kept its result, and its ticket is the live one.
    assert!(batch[1].is_confirmed());
    let kept = batch[1].tickets().unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(registry.ticket_for(&c3.key()).as_ref(), Some(&kept[0]));

    // No pending request holds a live ticket.
    for request in batch.iter().filter(|r| !r.is_processed()) {
        for resource in request.seats() {
            let holder = registry.ticket_for(&resource.key());
            assert!(holder.map_or(true, |t| t.owner() != request.requester()));
        }
    }
    assert_eq!(registry.ticket_count(), 1);

    blocker.release();
    let mut retry = vec![booking(&registry, &[('A', 1), ('B', 1)], "Thor Odinson")];
    assert_eq!(c.book(&mut retry).await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ticket_issued_outside_a_batch_is_a_seat_conflict() {
    let registry = tiny_hall();
    let c = coordinator(&registry, BookingConfig::default());
    let a1 = seat(&registry, 'A', 1);

    let guard = a1.acquire().await;
    let direct = guard.issue(&Guest::new("Nick Fury").unwrap()).unwrap();
    guard.release();
    assert!(!registry.is_available(&a1.key()));

    let mut batch = vec![booking(&registry, &[('A', 1)], "Tony Stark")];
    let tickets = c.book(&mut batch).await.unwrap();

    assert!(tickets.is_empty());
    assert_eq!(
        batch[0].rejection(),
        Some(&RejectReason::SeatTaken {
            seat: a1.key(),
            holder: direct.id(),
        })
    );
    assert_eq!(registry.ticket_for(&a1.key()), Some(direct));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_worker_fails_the_batch_after_the_rest_resolve() {
    let slam = Event::new(POETRY_SLAM, "Poetry Slam", "The Tiny Hall", "20:00").unwrap();
    let pricing = |_: &Event, seat: &Seat| -> u32 {
        if seat.row() == 'E' {
            panic!("no price list for row E");
        }
        1500
    };
    let registry = Arc::new(
        InventoryRegistry::builder(pricing)
            .event(slam, SeatLayout::rectangle(5, 3).unwrap())
            .unwrap()
            .build(),
    );
    let c = coordinator(&registry, BookingConfig::default());

    let mut batch = vec![
        booking(&registry, &[('E', 1)], "Bruce Banner"),
        booking(&registry, &[('A', 1)], "Steve Rogers"),
    ];
    let err = c.book(&mut batch).await.unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(err, BookingError::WorkerFailed(_)));
    assert_eq!(batch[0].rejection(), Some(&RejectReason::Aborted));
    assert!(batch[1].is_confirmed());

    let e1 = seat(&registry, 'E', 1);
    assert!(!e1.is_locked());
    assert!(registry.is_available(&e1.key()));
    assert!(registry.ticket_for(&e1.key()).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refunded_seat_can_be_booked_again() {
    let registry = tiny_hall();
    let c = coordinator(&registry, BookingConfig::default());

    let mut first = vec![booking(&registry, &[('C', 1)], "Natasha Romanoff")];
    let sold = c.book(&mut first).await.unwrap();
    registry.refund(&sold[0]).await.unwrap();

    let mut second = vec![booking(&registry, &[('C', 1)], "Nick Fury")];
    let tickets = c.book(&mut second).await.unwrap();
    assert_eq!(tickets.len(), 1);
    assert_ne!(tickets[0].id(), sold[0].id());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retired_seat_rejects_the_whole_request() {
    let registry = tiny_hall();
    let c = coordinator(&registry, BookingConfig::default());
    registry.retire(&key(&registry, 'E', 3)).await.unwrap();

    let mut batch = vec![booking(&registry, &[('E', 2), ('E', 3)], "Steve Rogers")];
    let tickets = c.book(&mut batch).await.unwrap();

    assert!(tickets.is_empty());
    assert_eq!(
        batch[0].rejection(),
        Some(&RejectReason::SeatRetired {
            seat: key(&registry, 'E', 3)
        })
    );
    assert!(registry.is_available(&key(&registry, 'E', 2)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worker_cap_still_resolves_everything() {
    let registry = tiny_hall();
    let config = BookingConfig::default()
        .with_max_in_flight(1)
        .with_hold_delay(Duration::from_millis(1));
    let c = coordinator(&registry, config);

    let mut batch = vec![
        booking(&registry, &[('A', 1), ('A', 2)], "Nick Fury"),
        booking(&registry, &[('A', 2), ('A', 3)], "Tony Stark"),
        booking(&registry, &[('B', 1)], "Steve Rogers"),
    ];
    c.book(&mut batch).await.unwrap();

    assert!(batch.iter().all(BookingRequest::is_processed));
    assert!(batch[2].is_confirmed());
    // A2 is shared, so at most one of the first two can win.
    assert!(!(batch[0].is_confirmed() && batch[1].is_confirmed()));
}

/// A request for one of the two events: event selector plus seat indexes.
fn arb_batch() -> impl Strategy<Value = Vec<(bool, Vec<usize>)>> {
    prop::collection::vec(
        (any::<bool>(), prop::collection::vec(0usize..15, 1..5)),
        1..12,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn random_batches_keep_inventory_consistent(shape in arb_batch()) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let registry = tiny_hall();
            let c = coordinator(&registry, BookingConfig::default());

            let mut batch: Vec<BookingRequest> = shape
                .iter()
                .enumerate()
                .map(|(i, (open_mic, picks))| {
                    let event = if *open_mic { OPEN_MIC } else { POETRY_SLAM };
                    let pool: Vec<Arc<SeatResource>> = registry
                        .resources()
                        .filter(|r| r.key().event == event)
                        .cloned()
                        .collect();
                    let mut seen = HashSet::new();
                    let seats = picks
                        .iter()
                        .map(|p| Arc::clone(&pool[p % pool.len()]))
                        .filter(|r| seen.insert(r.key()))
                        .collect();
                    BookingRequest::new(seats, Guest::new(format!("Guest {i}")).unwrap())
                })
                .collect();

            let tickets = tokio::time::timeout(Duration::from_secs(10), c.book(&mut batch))
                .await
                .expect("batch deadlocked")
                .unwrap();

            // No seat sold twice.
            let keys: HashSet<SeatKey> = tickets.iter().map(|t| t.key()).collect();
            assert_eq!(keys.len(), tickets.len());
            assert_eq!(registry.ticket_count(), tickets.len());

            // Every seat is either on sale or ticketed.
            let total = registry.resources().count();
            assert_eq!(registry.available_count() + registry.ticket_count(), total);

            for request in &batch {
                assert!(request.is_processed());
                match request.tickets() {
                    Some(issued) => {
                        assert_eq!(issued.len(), request.seats().len());
                        for ticket in issued {
                            assert_eq!(registry.ticket_for(&ticket.key()).as_ref(), Some(ticket));
                        }
                    }
                    None => {
                        for resource in request.seats() {
                            let holder = registry.ticket_for(&resource.key());
                            assert!(holder.map_or(true, |t| t.owner() != request.requester()));
                        }
                    }
                }
            }
        });
    }
}
