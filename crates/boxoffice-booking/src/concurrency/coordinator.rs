//! Concurrent, deadlock-free batch booking.
//!
//! [`BookingCoordinator::book`] validates a batch, then spawns one tokio task
//! per request. Each task locks its seats in ascending [`SeatKey`] order,
//! which is the same global order for every task, so no two tasks can wait
//! on each other in a cycle. With all locks held it issues one ticket per
//! seat; the first conflict revokes everything issued so far and rejects the
//! request. Locks are released in reverse acquisition order on every path,
//! including timeout and cancellation.
//!
//! Tasks report back over a channel as they finish. A confirmed task keeps
//! its seat locks until the coordinator has recorded the confirmation on the
//! caller's request; if the batch is dropped first, the task revokes its own
//! tickets before letting go. A request is therefore either confirmed with
//! its tickets or holds none.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};

use boxoffice_core::{Guest, SeatKey, Ticket};

use super::registry::InventoryRegistry;
use super::request::{BookingRequest, RejectReason, RequestId};
use super::resource::{IssueError, SeatGuard, SeatResource};
use crate::config::BookingConfig;
use crate::error::BookingError;

/// Resolves batches of [`BookingRequest`]s against one inventory.
pub struct BookingCoordinator {
    registry: Arc<InventoryRegistry>,
    config: BookingConfig,
    workers: Arc<Semaphore>,
}

/// What a booking task decided.
#[derive(Debug)]
enum TaskOutcome {
    Confirmed(Vec<Ticket>),
    Rejected(RejectReason),
}

/// A finished task's result for request `index` of the batch.
struct Report {
    index: usize,
    outcome: Result<TaskOutcome, BookingError>,
    /// Present for confirmations; the task holds its locks until answered.
    ack: Option<oneshot::Sender<()>>,
}

/// Everything a booking task needs, detached from the caller's request.
struct BookingPlan {
    request: RequestId,
    requester: Guest,
    /// Seats in request order; tickets are issued in this order.
    requested: Vec<SeatKey>,
    /// Seats in global lock order.
    order: Vec<Arc<SeatResource>>,
}

/// Seat locks held by one task, sorted by key.
///
/// Releases in reverse acquisition order when dropped, so a task that is
/// timed out or abandoned mid-acquisition gives back exactly what it holds.
struct HeldSeats {
    guards: Vec<SeatGuard>,
}

impl BookingCoordinator {
    pub fn new(
        registry: Arc<InventoryRegistry>,
        config: BookingConfig,
    ) -> Result<Self, BookingError> {
        config.validate()?;
        let workers = Arc::new(Semaphore::new(config.max_in_flight));
        Ok(BookingCoordinator {
            registry,
            config,
            workers,
        })
    }

    pub fn registry(&self) -> &Arc<InventoryRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &BookingConfig {
        &self.config
    }

    /// Books every request in the batch concurrently.
    ///
    /// Returns once all requests are resolved, with the tickets of every
    /// confirmed request in the order the requests were supplied. Seat
    /// conflicts only show up as rejected requests. The call itself fails
    /// up front on malformed input (nothing is dispatched) and after the
    /// batch on a fatal error such as a broken seat invariant.
    ///
    /// Dropping the returned future abandons the batch: requests already
    /// confirmed keep their tickets, every other request stays pending and
    /// holds none.
    pub async fn book(&self, requests: &mut [BookingRequest]) -> Result<Vec<Ticket>, BookingError> {
        let plans = requests
            .iter()
            .enumerate()
            .map(|(index, request)| self.plan(index, request))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(requests = plans.len(), "dispatching booking batch");

        let (reports, mut inbox) = mpsc::unbounded_channel();
        let handles: Vec<_> = plans
            .into_iter()
            .enumerate()
            .map(|(index, plan)| {
                tokio::spawn(run_booking(
                    index,
                    plan,
                    self.config.clone(),
                    Arc::clone(&self.workers),
                    reports.clone(),
                ))
            })
            .collect();
        drop(reports);

        let mut fatal: Option<BookingError> = None;

        // Ends once every task has finished and dropped its sender.
        while let Some(report) = inbox.recv().await {
            let request = &mut requests[report.index];
            match report.outcome {
                Ok(TaskOutcome::Confirmed(tickets)) => request.confirm(tickets)?,
                Ok(TaskOutcome::Rejected(reason)) => request.reject(reason)?,
                Err(err) => {
                    tracing::error!(request = %request.id(), error = %err, "booking task failed");
                    fatal.get_or_insert(err);
                    request.reject(RejectReason::Aborted)?;
                }
            }
            if let Some(ack) = report.ack {
                // The task is parked on the other end until this arrives.
                let _ = ack.send(());
            }
        }

        // Tasks that never reported panicked or were cancelled by the runtime.
        for (request, handle) in requests.iter_mut().zip(handles) {
            let Err(join) = handle.await else {
                continue;
            };
            let reason = if join.is_panic() {
                tracing::error!(request = %request.id(), error = %join, "booking task panicked");
                fatal.get_or_insert(BookingError::WorkerFailed(join.to_string()));
                RejectReason::Aborted
            } else {
                RejectReason::Cancelled
            };
            if !request.is_processed() {
                request.reject(reason)?;
            }
        }

        let issued: Vec<Ticket> = requests
            .iter()
            .filter_map(|request| request.tickets())
            .flatten()
            .cloned()
            .collect();
        let confirmed = requests.iter().filter(|r| r.is_confirmed()).count();

        tracing::info!(
            requests = requests.len(),
            confirmed,
            rejected = requests.len() - confirmed,
            tickets = issued.len(),
            "booking batch resolved"
        );

        match fatal {
            Some(err) => Err(err),
            None => Ok(issued),
        }
    }

    /// Validates one request and snapshots what its task needs.
    fn plan(&self, index: usize, request: &BookingRequest) -> Result<BookingPlan, BookingError> {
        let invalid = |reason: String| BookingError::InvalidRequest { index, reason };

        if request.is_processed() {
            return Err(invalid(format!("already {:?}", request.state())));
        }
        if request.seats().is_empty() {
            return Err(invalid("no seats requested".to_string()));
        }
        if let Some(foreign) = request.seats().iter().find(|s| !self.registry.contains(s)) {
            return Err(invalid(format!(
                "seat {} is not part of this inventory",
                foreign.key()
            )));
        }

        let order = request.acquisition_order();
        if let Some(pair) = order.windows(2).find(|pair| pair[0].key() == pair[1].key()) {
            return Err(invalid(format!(
                "seat {} requested more than once",
                pair[0].key()
            )));
        }

        Ok(BookingPlan {
            request: request.id(),
            requester: request.requester().clone(),
            requested: request.seats().iter().map(|s| s.key()).collect(),
            order,
        })
    }
}

async fn run_booking(
    index: usize,
    plan: BookingPlan,
    config: BookingConfig,
    workers: Arc<Semaphore>,
    reports: mpsc::UnboundedSender<Report>,
) {
    let report = |outcome| Report {
        index,
        outcome,
        ack: None,
    };

    // Stop waiting as soon as nobody is left to hear the result.
    let locked = tokio::select! {
        _ = reports.closed() => {
            tracing::debug!(request = %plan.request, "batch dropped while waiting for seat locks");
            return;
        }
        locked = lock_seats(&plan, &config, workers) => locked,
    };

    let (_slot, held) = match locked {
        Ok(Some(locked)) => locked,
        Ok(None) => {
            let _ = reports.send(report(Ok(TaskOutcome::Rejected(RejectReason::LockTimeout))));
            return;
        }
        Err(err) => {
            let _ = reports.send(report(Err(err)));
            return;
        }
    };

    match issue_all(&plan, &held) {
        Ok(TaskOutcome::Confirmed(tickets)) => {
            let (ack, acked) = oneshot::channel();
            let confirmation = Report {
                index,
                outcome: Ok(TaskOutcome::Confirmed(tickets.clone())),
                ack: Some(ack),
            };
            let recorded = reports.send(confirmation).is_ok() && acked.await.is_ok();
            if !recorded {
                match rollback(&held, &tickets) {
                    Ok(()) => tracing::info!(
                        request = %plan.request,
                        reverted = tickets.len(),
                        "batch dropped before confirmation was recorded"
                    ),
                    Err(err) => tracing::error!(
                        request = %plan.request,
                        error = %err,
                        "could not revert unrecorded confirmation"
                    ),
                }
            }
        }
        outcome => {
            let _ = reports.send(report(outcome));
        }
    }
    held.release();
}

/// Takes a worker slot, then every seat lock, within the configured bound.
/// `None` means the bound ran out.
async fn lock_seats(
    plan: &BookingPlan,
    config: &BookingConfig,
    workers: Arc<Semaphore>,
) -> Result<Option<(OwnedSemaphorePermit, HeldSeats)>, BookingError> {
    let slot = workers
        .acquire_owned()
        .await
        .map_err(|e| BookingError::WorkerFailed(e.to_string()))?;

    let acquisition = acquire_in_order(&plan.order, config.hold_delay);
    let held = match config.lock_wait_timeout {
        Some(limit) => match tokio::time::timeout(limit, acquisition).await {
            Ok(held) => held,
            Err(_) => {
                tracing::warn!(
                    request = %plan.request,
                    timeout = ?limit,
                    "timed out waiting for seat locks"
                );
                return Ok(None);
            }
        },
        None => acquisition.await,
    };
    Ok(Some((slot, held)))
}

/// Locks every seat in `order`, one at a time.
async fn acquire_in_order(order: &[Arc<SeatResource>], hold_delay: Duration) -> HeldSeats {
    let mut held = HeldSeats {
        guards: Vec::with_capacity(order.len()),
    };
    for resource in order {
        held.guards.push(resource.acquire().await);
        if !hold_delay.is_zero() {
            tokio::time::sleep(hold_delay).await;
        }
    }
    held
}

/// Issues one ticket per requested seat, or none at all.
fn issue_all(plan: &BookingPlan, held: &HeldSeats) -> Result<TaskOutcome, BookingError> {
    let mut issued: Vec<Ticket> = Vec::with_capacity(plan.requested.len());
    let mut rejection = None;

    for seat in &plan.requested {
        let Some(guard) = held.get(seat) else {
            rollback(held, &issued)?;
            return Err(BookingError::InvariantViolation {
                seat: *seat,
                reason: "requested seat is not locked".to_string(),
            });
        };

        match guard.issue(&plan.requester) {
            Ok(ticket) => issued.push(ticket),
            Err(IssueError::Conflict { seat, holder }) => {
                rejection = Some(RejectReason::SeatTaken { seat, holder });
                break;
            }
            Err(IssueError::Retired { seat }) => {
                rejection = Some(RejectReason::SeatRetired { seat });
                break;
            }
            Err(IssueError::Inconsistent { seat, reason }) => {
                rollback(held, &issued)?;
                return Err(BookingError::InvariantViolation {
                    seat,
                    reason: reason.to_string(),
                });
            }
        }
    }

    match rejection {
        Some(reason) => {
            rollback(held, &issued)?;
            tracing::info!(
                request = %plan.request,
                requester = %plan.requester,
                reverted = issued.len(),
                %reason,
                "booking rejected"
            );
            Ok(TaskOutcome::Rejected(reason))
        }
        None => {
            tracing::info!(
                request = %plan.request,
                requester = %plan.requester,
                tickets = issued.len(),
                "booking confirmed"
            );
            Ok(TaskOutcome::Confirmed(issued))
        }
    }
}

/// Revokes tickets issued in this attempt, newest first.
fn rollback(held: &HeldSeats, issued: &[Ticket]) -> Result<(), BookingError> {
    for ticket in issued.iter().rev() {
        let seat = ticket.key();
        let guard = held
            .get(&seat)
            .ok_or_else(|| BookingError::InvariantViolation {
                seat,
                reason: "issued a ticket for a seat that is not locked".to_string(),
            })?;
        guard
            .revoke(ticket)
            .map_err(|e| BookingError::InvariantViolation {
                seat,
                reason: format!("rollback failed: {e}"),
            })?;
    }
    Ok(())
}

impl HeldSeats {
    fn get(&self, seat: &SeatKey) -> Option<&SeatGuard> {
        self.guards
            .binary_search_by_key(seat, SeatGuard::key)
            .ok()
            .map(|i| &self.guards[i])
    }

    fn release(mut self) {
        self.release_in_reverse();
    }

    fn release_in_reverse(&mut self) {
        while let Some(guard) = self.guards.pop() {
            guard.release();
        }
    }
}

impl Drop for HeldSeats {
    fn drop(&mut self) {
        self.release_in_reverse();
    }
}
