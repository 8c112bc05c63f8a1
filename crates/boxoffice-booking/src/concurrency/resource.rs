//! Lockable seat inventory.
//!
//! A [`SeatResource`] is one seat at one event with its own exclusion lock.
//! [`SeatResource::acquire`] suspends until the lock is free and hands back a
//! [`SeatGuard`]; every seat mutation (issuing, revoking, retiring) is a
//! method on the guard, so none of them can run without the lock. A seat is
//! in exactly one of three places at any time the lock is free: the
//! available pool, the ticket map, or the retired set. Dropping the guard
//! releases the lock exactly once.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, OwnedMutexGuard};

use boxoffice_core::{Event, Guest, Seat, SeatKey, Ticket, TicketId};

use super::registry::Ledger;

/// One bookable seat at one event.
pub struct SeatResource {
    key: SeatKey,
    event: Arc<Event>,
    lock: Arc<Mutex<()>>,
    ledger: Arc<Ledger>,
}

/// Why a ticket could not be issued for a locked seat.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IssueError {
    /// Someone else already holds a ticket for this seat.
    #[error("seat {seat} already sold (ticket {holder})")]
    Conflict { seat: SeatKey, holder: TicketId },

    /// The seat was permanently taken off sale.
    #[error("seat {seat} is retired")]
    Retired { seat: SeatKey },

    /// The ledger holds a state no lock holder can produce.
    #[error("seat {seat} is inconsistent: {reason}")]
    Inconsistent { seat: SeatKey, reason: &'static str },
}

/// Errors from unregistering a ticket.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RevokeError {
    /// The ticket belongs to a different seat than the one locked.
    #[error("ticket {ticket} is for seat {ticket_seat}, not {seat}")]
    WrongSeat {
        ticket: TicketId,
        ticket_seat: SeatKey,
        seat: SeatKey,
    },

    /// The seat has no ticket, or a different one.
    #[error("ticket {ticket} is not registered for seat {seat}")]
    NotRegistered { ticket: TicketId, seat: SeatKey },
}

/// Errors from taking a seat off sale.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetireError {
    /// A live ticket still holds the seat; refund it first.
    #[error("seat {seat} has live ticket {holder} and cannot be retired")]
    Sold { seat: SeatKey, holder: TicketId },
}

impl SeatResource {
    pub(crate) fn new(event: Arc<Event>, seat: Seat, ledger: Arc<Ledger>) -> Self {
        SeatResource {
            key: SeatKey::new(event.id, seat),
            event,
            lock: Arc::new(Mutex::new(())),
            ledger,
        }
    }

    /// The canonical lock-order key.
    pub fn key(&self) -> SeatKey {
        self.key
    }

    pub fn event(&self) -> &Arc<Event> {
        &self.event
    }

    pub fn seat(&self) -> Seat {
        self.key.seat
    }

    /// Whether some task currently holds this seat's lock.
    pub fn is_locked(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Waits for exclusive ownership of the seat.
    ///
    /// The lock is not re-entrant: acquiring a seat the caller already holds
    /// never completes.
    pub async fn acquire(self: &Arc<Self>) -> SeatGuard {
        let permit = Arc::clone(&self.lock).lock_owned().await;
        tracing::trace!(seat = %self.key, "seat lock acquired");
        SeatGuard {
            resource: Arc::clone(self),
            _permit: permit,
        }
    }

    /// Takes the lock only if it is free right now.
    pub fn try_acquire(self: &Arc<Self>) -> Option<SeatGuard> {
        let permit = Arc::clone(&self.lock).try_lock_owned().ok()?;
        Some(SeatGuard {
            resource: Arc::clone(self),
            _permit: permit,
        })
    }
}

impl fmt::Debug for SeatResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeatResource")
            .field("key", &self.key)
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl fmt::Display for SeatResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.event.name, self.key.seat)
    }
}

/// Exclusive ownership of one seat. Releases the lock when dropped.
pub struct SeatGuard {
    resource: Arc<SeatResource>,
    _permit: OwnedMutexGuard<()>,
}

impl SeatGuard {
    pub fn key(&self) -> SeatKey {
        self.resource.key
    }

    pub fn resource(&self) -> &Arc<SeatResource> {
        &self.resource
    }

    /// Creates and registers a ticket for this seat, taking the seat out of
    /// the available pool. [`revoke`](Self::revoke) undoes it completely.
    pub fn issue(&self, owner: &Guest) -> Result<Ticket, IssueError> {
        let seat = self.key();
        let ledger = &self.resource.ledger;

        match ledger.tickets.entry(seat) {
            Entry::Occupied(existing) => {
                if ledger.available.contains(&seat) {
                    Err(IssueError::Inconsistent {
                        seat,
                        reason: "seat is both available and ticketed",
                    })
                } else {
                    Err(IssueError::Conflict {
                        seat,
                        holder: existing.get().id(),
                    })
                }
            }
            Entry::Vacant(slot) => {
                if ledger.retired.contains(&seat) {
                    return Err(IssueError::Retired { seat });
                }
                let event = &self.resource.event;
                let price = ledger.pricing.price(event, &seat.seat);
                if ledger.available.remove(&seat).is_none() {
                    return Err(IssueError::Inconsistent {
                        seat,
                        reason: "seat is neither available, ticketed nor retired",
                    });
                }
                let ticket = Ticket::new(event, seat.seat, owner.clone(), price);
                slot.insert(ticket.clone());
                tracing::debug!(seat = %seat, ticket = %ticket.id(), owner = %owner, "ticket issued");
                Ok(ticket)
            }
        }
    }

    /// Unregisters `ticket` and puts the seat back on sale.
    pub fn revoke(&self, ticket: &Ticket) -> Result<(), RevokeError> {
        let seat = self.key();
        if ticket.key() != seat {
            return Err(RevokeError::WrongSeat {
                ticket: ticket.id(),
                ticket_seat: ticket.key(),
                seat,
            });
        }

        let ledger = &self.resource.ledger;
        match ledger
            .tickets
            .remove_if(&seat, |_, registered| registered.id() == ticket.id())
        {
            Some(_) => {
                ledger.available.insert(seat);
                tracing::debug!(seat = %seat, ticket = %ticket.id(), "ticket revoked");
                Ok(())
            }
            None => Err(RevokeError::NotRegistered {
                ticket: ticket.id(),
                seat,
            }),
        }
    }

    /// Takes an unsold seat off sale for good. Returns `false` if it was
    /// already retired.
    pub fn retire(&self) -> Result<bool, RetireError> {
        let seat = self.key();
        let ledger = &self.resource.ledger;
        if let Some(ticket) = ledger.tickets.get(&seat) {
            return Err(RetireError::Sold {
                seat,
                holder: ticket.id(),
            });
        }
        ledger.available.remove(&seat);
        Ok(ledger.retired.insert(seat))
    }

    /// Gives the lock back. Equivalent to dropping the guard.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for SeatGuard {
    fn drop(&mut self) {
        tracing::trace!(seat = %self.resource.key, "seat lock released");
    }
}

impl fmt::Debug for SeatGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SeatGuard").field(&self.resource.key).finish()
    }
}
