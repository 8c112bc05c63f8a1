//! Booking requests and their lifecycle.
//!
//! A [`BookingRequest`] starts [`BookingState::Pending`] and is resolved
//! exactly once, to either `Confirmed` (with its tickets) or `Rejected`
//! (with a [`RejectReason`]). A second resolution attempt is refused with
//! [`LifecycleError`] and leaves the request untouched.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use boxoffice_core::{Guest, SeatKey, Ticket, TicketId};

use super::resource::SeatResource;

/// Unique request identifier (UUID v4 newtype).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingState {
    Pending,
    Confirmed,
    Rejected,
}

/// Why a request was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// A requested seat already carries someone else's ticket.
    SeatTaken { seat: SeatKey, holder: TicketId },
    /// A requested seat is no longer on sale.
    SeatRetired { seat: SeatKey },
    /// The seat locks could not all be taken within the configured bound.
    LockTimeout,
    /// The booking task was cancelled before it finished.
    Cancelled,
    /// The batch hit a fatal error while this request was in flight.
    Aborted,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::SeatTaken { seat, holder } => {
                write!(f, "seat {seat} already sold (ticket {holder})")
            }
            RejectReason::SeatRetired { seat } => write!(f, "seat {seat} is retired"),
            RejectReason::LockTimeout => f.write_str("timed out waiting for seat locks"),
            RejectReason::Cancelled => f.write_str("cancelled"),
            RejectReason::Aborted => f.write_str("aborted by a failed batch"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("booking {request} is already {state:?}")]
    AlreadyResolved {
        request: RequestId,
        state: BookingState,
    },
}

/// A guest's ask for a set of seats, all or nothing.
#[derive(Debug)]
pub struct BookingRequest {
    id: RequestId,
    seats: Vec<Arc<SeatResource>>,
    requester: Guest,
    state: BookingState,
    tickets: Vec<Ticket>,
    rejection: Option<RejectReason>,
}

impl BookingRequest {
    /// Creates a pending request. Seat order is preserved as given.
    pub fn new(seats: Vec<Arc<SeatResource>>, requester: Guest) -> Self {
        BookingRequest {
            id: RequestId(Uuid::new_v4()),
            seats,
            requester,
            state: BookingState::Pending,
            tickets: Vec::new(),
            rejection: None,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Requested seats, in request order.
    pub fn seats(&self) -> &[Arc<SeatResource>] {
        &self.seats
    }

    pub fn requester(&self) -> &Guest {
        &self.requester
    }

    pub fn state(&self) -> BookingState {
        self.state
    }

    pub fn is_processed(&self) -> bool {
        self.state != BookingState::Pending
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == BookingState::Confirmed
    }

    pub fn is_rejected(&self) -> bool {
        self.state == BookingState::Rejected
    }

    /// Issued tickets; `None` unless the request is confirmed.
    pub fn tickets(&self) -> Option<&[Ticket]> {
        self.is_confirmed().then_some(self.tickets.as_slice())
    }

    pub fn rejection(&self) -> Option<&RejectReason> {
        self.rejection.as_ref()
    }

    /// Seats sorted into the global lock order.
    pub fn acquisition_order(&self) -> Vec<Arc<SeatResource>> {
        let mut order = self.seats.clone();
        order.sort_by_key(|resource| resource.key());
        order
    }

    pub fn confirm(&mut self, tickets: Vec<Ticket>) -> Result<(), LifecycleError> {
        self.ensure_pending()?;
        self.tickets = tickets;
        self.state = BookingState::Confirmed;
        Ok(())
    }

    pub fn reject(&mut self, reason: RejectReason) -> Result<(), LifecycleError> {
        self.ensure_pending()?;
        self.rejection = Some(reason);
        self.state = BookingState::Rejected;
        Ok(())
    }

    fn ensure_pending(&self) -> Result<(), LifecycleError> {
        match self.state {
            BookingState::Pending => Ok(()),
            state => Err(LifecycleError::AlreadyResolved {
                request: self.id,
                state,
            }),
        }
    }
}

impl fmt::Display for BookingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for {} [", self.id, self.requester)?;
        for (i, seat) in self.seats.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", seat.key())?;
        }
        f.write_str("]")
    }
}
