//! Issued tickets.
//!
//! A [`Ticket`] carries its price from the moment it is issued; payment and
//! entry only flip the two flags. Uniqueness per seat is not the ticket's
//! concern: the inventory registry refuses to register a second ticket for
//! the same [`SeatKey`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::{Event, Guest};
use crate::id::{EventId, SeatKey, TicketId};
use crate::seat::Seat;

/// A ticket for one seat at one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    id: TicketId,
    event: EventId,
    seat: Seat,
    owner: Guest,
    /// Price in minor currency units.
    price: u32,
    paid: bool,
    used: bool,
}

impl Ticket {
    /// Creates a fresh, unpaid and unused ticket with a new id.
    pub fn new(event: &Event, seat: Seat, owner: Guest, price: u32) -> Self {
        Ticket {
            id: TicketId::generate(),
            event: event.id,
            seat,
            owner,
            price,
            paid: false,
            used: false,
        }
    }

    pub fn id(&self) -> TicketId {
        self.id
    }

    pub fn event(&self) -> EventId {
        self.event
    }

    pub fn seat(&self) -> Seat {
        self.seat
    }

    pub fn key(&self) -> SeatKey {
        SeatKey::new(self.event, self.seat)
    }

    pub fn owner(&self) -> &Guest {
        &self.owner
    }

    pub fn price(&self) -> u32 {
        self.price
    }

    pub fn is_paid(&self) -> bool {
        self.paid
    }

    pub fn is_used(&self) -> bool {
        self.used
    }

    pub fn pay(&mut self) {
        self.paid = true;
    }

    pub fn use_ticket(&mut self) {
        self.used = true;
    }

    /// A guest may enter with a ticket that is paid and not yet used.
    pub fn is_allowed_to_enter(&self) -> bool {
        self.paid && !self.used
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for {}", self.key(), self.owner)
    }
}
