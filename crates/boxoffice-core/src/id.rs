//! Stable, totally ordered identifiers for bookable inventory.
//!
//! [`SeatKey`] is the canonical lock-order key: it orders by event first and
//! seat second, so every booking task that sorts its keys walks the same
//! global sequence.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::seat::Seat;

/// Scheduled event identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u32);

/// Generated ticket identity (UUID v4 newtype).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(pub Uuid);

impl TicketId {
    /// Generates a fresh random ticket id.
    pub fn generate() -> Self {
        TicketId(Uuid::new_v4())
    }
}

/// One seat at one event.
///
/// Field order matters: the derived `Ord` compares `event` before `seat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeatKey {
    pub event: EventId,
    pub seat: Seat,
}

impl SeatKey {
    pub fn new(event: EventId, seat: Seat) -> Self {
        SeatKey { event, seat }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SeatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.event, self.seat)
    }
}
