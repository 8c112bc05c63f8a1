//! Shared seat inventory.
//!
//! [`InventoryRegistry`] owns one [`SeatResource`] per catalog seat and the
//! [`Ledger`] they all write to: the available pool and the registered
//! tickets. There is no registry-wide lock. The ledger maps are concurrent,
//! but a seat's entries are only changed through that seat's
//! [`SeatGuard`](super::resource::SeatGuard), so the two views agree per
//! seat once its lock is released.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};

use boxoffice_core::{Event, EventId, PriceCalculator, Seat, SeatKey, Ticket};

use super::resource::SeatResource;
use crate::error::BookingError;

/// Seat-level state shared by every [`SeatResource`] of one registry.
pub(crate) struct Ledger {
    pub(crate) available: DashSet<SeatKey>,
    pub(crate) tickets: DashMap<SeatKey, Ticket>,
    pub(crate) retired: DashSet<SeatKey>,
    pub(crate) pricing: Box<dyn PriceCalculator>,
}

/// The authoritative seat inventory for all events.
pub struct InventoryRegistry {
    events: BTreeMap<EventId, Arc<Event>>,
    resources: BTreeMap<SeatKey, Arc<SeatResource>>,
    ledger: Arc<Ledger>,
}

/// Collects catalog entries before the inventory is frozen.
pub struct InventoryBuilder {
    events: BTreeMap<EventId, Arc<Event>>,
    seats: BTreeMap<EventId, BTreeSet<Seat>>,
    pricing: Box<dyn PriceCalculator>,
}

impl InventoryBuilder {
    /// Adds an event and the seats on sale for it.
    pub fn event(
        mut self,
        event: Event,
        seats: impl IntoIterator<Item = Seat>,
    ) -> Result<Self, BookingError> {
        if self.events.contains_key(&event.id) {
            return Err(BookingError::DuplicateEvent(event.id));
        }
        self.seats.insert(event.id, seats.into_iter().collect());
        self.events.insert(event.id, Arc::new(event));
        Ok(self)
    }

    /// Creates one resource per (event, seat), all initially available.
    pub fn build(self) -> InventoryRegistry {
        let InventoryBuilder {
            events,
            seats,
            pricing,
        } = self;

        let ledger = Arc::new(Ledger {
            available: DashSet::new(),
            tickets: DashMap::new(),
            retired: DashSet::new(),
            pricing,
        });

        let mut resources = BTreeMap::new();
        for (event_id, event_seats) in seats {
            let Some(event) = events.get(&event_id) else {
                continue;
            };
            for seat in event_seats {
                let resource = SeatResource::new(Arc::clone(event), seat, Arc::clone(&ledger));
                ledger.available.insert(resource.key());
                resources.insert(resource.key(), Arc::new(resource));
            }
        }

        tracing::info!(
            events = events.len(),
            seats = resources.len(),
            "inventory built"
        );

        InventoryRegistry {
            events,
            resources,
            ledger,
        }
    }
}

impl InventoryRegistry {
    /// Starts a catalog priced by `pricing`.
    pub fn builder(pricing: impl PriceCalculator + 'static) -> InventoryBuilder {
        InventoryBuilder {
            events: BTreeMap::new(),
            seats: BTreeMap::new(),
            pricing: Box::new(pricing),
        }
    }

    pub fn events(&self) -> impl Iterator<Item = &Arc<Event>> {
        self.events.values()
    }

    pub fn event(&self, id: EventId) -> Option<&Arc<Event>> {
        self.events.get(&id)
    }

    pub fn resource(&self, key: &SeatKey) -> Option<&Arc<SeatResource>> {
        self.resources.get(key)
    }

    /// All resources in canonical lock order.
    pub fn resources(&self) -> impl Iterator<Item = &Arc<SeatResource>> {
        self.resources.values()
    }

    /// Looks up a seat by event, row and column.
    pub fn seat(
        &self,
        event: EventId,
        row: char,
        column: u32,
    ) -> Result<Arc<SeatResource>, BookingError> {
        let key = SeatKey::new(event, Seat::new(row, column)?);
        self.resources
            .get(&key)
            .cloned()
            .ok_or(BookingError::UnknownSeat { seat: key })
    }

    /// Whether `resource` is this registry's own instance for its key.
    pub fn contains(&self, resource: &Arc<SeatResource>) -> bool {
        self.resources
            .get(&resource.key())
            .is_some_and(|own| Arc::ptr_eq(own, resource))
    }

    /// Still in the available pool.
    pub fn is_available(&self, key: &SeatKey) -> bool {
        self.ledger.available.contains(key)
    }

    pub fn is_retired(&self, key: &SeatKey) -> bool {
        self.ledger.retired.contains(key)
    }

    /// Seats of `event` still on sale, in seat order.
    pub fn available_seats(&self, event: EventId) -> Vec<Seat> {
        self.resources
            .keys()
            .filter(|key| key.event == event && self.is_available(key))
            .map(|key| key.seat)
            .collect()
    }

    pub fn available_count(&self) -> usize {
        self.resources
            .keys()
            .filter(|key| self.is_available(key))
            .count()
    }

    /// The live ticket for a seat, if any.
    pub fn ticket_for(&self, key: &SeatKey) -> Option<Ticket> {
        self.ledger.tickets.get(key).map(|entry| entry.value().clone())
    }

    /// Live tickets for `event`, in seat order.
    pub fn registered_tickets(&self, event: EventId) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = self
            .ledger
            .tickets
            .iter()
            .filter(|entry| entry.key().event == event)
            .map(|entry| entry.value().clone())
            .collect();
        tickets.sort_by_key(Ticket::key);
        tickets
    }

    pub fn ticket_count(&self) -> usize {
        self.ledger.tickets.len()
    }

    /// Revokes a confirmed ticket and puts its seat back on sale.
    pub async fn refund(&self, ticket: &Ticket) -> Result<(), BookingError> {
        let key = ticket.key();
        let resource = self
            .resources
            .get(&key)
            .ok_or(BookingError::UnknownSeat { seat: key })?;

        let guard = resource.acquire().await;
        guard.revoke(ticket)?;
        guard.release();

        tracing::info!(seat = %key, ticket = %ticket.id(), "ticket refunded");
        Ok(())
    }

    /// Permanently takes an unsold seat off sale.
    pub async fn retire(&self, key: &SeatKey) -> Result<bool, BookingError> {
        let resource = self
            .resources
            .get(key)
            .ok_or(BookingError::UnknownSeat { seat: *key })?;

        let guard = resource.acquire().await;
        let retired = guard.retire()?;
        guard.release();

        if retired {
            tracing::info!(seat = %key, "seat retired");
        }
        Ok(retired)
    }
}

#[cfg(test)]
impl InventoryRegistry {
    pub(crate) fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}

impl fmt::Debug for InventoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InventoryRegistry")
            .field("events", &self.events.len())
            .field("seats", &self.resources.len())
            .field("tickets", &self.ledger.tickets.len())
            .finish()
    }
}
