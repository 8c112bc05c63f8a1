//! Seat pricing.
//!
//! The catalog supplies a [`PriceCalculator`]; the inventory asks it once per
//! ticket at issuance time. Any `Fn(&Event, &Seat) -> u32` closure works.

use crate::event::Event;
use crate::seat::Seat;

/// Computes a seat price in minor currency units.
pub trait PriceCalculator: Send + Sync {
    fn price(&self, event: &Event, seat: &Seat) -> u32;
}

impl<F> PriceCalculator for F
where
    F: Fn(&Event, &Seat) -> u32 + Send + Sync,
{
    fn price(&self, event: &Event, seat: &Seat) -> u32 {
        self(event, seat)
    }
}

/// Same price for every seat.
#[derive(Debug, Clone, Copy)]
pub struct FlatPrice(pub u32);

impl PriceCalculator for FlatPrice {
    fn price(&self, _event: &Event, _seat: &Seat) -> u32 {
        self.0
    }
}

/// Premium price for a set of rows, standard price everywhere else.
#[derive(Debug, Clone)]
pub struct RowTierPrice {
    pub premium_rows: Vec<char>,
    pub premium: u32,
    pub standard: u32,
}

impl PriceCalculator for RowTierPrice {
    fn price(&self, _event: &Event, seat: &Seat) -> u32 {
        if self.premium_rows.contains(&seat.row()) {
            self.premium
        } else {
            self.standard
        }
    }
}
