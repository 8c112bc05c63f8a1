//! Concurrent seat booking for scheduled events.
//!
//! Books multi-seat requests in parallel without ever selling a seat twice.
//! This crate contains the seat-level locking, the shared inventory, the
//! booking request lifecycle, and the batch coordinator that ties them
//! together without deadlocking.

pub mod concurrency;
pub mod config;
pub mod error;

pub use concurrency::{
    BookingCoordinator, BookingRequest, BookingState, InventoryRegistry, RejectReason,
    SeatResource,
};
pub use config::BookingConfig;
pub use error::BookingError;
