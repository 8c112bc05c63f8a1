//! Concurrent seat booking.
//!
//! Provides the building blocks for booking overlapping seat sets safely:
//! - [`resource::SeatResource`] for per-seat exclusive locks
//! - [`registry::InventoryRegistry`] for the shared available pool and ticket set
//! - [`request::BookingRequest`] for the pending/confirmed/rejected lifecycle
//! - [`coordinator::BookingCoordinator`] for ordered, all-or-nothing batch booking

pub mod coordinator;
pub mod registry;
pub mod request;
pub mod resource;

pub use coordinator::BookingCoordinator;
pub use registry::{InventoryBuilder, InventoryRegistry};
pub use request::{BookingRequest, BookingState, LifecycleError, RejectReason, RequestId};
pub use resource::{IssueError, RetireError, RevokeError, SeatGuard, SeatResource};
