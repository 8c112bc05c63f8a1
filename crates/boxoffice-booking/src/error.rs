//! Booking error types.
//!
//! [`BookingError`] is what a caller of the coordinator or registry can see.
//! Seat contention never shows up here: a lost race resolves the request as
//! rejected.

use boxoffice_core::{CoreError, EventId, SeatKey};

use crate::concurrency::request::LifecycleError;
use crate::concurrency::resource::{RetireError, RevokeError};

/// Errors from building inventory, submitting batches, or seat maintenance.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    /// A request in the batch is malformed. Nothing in the batch was dispatched.
    #[error("invalid booking request #{index}: {reason}")]
    InvalidRequest { index: usize, reason: String },

    /// The seat does not belong to this inventory.
    #[error("unknown seat: {seat}")]
    UnknownSeat { seat: SeatKey },

    /// Two catalog entries share an event id.
    #[error("duplicate event in catalog: {0}")]
    DuplicateEvent(EventId),

    /// Seat state was found in a shape the lock discipline rules out.
    #[error("invariant violated on seat {seat}: {reason}")]
    InvariantViolation { seat: SeatKey, reason: String },

    /// A booking worker task panicked or the worker pool shut down.
    #[error("booking worker failed: {0}")]
    WorkerFailed(String),

    /// Environment configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Revoke(#[from] RevokeError),

    #[error(transparent)]
    Retire(#[from] RetireError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl BookingError {
    /// Fatal errors indicate broken lock discipline rather than bad input.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BookingError::InvariantViolation { .. } | BookingError::WorkerFailed(_)
        )
    }
}
