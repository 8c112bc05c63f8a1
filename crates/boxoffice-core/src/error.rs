//! Core error types for boxoffice-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! malformed catalog input.

use thiserror::Error;

/// Errors produced while constructing domain values.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Seat rows are single uppercase letters.
    #[error("invalid seat row: '{row}'")]
    InvalidRow { row: char },

    /// Seat columns start at 1.
    #[error("invalid seat column: {column} (must be >= 1)")]
    InvalidColumn { column: u32 },

    /// A layout needs between 1 and `max` rows.
    #[error("invalid row count: {rows} (must be between 1 and {max})")]
    InvalidRowCount { rows: u32, max: u32 },

    /// A generated row ended up with no seats.
    #[error("row {row} has no seats")]
    EmptyRow { row: char },

    #[error("{what} must not be blank")]
    BlankName { what: &'static str },
}
