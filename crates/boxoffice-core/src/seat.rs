//! Seats and auditorium layouts.
//!
//! A [`Seat`] is a row letter plus a 1-based column. [`SeatLayout`] generates
//! the seat sets a catalog is built from.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A seat in an auditorium, ordered by row and then by column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Seat {
    row: char,
    column: u32,
}

impl Seat {
    /// Creates a seat. Rows are ASCII uppercase letters, columns start at 1.
    pub fn new(row: char, column: u32) -> Result<Self, CoreError> {
        if !row.is_ascii_uppercase() {
            return Err(CoreError::InvalidRow { row });
        }
        if column < 1 {
            return Err(CoreError::InvalidColumn { column });
        }
        Ok(Seat { row, column })
    }

    pub fn row(&self) -> char {
        self.row
    }

    pub fn column(&self) -> u32 {
        self.column
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.column)
    }
}

/// Seat set generators.
pub struct SeatLayout;

impl SeatLayout {
    /// Rows are lettered `A` to `Z`.
    pub const MAX_ROWS: u32 = 26;

    /// `rows` rows with `seats_per_row` seats each.
    pub fn rectangle(rows: u32, seats_per_row: u32) -> Result<BTreeSet<Seat>, CoreError> {
        Self::by_row(rows, |_| seats_per_row)
    }

    /// `rows` rows where row offset `n` (starting at 0) holds
    /// `seats_in_row(n)` seats.
    pub fn by_row<F>(rows: u32, seats_in_row: F) -> Result<BTreeSet<Seat>, CoreError>
    where
        F: Fn(u32) -> u32,
    {
        if rows < 1 || rows > Self::MAX_ROWS {
            return Err(CoreError::InvalidRowCount {
                rows,
                max: Self::MAX_ROWS,
            });
        }

        let mut seats = BTreeSet::new();
        for offset in 0..rows {
            let row = row_letter(offset);
            let count = seats_in_row(offset);
            if count < 1 {
                return Err(CoreError::EmptyRow { row });
            }
            for column in 1..=count {
                seats.insert(Seat::new(row, column)?);
            }
        }
        Ok(seats)
    }
}

/// 0 -> 'A', 1 -> 'B', ...
fn row_letter(offset: u32) -> char {
    char::from(b'A' + offset as u8)
}
