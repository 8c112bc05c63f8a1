pub mod error;
pub mod event;
pub mod id;
pub mod pricing;
pub mod seat;
pub mod ticket;

// Re-export commonly used types
pub use error::CoreError;
pub use event::{Event, Guest};
pub use id::{EventId, SeatKey, TicketId};
pub use pricing::{FlatPrice, PriceCalculator, RowTierPrice};
pub use seat::{Seat, SeatLayout};
pub use ticket::Ticket;
