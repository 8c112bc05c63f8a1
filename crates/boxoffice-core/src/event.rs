//! Scheduled events and the guests who book them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::EventId;

/// One scheduled performance at a venue.
///
/// Events are distinguished by their [`EventId`]; the name, venue and start
/// label are descriptive only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub venue: String,
    /// Free-form start time label, e.g. `2026-11-02 19:30`.
    pub starts_at: String,
}

impl Event {
    pub fn new(
        id: EventId,
        name: impl Into<String>,
        venue: impl Into<String>,
        starts_at: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let name = non_blank("event name", name.into())?;
        let venue = non_blank("venue", venue.into())?;
        Ok(Event {
            id,
            name,
            venue,
            starts_at: starts_at.into(),
        })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} ({})", self.name, self.venue, self.starts_at)
    }
}

/// The person a booking is made for and who owns the resulting tickets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Guest {
    name: String,
}

impl Guest {
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        Ok(Guest {
            name: non_blank("guest name", name.into())?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Guest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn non_blank(what: &'static str, value: String) -> Result<String, CoreError> {
    if value.trim().is_empty() {
        Err(CoreError::BlankName { what })
    } else {
        Ok(value)
    }
}
