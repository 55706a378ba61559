use chrono::{DateTime, Local};
use serde::Serialize;

/// Direction of one attendance booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Entering the company.
    Come,
    /// Leaving the company.
    Leave,
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryType::Come => write!(f, "come"),
            EntryType::Leave => write!(f, "leave"),
        }
    }
}

/// One timestamped attendance event from the bookings page.
///
/// Timestamps are minute-granular in the local time zone (the portal
/// reports no seconds). Entries carry no identity beyond their fields;
/// duplicates are preserved in document order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub time: DateTime<Local>,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
}
