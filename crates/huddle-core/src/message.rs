//! Chat message construction.
//!
//! Messages carry a display time rather than a sortable timestamp: the
//! wall clock shifted to a fixed UTC offset and rendered with a strftime
//! pattern.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use huddle_protocol::ChatMessage;
use std::fmt::Write;
use thiserror::Error;

/// Default UTC offset in minutes (+09:00).
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 9 * 60;

/// Default time format, e.g. `3:04:05 PM`.
pub const DEFAULT_TIME_FORMAT: &str = "%-I:%M:%S %p";

/// Clock configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClockError {
    /// Offset outside of ±24h.
    #[error("Invalid UTC offset: {0} minutes")]
    InvalidOffset(i32),

    /// Unparseable strftime pattern.
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),
}

/// Stamps chat messages with a formatted wall-clock time.
#[derive(Debug, Clone)]
pub struct MessageClock {
    offset: FixedOffset,
    format: String,
}

impl MessageClock {
    /// Create a clock for the given UTC offset and strftime format.
    ///
    /// # Errors
    ///
    /// Returns an error if the offset is out of range or the format does not parse.
    pub fn new(utc_offset_minutes: i32, format: impl Into<String>) -> Result<Self, ClockError> {
        let offset = FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60))
            .ok_or(ClockError::InvalidOffset(utc_offset_minutes))?;

        let format = format.into();
        if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
            return Err(ClockError::InvalidFormat(format));
        }

        Ok(Self { offset, format })
    }

    /// Format an instant.
    #[must_use]
    pub fn format_at(&self, instant: DateTime<Utc>) -> String {
        let local = instant.with_timezone(&self.offset);
        let mut out = String::new();
        if write!(out, "{}", local.format(&self.format)).is_err() {
            return local.to_rfc3339();
        }
        out
    }

    /// Format the current time.
    #[must_use]
    pub fn now(&self) -> String {
        self.format_at(Utc::now())
    }

    /// Build a chat message stamped with the current time.
    #[must_use]
    pub fn stamp(&self, name: impl Into<String>, text: impl Into<String>) -> ChatMessage {
        ChatMessage {
            name: name.into(),
            text: text.into(),
            time: self.now(),
        }
    }
}

impl Default for MessageClock {
    fn default() -> Self {
        Self {
            offset: FixedOffset::east_opt(DEFAULT_UTC_OFFSET_MINUTES * 60)
                .unwrap_or_else(|| Utc.fix()),
            format: DEFAULT_TIME_FORMAT.to_string(),
        }
    }
}
