use serde::{Deserialize, Serialize};
use time::{macros::format_description, OffsetDateTime};

use crate::DomainError;

/// Header row of a progress log.
pub const PROGRESS_HEADER: &str = "Timestamp,Accuracy";

/// One finished tutoring session: when it ended and how accurate it was.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgressRecord {
    /// `HH:MM dd/mm/yy`
    pub timestamp: String,
    /// Percentage in `0.0..=100.0`, rounded to two decimals.
    pub accuracy: f64,
}

impl ProgressRecord {
    pub fn new(timestamp: impl Into<String>, accuracy: f64) -> Self {
        Self {
            timestamp: timestamp.into(),
            accuracy,
        }
    }

    /// Stamps `accuracy` with the current local time (UTC when the offset is unknown).
    pub fn now(accuracy: f64) -> Self {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        Self::new(format_timestamp(now), accuracy)
    }

    pub fn to_row(&self) -> String {
        format!("{},{}%", self.timestamp, self.accuracy)
    }

    pub fn from_row(row: &str) -> Result<Self, DomainError> {
        let (timestamp, accuracy) = row
            .trim_end()
            .rsplit_once(',')
            .ok_or_else(|| DomainError::validation(format!("malformed progress row {row:?}")))?;
        let accuracy = accuracy
            .trim()
            .trim_end_matches('%')
            .parse::<f64>()
            .map_err(|err| DomainError::validation(format!("bad accuracy in {row:?}: {err}")))?;
        Ok(Self::new(timestamp, accuracy))
    }
}

pub fn format_timestamp(at: OffsetDateTime) -> String {
    let format = format_description!("[hour]:[minute] [day]/[month]/[year repr:last_two]");
    at.format(&format)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}
