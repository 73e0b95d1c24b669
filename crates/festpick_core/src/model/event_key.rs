//! Composite attendance key parsing.
//!
//! Attendance entries are keyed by `band:location:startTime:eventType:year`.
//! Start times are usually written as `HH:MM`, which adds one separator; that
//! shape is accepted explicitly. Every other part count is rejected rather
//! than guessed at.

use std::error::Error;
use std::fmt::{Display, Formatter};

const KEY_SEPARATOR: char = ':';

/// Parsed form of one attendance key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceKey {
    pub band: String,
    pub location: String,
    pub start_time: String,
    pub event_type: String,
    pub year: i32,
}

impl AttendanceKey {
    /// Parses a composite key string.
    pub fn parse(raw: &str) -> Result<Self, AttendanceKeyError> {
        let parts: Vec<&str> = raw.split(KEY_SEPARATOR).collect();
        let (band, location, start_time, event_type, year) = match parts.as_slice() {
            [band, location, start, event_type, year] => {
                (*band, *location, (*start).to_string(), *event_type, *year)
            }
            [band, location, hour, minute, event_type, year] if is_clock_pair(hour, minute) => (
                *band,
                *location,
                format!("{hour}{KEY_SEPARATOR}{minute}"),
                *event_type,
                *year,
            ),
            _ => return Err(AttendanceKeyError::WrongPartCount(parts.len())),
        };

        if band.trim().is_empty() {
            return Err(AttendanceKeyError::BlankBand);
        }
        let year = year
            .trim()
            .parse::<i32>()
            .map_err(|_| AttendanceKeyError::InvalidYear(year.to_string()))?;

        Ok(Self {
            band: band.to_string(),
            location: location.to_string(),
            start_time,
            event_type: event_type.to_string(),
            year,
        })
    }

    /// Renders the canonical composite key.
    pub fn to_key(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}{sep}{}{sep}{}",
            self.band,
            self.location,
            self.start_time,
            self.event_type,
            self.year,
            sep = KEY_SEPARATOR
        )
    }
}

fn is_clock_pair(hour: &str, minute: &str) -> bool {
    let numeric = |value: &str, max: u32| {
        !value.is_empty()
            && value.len() <= 2
            && value.chars().all(|c| c.is_ascii_digit())
            && value.parse::<u32>().is_ok_and(|n| n <= max)
    };
    numeric(hour, 23) && minute.len() == 2 && numeric(minute, 59)
}

/// Rejection reasons for malformed attendance keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendanceKeyError {
    WrongPartCount(usize),
    BlankBand,
    InvalidYear(String),
}

impl Display for AttendanceKeyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongPartCount(count) => {
                write!(f, "attendance key has {count} parts, expected 5")
            }
            Self::BlankBand => write!(f, "attendance key has a blank band name"),
            Self::InvalidYear(value) => write!(f, "attendance key year is not a number: `{value}`"),
        }
    }
}

impl Error for AttendanceKeyError {}
