use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Timelike};

/// Minute-resolution time of day, always written as zero-padded `HH:MM` so
/// that lexicographic order of the text equals chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(NaiveTime);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed time of day {0:?}, expected HH:MM")]
pub struct ParseTimeError(pub String);

impl TimeOfDay {
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }
}

impl FromStr for TimeOfDay {
    type Err = ParseTimeError;

    /// Strict `HH:MM`: chrono alone would also accept `9:05`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        let shape_ok = bytes.len() == 5
            && bytes[2] == b':'
            && [0, 1, 3, 4].iter().all(|&i| bytes[i].is_ascii_digit());
        if !shape_ok {
            return Err(ParseTimeError(s.to_string()));
        }
        let two_digits = |i: usize| u32::from(bytes[i] - b'0') * 10 + u32::from(bytes[i + 1] - b'0');
        Self::from_hm(two_digits(0), two_digits(3)).ok_or_else(|| ParseTimeError(s.to_string()))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0.hour(), self.0.minute())
    }
}

/// Half-open interval `[start, end)` within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl Span {
    /// `None` unless `start < end`.
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// An admitted (or about to be admitted) claim on a room for part of a day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub room: String,
    pub day: NaiveDate,
    pub span: Span,
    pub owner: String,
}

/// Raw request as handed over by a transport. Times are still text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub room: String,
    pub start: String,
    pub end: String,
    pub owner: String,
}

impl ReservationRequest {
    pub fn new(
        room: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            room: room.into(),
            start: start.into(),
            end: end.into(),
            owner: owner.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub name: String,
    pub description: String,
}

impl Room {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Business outcome of an admission attempt. Faults are `EngineError`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted(Reservation),
    Denied { held_by: String },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted(_))
    }
}
