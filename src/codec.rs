//! Reservation <-> store record encoding.
//!
//! Key:   `YYYY-MM-DD␟room␟ULID`
//! Value: `v1␟HH:MM␟HH:MM␟owner`
//!
//! `␟` is ASCII unit separator (0x1F). Dates, times and ULIDs are all
//! fixed-width, zero-padded text, so byte order of keys is (day, room,
//! creation order) and byte order of times is chronological. Validation keeps
//! the separator out of room names and owners, and decoding checks the exact
//! field count so a stray separator can never shift fields.

use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::FIELD_SEPARATOR;
use crate::model::{Reservation, Span, TimeOfDay};

const DATE_FORMAT: &str = "%Y-%m-%d";
const VALUE_VERSION: &str = "v1";
const KEY_FIELDS: usize = 3;
const VALUE_FIELDS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("malformed record: not valid UTF-8")]
    NotUtf8,
    #[error("malformed record: {part} has {found} fields, expected {expected}")]
    FieldCount {
        part: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("malformed record: unsupported value version {0:?}")]
    UnsupportedVersion(String),
    #[error("malformed record: bad {field} {value:?}")]
    BadField { field: &'static str, value: String },
}

/// A decoded record together with its storage disambiguator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub id: Ulid,
    pub reservation: Reservation,
}

pub fn encode(reservation: &Reservation, id: Ulid) -> (Vec<u8>, Vec<u8>) {
    let mut key = room_prefix(reservation.day, &reservation.room);
    key.extend_from_slice(id.to_string().as_bytes());
    let value = format!(
        "{VALUE_VERSION}{sep}{}{sep}{}{sep}{}",
        reservation.span.start,
        reservation.span.end,
        reservation.owner,
        sep = FIELD_SEPARATOR,
    );
    (key, value.into_bytes())
}

pub fn decode(key: &[u8], value: &[u8]) -> Result<Decoded, CodecError> {
    let key = std::str::from_utf8(key).map_err(|_| CodecError::NotUtf8)?;
    let value = std::str::from_utf8(value).map_err(|_| CodecError::NotUtf8)?;

    let [day, room, id] = split_exact::<KEY_FIELDS>(key, "key")?;
    let [version, start, end, owner] = split_exact::<VALUE_FIELDS>(value, "value")?;

    if version != VALUE_VERSION {
        return Err(CodecError::UnsupportedVersion(version.to_string()));
    }
    let day = NaiveDate::parse_from_str(day, DATE_FORMAT)
        .ok()
        .filter(|d| d.format(DATE_FORMAT).to_string() == day)
        .ok_or_else(|| bad("day", day))?;
    if room.is_empty() {
        return Err(bad("room", room));
    }
    let id = Ulid::from_string(id).map_err(|_| bad("id", id))?;
    let start: TimeOfDay = start.parse().map_err(|_| bad("start", start))?;
    let end: TimeOfDay = end.parse().map_err(|_| bad("end", end))?;
    let span = Span::new(start, end).ok_or_else(|| bad("span", &format!("{start}~{end}")))?;
    if owner.is_empty() {
        return Err(bad("owner", owner));
    }

    Ok(Decoded {
        id,
        reservation: Reservation {
            room: room.to_string(),
            day,
            span,
            owner: owner.to_string(),
        },
    })
}

/// Prefix selecting every reservation of one day.
pub fn day_prefix(day: NaiveDate) -> Vec<u8> {
    let mut prefix = day.format(DATE_FORMAT).to_string().into_bytes();
    push_separator(&mut prefix);
    prefix
}

/// Prefix selecting every reservation of one room on one day. The trailing
/// separator keeps `alpha` from matching `alphabet`.
pub fn room_prefix(day: NaiveDate, room: &str) -> Vec<u8> {
    let mut prefix = day_prefix(day);
    prefix.extend_from_slice(room.as_bytes());
    push_separator(&mut prefix);
    prefix
}

/// Human-readable rendering of a raw record, separators shown as `_`.
pub fn display_raw(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace(FIELD_SEPARATOR, "_")
}

fn push_separator(buf: &mut Vec<u8>) {
    let mut tmp = [0u8; 4];
    buf.extend_from_slice(FIELD_SEPARATOR.encode_utf8(&mut tmp).as_bytes());
}

fn split_exact<'a, const N: usize>(
    s: &'a str,
    part: &'static str,
) -> Result<[&'a str; N], CodecError> {
    let fields: Vec<&str> = s.split(FIELD_SEPARATOR).collect();
    let found = fields.len();
    fields.try_into().map_err(|_| CodecError::FieldCount {
        part,
        expected: N,
        found,
    })
}

fn bad(field: &'static str, value: &str) -> CodecError {
    CodecError::BadField {
        field,
        value: value.to_string(),
    }
}
