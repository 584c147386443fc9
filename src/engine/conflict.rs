use chrono::NaiveDate;

use crate::codec;
use crate::model::Span;
use crate::store::Transaction;

use super::EngineError;

/// Owner of the first reservation (in key order, i.e. insertion order) on
/// `room`/`day` that overlaps `span`. Reads only; safe to run inside the
/// transaction that will perform the write.
///
/// An undecodable record under the prefix fails the whole check: admitting
/// next to a reservation we cannot read could break the no-overlap invariant.
pub fn find_conflict<T: Transaction>(
    txn: &mut T,
    day: NaiveDate,
    room: &str,
    span: &Span,
) -> Result<Option<String>, EngineError> {
    let prefix = codec::room_prefix(day, room);
    for (key, value) in txn.scan_prefix(&prefix)? {
        let existing = codec::decode(&key, &value)?.reservation;
        if existing.span.start < span.end && existing.span.end > span.start {
            return Ok(Some(existing.owner));
        }
    }
    Ok(None)
}
