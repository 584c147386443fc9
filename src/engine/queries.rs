use chrono::NaiveDate;
use tracing::{info, warn};

use crate::codec;
use crate::model::*;
use crate::observability;
use crate::store::{Entry, Store, Transaction};

use super::{Engine, EngineError};

impl<S: Store> Engine<S> {
    /// Every decodable reservation of `day`, in key order.
    pub fn list_day(&self, day: NaiveDate) -> Result<Vec<Reservation>, EngineError> {
        Ok(decode_skipping_malformed(self.scan(&codec::day_prefix(day))?))
    }

    /// Every decodable reservation in the store, in key order.
    pub fn list_all(&self) -> Result<Vec<Reservation>, EngineError> {
        Ok(decode_skipping_malformed(self.scan(b"")?))
    }

    /// Raw stored records, for diagnostics.
    pub fn raw_entries(&self) -> Result<Vec<Entry>, EngineError> {
        self.scan(b"")
    }

    /// The reservation holding `room` at instant `at` on `day`, if any.
    pub fn current_holder(
        &self,
        day: NaiveDate,
        room: &str,
        at: TimeOfDay,
    ) -> Result<Option<Reservation>, EngineError> {
        let entries = self.scan(&codec::room_prefix(day, room))?;
        Ok(decode_skipping_malformed(entries)
            .into_iter()
            .find(|r| r.span.start <= at && at < r.span.end))
    }

    /// Administrative wipe of every reservation. No confirmation step.
    pub fn reset_all(&self) -> Result<(), EngineError> {
        self.store().clear()?;
        info!("all reservations reset");
        Ok(())
    }

    fn scan(&self, prefix: &[u8]) -> Result<Vec<Entry>, EngineError> {
        let mut txn = self.store().begin()?;
        Ok(txn.scan_prefix(prefix)?)
    }
}

fn decode_skipping_malformed(entries: Vec<Entry>) -> Vec<Reservation> {
    entries
        .into_iter()
        .filter_map(|(key, value)| match codec::decode(&key, &value) {
            Ok(decoded) => Some(decoded.reservation),
            Err(e) => {
                warn!(key = %codec::display_raw(&key), "skipping record: {e}");
                metrics::counter!(observability::MALFORMED_RECORDS_TOTAL).increment(1);
                None
            }
        })
        .collect()
}
