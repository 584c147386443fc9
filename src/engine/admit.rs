use std::time::Instant;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::codec;
use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::store::{Store, Transaction};

use super::conflict::find_conflict;
use super::{Engine, EngineError, InvalidRequest};

impl<S: Store> Engine<S> {
    /// Turn a raw request into a reservation for `day`, or say why not.
    /// Never touches the store.
    pub fn validate(
        &self,
        day: NaiveDate,
        request: &ReservationRequest,
    ) -> Result<Reservation, InvalidRequest> {
        if !self.rooms().is_valid(&request.room) {
            return Err(InvalidRequest::UnknownRoom(request.room.clone()));
        }
        validate_owner(&request.owner)?;
        let start: TimeOfDay = request.start.parse()?;
        let end: TimeOfDay = request.end.parse()?;
        let span = Span::new(start, end).ok_or(InvalidRequest::EmptyInterval { start, end })?;
        Ok(Reservation {
            room: request.room.clone(),
            day,
            span,
            owner: request.owner.clone(),
        })
    }

    /// Admit `request` on `day` if its interval overlaps no existing
    /// reservation of the same room and day.
    ///
    /// The conflict scan and the write share one transaction. A lost commit
    /// race comes back as `EngineError::StoreConflict`; the engine never
    /// retries on its own.
    pub fn admit(
        &self,
        day: NaiveDate,
        request: &ReservationRequest,
    ) -> Result<Admission, EngineError> {
        let started = Instant::now();
        let result = self.try_admit(day, request);
        let outcome = match &result {
            Ok(Admission::Admitted(_)) => "admitted",
            Ok(Admission::Denied { .. }) => "denied",
            Err(e) => e.kind(),
        };
        metrics::counter!(observability::ADMISSIONS_TOTAL, "outcome" => outcome).increment(1);
        metrics::histogram!(observability::ADMIT_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(Admission::Admitted(r)) => info!(
                room = %r.room, day = %r.day, start = %r.span.start, end = %r.span.end,
                owner = %r.owner, "reservation admitted"
            ),
            Ok(Admission::Denied { held_by }) => debug!(
                room = %request.room, start = %request.start, end = %request.end,
                held_by = %held_by, "reservation denied"
            ),
            Err(EngineError::InvalidRequest(reason)) => {
                debug!(room = %request.room, "invalid request: {reason}")
            }
            Err(e) => warn!(room = %request.room, "admission failed: {e}"),
        }
        result
    }

    fn try_admit(
        &self,
        day: NaiveDate,
        request: &ReservationRequest,
    ) -> Result<Admission, EngineError> {
        let reservation = self.validate(day, request)?;

        let mut txn = self.store().begin()?;
        if let Some(held_by) = find_conflict(&mut txn, day, &reservation.room, &reservation.span)? {
            // Dropping the transaction aborts it.
            return Ok(Admission::Denied { held_by });
        }

        let (key, value) = codec::encode(&reservation, self.next_id()?);
        txn.put(key, value);
        txn.commit()?;
        Ok(Admission::Admitted(reservation))
    }
}

/// Owners are stored verbatim in the value record, so they must not carry
/// the field separator or any other control character.
fn validate_owner(owner: &str) -> Result<(), InvalidRequest> {
    if owner.trim().is_empty() {
        return Err(InvalidRequest::InvalidOwner("empty"));
    }
    if owner.len() > MAX_OWNER_LEN {
        return Err(InvalidRequest::InvalidOwner("too long"));
    }
    if owner.chars().any(|c| c.is_control() || c == FIELD_SEPARATOR) {
        return Err(InvalidRequest::InvalidOwner("contains control characters"));
    }
    Ok(())
}
