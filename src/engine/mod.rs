mod admit;
mod conflict;
mod error;
mod queries;
#[cfg(test)]
mod tests;

pub use conflict::find_conflict;
pub use error::{EngineError, InvalidRequest};

use std::sync::{Arc, Mutex};

use ulid::Ulid;

use crate::rooms::RoomDirectory;
use crate::store::Store;

/// Admission engine over a transactional store. Synchronous per call and
/// shareable across request handlers behind an `Arc`.
pub struct Engine<S: Store> {
    store: S,
    rooms: Arc<RoomDirectory>,
    /// Monotonic even within one millisecond, so key order is creation order.
    ids: Mutex<ulid::Generator>,
}

impl<S: Store> Engine<S> {
    pub fn new(store: S, rooms: Arc<RoomDirectory>) -> Self {
        Self {
            store,
            rooms,
            ids: Mutex::new(ulid::Generator::new()),
        }
    }

    pub fn rooms(&self) -> &RoomDirectory {
        &self.rooms
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn next_id(&self) -> Result<Ulid, EngineError> {
        let mut ids = self
            .ids
            .lock()
            .map_err(|_| EngineError::Internal("id generator lock poisoned".into()))?;
        ids.generate()
            .map_err(|e| EngineError::Internal(format!("id generation failed: {e}")))
    }
}
