use crate::codec::CodecError;
use crate::model::{ParseTimeError, TimeOfDay};
use crate::store::StoreError;

/// Why a request was refused before it reached the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRequest {
    #[error("unknown room: {0}")]
    UnknownRoom(String),
    #[error(transparent)]
    BadTime(#[from] ParseTimeError),
    #[error("start {start} must be before end {end}")]
    EmptyInterval { start: TimeOfDay, end: TimeOfDay },
    #[error("invalid owner: {0}")]
    InvalidOwner(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] InvalidRequest),
    /// Lost a commit race. Retry with fresh validation.
    #[error("store conflict, retry the request")]
    StoreConflict,
    #[error(transparent)]
    MalformedRecord(#[from] CodecError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::StoreConflict)
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidRequest(_) => "invalid_request",
            EngineError::StoreConflict => "store_conflict",
            EngineError::MalformedRecord(_) => "malformed_record",
            EngineError::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => EngineError::StoreConflict,
            other => EngineError::Internal(other.to_string()),
        }
    }
}
