//! Error taxonomy shared by the store, aggregator, gateway and workflow.

use thiserror::Error;

/// Errors surfaced by the habit-tracking core.
///
/// Nothing here is fatal to the process: every variant describes a failure of
/// one store call or one workflow instance.
#[derive(Error, Debug)]
pub enum Error {
    #[error("habit limit reached ({limit} habits)")]
    CapacityExceeded { limit: usize },

    #[error("habit {habit_id} not found")]
    NotFound { habit_id: i64 },

    #[error("habit store unavailable: {0}")]
    StoreUnavailable(#[from] rusqlite::Error),

    #[error("invalid habit: {0}")]
    InvalidHabit(String),

    #[error("vision judge API key not configured")]
    CredentialMissing,

    #[error("failed to process image: {0}")]
    ImageProcessing(String),

    #[error("verification service failed: {0}")]
    VerificationService(String),

    #[error("cannot {action} while {state}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },
}

/// Fieldless discriminant of [`Error`], for callers that branch on the failure
/// class (e.g. prompting for credential setup only on `CredentialMissing`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CapacityExceeded,
    NotFound,
    StoreUnavailable,
    InvalidHabit,
    CredentialMissing,
    ImageProcessing,
    VerificationService,
    InvalidTransition,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Error::InvalidHabit(_) => ErrorKind::InvalidHabit,
            Error::CredentialMissing => ErrorKind::CredentialMissing,
            Error::ImageProcessing(_) => ErrorKind::ImageProcessing,
            Error::VerificationService(_) => ErrorKind::VerificationService,
            Error::InvalidTransition { .. } => ErrorKind::InvalidTransition,
        }
    }

    /// Store connection lock was poisoned by a panicking holder.
    pub(crate) fn poisoned() -> Self {
        Error::StoreUnavailable(rusqlite::Error::InvalidParameterName(
            "habit store connection lock poisoned".to_string(),
        ))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
