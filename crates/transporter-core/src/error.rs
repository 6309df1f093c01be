//! Error taxonomy shared by every Transporter layer.

use thiserror::Error;

/// Failure categories a Transporter can report.
///
/// Each kind carries a human-readable message and maps onto an HTTP-style
/// status code via [`TransportError::code`]. Backends, decorators, and the
/// sync engine all speak this one vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The id or band does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The principal may not perform this operation.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Optimistic-concurrency mismatch: the stored value carries a newer
    /// version marker than the one being written.
    #[error("timestamp out of date: {0}")]
    VersionConflict(String),

    /// Wrong kind of record for the operation.
    #[error("not appropriate: {0}")]
    NotAppropriate(String),

    /// Malformed input.
    #[error("invalid: {0}")]
    Invalid(String),

    /// The operation is not allowed on this record.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// The underlying service cannot be reached.
    #[error("underlying service not available: {0}")]
    ServiceNotAvailable(String),

    /// The backend does not implement this primitive (yet).
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// The backend will never implement this primitive.
    #[error("never will be implemented: {0}")]
    NeverImplemented(String),

    /// Additional setup is required before this can work.
    #[error("setup required: {0}")]
    SetupRequired(String),

    /// Some sort of internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TransportError {
    /// HTTP-style status code for this error kind.
    pub fn code(&self) -> u16 {
        match self {
            TransportError::NotFound(_) => 404,
            TransportError::NotAuthorized(_) => 401,
            TransportError::VersionConflict(_) => 409,
            TransportError::NotAppropriate(_) => 403,
            TransportError::Invalid(_) => 403,
            TransportError::MethodNotAllowed(_) => 405,
            TransportError::ServiceNotAvailable(_) => 503,
            TransportError::NotImplemented(_) | TransportError::NeverImplemented(_) => 501,
            TransportError::SetupRequired(_) | TransportError::Internal(_) => 500,
        }
    }

    /// True for the one kind the monitor treats as recoverable.
    pub fn is_conflict(&self) -> bool {
        matches!(self, TransportError::VersionConflict(_))
    }

    /// True if the error says the record simply isn't there.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound(_))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        TransportError::NotFound(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        TransportError::Invalid(what.into())
    }

    pub fn not_implemented(what: impl Into<String>) -> Self {
        TransportError::NotImplemented(what.into())
    }

    pub fn internal(what: impl Into<String>) -> Self {
        TransportError::Internal(what.into())
    }
}

/// Result type for Transporter operations.
pub type Result<T> = std::result::Result<T, TransportError>;
