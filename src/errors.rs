use http::StatusCode;
use serde::Serialize;
use uuid::Uuid;

/// Error taxonomy shared by every warehouse operation.
///
/// Transition failures never leave a record half-mutated: the workflow engine
/// works on a draft copy and only commits after guards, freeze checks and
/// ledger creation have all succeeded.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    /// Transition not legal from the record's current status.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Guard failed; the message is user-facing.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A pick line could not be bound to a bin.
    #[error("Resolution error: {0}")]
    ResolutionError(String),

    /// Movement blocked by an active freeze scope.
    #[error("Frozen stock: {0}")]
    FrozenStock(String),

    /// Downstream ledger document creation failed; the transition was rolled back.
    #[error("Ledger creation error: {0}")]
    LedgerCreationError(String),

    /// Barcode scan exceeds the remaining quantity of the line.
    #[error("Over-scan: {0}")]
    OverScan(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Another transition is in flight on the same aggregate.
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidState(_) | Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::ResolutionError(_) | Self::OverScan(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::FrozenStock(_) => StatusCode::LOCKED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::LedgerCreationError(_) | Self::ExternalServiceError(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::SerializationError(_) | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable identifier, also used as the metrics label.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidState(_) => "invalid_state",
            Self::ValidationError(_) => "validation_error",
            Self::ResolutionError(_) => "resolution_error",
            Self::FrozenStock(_) => "frozen_stock",
            Self::LedgerCreationError(_) => "ledger_creation_error",
            Self::OverScan(_) => "over_scan",
            Self::NotFound(_) => "not_found",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::ExternalServiceError(_) => "external_service_error",
            Self::SerializationError(_) => "serialization_error",
            Self::Other(_) => "internal_error",
        }
    }

    /// Returns the error message suitable for callers outside the process.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::SerializationError(_) | Self::Other(_) => "Internal server error".to_string(),
            Self::ConcurrentModification(id) => {
                format!("Another transition is in progress for {}", id)
            }
            _ => self.to_string(),
        }
    }

    /// True for errors that are the caller's fault and must not be retried as-is.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidState(_)
                | Self::ValidationError(_)
                | Self::FrozenStock(_)
                | Self::OverScan(_)
                | Self::NotFound(_)
        )
    }
}

// Type aliases for readability at call sites
pub type WorkflowError = ServiceError;
pub type RoutingError = ServiceError;
pub type LedgerError = ServiceError;

// Result extensions for easier error handling
pub trait ResultExt<T> {
    fn map_err_to_service(self) -> Result<T, ServiceError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<ServiceError>,
{
    fn map_err_to_service(self) -> Result<T, ServiceError> {
        self.map_err(|e| e.into())
    }
}
