use crate::bus::MessageBusError;
use std::io;
use thiserror::Error;

/// Unified error type for the staging core.
///
/// Validation and not-found conditions are returned to the immediate caller as
/// typed variants. Unexpected failures inside worker selection, result
/// application or the completion gateway are logged at the component boundary
/// and re-surfaced as [`StagerError::Server`].
#[derive(Error, Debug)]
pub enum StagerError {
    /// Bad or missing shared credential
    #[error("Authentication error")]
    Authentication,

    /// Unknown app, package, droplet, space or staging task
    #[error("{0} not found")]
    NotFound(String),

    /// Malformed create/upload request, bad type/url combination, missing field
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflicting state transition such as double staging
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A second upload to a package whose bits were already received
    #[error("{0}")]
    BitsAlreadyUploaded(String),

    /// The target is not staged by this orchestrator's backend
    #[error("Staging backend invalid: {0}")]
    BackendMismatch(String),

    /// No worker satisfies the requested stack and resources
    #[error("No available stager: {0}")]
    Capacity(String),

    /// No staging result arrived before the deadline
    #[error("Staging timed out after {0} seconds")]
    Timeout(u64),

    /// Malformed inbound payload
    #[error("Request invalid due to parse error: {0}")]
    Parse(String),

    /// The target already carries an unrecoverable staging failure
    #[error("Staging error: {0}")]
    StagingFailed(String),

    /// The access context refused the operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Errors related to database operations
    #[error("Database error: {0}")]
    Database(String),

    /// Errors related to serialization/deserialization of stored records
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Errors raised by the message bus
    #[error("Message bus error: {0}")]
    Bus(#[from] MessageBusError),

    /// Errors related to configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to IO operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Unexpected failure
    #[error("Server error: {0}")]
    Server(String),
}

impl StagerError {
    /// Stable name used for the `CF-<Name>` error code on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authentication => "NotAuthenticated",
            Self::NotFound(_) => "NotFound",
            Self::Validation(_) => "UnprocessableEntity",
            Self::Conflict(_) => "Conflict",
            Self::BitsAlreadyUploaded(_) => "BitsAlreadyUploaded",
            Self::BackendMismatch(_) => "StagingBackendInvalid",
            Self::Capacity(_) => "StagingCapacityError",
            Self::Timeout(_) => "StagingTimeout",
            Self::Parse(_) => "MessageParseError",
            Self::StagingFailed(_) => "StagingError",
            Self::Unauthorized(_) => "NotAuthorized",
            Self::Database(_)
            | Self::Serialization(_)
            | Self::Bus(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Server(_) => "ServerError",
        }
    }

    /// Numeric error code carried in the error envelope.
    pub fn code(&self) -> u32 {
        match self {
            Self::Authentication => 10002,
            Self::NotFound(_) => 10000,
            Self::Validation(_) => 10008,
            Self::Conflict(_) => 10009,
            Self::BitsAlreadyUploaded(_) => 150004,
            Self::BackendMismatch(_) => 170011,
            Self::Capacity(_) => 170004,
            Self::Timeout(_) => 170007,
            Self::Parse(_) => 1001,
            Self::StagingFailed(_) => 170001,
            Self::Unauthorized(_) => 10003,
            _ => 10001,
        }
    }

    /// Errors that describe the request rather than a fault in this process.
    ///
    /// These pass through component boundaries untouched; everything else is
    /// collapsed into [`StagerError::Server`].
    pub fn is_api_error(&self) -> bool {
        !matches!(
            self,
            Self::Database(_)
                | Self::Serialization(_)
                | Self::Bus(_)
                | Self::Config(_)
                | Self::Io(_)
                | Self::Server(_)
        )
    }

    /// Error code recorded on a failed staging attempt.
    pub fn staging_error_code(&self) -> String {
        self.name().to_string()
    }
}

impl From<sled::Error> for StagerError {
    fn from(error: sled::Error) -> Self {
        StagerError::Database(error.to_string())
    }
}

impl From<serde_json::Error> for StagerError {
    fn from(error: serde_json::Error) -> Self {
        StagerError::Serialization(error.to_string())
    }
}

/// Result type alias for operations that can result in a StagerError
pub type StagerResult<T> = Result<T, StagerError>;
