//! Error taxonomy for the row store
//!
//! One shared error type crosses every layer. The HTTP surface maps each
//! kind to a status code; the engine decides which kinds are eligible for
//! internal retry:
//!
//! | Kind | Retried internally? |
//! |------|---------------------|
//! | `StoreNotFound` / `RowNotFound` | never (deterministic) |
//! | `AlreadyExists` | never |
//! | `Validation` | never (deterministic) |
//! | `InvalidSchema` / `InvalidToken` | never |
//! | `UnresolvedConflict` | never (policy decision, caller may resubmit) |
//! | `BackendUnavailable` | bounded backoff, idempotent operations only |
//! | `Canceled` | never (outcome is unknown, caller may retry) |

use thiserror::Error;

use crate::schema::FieldType;
use crate::types::{RowId, StoreId};

/// Result type for row store operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All row store errors
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Store absent, or not visible to the requesting owner
    #[error("store not found: {0}")]
    StoreNotFound(StoreId),

    /// Row absent within an existing store
    #[error("row not found: {0}")]
    RowNotFound(RowId),

    /// Store id collision on creation
    #[error("store already exists: {0}")]
    AlreadyExists(StoreId),

    /// Candidate data violated the store's schema
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Submitted schema violated the schema naming rules
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Malformed continuation token on a paged listing
    #[error("invalid continuation token: {0}")]
    InvalidToken(String),

    /// Sibling resolution declined by the store's `reject` policy
    #[error("unresolved conflict on row {0}")]
    UnresolvedConflict(RowId),

    /// Backing store I/O failure or timeout
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Caller-initiated cancellation mid-operation
    ///
    /// A canceled write may or may not have landed; the outcome is
    /// unknown, not failed.
    #[error("operation canceled: {0}")]
    Canceled(String),

    /// Value could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Bug or invariant violation
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Canonical machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            Error::StoreNotFound(_) | Error::RowNotFound(_) => "NotFound",
            Error::AlreadyExists(_) => "AlreadyExists",
            Error::Validation(_) => "ValidationError",
            Error::InvalidSchema(_) => "InvalidSchema",
            Error::InvalidToken(_) => "InvalidToken",
            Error::UnresolvedConflict(_) => "UnresolvedConflict",
            Error::BackendUnavailable(_) => "BackendUnavailable",
            Error::Canceled(_) => "Canceled",
            Error::Serialization(_) => "SerializationError",
            Error::Internal(_) => "Internal",
        }
    }

    /// Whether a bounded internal retry may succeed
    ///
    /// Only transient backend failures qualify; everything else is either
    /// deterministic given current state or a policy decision.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::BackendUnavailable(_))
    }

    /// Whether this is a not-found condition (store or row)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::StoreNotFound(_) | Error::RowNotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Schema violation detected by the validator
///
/// Each variant names the offending field so the reason string is
/// actionable without consulting logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A field the schema marks required is absent from the data
    #[error("missing required field '{field}'")]
    MissingField {
        /// The absent field
        field: String,
    },

    /// A present field's value does not satisfy its declared type
    #[error("type mismatch for field '{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        /// The offending field
        field: String,
        /// The declared type
        expected: FieldType,
        /// The JSON type actually supplied
        actual: String,
    },

    /// A field absent from a strict schema was supplied
    #[error("unknown field '{field}'")]
    UnknownField {
        /// The undeclared field
        field: String,
    },
}
