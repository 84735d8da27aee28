//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// The first four variants are the caller-facing taxonomy; `Storage` carries
/// backend failures (driver errors, poisoned locks, undecodable payloads).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The addressed record does not exist (or is not in a state the
    /// operation can address).
    #[error("{entity} not found")]
    NotFound { entity: String },

    /// A caller-supplied value or the current record state makes the request
    /// invalid.
    #[error("invalid argument `{field}`: {message}")]
    Argument { field: String, message: String },

    /// A uniqueness constraint was violated.
    #[error("{entity} already in use: {}", fields.join(", "))]
    AlreadyInUse { entity: String, fields: Vec<String> },

    /// The store returned an inconsistent or transient answer; retry later.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    pub fn argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Argument {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn already_in_use<I, S>(entity: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AlreadyInUse {
            entity: entity.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Short machine-readable name of the variant, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Argument { .. } => "argument",
            Self::AlreadyInUse { .. } => "already_in_use",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Storage(_) => "storage",
        }
    }

    /// Whether the failure was caused by the request rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Argument { .. } | Self::AlreadyInUse { .. }
        )
    }
}
