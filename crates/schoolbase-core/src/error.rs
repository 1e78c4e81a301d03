use thiserror::Error;

/// Errors raised while building or checking domain values locally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Unknown plan tier: {0}")]
    UnknownTier(String),

    #[error("Unknown seat status: {0}")]
    UnknownSeatStatus(String),

    #[error("Entitlement invariant violated: {0}")]
    Entitlement(String),
}

impl CoreError {
    /// Create a new InvalidValue error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new Entitlement error
    pub fn entitlement(message: impl Into<String>) -> Self {
        Self::Entitlement(message.into())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
