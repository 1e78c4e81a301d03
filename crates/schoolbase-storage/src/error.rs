//! Store error types.
//!
//! Every failure that crosses the [`TabularStore`](crate::TabularStore)
//! boundary is a [`StoreError`]. Rejections from the remote store keep the
//! payload it sent so operators see exactly what the database reported.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error body returned by the remote store when it rejects a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteErrorPayload {
    /// Database or gateway error code (e.g. `23503`, `PGRST202`).
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl RemoteErrorPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Parses a response body, falling back to the raw text as the message.
    pub fn from_body(body: &str) -> Self {
        match serde_json::from_str::<RemoteErrorPayload>(body) {
            Ok(payload) if !payload.message.is_empty() || payload.code.is_some() => payload,
            _ => Self::new(body.trim()),
        }
    }

    /// SQLSTATE class 23: integrity constraint violation.
    pub fn is_constraint_violation(&self) -> bool {
        self.code.as_deref().is_some_and(|c| c.starts_with("23"))
    }
}

impl fmt::Display for RemoteErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = &self.code {
            write!(f, "[{code}] ")?;
        }
        write!(f, "{}", self.message)?;
        if let Some(details) = &self.details {
            write!(f, " ({details})")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " hint: {hint}")?;
        }
        Ok(())
    }
}

/// Errors that can occur while talking to the tabular store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store received the request and rejected it.
    #[error("Store rejected request (HTTP {status}): {payload}")]
    Remote {
        /// HTTP status of the rejection.
        status: u16,
        /// Error body exactly as the store reported it.
        payload: RemoteErrorPayload,
    },

    /// The request never reached the store or the connection dropped.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the transport failure.
        message: String,
    },

    /// The store answered with something that could not be decoded.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the decoding failure.
        message: String,
    },

    /// The request was refused locally before being sent.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Why the request was refused.
        message: String,
    },
}

impl StoreError {
    /// Creates a new `Remote` error.
    #[must_use]
    pub fn remote(status: u16, payload: RemoteErrorPayload) -> Self {
        Self::Remote { status, payload }
    }

    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Decode` error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// The remote payload, when the store itself rejected the request.
    #[must_use]
    pub fn payload(&self) -> Option<&RemoteErrorPayload> {
        match self {
            Self::Remote { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Returns the error category for logging.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Remote { status, payload } => match *status {
                401 | 403 => ErrorCategory::Auth,
                _ if payload.is_constraint_violation() => ErrorCategory::Constraint,
                409 => ErrorCategory::Constraint,
                500.. => ErrorCategory::Infrastructure,
                _ => ErrorCategory::Rejected,
            },
            Self::Connection { .. } => ErrorCategory::Infrastructure,
            Self::Decode { .. } => ErrorCategory::Decode,
            Self::InvalidRequest { .. } => ErrorCategory::InvalidRequest,
        }
    }
}

/// Categories of store errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Credential missing or lacking privileges.
    Auth,
    /// Constraint violation (unique, foreign key, check).
    Constraint,
    /// Any other rejection by the store.
    Rejected,
    /// Network or server-side failure.
    Infrastructure,
    /// Unreadable response.
    Decode,
    /// Refused before sending.
    InvalidRequest,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth => write!(f, "auth"),
            Self::Constraint => write!(f, "constraint"),
            Self::Rejected => write!(f, "rejected"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Decode => write!(f, "decode"),
            Self::InvalidRequest => write!(f, "invalid_request"),
        }
    }
}
