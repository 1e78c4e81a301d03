//! Reconciliation error types.

use std::fmt;

use schoolbase_core::CoreError;
use schoolbase_storage::StoreError;
use serde::Serialize;
use serde_json::Value;

/// Why a reconciliation step failed.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The filter matched zero rows.
    #[error("No row in {table} matches {filter}")]
    NotFound { table: String, filter: String },

    /// The filter matched more than one row where exactly one was expected.
    #[error("{count} rows in {table} match {filter}; refusing to pick one")]
    AmbiguousMatch {
        table: String,
        filter: String,
        count: usize,
    },

    /// The store rejected a read, write or procedure call.
    #[error("{operation} failed: {source}")]
    Store {
        /// The attempted operation, e.g. `update profiles where id=eq.U1`.
        operation: String,
        /// Fields or arguments that were sent, if any.
        payload: Option<Value>,
        #[source]
        source: StoreError,
    },

    /// Input rejected locally before anything was sent.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The re-fetched row does not show the state the write should have produced.
    #[error("Verification failed: {0}")]
    Verification(String),
}

impl ReconcileError {
    pub fn not_found(table: impl Into<String>, filter: impl fmt::Display) -> Self {
        Self::NotFound {
            table: table.into(),
            filter: filter.to_string(),
        }
    }

    pub fn ambiguous(table: impl Into<String>, filter: impl fmt::Display, count: usize) -> Self {
        Self::AmbiguousMatch {
            table: table.into(),
            filter: filter.to_string(),
            count,
        }
    }

    pub fn store(operation: impl Into<String>, payload: Option<Value>, source: StoreError) -> Self {
        Self::Store {
            operation: operation.into(),
            payload,
            source,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn verification(message: impl Into<String>) -> Self {
        Self::Verification(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AmbiguousMatch { .. } => ErrorKind::AmbiguousMatch,
            Self::Store { .. } => ErrorKind::Store,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Verification(_) => ErrorKind::Verification,
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

impl From<CoreError> for ReconcileError {
    fn from(e: CoreError) -> Self {
        Self::Validation(e.to_string())
    }
}

/// Stable, machine-readable name of each failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AmbiguousMatch,
    Store,
    Validation,
    Verification,
}

impl ErrorKind {
    /// Exit codes 0-2 are taken by success, generic failure and usage errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::NotFound => 3,
            ErrorKind::AmbiguousMatch => 4,
            ErrorKind::Store => 5,
            ErrorKind::Validation => 6,
            ErrorKind::Verification => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::AmbiguousMatch => "ambiguous_match",
            ErrorKind::Store => "store",
            ErrorKind::Validation => "validation",
            ErrorKind::Verification => "verification",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
