//! # schoolbase-storage
//!
//! Abstraction over the hosted relational store the admin tooling repairs.
//!
//! This crate defines the [`TabularStore`] trait, the filter and row types it
//! speaks, and [`StoreError`]. Backends live in separate crates:
//! `schoolbase-db-rest` talks to the hosted database over its REST gateway,
//! `schoolbase-db-memory` keeps tables in process for tests and rehearsals.
//!
//! ## Example
//!
//! ```ignore
//! use schoolbase_storage::{Columns, Filter, TabularStore, StoreError};
//!
//! async fn find_by_email(
//!     store: &dyn TabularStore,
//!     email: &str,
//! ) -> Result<Vec<Row>, StoreError> {
//!     store
//!         .select("profiles", &Columns::All, &Filter::new().eq("email", email))
//!         .await
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, RemoteErrorPayload, StoreError};
pub use traits::TabularStore;
pub use types::{Columns, Condition, Filter, FilterOp, Row, filter_text};

/// Type alias for a store result.
pub type StoreResult<T> = Result<T, StoreError>;

/// Type alias for a shareable store trait object.
pub type DynStore = std::sync::Arc<dyn TabularStore>;

pub mod prelude {
    pub use crate::error::{ErrorCategory, RemoteErrorPayload, StoreError};
    pub use crate::traits::TabularStore;
    pub use crate::types::{Columns, Condition, Filter, FilterOp, Row};
    pub use crate::{DynStore, StoreResult};
}
