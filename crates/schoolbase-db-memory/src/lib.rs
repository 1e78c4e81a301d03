//! In-memory tabular store for schoolbase.
//!
//! This crate provides an in-process implementation of the `TabularStore`
//! trait from `schoolbase-storage`. Tables are plain row vectors behind a
//! tokio `RwLock`; remote procedures are closures registered by the caller
//! and run while holding the write lock, so each call is atomic.
//!
//! # Example
//!
//! ```ignore
//! use schoolbase_db_memory::InMemoryStore;
//! use schoolbase_storage::{Columns, Filter, TabularStore};
//!
//! let store = InMemoryStore::new();
//! store.seed("profiles", vec![json!({"id": "u1", "email": "a@b.c"})]).await;
//! let rows = store
//!     .select("profiles", &Columns::All, &Filter::new().eq("id", "u1"))
//!     .await?;
//! ```

mod storage;
mod tables;

pub use schoolbase_storage::{StoreError, TabularStore};
pub use storage::{InMemoryStore, Operation, OperationKind, ProcedureHandler};
pub use tables::{ForeignKey, Tables};

/// Type alias for a shareable in-memory store.
pub type DynMemoryStore = std::sync::Arc<InMemoryStore>;
