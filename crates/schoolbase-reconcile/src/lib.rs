//! # schoolbase-reconcile
//!
//! Resolve one row, derive a single write from it, apply the write, re-fetch
//! and verify, recording every step in a [`RunReport`].
//!
//! The primitive operations live on [`Runner`]: `fetch_single`,
//! `apply_patch`, `invoke_procedure` and `delete_by_ids`. Concrete repairs
//! implement [`Reconciliation`] and are driven by [`Runner::run`].
//!
//! Writes that touch more than one table go through a typed [`Procedure`]
//! so the store applies them in one transaction.

pub mod error;
pub mod procedures;
pub mod recipe;
pub mod report;
pub mod runner;
pub mod tasks;

pub use error::{ErrorKind, ReconcileError};
pub use procedures::{
    AssignUsageTier, KNOWN_PROCEDURES, Procedure, ProcedureCall, ProcedureInfo, StartTrial,
    decode_response, install_script,
};
pub use recipe::{Deletion, Mutation, MutationOutcome, Plan, Reconciliation};
pub use report::{ErrorReport, FieldChange, RunReport, RunState, StepRecord, diff_rows};
pub use runner::{RunFailure, RunMode, Runner, target_id};
pub use tasks::{
    BackfillName, NameSource, PatchFields, RemoveDuplicates, SetTier, StartTrialRun, Target,
};
