pub mod auth;
pub mod procedures;
pub mod reconcile;
