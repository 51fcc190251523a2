//! Offline-first sync core for the pocketledger finance tracker.
//!
//! Transactions and categories are stored locally first and reconciled with
//! a remote backend in the background.

pub mod categories;
pub mod config;
pub mod context;
pub mod errors;
pub mod sync;
pub mod transactions;

pub use errors::{Error, Result};
