//! Optimistic transactions over a [`StoreProvider`](crate::store::StoreProvider).
//!
//! A [`Database`] hands out [`Transaction`]s that buffer writes and record
//! their reads. Commits are validated against every commit that happened
//! since the transaction started; losers fail with
//! [`ErrorKind::TransactionConflict`](crate::errors::ErrorKind::TransactionConflict)
//! and can be re-run with [`Database::run`].

mod core;
mod database;
#[allow(clippy::module_inception)]
mod transaction;

pub use self::core::{TransactionConfig, TransactionState};
pub use database::{Database, DatabaseBuilder};
pub use transaction::Transaction;
