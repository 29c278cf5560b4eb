//! Persistent storage for strata on the Fjall LSM-tree engine.
//!
//! [`FjallStore`] implements [`StoreProvider`](strata::store::StoreProvider),
//! so it can back a [`Database`](strata::transaction::Database) in place of
//! the in-memory store.

mod config;
mod error;
mod store;

pub use config::*;
pub use error::FjallStoreError;
pub use store::*;
