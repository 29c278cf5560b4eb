//! # Strata - Ordered Transactional Key-Value Substrate
//!
//! Strata is the storage foundation the index crates are built on: an
//! ordered byte-keyed store behind a pluggable provider trait, an
//! order-preserving tuple encoding for composite keys, and optimistic
//! transactions with conflict detection and retry.
//!
//! ## Key Features
//!
//! - **Ordered Keys**: lexicographic byte order with range scans in both directions
//! - **Tuple Encoding**: packed tuples sort exactly like the values they hold, nulls first
//! - **Optimistic Transactions**: read-your-writes, validated at commit, retried on conflict
//! - **Multiple Storage Backends**: in-memory skip list and pluggable store providers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strata::store::memory::InMemoryStore;
//! use strata::transaction::Database;
//! use strata::{tuple, common::Subspace};
//!
//! let db = Database::builder().store(InMemoryStore::default()).open()?;
//! let users = Subspace::from_tuple(&tuple!["users"]);
//!
//! db.run(|tx| tx.set(&users.pack(&tuple![42i64]), b"alice"))?;
//! ```
//!
//! ## Module Organization
//!
//! - [`common`] - Values, tuples, subspaces and small concurrency helpers
//! - [`errors`] - Error types and result definitions
//! - [`store`] - Storage provider abstraction and the in-memory store
//! - [`transaction`] - Optimistic transactions and the retry loop

pub mod common;
pub mod errors;
pub mod store;
pub mod transaction;

#[cfg(test)]
mod tests {
    // Setup only one time throughout the crate's tests.
    #[ctor::ctor]
    fn init() {
        colog::init();
    }
}
