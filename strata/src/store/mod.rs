//! Storage backends and abstractions.
//!
//! The storage layer is an ordered byte-keyed map. Engines implement
//! [`StoreProvider`] and are wrapped in a [`KvStore`] handle; everything
//! above this module (transactions, indexes) only ever talks to that trait.
//!
//! # Storage Providers
//!
//! - **In-Memory Store**: [`memory::InMemoryStore`] for tests and scratch data
//! - **Fjall Store**: `strata-fjall-adapter` for persistent, LSM-based storage

mod key_range;
mod kv_store;
pub mod memory;

pub use key_range::*;
pub use kv_store::*;
