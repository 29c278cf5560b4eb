//! Multidimensional index integration tests.
//!
//! Every read is checked against a brute-force evaluation of the same
//! predicate over all stored records.

mod common;
mod concurrency_test;
mod index_read_test;
mod maintenance_test;
mod nulls_test;
mod pagination_test;
mod persistence_test;
