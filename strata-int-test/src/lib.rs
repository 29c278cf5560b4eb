//! Shared fixtures for the strata integration tests: the calendar event
//! model and its generators, and the database context harness.

pub mod records;
pub mod test_util;
