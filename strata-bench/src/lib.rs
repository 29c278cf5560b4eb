//! Strata Benchmark Library
//!
//! Provides benchmark infrastructure for measuring the multidimensional
//! index across storage backends and layout options.

pub mod config;
pub mod data_gen;
pub mod stores;
