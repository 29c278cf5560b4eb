//! Benchmark configuration

use strata_rtree::{IndexOptions, SplitStrategy, StorageVariant};

/// Storage backend type for benchmarks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreType {
    /// In-memory storage (fast, no persistence)
    InMemory,
    /// Fjall persistent storage
    Fjall,
}

impl std::fmt::Display for StoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreType::InMemory => write!(f, "inmemory"),
            StoreType::Fjall => write!(f, "fjall"),
        }
    }
}

/// A named index layout to benchmark.
#[derive(Debug, Clone)]
pub struct Layout {
    pub name: String,
    pub options: IndexOptions,
}

/// Both storage variants with Hilbert splits and stored Hilbert values,
/// plus the quadratic split over `BY_NODE`.
pub fn layouts() -> Vec<Layout> {
    let mut layouts: Vec<Layout> = [StorageVariant::ByNode, StorageVariant::BySlot]
        .into_iter()
        .map(|storage| Layout {
            name: storage.to_string().to_lowercase(),
            options: IndexOptions::new().storage(storage),
        })
        .collect();
    layouts.push(Layout {
        name: "by_node_quadratic".to_string(),
        options: IndexOptions::new().split_strategy(SplitStrategy::Quadratic),
    });
    layouts
}

/// Configuration for benchmark runs
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Record counts to benchmark
    pub record_counts: Vec<usize>,
    /// Records saved per transaction while loading
    pub batch_size: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            record_counts: vec![100, 1_000, 10_000],
            batch_size: 500,
        }
    }
}

impl BenchmarkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quick config with smaller record counts for fast testing
    pub fn quick() -> Self {
        Self {
            record_counts: vec![100, 1_000],
            ..Default::default()
        }
    }
}
