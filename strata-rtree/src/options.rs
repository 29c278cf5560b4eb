use crate::hilbert::default_bits_per_dimension;
use crate::rtree::{RTreeError, RTreeResult, DEFAULT_MAX_FANOUT, DEFAULT_MIN_FANOUT};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Option key selecting the physical node layout.
pub const RTREE_STORAGE: &str = "rtreeStorage";
/// Option key controlling whether Hilbert values are persisted.
pub const RTREE_STORE_HILBERT_VALUES: &str = "rtreeStoreHilbertValues";
pub const RTREE_MIN_FANOUT: &str = "rtreeMinFanout";
pub const RTREE_MAX_FANOUT: &str = "rtreeMaxFanout";
pub const RTREE_SPLIT_STRATEGY: &str = "rtreeSplitStrategy";

/// Physical layout of tree nodes in the key-value store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StorageVariant {
    /// A node is one key whose value holds all of its entries.
    #[default]
    ByNode,
    /// Every entry of a node is its own key under the node's prefix.
    BySlot,
}

impl Display for StorageVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageVariant::ByNode => write!(f, "BY_NODE"),
            StorageVariant::BySlot => write!(f, "BY_SLOT"),
        }
    }
}

/// Heuristic used to divide an overflowing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SplitStrategy {
    /// Cut the Hilbert-ordered entries where overlap and area are smallest.
    #[default]
    Hilbert,
    /// Guttman's quadratic split.
    Quadratic,
}

impl Display for SplitStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitStrategy::Hilbert => write!(f, "HILBERT"),
            SplitStrategy::Quadratic => write!(f, "QUADRATIC"),
        }
    }
}

/// Layout and balancing options of a multidimensional index.
///
/// Options are fixed for the lifetime of the index data: they are persisted
/// when the index is first opened and changing them later requires a
/// rebuild.
///
/// # Examples
///
/// ```rust,ignore
/// use strata_rtree::{IndexOptions, StorageVariant};
///
/// let options = IndexOptions::new()
///     .storage(StorageVariant::BySlot)
///     .store_hilbert_values(false)
///     .fanout(4, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOptions {
    storage: StorageVariant,
    store_hilbert_values: bool,
    min_fanout: usize,
    max_fanout: usize,
    split_strategy: SplitStrategy,
    bits_per_dimension: Option<u32>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        IndexOptions {
            storage: StorageVariant::ByNode,
            store_hilbert_values: true,
            min_fanout: DEFAULT_MIN_FANOUT,
            max_fanout: DEFAULT_MAX_FANOUT,
            split_strategy: SplitStrategy::Hilbert,
            bits_per_dimension: None,
        }
    }
}

impl IndexOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn storage(mut self, storage: StorageVariant) -> Self {
        self.storage = storage;
        self
    }

    pub fn store_hilbert_values(mut self, store: bool) -> Self {
        self.store_hilbert_values = store;
        self
    }

    /// Sets the minimum and maximum number of entries per node.
    pub fn fanout(mut self, min: usize, max: usize) -> Self {
        self.min_fanout = min;
        self.max_fanout = max;
        self
    }

    pub fn split_strategy(mut self, strategy: SplitStrategy) -> Self {
        self.split_strategy = strategy;
        self
    }

    /// Overrides the Hilbert precision per dimension.
    pub fn bits_per_dimension(mut self, bits: u32) -> Self {
        self.bits_per_dimension = Some(bits);
        self
    }

    /// Parses options from string key-value pairs, e.g. index options of a
    /// record schema. Unknown keys are ignored.
    ///
    /// # Arguments
    /// * `map` - Option names (`rtreeStorage`, `rtreeStoreHilbertValues`,
    ///   `rtreeMinFanout`, `rtreeMaxFanout`, `rtreeSplitStrategy`) to values
    ///
    /// # Returns
    /// The parsed options, or a `Validation` error for an unparsable value.
    pub fn from_map(map: &HashMap<String, String>) -> RTreeResult<IndexOptions> {
        let mut options = IndexOptions::default();
        if let Some(value) = map.get(RTREE_STORAGE) {
            options.storage = match value.to_ascii_uppercase().as_str() {
                "BY_NODE" => StorageVariant::ByNode,
                "BY_SLOT" => StorageVariant::BySlot,
                other => return Err(invalid_option(RTREE_STORAGE, other)),
            };
        }
        if let Some(value) = map.get(RTREE_STORE_HILBERT_VALUES) {
            options.store_hilbert_values = value
                .parse::<bool>()
                .map_err(|_| invalid_option(RTREE_STORE_HILBERT_VALUES, value))?;
        }
        if let Some(value) = map.get(RTREE_MIN_FANOUT) {
            options.min_fanout = value
                .parse::<usize>()
                .map_err(|_| invalid_option(RTREE_MIN_FANOUT, value))?;
        }
        if let Some(value) = map.get(RTREE_MAX_FANOUT) {
            options.max_fanout = value
                .parse::<usize>()
                .map_err(|_| invalid_option(RTREE_MAX_FANOUT, value))?;
        }
        if let Some(value) = map.get(RTREE_SPLIT_STRATEGY) {
            options.split_strategy = match value.to_ascii_uppercase().as_str() {
                "HILBERT" => SplitStrategy::Hilbert,
                "QUADRATIC" => SplitStrategy::Quadratic,
                other => return Err(invalid_option(RTREE_SPLIT_STRATEGY, other)),
            };
        }
        Ok(options)
    }

    pub fn get_storage(&self) -> StorageVariant {
        self.storage
    }

    pub fn is_store_hilbert_values(&self) -> bool {
        self.store_hilbert_values
    }

    pub fn get_min_fanout(&self) -> usize {
        self.min_fanout
    }

    pub fn get_max_fanout(&self) -> usize {
        self.max_fanout
    }

    pub fn get_split_strategy(&self) -> SplitStrategy {
        self.split_strategy
    }

    /// Hilbert precision for a point of `dimensions` coordinates.
    pub fn get_bits_per_dimension(&self, dimensions: usize) -> u32 {
        self.bits_per_dimension
            .unwrap_or_else(|| default_bits_per_dimension(dimensions))
    }

    /// Checks that the options describe a balanced tree over `dimensions`.
    pub fn validate(&self, dimensions: usize) -> RTreeResult<()> {
        if self.min_fanout < 2 || self.min_fanout > self.max_fanout / 2 {
            return Err(RTreeError::Validation(format!(
                "Fanout must satisfy 2 <= min <= max / 2, got min {} and max {}",
                self.min_fanout, self.max_fanout
            )));
        }
        if let Some(bits) = self.bits_per_dimension {
            if bits == 0 || bits > 64 || bits as usize * dimensions > 128 {
                return Err(RTreeError::Validation(format!(
                    "{} bits per dimension do not fit {} dimensions",
                    bits, dimensions
                )));
            }
        }
        Ok(())
    }
}

fn invalid_option(key: &str, value: &str) -> RTreeError {
    RTreeError::Validation(format!("Invalid value '{}' for option {}", value, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = IndexOptions::default();
        assert_eq!(options.get_storage(), StorageVariant::ByNode);
        assert!(options.is_store_hilbert_values());
        assert_eq!(options.get_min_fanout(), 16);
        assert_eq!(options.get_max_fanout(), 32);
        assert_eq!(options.get_split_strategy(), SplitStrategy::Hilbert);
        assert_eq!(options.get_bits_per_dimension(2), 64);
        assert_eq!(options.get_bits_per_dimension(3), 42);
        assert!(options.validate(2).is_ok());
    }

    #[test]
    fn test_from_map() {
        let map: HashMap<String, String> = [
            (RTREE_STORAGE, "BY_SLOT"),
            (RTREE_STORE_HILBERT_VALUES, "false"),
            (RTREE_MIN_FANOUT, "3"),
            (RTREE_MAX_FANOUT, "6"),
            (RTREE_SPLIT_STRATEGY, "quadratic"),
            ("somethingElse", "ignored"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let options = IndexOptions::from_map(&map).unwrap();
        assert_eq!(
            options,
            IndexOptions::new()
                .storage(StorageVariant::BySlot)
                .store_hilbert_values(false)
                .fanout(3, 6)
                .split_strategy(SplitStrategy::Quadratic)
        );
    }

    #[test]
    fn test_from_map_rejects_garbage() {
        let mut map = HashMap::new();
        map.insert(RTREE_STORAGE.to_string(), "BY_PAGE".to_string());
        assert!(matches!(
            IndexOptions::from_map(&map),
            Err(RTreeError::Validation(_))
        ));

        let mut map = HashMap::new();
        map.insert(RTREE_MAX_FANOUT.to_string(), "many".to_string());
        assert!(IndexOptions::from_map(&map).is_err());
    }

    #[test]
    fn test_validate_fanout() {
        assert!(IndexOptions::new().fanout(2, 4).validate(2).is_ok());
        assert!(IndexOptions::new().fanout(1, 4).validate(2).is_err());
        assert!(IndexOptions::new().fanout(3, 5).validate(2).is_err());
        assert!(IndexOptions::new().bits_per_dimension(50).validate(3).is_err());
        assert!(IndexOptions::new().bits_per_dimension(32).validate(4).is_ok());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(StorageVariant::BySlot.to_string(), "BY_SLOT");
        assert_eq!(SplitStrategy::Quadratic.to_string(), "QUADRATIC");
    }
}
