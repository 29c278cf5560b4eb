use crate::options::IndexOptions;
use crate::rtree::{RTreeError, RTreeResult, MAX_VALUE_DIMENSIONS};
use std::collections::HashSet;
use std::fmt::{Display, Formatter};

/// Declared type of an indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DimensionType {
    Int64,
    Float64,
    String,
    Bytes,
    Boolean,
}

impl DimensionType {
    /// Returns `true` if values of this type can be placed on a spatial axis.
    pub fn is_spatial(&self) -> bool {
        matches!(self, DimensionType::Int64 | DimensionType::Float64)
    }
}

impl Display for DimensionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DimensionType::Int64 => write!(f, "int64"),
            DimensionType::Float64 => write!(f, "float64"),
            DimensionType::String => write!(f, "string"),
            DimensionType::Bytes => write!(f, "bytes"),
            DimensionType::Boolean => write!(f, "boolean"),
        }
    }
}

/// A named, typed field of the index key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionDef {
    pub name: String,
    pub dimension_type: DimensionType,
}

impl DimensionDef {
    pub fn new(name: &str, dimension_type: DimensionType) -> Self {
        DimensionDef {
            name: name.to_string(),
            dimension_type,
        }
    }
}

/// Structure of a multidimensional index.
///
/// The index key of a record is its group tuple followed by its value
/// dimensions. Every distinct group owns an independent tree; the value
/// dimensions are the axes of that tree.
///
/// # Examples
///
/// ```rust,ignore
/// use strata_rtree::{DimensionType, IndexDefinition};
///
/// let definition = IndexDefinition::builder("calendar")
///     .group("calendar_name", DimensionType::String)
///     .dimension("start_epoch", DimensionType::Int64)
///     .dimension("end_epoch", DimensionType::Int64)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    name: String,
    group_dimensions: Vec<DimensionDef>,
    value_dimensions: Vec<DimensionDef>,
    options: IndexOptions,
}

impl IndexDefinition {
    pub fn builder(name: &str) -> IndexDefinitionBuilder {
        IndexDefinitionBuilder {
            name: name.to_string(),
            group_dimensions: Vec::new(),
            value_dimensions: Vec::new(),
            options: IndexOptions::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group_dimensions(&self) -> &[DimensionDef] {
        &self.group_dimensions
    }

    pub fn value_dimensions(&self) -> &[DimensionDef] {
        &self.value_dimensions
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// Number of value (spatial) dimensions.
    pub fn dimensions(&self) -> usize {
        self.value_dimensions.len()
    }

    pub fn bits_per_dimension(&self) -> u32 {
        self.options.get_bits_per_dimension(self.dimensions())
    }

    /// Locates a dimension by name.
    pub(crate) fn find(&self, name: &str) -> Option<DimensionRef<'_>> {
        if let Some(pos) = self.group_dimensions.iter().position(|d| d.name == name) {
            return Some(DimensionRef::Group(pos, &self.group_dimensions[pos]));
        }
        self.value_dimensions
            .iter()
            .position(|d| d.name == name)
            .map(|pos| DimensionRef::Value(pos, &self.value_dimensions[pos]))
    }

    /// Same structure with different options, used when rebuilding.
    pub fn with_options(&self, options: IndexOptions) -> RTreeResult<IndexDefinition> {
        options.validate(self.dimensions())?;
        Ok(IndexDefinition {
            options,
            ..self.clone()
        })
    }
}

/// Position of a named dimension inside the index key.
#[derive(Debug, Clone, Copy)]
pub(crate) enum DimensionRef<'a> {
    Group(usize, &'a DimensionDef),
    Value(usize, &'a DimensionDef),
}

/// Builder for [`IndexDefinition`].
pub struct IndexDefinitionBuilder {
    name: String,
    group_dimensions: Vec<DimensionDef>,
    value_dimensions: Vec<DimensionDef>,
    options: IndexOptions,
}

impl IndexDefinitionBuilder {
    /// Appends a grouping dimension.
    pub fn group(mut self, name: &str, dimension_type: DimensionType) -> Self {
        self.group_dimensions
            .push(DimensionDef::new(name, dimension_type));
        self
    }

    /// Appends a value (spatial) dimension.
    pub fn dimension(mut self, name: &str, dimension_type: DimensionType) -> Self {
        self.value_dimensions
            .push(DimensionDef::new(name, dimension_type));
        self
    }

    pub fn options(mut self, options: IndexOptions) -> Self {
        self.options = options;
        self
    }

    /// Validates and builds the definition.
    ///
    /// # Errors
    /// * `InvalidDimensionType` if a value dimension is not numeric
    /// * `Validation` for a missing or duplicate dimension, too many value
    ///   dimensions, or inconsistent options
    pub fn build(self) -> RTreeResult<IndexDefinition> {
        if self.value_dimensions.is_empty() {
            return Err(RTreeError::Validation(format!(
                "Index {} declares no value dimension",
                self.name
            )));
        }
        if self.value_dimensions.len() > MAX_VALUE_DIMENSIONS {
            return Err(RTreeError::Validation(format!(
                "Index {} declares {} value dimensions, at most {} are supported",
                self.name,
                self.value_dimensions.len(),
                MAX_VALUE_DIMENSIONS
            )));
        }

        let mut names = HashSet::new();
        for dim in self.group_dimensions.iter().chain(&self.value_dimensions) {
            if !names.insert(dim.name.as_str()) {
                return Err(RTreeError::Validation(format!(
                    "Dimension {} is declared twice in index {}",
                    dim.name, self.name
                )));
            }
        }

        if let Some(dim) = self
            .value_dimensions
            .iter()
            .find(|d| !d.dimension_type.is_spatial())
        {
            log::error!(
                "Index {} rejects {} dimension {}",
                self.name,
                dim.dimension_type,
                dim.name
            );
            return Err(RTreeError::InvalidDimensionType(format!(
                "Dimension {} of type {} cannot be indexed spatially",
                dim.name, dim.dimension_type
            )));
        }

        self.options.validate(self.value_dimensions.len())?;

        Ok(IndexDefinition {
            name: self.name,
            group_dimensions: self.group_dimensions,
            value_dimensions: self.value_dimensions,
            options: self.options,
        })
    }
}
