//! Common types shared by the substrate and the index crates: values,
//! order-preserving tuples, subspaces and small concurrency helpers.

mod subspace;
mod tuple;
mod type_utils;
mod value;

pub use subspace::*;
pub use tuple::*;
pub use type_utils::*;
pub use value::*;
