use crate::common::{pack, unpack, Tuple, Value};
use crate::errors::{ErrorKind, StrataError, StrataResult};
use crate::store::KeyRange;

/// A byte prefix that carves a private region out of the ordered key space.
///
/// Keys are built by appending packed tuples (or raw suffixes) to the
/// prefix, so every key of a subspace sorts inside [`Subspace::range`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subspace {
    prefix: Vec<u8>,
}

impl Subspace {
    pub fn new(prefix: Vec<u8>) -> Subspace {
        Subspace { prefix }
    }

    pub fn from_tuple(values: &[Value]) -> Subspace {
        Subspace {
            prefix: pack(values),
        }
    }

    #[inline]
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Nested subspace whose prefix is this prefix followed by `values`.
    pub fn sub(&self, values: &[Value]) -> Subspace {
        Subspace {
            prefix: self.pack(values),
        }
    }

    pub fn pack(&self, values: &[Value]) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(&pack(values));
        key
    }

    /// Prefix followed by an arbitrary raw suffix.
    pub fn key(&self, suffix: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len() + suffix.len());
        key.extend_from_slice(&self.prefix);
        key.extend_from_slice(suffix);
        key
    }

    #[inline]
    pub fn contains(&self, key: &[u8]) -> bool {
        key.starts_with(&self.prefix)
    }

    /// Strips the prefix, failing if the key lies outside this subspace.
    pub fn strip<'a>(&self, key: &'a [u8]) -> StrataResult<&'a [u8]> {
        key.strip_prefix(self.prefix.as_slice()).ok_or_else(|| {
            StrataError::new(
                "Key does not belong to the subspace",
                ErrorKind::EncodingError,
            )
        })
    }

    pub fn unpack(&self, key: &[u8]) -> StrataResult<Tuple> {
        unpack(self.strip(key)?)
    }

    /// Every key under this subspace.
    pub fn range(&self) -> KeyRange {
        KeyRange::prefix(&self.prefix)
    }
}
