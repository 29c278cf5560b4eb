use crate::common::strinc;
use std::cmp::Ordering;
use std::ops::Bound;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A half-open range of keys: `begin` is inclusive, `end` is exclusive and
/// `None` means unbounded above.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeyRange {
    begin: Vec<u8>,
    end: Option<Vec<u8>>,
}

impl KeyRange {
    pub fn new(begin: Vec<u8>, end: Option<Vec<u8>>) -> KeyRange {
        KeyRange { begin, end }
    }

    /// All keys starting with `prefix`.
    pub fn prefix(prefix: &[u8]) -> KeyRange {
        KeyRange {
            begin: prefix.to_vec(),
            end: strinc(prefix),
        }
    }

    /// The whole key space.
    pub fn all() -> KeyRange {
        KeyRange {
            begin: Vec::new(),
            end: None,
        }
    }

    #[inline]
    pub fn begin(&self) -> &[u8] {
        &self.begin
    }

    #[inline]
    pub fn end(&self) -> Option<&[u8]> {
        self.end.as_deref()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.begin.as_slice() && self.end.as_deref().map_or(true, |end| key < end)
    }

    pub fn is_empty(&self) -> bool {
        match &self.end {
            Some(end) => end.as_slice() <= self.begin.as_slice(),
            None => false,
        }
    }

    pub fn intersects(&self, other: &KeyRange) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        let below_other_end = other
            .end
            .as_deref()
            .map_or(true, |end| self.begin.as_slice() < end);
        let above_other_begin = self
            .end
            .as_deref()
            .map_or(true, |end| other.begin.as_slice() < end);
        below_other_end && above_other_begin
    }

    /// Same range with a tighter exclusive upper end.
    pub fn with_end(&self, end: Vec<u8>) -> KeyRange {
        let end = match &self.end {
            Some(current) if current.as_slice().cmp(end.as_slice()) == Ordering::Less => {
                current.clone()
            }
            _ => end,
        };
        KeyRange {
            begin: self.begin.clone(),
            end: Some(end),
        }
    }

    /// Same range with a tighter inclusive lower begin.
    pub fn with_begin(&self, begin: Vec<u8>) -> KeyRange {
        let begin = if begin < self.begin {
            self.begin.clone()
        } else {
            begin
        };
        KeyRange {
            begin,
            end: self.end.clone(),
        }
    }

    /// `(Bound, Bound)` pair accepted by ordered maps.
    pub fn to_bounds(&self) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
        let end = match &self.end {
            Some(end) => Bound::Excluded(end.clone()),
            None => Bound::Unbounded,
        };
        (Bound::Included(self.begin.clone()), end)
    }
}

/// The key immediately after `key` in byte order.
pub fn key_after(key: &[u8]) -> Vec<u8> {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0x00);
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_range_contains_extensions_only() {
        let range = KeyRange::prefix(&[0x01, 0x02]);
        assert!(range.contains(&[0x01, 0x02]));
        assert!(range.contains(&[0x01, 0x02, 0xFF, 0xFF]));
        assert!(!range.contains(&[0x01, 0x03]));
        assert!(!range.contains(&[0x01]));
    }

    #[test]
    fn unbounded_range() {
        let range = KeyRange::prefix(&[0xFF]);
        assert_eq!(range.end(), None);
        assert!(range.contains(&[0xFF, 0xFF, 0x00]));
        assert!(KeyRange::all().contains(&[]));
    }

    #[test]
    fn intersection() {
        let a = KeyRange::new(vec![1], Some(vec![5]));
        let b = KeyRange::new(vec![4], Some(vec![9]));
        let c = KeyRange::new(vec![5], None);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(b.intersects(&c));
        assert!(!KeyRange::new(vec![3], Some(vec![3])).intersects(&KeyRange::all()));
    }

    #[test]
    fn narrowing() {
        let range = KeyRange::new(vec![1], Some(vec![9]));
        assert_eq!(range.with_end(vec![4]).end(), Some(&[4u8][..]));
        assert_eq!(range.with_end(vec![12]).end(), Some(&[9u8][..]));
        assert_eq!(range.with_begin(vec![0]).begin(), &[1]);
        assert_eq!(range.with_begin(vec![3]).begin(), &[3]);
    }

    #[test]
    fn key_after_is_immediate_successor() {
        let key = vec![0x01, 0x02];
        let next = key_after(&key);
        assert!(next > key);
        assert_eq!(next, vec![0x01, 0x02, 0x00]);
    }
}
