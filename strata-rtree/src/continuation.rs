//! Resume tokens for paginated scans.
//!
//! A token is a format version byte followed by the bincode form of a
//! [`ScanPosition`]: the group of the last returned entry, that entry's
//! scan key and the number of results emitted so far. The key names a
//! position in the scan order rather than a place in the tree, so a token
//! stays valid while the tree changes shape between pages.

use crate::rtree::cursor::ScanKey;
use crate::rtree::storage::{decode_value, encode_value};
use crate::rtree::{RTreeError, RTreeResult, CONTINUATION_VERSION};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ScanPosition {
    pub group: Vec<u8>,
    /// `None` starts at `group` itself instead of inside it
    pub after: Option<ScanKey>,
    pub emitted: u64,
}

impl ScanPosition {
    /// Before the first group.
    pub fn start() -> ScanPosition {
        ScanPosition {
            group: Vec::new(),
            after: None,
            emitted: 0,
        }
    }
}

/// Opaque position of a paginated scan.
///
/// Tokens compare by their byte form. A scan returns no token once it is
/// complete.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Continuation {
    bytes: Vec<u8>,
}

impl Continuation {
    pub(crate) fn new(position: &ScanPosition) -> RTreeResult<Continuation> {
        let mut bytes = vec![CONTINUATION_VERSION];
        bytes.extend(encode_value(position)?);
        Ok(Continuation { bytes })
    }

    /// Restores a token from the bytes returned by [`Continuation::as_bytes`].
    ///
    /// # Errors
    /// `Validation` if the bytes are not a token of this format.
    pub fn from_bytes(bytes: &[u8]) -> RTreeResult<Continuation> {
        let continuation = Continuation {
            bytes: bytes.to_vec(),
        };
        continuation.position()?;
        Ok(continuation)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Number of results the scan emitted before this token.
    pub fn emitted(&self) -> RTreeResult<u64> {
        Ok(self.position()?.emitted)
    }

    pub(crate) fn position(&self) -> RTreeResult<ScanPosition> {
        match self.bytes.split_first() {
            Some((&CONTINUATION_VERSION, body)) => decode_value(body).map_err(|e| {
                RTreeError::Validation(format!("Malformed continuation: {}", e))
            }),
            Some((version, _)) => Err(RTreeError::Validation(format!(
                "Unsupported continuation version {}",
                version
            ))),
            None => Err(RTreeError::Validation("Empty continuation".to_string())),
        }
    }
}

impl Display for Continuation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for byte in &self.bytes {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
