use std::error::Error;
use strata::errors::{ErrorKind, StrataError};
use thiserror::Error;

/// Errors raised by the adapter itself, before Fjall is involved.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FjallStoreError {
    #[error("No database path configured")]
    MissingPath,
    #[error("Invalid partition name '{0}': only a-z, A-Z, 0-9, _, -, ., # and $ are allowed")]
    InvalidPartitionName(String),
    #[error("Store is not opened")]
    NotOpened,
}

impl From<FjallStoreError> for StrataError {
    fn from(err: FjallStoreError) -> Self {
        let kind = match err {
            FjallStoreError::MissingPath | FjallStoreError::InvalidPartitionName(_) => {
                ErrorKind::ValidationError
            }
            FjallStoreError::NotOpened => ErrorKind::StoreNotInitialized,
        };
        StrataError::new(&err.to_string(), kind)
    }
}

/// Maps a Fjall error onto the closest strata error kind.
pub(crate) fn to_strata_error(error: impl Error) -> StrataError {
    let error_msg = error.to_string();
    let error_kind = if error_msg.contains("closed") {
        ErrorKind::StoreAlreadyClosed
    } else if error_msg.contains("deleted") || error_msg.contains("PartitionDeleted") {
        ErrorKind::StoreNotInitialized
    } else if error_msg.contains("Io") || error_msg.contains("I/O") {
        ErrorKind::IOError
    } else {
        ErrorKind::BackendError
    };
    StrataError::new(&format!("Fjall Error: {}", error_msg), error_kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Failure(&'static str);

    impl std::fmt::Display for Failure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl Error for Failure {}

    #[test]
    fn test_error_kinds() {
        let err = to_strata_error(Failure("keyspace closed"));
        assert_eq!(*err.kind(), ErrorKind::StoreAlreadyClosed);
        assert!(err.message().starts_with("Fjall Error:"));
        assert_eq!(
            *to_strata_error(Failure("PartitionDeleted")).kind(),
            ErrorKind::StoreNotInitialized
        );
        assert_eq!(
            *to_strata_error(Failure("checksum mismatch")).kind(),
            ErrorKind::BackendError
        );
    }

    #[test]
    fn test_adapter_errors() {
        let err: StrataError = FjallStoreError::MissingPath.into();
        assert_eq!(*err.kind(), ErrorKind::ValidationError);
        let err: StrataError = FjallStoreError::NotOpened.into();
        assert_eq!(*err.kind(), ErrorKind::StoreNotInitialized);
    }
}
