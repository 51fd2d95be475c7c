use thiserror::Error;

use crate::{ErrorCode, Status};

/// Errors that can occur when acquiring memory for a container.
///
/// Every error leaves the container that reported it in the state it had before the failed
/// operation started. No operation retries internally.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The underlying aligned memory primitive could not satisfy a request.
    #[error("failed to allocate {bytes} bytes aligned to {align}")]
    BadAlloc {
        /// Number of bytes that were requested.
        bytes: usize,

        /// Alignment that was requested.
        align: usize,
    },

    /// The requested number of items cannot be represented as an allocation size.
    #[error("cannot allocate {count} items of {item_size} bytes each")]
    BadSize {
        /// Number of items that were requested.
        count: usize,

        /// Size of a single item in bytes.
        item_size: usize,
    },
}

impl Error {
    /// The status code form of the error, for callers that report errors as codes.
    ///
    /// # Example
    ///
    /// ```
    /// use raw_memory::{Error, ErrorCode};
    ///
    /// let error = Error::BadAlloc { bytes: 64, align: 16 };
    /// assert_eq!(error.code(), ErrorCode::BadAlloc);
    /// ```
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BadAlloc { .. } => ErrorCode::BadAlloc,
            Self::BadSize { .. } => ErrorCode::BadSize,
        }
    }

    /// The status an operation reports when it fails with this error.
    ///
    /// Memory errors are never recoverable by the operation that hit them, so this is always
    /// [`Status::Fatal`].
    #[must_use]
    #[expect(
        clippy::unused_self,
        reason = "keeps the mapping next to code() in case non-fatal errors are added"
    )]
    pub fn status(&self) -> Status {
        Status::Fatal
    }
}

/// A specialized `Result` type for memory operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug, Clone);

    #[test]
    fn codes_match_variants() {
        assert_eq!(
            Error::BadAlloc { bytes: 1, align: 16 }.code(),
            ErrorCode::BadAlloc
        );
        assert_eq!(
            Error::BadSize {
                count: 2,
                item_size: 3
            }
            .code(),
            ErrorCode::BadSize
        );
    }

    #[test]
    fn every_error_is_fatal() {
        assert_eq!(
            Error::BadAlloc { bytes: 1, align: 16 }.status(),
            Status::Fatal
        );
        assert_eq!(
            Error::BadSize {
                count: 2,
                item_size: 3
            }
            .status(),
            Status::Fatal
        );
    }

    #[test]
    fn display_mentions_request() {
        let message = Error::BadAlloc {
            bytes: 128,
            align: 16,
        }
        .to_string();

        assert!(message.contains("128"));
        assert!(message.contains("16"));
    }
}
