use crate::Error;

/// Result status of an operation, for callers that work with status codes rather than [`Result`].
///
/// The numeric values are stable and may be passed across a foreign function boundary.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u32)]
#[allow(
    clippy::exhaustive_enums,
    reason = "the set of status codes is closed and callers match on all of them"
)]
pub enum Status {
    /// Generic failure, "no" or "not found".
    No = 0,

    /// Success.
    Ok = 1,

    /// An error without further details.
    Err = 2,

    /// The operation was canceled.
    Canceled = 3,

    /// The operation failed in a way the caller cannot recover from, such as running out of
    /// memory during a required allocation.
    Fatal = 4,
}

impl Status {
    /// Whether this status signals success.
    #[must_use]
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

/// Specific error code written to the optional error slot of a failed operation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u32)]
#[allow(
    clippy::exhaustive_enums,
    reason = "the set of error codes is closed and callers match on all of them"
)]
pub enum ErrorCode {
    /// The aligned memory primitive returned no memory.
    BadAlloc = 1,

    /// A size request was invalid.
    BadSize = 2,
}

/// Converts the result of a container operation into a [`Status`], writing the specific
/// [`ErrorCode`] into `slot` if the operation failed and a slot was supplied.
///
/// When the operation succeeded, the slot is left untouched.
///
/// # Example
///
/// ```
/// use raw_memory::{Error, ErrorCode, Status, report};
///
/// let failed: Result<(), Error> = Err(Error::BadAlloc { bytes: 64, align: 16 });
///
/// let mut code = None;
/// let status = report(&failed, Some(&mut code));
///
/// assert_eq!(status, Status::Fatal);
/// assert_eq!(code, Some(ErrorCode::BadAlloc));
///
/// // Without a slot, only the status is reported.
/// assert_eq!(report(&failed, None), Status::Fatal);
/// ```
pub fn report<T>(result: &Result<T, Error>, slot: Option<&mut Option<ErrorCode>>) -> Status {
    match result {
        Ok(_) => Status::Ok,
        Err(error) => {
            if let Some(slot) = slot {
                *slot = Some(error.code());
            }

            error.status()
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn numeric_values_are_stable() {
        assert_eq!(Status::No as u32, 0);
        assert_eq!(Status::Ok as u32, 1);
        assert_eq!(Status::Err as u32, 2);
        assert_eq!(Status::Canceled as u32, 3);
        assert_eq!(Status::Fatal as u32, 4);
    }

    #[test]
    fn only_ok_is_ok() {
        assert!(Status::Ok.is_ok());
        assert!(!Status::No.is_ok());
        assert!(!Status::Err.is_ok());
        assert!(!Status::Canceled.is_ok());
        assert!(!Status::Fatal.is_ok());
    }

    #[test]
    fn success_leaves_slot_untouched() {
        let result: Result<u32, Error> = Ok(5);

        let mut code = Some(ErrorCode::BadSize);
        assert_eq!(report(&result, Some(&mut code)), Status::Ok);
        assert_eq!(code, Some(ErrorCode::BadSize));
    }

    #[test]
    fn failure_writes_exactly_one_code() {
        let result: Result<(), Error> = Err(Error::BadSize {
            count: usize::MAX,
            item_size: 8,
        });

        let mut code = None;
        assert_eq!(report(&result, Some(&mut code)), Status::Fatal);
        assert_eq!(code, Some(ErrorCode::BadSize));
    }
}
