//! Error types for the OS abstraction layer
//!
//! Every operation reports one of three kinds. Kernel-native status codes
//! never reach callers.

/// OS layer error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum OsError {
    /// Caller contract violation: stale handle, out-of-range priority or
    /// count, wrongly sized record, suspending call from interrupt context.
    /// Never worth retrying.
    InvalidParameter = -5,

    /// The kernel declined to create or act on an object, e.g. it ran out
    /// of memory or an interrupt-context call found the object full/empty.
    Platform = -6,

    /// The operation did not complete within the caller's wait. Callers
    /// using the wait-forever variants never see this.
    Timeout = -9,
}

/// Result type alias for OS layer operations
pub type OsResult<T> = Result<T, OsError>;

impl OsError {
    /// Numeric code, negative, stable across versions
    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }

    #[inline]
    pub fn is_timeout(self) -> bool {
        self == OsError::Timeout
    }

    /// Short name for log output
    pub fn as_str(self) -> &'static str {
        match self {
            OsError::InvalidParameter => "invalid parameter",
            OsError::Platform => "platform",
            OsError::Timeout => "timeout",
        }
    }
}

impl ::core::fmt::Display for OsError {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for OsError {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.as_str())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for OsError {}
