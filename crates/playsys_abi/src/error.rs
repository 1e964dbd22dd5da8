// playsys_abi/src/error.rs
//! Syscall Errors
//!
//! Every operation reports failure with exactly one value of this closed
//! enumeration. Host-specific error numbers never cross the ABI boundary;
//! backends translate them into [`SysError`] first.
//!
//! # ABI Representation
//!
//! On the wire an error is the negative `i32` discriminant, widened to
//! `isize` when returned from the multiplexed entry point. `0` means
//! "no error" and is deliberately not a variant.
//!
//! # Example
//!
//! ```ignore
//! match sys.read(fd, &mut buf) {
//!     Ok(0) => println!("end of stream"),
//!     Ok(n) => println!("read {} bytes", n),
//!     Err(SysError::BadFd) => println!("no such descriptor"),
//!     Err(e) => println!("unexpected error: {}", e),
//! }
//! ```

/// Syscall error type
///
/// The discriminant values are stable and must not be changed: they are
/// part of the contract consumed by generated bindings.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum SysError {
    /// Invalid data or argument
    #[error("invalid argument")]
    Invalid = -1,

    /// Invalid syscall operation code
    #[error("invalid syscall operation")]
    SysOp = -2,

    /// Invalid file descriptor
    #[error("bad file descriptor")]
    BadFd = -3,

    /// Invalid or misformed name
    #[error("bad name")]
    BadName = -4,

    /// Resource not found
    #[error("not found")]
    NotFound = -5,

    /// Name exceeds the maximum length
    #[error("name too long")]
    NameTooLong = -6,

    /// Operation canceled (e.g. interrupted by a signal)
    #[error("operation canceled")]
    Canceled = -7,

    /// Operation not supported by this resource or backend
    #[error("not supported")]
    NotSupported = -8,

    /// Resource already exists
    #[error("already exists")]
    Exists = -9,

    /// End of resource
    #[error("end of resource")]
    End = -10,

    /// Permission denied
    #[error("permission denied")]
    Access = -11,

    /// Cannot allocate memory or descriptor space
    #[error("out of memory")]
    NoMemory = -12,

    /// Bad memory address
    #[error("bad memory address")]
    MemFault = -13,

    /// Value too large for the defined data type
    #[error("value overflow")]
    Overflow = -14,
}

impl SysError {
    /// Every variant, in discriminant order
    pub const ALL: [Self; 14] = [
        Self::Invalid,
        Self::SysOp,
        Self::BadFd,
        Self::BadName,
        Self::NotFound,
        Self::NameTooLong,
        Self::Canceled,
        Self::NotSupported,
        Self::Exists,
        Self::End,
        Self::Access,
        Self::NoMemory,
        Self::MemFault,
        Self::Overflow,
    ];

    /// Convert from a raw negative error code
    ///
    /// Returns `None` for `0` and any value outside the closed set.
    #[must_use]
    pub const fn from_raw(value: i32) -> Option<Self> {
        match value {
            -1 => Some(Self::Invalid),
            -2 => Some(Self::SysOp),
            -3 => Some(Self::BadFd),
            -4 => Some(Self::BadName),
            -5 => Some(Self::NotFound),
            -6 => Some(Self::NameTooLong),
            -7 => Some(Self::Canceled),
            -8 => Some(Self::NotSupported),
            -9 => Some(Self::Exists),
            -10 => Some(Self::End),
            -11 => Some(Self::Access),
            -12 => Some(Self::NoMemory),
            -13 => Some(Self::MemFault),
            -14 => Some(Self::Overflow),
            _ => None,
        }
    }

    /// Get the raw (negative) error code
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the error code widened for the syscall return register
    #[must_use]
    pub const fn as_isize(self) -> isize {
        self as i32 as isize
    }

    /// Get the error category
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Invalid | Self::SysOp | Self::BadName | Self::NameTooLong => {
                ErrorCategory::Argument
            }
            Self::BadFd | Self::NotFound | Self::Exists | Self::End | Self::Access => {
                ErrorCategory::Resource
            }
            Self::NoMemory | Self::MemFault | Self::Overflow => ErrorCategory::Memory,
            Self::NotSupported => ErrorCategory::Capability,
            Self::Canceled => ErrorCategory::Interrupted,
        }
    }

    /// Get a human-readable description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid argument",
            Self::SysOp => "invalid syscall operation",
            Self::BadFd => "bad file descriptor",
            Self::BadName => "bad name",
            Self::NotFound => "not found",
            Self::NameTooLong => "name too long",
            Self::Canceled => "operation canceled",
            Self::NotSupported => "not supported",
            Self::Exists => "already exists",
            Self::End => "end of resource",
            Self::Access => "permission denied",
            Self::NoMemory => "out of memory",
            Self::MemFault => "bad memory address",
            Self::Overflow => "value overflow",
        }
    }
}

/// Error category for grouping related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Argument validation failures
    Argument,
    /// Descriptor and named-resource failures
    Resource,
    /// Allocation and size-arithmetic failures
    Memory,
    /// Capability absent on the resource or backend
    Capability,
    /// Operation interrupted before completion
    Interrupted,
}

/// Type alias for syscall results
pub type SysResult<T> = Result<T, SysError>;

/// Encode a result for the syscall return register
///
/// Success values must be non-negative; a value that does not fit is
/// reported as [`SysError::Overflow`].
#[must_use]
pub fn encode_result<T>(result: SysResult<T>) -> isize
where
    T: TryInto<isize>,
{
    match result {
        Ok(value) => match value.try_into() {
            Ok(v) if v >= 0 => v,
            _ => SysError::Overflow.as_isize(),
        },
        Err(e) => e.as_isize(),
    }
}

/// Decode a syscall return register value
///
/// Negative values outside the closed set decode as [`SysError::Invalid`].
pub fn decode_result(raw: isize) -> SysResult<usize> {
    if raw >= 0 {
        return Ok(raw.unsigned_abs());
    }
    let code = i32::try_from(raw).unwrap_or(SysError::Invalid.as_i32());
    Err(SysError::from_raw(code).unwrap_or(SysError::Invalid))
}
