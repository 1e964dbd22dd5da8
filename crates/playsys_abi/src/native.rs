// playsys_abi/src/native.rs
//! Operation codes and flag words
//!
//! Operation code values coincide with the x86_64 Linux syscall numbers where
//! a clash is harmless, purely so that they are stable and recognizable. The
//! dispatcher does not depend on that numbering. Values must never be
//! renumbered.

use bitflags::bitflags;

/// File descriptor
///
/// Non-negative values are descriptors; negative values only appear as
/// [`AT_FDCWD`] or as error codes in raw return values.
pub type Fd = i32;

/// Standard input stream
pub const FD_STDIN: Fd = 0;
/// Main output stream
pub const FD_STDOUT: Fd = 1;
/// Logging output stream
pub const FD_STDERR: Fd = 2;
/// "Current directory" base for `*at` file operations
pub const AT_FDCWD: Fd = -100;

/// Syscall operation code
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SysOp {
    /// Read from a descriptor: `fd, buf*, nbyte -> n`
    Read = 0,
    /// Write to a descriptor: `fd, buf*, nbyte -> n`
    Write = 1,
    /// Close a descriptor: `fd -> err`
    Close = 3,
    /// Reposition a descriptor (permanently unsupported)
    Seek = 8,
    /// Map memory: `addr**, length, flags, fd, offs -> err`
    Mmap = 9,
    /// Terminate the process: `status`
    Exit = 60,
    /// Sleep: `seconds, nanoseconds -> err`
    Sleep = 230,
    /// Open a file: `base fd, path*, flags, mode -> fd`
    OpenAt = 257,
    /// Stat a path (permanently unsupported)
    StatAt = 262,
    /// Remove a path (permanently unsupported)
    RemoveAt = 263,
    /// Rename a path (permanently unsupported)
    RenameAt = 264,
    /// Create a pipe: `fdv*[2], flags -> err`
    Pipe = 293,
    /// Create an ioring: `entries, params* -> fd`
    IoringSetup = 425,
    /// Submit to / wait on an ioring (unsupported): `fd, to_submit, min_complete, flags`
    IoringEnter = 426,
    /// Register resources with an ioring (unsupported): `fd, opcode, arg*, nr_args`
    IoringRegister = 427,
    /// Query whether an operation is implemented: `op -> err`
    Test = 10000,
}

impl SysOp {
    /// Every operation code
    pub const ALL: [Self; 16] = [
        Self::Read,
        Self::Write,
        Self::Close,
        Self::Seek,
        Self::Mmap,
        Self::Exit,
        Self::Sleep,
        Self::OpenAt,
        Self::StatAt,
        Self::RemoveAt,
        Self::RenameAt,
        Self::Pipe,
        Self::IoringSetup,
        Self::IoringEnter,
        Self::IoringRegister,
        Self::Test,
    ];

    /// Convert from a raw operation code
    #[must_use]
    pub const fn from_raw(value: usize) -> Option<Self> {
        match value {
            0 => Some(Self::Read),
            1 => Some(Self::Write),
            3 => Some(Self::Close),
            8 => Some(Self::Seek),
            9 => Some(Self::Mmap),
            60 => Some(Self::Exit),
            230 => Some(Self::Sleep),
            257 => Some(Self::OpenAt),
            262 => Some(Self::StatAt),
            263 => Some(Self::RemoveAt),
            264 => Some(Self::RenameAt),
            293 => Some(Self::Pipe),
            425 => Some(Self::IoringSetup),
            426 => Some(Self::IoringEnter),
            427 => Some(Self::IoringRegister),
            10000 => Some(Self::Test),
            _ => None,
        }
    }

    /// Get the raw operation code
    #[must_use]
    pub const fn as_raw(self) -> usize {
        self as usize
    }

    /// Whether the operation takes a file descriptor as its first argument
    #[must_use]
    pub const fn is_fd_bearing(self) -> bool {
        matches!(
            self,
            Self::Read
                | Self::Write
                | Self::Close
                | Self::Mmap
                | Self::OpenAt
                | Self::IoringEnter
                | Self::IoringRegister
        )
    }

    /// Get the name used in traces and generated bindings
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Close => "close",
            Self::Seek => "seek",
            Self::Mmap => "mmap",
            Self::Exit => "exit",
            Self::Sleep => "sleep",
            Self::OpenAt => "openat",
            Self::StatAt => "statat",
            Self::RemoveAt => "removeat",
            Self::RenameAt => "renameat",
            Self::Pipe => "pipe",
            Self::IoringSetup => "ioring_setup",
            Self::IoringEnter => "ioring_enter",
            Self::IoringRegister => "ioring_register",
            Self::Test => "test",
        }
    }
}

impl core::fmt::Display for SysOp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Flags to the `openat` operation
    ///
    /// The low two bits are an access mode (`0` read-only, `1` write-only,
    /// `2` read-write); use [`OpenFlags::access_mode`] rather than testing
    /// them as bits.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenFlags: u32 {
        /// Open for writing only
        const WONLY  = 1;
        /// Open for both reading and writing
        const RW     = 2;
        /// Start writing at end (seekable files only)
        const APPEND = 4;
        /// Create file if it does not exist
        const CREATE = 8;
        /// Set file size to zero
        const TRUNC  = 16;
        /// Fail if file exists when CREATE and EXCL are set
        const EXCL   = 32;
    }
}

/// Access mode encoded in the low two bits of [`OpenFlags`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Open for reading only
    ReadOnly,
    /// Open for writing only
    WriteOnly,
    /// Open for reading and writing
    ReadWrite,
}

impl OpenFlags {
    /// Open for reading only (the absence of WONLY and RW)
    pub const RONLY: Self = Self::empty();

    /// Decode the access mode; `None` when both mode bits are set
    #[must_use]
    pub const fn access_mode(self) -> Option<AccessMode> {
        match self.bits() & 3 {
            0 => Some(AccessMode::ReadOnly),
            1 => Some(AccessMode::WriteOnly),
            2 => Some(AccessMode::ReadWrite),
            _ => None,
        }
    }
}

bitflags! {
    /// Flags to the `mmap` operation
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MmapFlags: u32 {
        /// Pages may be read
        const PROT_READ  = 0x1;
        /// Pages may be written
        const PROT_WRITE = 0x2;
        /// Pages may be executed
        const PROT_EXEC  = 0x4;
        /// Share this mapping
        const SHARED     = 0x8;
        /// Create a private copy-on-write mapping
        const PRIVATE    = 0x10;
        /// Place the mapping at exactly the address addr
        const FIXED      = 0x40;
        /// Not backed by file, contents zero-initialized, fd argument ignored
        const ANONYMOUS  = 0x80;
        /// The mapping should extend downward in memory
        const GROWSDOWN  = 0x100;
        /// Populate (prefault) page tables for a mapping
        const POPULATE   = 0x200;
        /// Use with POPULATE to not block on prefault
        const NONBLOCK   = 0x400;
        /// Allocate at an address suitable for a stack
        const STACK      = 0x800;
    }
}

impl MmapFlags {
    /// Pages may not be accessed
    pub const PROT_NONE: Self = Self::empty();
}
