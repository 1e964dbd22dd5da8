// playsys/src/host/mod.rs
//! Host kernel abstraction
//!
//! Operations that no virtual file claims fall through to a [`Host`]. The
//! host is the only place host-specific error numbers are seen; everything
//! it returns is already translated into the closed [`SysError`] set.
//!
//! # Implementations
//!
//! - [`PosixHost`]: libc pass-through for unix hosts
//! - [`NullHost`]: a host with no kernel facility behind it (sandboxed
//!   targets); every descriptor operation fails

#[cfg(unix)]
pub mod errno;
#[cfg(unix)]
mod posix;

use core::ffi::CStr;
use core::ptr::NonNull;
use core::time::Duration;

use playsys_abi::{Fd, MmapFlags, OpenFlags, SysError, SysResult};

#[cfg(unix)]
pub use posix::PosixHost;

/// Host kernel facility
pub trait Host: Send + Sync {
    /// Open `path` relative to `at` (or [`playsys_abi::AT_FDCWD`])
    fn openat(&self, at: Fd, path: &CStr, flags: OpenFlags, mode: u32) -> SysResult<Fd>;

    /// Close a host descriptor
    fn close(&self, fd: Fd) -> SysResult<()>;

    /// Read from a host descriptor
    fn read(&self, fd: Fd, buf: &mut [u8]) -> SysResult<usize>;

    /// Write to a host descriptor
    fn write(&self, fd: Fd, buf: &[u8]) -> SysResult<usize>;

    /// Map memory
    ///
    /// # Safety
    ///
    /// With [`MmapFlags::FIXED`] the mapping replaces whatever lives at
    /// `addr`; the caller must own that range.
    unsafe fn mmap(
        &self,
        addr: *mut u8,
        len: usize,
        flags: MmapFlags,
        fd: Fd,
        offset: u64,
    ) -> SysResult<NonNull<u8>>;

    /// Create a pipe, returning `[read end, write end]`
    fn pipe(&self) -> SysResult<[Fd; 2]>;

    /// Block the calling thread
    ///
    /// Interruption is reported as [`SysError::Canceled`] and never retried.
    fn sleep(&self, duration: Duration) -> SysResult<()>;

    /// Terminate the process
    fn exit(&self, status: i32) -> !;
}

/// Host without any kernel facility
///
/// Only virtual files work on top of this host.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Host for NullHost {
    fn openat(&self, _at: Fd, _path: &CStr, _flags: OpenFlags, _mode: u32) -> SysResult<Fd> {
        Err(SysError::NotSupported)
    }

    fn close(&self, _fd: Fd) -> SysResult<()> {
        Err(SysError::BadFd)
    }

    fn read(&self, _fd: Fd, _buf: &mut [u8]) -> SysResult<usize> {
        Err(SysError::BadFd)
    }

    fn write(&self, _fd: Fd, _buf: &[u8]) -> SysResult<usize> {
        Err(SysError::BadFd)
    }

    unsafe fn mmap(
        &self,
        _addr: *mut u8,
        _len: usize,
        _flags: MmapFlags,
        _fd: Fd,
        _offset: u64,
    ) -> SysResult<NonNull<u8>> {
        Err(SysError::NotSupported)
    }

    fn pipe(&self) -> SysResult<[Fd; 2]> {
        Err(SysError::NotSupported)
    }

    fn sleep(&self, duration: Duration) -> SysResult<()> {
        std::thread::sleep(duration);
        Ok(())
    }

    fn exit(&self, status: i32) -> ! {
        std::process::exit(status)
    }
}
