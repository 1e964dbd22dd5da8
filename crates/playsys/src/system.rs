// playsys/src/system.rs
//! Top-level syscall context
//!
//! [`System`] owns the host, the virtual file table and the ioring pool, and
//! exposes every operation as a typed method. The raw word-based entry point
//! ([`System::dispatch`]) decodes its arguments and forwards to these.
//!
//! # Fall-through Policy
//!
//! For fd-bearing operations the virtual file table is consulted first:
//!
//! | op       | record with capability | record without capability      | no record |
//! |----------|------------------------|--------------------------------|-----------|
//! | `read`   | resource               | host if pipe-backed, else `NotSupported` | host |
//! | `write`  | resource               | host if pipe-backed, else `NotSupported` | host |
//! | `mmap`   | resource               | host                           | host      |
//! | `openat` | resource               | host                           | host      |
//! | `close`  | `release`, then remove | remove                         | host      |

use core::ffi::CStr;
use core::ptr::NonNull;
use core::time::Duration;
use std::ffi::CString;
use std::sync::Arc;

use playsys_abi::{
    Fd, IoringEnterFlags, IoringParams, MmapFlags, OpenFlags, SysError, SysOp, SysResult,
    AT_FDCWD,
};

use crate::config::{SystemConfig, PATH_MAX};
use crate::host::Host;
use crate::ioring::{self, DriverRing, IoringPool};
use crate::syscall::{self, special};
use crate::vfile::{Capabilities, VFile, VFileDesc, VFileOps, VFileTable};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Validate a path argument
///
/// Paths longer than [`PATH_MAX`] are [`SysError::NameTooLong`]; paths that
/// are not UTF-8 are [`SysError::BadName`].
pub fn check_path(path: &CStr) -> SysResult<&str> {
    if path.to_bytes().len() > PATH_MAX {
        return Err(SysError::NameTooLong);
    }
    path.to_str().map_err(|_| SysError::BadName)
}

/// Syscall personality instance
pub struct System {
    config: SystemConfig,
    host: Box<dyn Host>,
    vfiles: VFileTable,
    iorings: Arc<IoringPool>,
}

impl System {
    /// Create a system on top of `host`
    #[must_use]
    pub fn new(host: impl Host + 'static, config: SystemConfig) -> Self {
        log::debug!("[SYSTEM] init {config:?}");
        Self {
            vfiles: VFileTable::new(&config),
            iorings: Arc::new(IoringPool::new(
                config.ioring_pool_capacity,
                config.ring_memory_limit,
            )),
            host: Box::new(host),
            config,
        }
    }

    /// Create a system on top of the platform libc
    #[cfg(unix)]
    #[must_use]
    pub fn posix() -> Self {
        Self::new(crate::host::PosixHost, SystemConfig::default())
    }

    /// Configuration the system was created with
    #[must_use]
    pub const fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Host facility
    #[must_use]
    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    /// Virtual file table
    #[must_use]
    pub const fn vfiles(&self) -> &VFileTable {
        &self.vfiles
    }

    /// ioring instance pool
    #[must_use]
    pub fn iorings(&self) -> &IoringPool {
        &self.iorings
    }

    /// Register an embedder-defined virtual file
    pub fn open_vfile(&self, desc: VFileDesc, resource: Arc<dyn VFileOps>) -> SysResult<VFile> {
        self.vfiles.open(self.host(), desc, resource)
    }

    /// Open `path` relative to `at`
    pub fn openat(&self, at: Fd, path: &str, flags: OpenFlags, mode: u32) -> SysResult<Fd> {
        if path.len() > PATH_MAX {
            return Err(SysError::NameTooLong);
        }
        let path = CString::new(path).map_err(|_| SysError::BadName)?;
        self.openat_cstr(at, &path, flags, mode)
    }

    /// Open a NUL-terminated `path` relative to `at`
    ///
    /// With `at == AT_FDCWD`, paths under `/sys/` name special files.
    pub fn openat_cstr(&self, at: Fd, path: &CStr, flags: OpenFlags, mode: u32) -> SysResult<Fd> {
        let name = check_path(path)?;

        if at == AT_FDCWD {
            if let Some(special) = name.strip_prefix(special::SPECIAL_PREFIX) {
                return special::open(self.host(), special);
            }
        } else if let Some(file) = self.vfiles.lookup(at) {
            if file.supports(Capabilities::OPENAT) {
                return file.resource.openat(&file, path, flags, mode);
            }
        }

        self.host.openat(at, path, flags, mode)
    }

    /// Close a descriptor
    pub fn close(&self, fd: Fd) -> SysResult<()> {
        match self.vfiles.close(self.host(), fd) {
            Some(result) => result,
            None => self.host.close(fd),
        }
    }

    /// Read from a descriptor
    pub fn read(&self, fd: Fd, buf: &mut [u8]) -> SysResult<usize> {
        if let Some(file) = self.vfiles.lookup(fd) {
            if file.supports(Capabilities::READ) {
                return file.resource.read(&file, buf);
            }
            if !file.is_pipe_backed() {
                return Err(SysError::NotSupported);
            }
        }
        self.host.read(fd, buf)
    }

    /// Write to a descriptor
    pub fn write(&self, fd: Fd, buf: &[u8]) -> SysResult<usize> {
        if let Some(file) = self.vfiles.lookup(fd) {
            if file.supports(Capabilities::WRITE) {
                return file.resource.write(&file, buf);
            }
            if !file.is_pipe_backed() {
                return Err(SysError::NotSupported);
            }
        }
        self.host.write(fd, buf)
    }

    /// Map memory
    ///
    /// For an ioring descriptor `offset` must be one of the magic offsets
    /// and `addr` is ignored.
    ///
    /// # Safety
    ///
    /// Requests falling through to the host carry the host's contract: with
    /// [`MmapFlags::FIXED`] the caller must own the range at `addr`.
    pub unsafe fn mmap(
        &self,
        addr: *mut u8,
        len: usize,
        flags: MmapFlags,
        fd: Fd,
        offset: u64,
    ) -> SysResult<NonNull<u8>> {
        if let Some(file) = self.vfiles.lookup(fd) {
            if file.supports(Capabilities::MMAP) {
                return file.resource.mmap(&file, len, flags, offset);
            }
        }
        // SAFETY: forwarded from the caller.
        unsafe { self.host.mmap(addr, len, flags, fd, offset) }
    }

    /// Create a pipe, returning `[read end, write end]`
    ///
    /// No pipe flags are defined; any non-zero `flags` is invalid.
    pub fn pipe(&self, flags: u32) -> SysResult<[Fd; 2]> {
        if flags != 0 {
            return Err(SysError::Invalid);
        }
        self.host.pipe()
    }

    /// Sleep for `seconds` plus `nanoseconds`
    ///
    /// An interrupted sleep is [`SysError::Canceled`].
    pub fn sleep(&self, seconds: u64, nanoseconds: u64) -> SysResult<()> {
        if nanoseconds >= NANOS_PER_SEC {
            return Err(SysError::Invalid);
        }
        let nanos = u32::try_from(nanoseconds).map_err(|_| SysError::Invalid)?;
        self.host.sleep(Duration::new(seconds, nanos))
    }

    /// Terminate the process
    pub fn exit(&self, status: i32) -> ! {
        log::debug!("[SYSTEM] exit({status})");
        self.host.exit(status)
    }

    /// Check whether operation code `op` is implemented
    pub fn test(&self, op: usize) -> SysResult<()> {
        match SysOp::from_raw(op) {
            Some(op) if syscall::is_implemented(op) => Ok(()),
            _ => Err(SysError::NotSupported),
        }
    }

    /// Create an ioring
    ///
    /// See [`ioring::setup`].
    pub fn ioring_setup(&self, entries: u32, params: &mut IoringParams) -> SysResult<Fd> {
        ioring::setup(&self.vfiles, &self.iorings, self.host(), entries, params)
    }

    /// Submit to and wait on an ioring (not implemented)
    pub fn ioring_enter(
        &self,
        _fd: Fd,
        _to_submit: u32,
        _min_complete: u32,
        _flags: IoringEnterFlags,
    ) -> SysResult<usize> {
        Err(SysError::NotSupported)
    }

    /// Register resources with an ioring (not implemented)
    pub fn ioring_register(
        &self,
        _fd: Fd,
        _opcode: u32,
        _arg: *const u8,
        _nr_args: u32,
    ) -> SysResult<usize> {
        Err(SysError::NotSupported)
    }

    /// Run the driver side of the ring behind `fd`
    pub fn with_ioring_driver<R>(
        &self,
        fd: Fd,
        f: impl FnOnce(&mut DriverRing<'_>) -> R,
    ) -> SysResult<R> {
        ioring::with_driver(&self.vfiles, fd, f)
    }

    /// Raw multiplexed entry point
    ///
    /// # Safety
    ///
    /// Pointer arguments must be valid for the access the operation makes:
    /// buffers for `len` bytes, `mmap`'s `addr**` for a read and a write,
    /// `pipe`'s `fdv*` for two descriptors, `ioring_setup`'s params for a
    /// read and a write of [`IoringParams`], paths NUL-terminated.
    pub unsafe fn dispatch(&self, op: usize, args: [isize; 5]) -> isize {
        // SAFETY: forwarded from the caller.
        unsafe { syscall::dispatch(self, op, args) }
    }
}

impl core::fmt::Debug for System {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("System")
            .field("config", &self.config)
            .field("vfiles", &self.vfiles)
            .field("iorings", &self.iorings)
            .finish_non_exhaustive()
    }
}
