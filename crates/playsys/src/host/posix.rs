// playsys/src/host/posix.rs
//! POSIX host backend (libc pass-through)

use core::ffi::CStr;
use core::ptr::NonNull;
use core::time::Duration;

use playsys_abi::native::AccessMode;
use playsys_abi::{Fd, MmapFlags, OpenFlags, SysError, SysResult};

use super::errno;
use super::Host;

/// Host backed by the platform libc
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixHost;

impl PosixHost {
    fn open_flags(flags: OpenFlags) -> SysResult<libc::c_int> {
        let mut oflag = match flags.access_mode().ok_or(SysError::Invalid)? {
            AccessMode::ReadOnly => libc::O_RDONLY,
            AccessMode::WriteOnly => libc::O_WRONLY,
            AccessMode::ReadWrite => libc::O_RDWR,
        };
        if flags.contains(OpenFlags::APPEND) {
            oflag |= libc::O_APPEND;
        }
        if flags.contains(OpenFlags::CREATE) {
            oflag |= libc::O_CREAT;
        }
        if flags.contains(OpenFlags::TRUNC) {
            oflag |= libc::O_TRUNC;
        }
        if flags.contains(OpenFlags::EXCL) {
            oflag |= libc::O_EXCL;
        }
        Ok(oflag)
    }

    /// Split mmap flags into `(prot, flags)` for the host call
    fn mmap_flags(flags: MmapFlags) -> SysResult<(libc::c_int, libc::c_int)> {
        if flags.intersects(MmapFlags::POPULATE | MmapFlags::NONBLOCK) {
            return Err(SysError::Invalid);
        }

        let mut prot = libc::PROT_NONE;
        if flags.contains(MmapFlags::PROT_READ) {
            prot |= libc::PROT_READ;
        }
        if flags.contains(MmapFlags::PROT_WRITE) {
            prot |= libc::PROT_WRITE;
        }
        if flags.contains(MmapFlags::PROT_EXEC) {
            prot |= libc::PROT_EXEC;
        }

        let mut map = 0;
        if flags.contains(MmapFlags::SHARED) {
            map |= libc::MAP_SHARED;
        }
        if flags.contains(MmapFlags::PRIVATE) {
            map |= libc::MAP_PRIVATE;
        }
        if flags.contains(MmapFlags::FIXED) {
            map |= libc::MAP_FIXED;
        }
        if flags.contains(MmapFlags::ANONYMOUS) {
            map |= libc::MAP_ANON;
        }
        Ok((prot, map))
    }
}

impl Host for PosixHost {
    fn openat(&self, at: Fd, path: &CStr, flags: OpenFlags, mode: u32) -> SysResult<Fd> {
        let oflag = Self::open_flags(flags)?;
        let at = if at == playsys_abi::AT_FDCWD {
            libc::AT_FDCWD
        } else {
            at
        };
        // SAFETY: path is NUL-terminated and outlives the call.
        let fd = unsafe { libc::openat(at, path.as_ptr(), oflag, libc::c_uint::from(mode)) };
        if fd < 0 {
            return Err(errno::last_error());
        }
        Ok(fd)
    }

    fn close(&self, fd: Fd) -> SysResult<()> {
        // SAFETY: closing an arbitrary integer is memory safe.
        if unsafe { libc::close(fd) } != 0 {
            return Err(errno::last_error());
        }
        Ok(())
    }

    fn read(&self, fd: Fd, buf: &mut [u8]) -> SysResult<usize> {
        // SAFETY: buf is valid for buf.len() writable bytes.
        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(errno::last_error());
        }
        Ok(n.unsigned_abs())
    }

    fn write(&self, fd: Fd, buf: &[u8]) -> SysResult<usize> {
        // SAFETY: buf is valid for buf.len() readable bytes.
        let n = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(errno::last_error());
        }
        Ok(n.unsigned_abs())
    }

    unsafe fn mmap(
        &self,
        addr: *mut u8,
        len: usize,
        flags: MmapFlags,
        fd: Fd,
        offset: u64,
    ) -> SysResult<NonNull<u8>> {
        let (prot, map) = Self::mmap_flags(flags)?;
        let offset = libc::off_t::try_from(offset).map_err(|_| SysError::Overflow)?;
        // SAFETY: the caller upholds the FIXED contract; otherwise the host
        // picks an unused range.
        let p = unsafe { libc::mmap(addr.cast(), len, prot, map, fd, offset) };
        if p == libc::MAP_FAILED {
            return Err(errno::last_error());
        }
        NonNull::new(p.cast()).ok_or(SysError::NoMemory)
    }

    fn pipe(&self) -> SysResult<[Fd; 2]> {
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: fds has room for the two descriptors pipe writes.
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(errno::last_error());
        }
        Ok(fds)
    }

    fn sleep(&self, duration: Duration) -> SysResult<()> {
        let rqtp = libc::timespec {
            tv_sec: libc::time_t::try_from(duration.as_secs()).map_err(|_| SysError::Overflow)?,
            tv_nsec: libc::c_long::try_from(duration.subsec_nanos())
                .map_err(|_| SysError::Overflow)?,
        };
        // SAFETY: rqtp is a valid timespec; the remainder pointer may be null.
        if unsafe { libc::nanosleep(&rqtp, core::ptr::null_mut()) } != 0 {
            return Err(errno::last_error());
        }
        Ok(())
    }

    fn exit(&self, status: i32) -> ! {
        std::process::exit(status)
    }
}
