// playsys/src/syscall/mod.rs
//! Raw syscall dispatch
//!
//! Every operation enters through [`dispatch`] with an operation code and
//! five word-sized arguments. The code selects exactly one entry of
//! [`SYSCALL_TABLE`]; the entry's handler decodes the raw words and forwards
//! to the typed API on [`System`], and the result is encoded as a
//! non-negative value or a negative [`SysError`] code.
//!
//! # Argument Conventions
//!
//! | op               | a1       | a2       | a3           | a4      | a5     |
//! |------------------|----------|----------|--------------|---------|--------|
//! | `openat`         | base fd  | path*    | flags        | mode    |        |
//! | `close`          | fd       |          |              |         |        |
//! | `read`/`write`   | fd       | buf*     | len          |         |        |
//! | `mmap`           | addr**   | len      | flags        | fd      | offset |
//! | `sleep`          | seconds  | nanos    |              |         |        |
//! | `exit`           | status   |          |              |         |        |
//! | `pipe`           | fdv*[2]  | flags    |              |         |        |
//! | `test`           | op       |          |              |         |        |
//! | `ioring_setup`   | entries  | params*  |              |         |        |
//! | `ioring_enter`   | fd       | to_submit| min_complete | flags   |        |
//! | `ioring_register`| fd       | opcode   | arg*         | nr_args |        |
//!
//! A null required pointer is [`SysError::MemFault`]. Flag words with
//! unknown bits are [`SysError::Invalid`].

pub mod special;

use core::ffi::CStr;
use core::ptr;

use playsys_abi::error::encode_result;
use playsys_abi::{
    Fd, IoringEnterFlags, IoringParams, MmapFlags, OpenFlags, SysError, SysOp, SysResult,
};

use crate::config::PATH_MAX;
use crate::system::System;

/// Raw handler: decodes five argument words
type SyscallHandler = unsafe fn(&System, [isize; 5]) -> isize;

/// One operation's slot in the dispatch table
struct SyscallEntry {
    op: SysOp,
    /// Whether `test` reports the operation as available
    implemented: bool,
    handler: SyscallHandler,
}

/// Syscall dispatch table
///
/// Ordered as [`SysOp::ALL`]; [`table_index`] is the lookup.
static SYSCALL_TABLE: [SyscallEntry; 16] = [
    SyscallEntry { op: SysOp::Read, implemented: true, handler: sys_read },
    SyscallEntry { op: SysOp::Write, implemented: true, handler: sys_write },
    SyscallEntry { op: SysOp::Close, implemented: true, handler: sys_close },
    SyscallEntry { op: SysOp::Seek, implemented: false, handler: sys_unsupported },
    SyscallEntry { op: SysOp::Mmap, implemented: true, handler: sys_mmap },
    SyscallEntry { op: SysOp::Exit, implemented: true, handler: sys_exit },
    SyscallEntry { op: SysOp::Sleep, implemented: true, handler: sys_sleep },
    SyscallEntry { op: SysOp::OpenAt, implemented: true, handler: sys_openat },
    SyscallEntry { op: SysOp::StatAt, implemented: false, handler: sys_unsupported },
    SyscallEntry { op: SysOp::RemoveAt, implemented: false, handler: sys_unsupported },
    SyscallEntry { op: SysOp::RenameAt, implemented: false, handler: sys_unsupported },
    SyscallEntry { op: SysOp::Pipe, implemented: true, handler: sys_pipe },
    SyscallEntry { op: SysOp::IoringSetup, implemented: true, handler: sys_ioring_setup },
    SyscallEntry { op: SysOp::IoringEnter, implemented: false, handler: sys_ioring_enter },
    SyscallEntry { op: SysOp::IoringRegister, implemented: false, handler: sys_ioring_register },
    SyscallEntry { op: SysOp::Test, implemented: true, handler: sys_test },
];

const fn table_index(op: SysOp) -> usize {
    match op {
        SysOp::Read => 0,
        SysOp::Write => 1,
        SysOp::Close => 2,
        SysOp::Seek => 3,
        SysOp::Mmap => 4,
        SysOp::Exit => 5,
        SysOp::Sleep => 6,
        SysOp::OpenAt => 7,
        SysOp::StatAt => 8,
        SysOp::RemoveAt => 9,
        SysOp::RenameAt => 10,
        SysOp::Pipe => 11,
        SysOp::IoringSetup => 12,
        SysOp::IoringEnter => 13,
        SysOp::IoringRegister => 14,
        SysOp::Test => 15,
    }
}

fn entry(op: SysOp) -> Option<&'static SyscallEntry> {
    SYSCALL_TABLE.get(table_index(op)).filter(|entry| entry.op == op)
}

/// Whether `op` is implemented (as opposed to a permanent stub)
#[must_use]
pub fn is_implemented(op: SysOp) -> bool {
    entry(op).is_some_and(|entry| entry.implemented)
}

/// Dispatch one raw syscall
///
/// Unknown operation codes return [`SysError::SysOp`].
///
/// # Safety
///
/// See [`System::dispatch`].
pub unsafe fn dispatch(sys: &System, op: usize, args: [isize; 5]) -> isize {
    let Some(entry) = SysOp::from_raw(op).and_then(entry) else {
        log::debug!("[SYSCALL] unknown op {op}");
        return SysError::SysOp.as_isize();
    };

    // SAFETY: forwarded from the caller.
    let result = unsafe { (entry.handler)(sys, args) };

    #[cfg(feature = "syscall_trace")]
    log::trace!("[SYSCALL] {}({args:#x?}) -> {result}", entry.op);

    result
}

// ============================================================================
// Argument decoding
// ============================================================================

fn encode_unit(result: SysResult<()>) -> isize {
    encode_result(result.map(|()| 0usize))
}

fn fd_arg(word: isize) -> SysResult<Fd> {
    Fd::try_from(word).map_err(|_| SysError::BadFd)
}

fn len_arg(word: isize) -> SysResult<usize> {
    usize::try_from(word).map_err(|_| SysError::Invalid)
}

fn u32_arg(word: isize) -> SysResult<u32> {
    u32::try_from(word).map_err(|_| SysError::Invalid)
}

fn ptr_arg<T>(word: isize) -> SysResult<*mut T> {
    #[allow(clippy::cast_sign_loss)]
    let ptr = ptr::with_exposed_provenance_mut::<T>(word as usize);
    if ptr.is_null() {
        return Err(SysError::MemFault);
    }
    Ok(ptr)
}

/// Borrow a NUL-terminated path, scanning at most `PATH_MAX + 1` bytes
///
/// # Safety
///
/// `ptr` must be readable up to its terminator or `PATH_MAX + 1` bytes,
/// whichever comes first.
unsafe fn path_arg<'a>(ptr: *const u8) -> SysResult<&'a CStr> {
    for len in 0..=PATH_MAX {
        // SAFETY: within the range the caller vouches for.
        if unsafe { ptr.add(len).read() } == 0 {
            // SAFETY: bytes 0..=len were just read.
            let bytes = unsafe { core::slice::from_raw_parts(ptr, len + 1) };
            return CStr::from_bytes_with_nul(bytes).map_err(|_| SysError::BadName);
        }
    }
    Err(SysError::NameTooLong)
}

// ============================================================================
// Handlers
// ============================================================================

unsafe fn sys_read(sys: &System, args: [isize; 5]) -> isize {
    let result = (|| -> SysResult<usize> {
        let fd = fd_arg(args[0])?;
        let buf = ptr_arg::<u8>(args[1])?;
        let len = len_arg(args[2])?;
        // SAFETY: the caller provides `len` writable bytes at `buf`.
        let buf = unsafe { core::slice::from_raw_parts_mut(buf, len) };
        sys.read(fd, buf)
    })();
    encode_result(result)
}

unsafe fn sys_write(sys: &System, args: [isize; 5]) -> isize {
    let result = (|| -> SysResult<usize> {
        let fd = fd_arg(args[0])?;
        let buf = ptr_arg::<u8>(args[1])?;
        let len = len_arg(args[2])?;
        // SAFETY: the caller provides `len` readable bytes at `buf`.
        let buf = unsafe { core::slice::from_raw_parts(buf.cast_const(), len) };
        sys.write(fd, buf)
    })();
    encode_result(result)
}

unsafe fn sys_close(sys: &System, args: [isize; 5]) -> isize {
    encode_unit(fd_arg(args[0]).and_then(|fd| sys.close(fd)))
}

unsafe fn sys_openat(sys: &System, args: [isize; 5]) -> isize {
    let result = (|| -> SysResult<Fd> {
        let at = fd_arg(args[0])?;
        let path = ptr_arg::<u8>(args[1])?;
        // SAFETY: the caller provides a NUL-terminated path.
        let path = unsafe { path_arg(path.cast_const()) }?;
        let flags = OpenFlags::from_bits(u32_arg(args[2])?).ok_or(SysError::Invalid)?;
        let mode = u32_arg(args[3])?;
        sys.openat_cstr(at, path, flags, mode)
    })();
    encode_result(result)
}

unsafe fn sys_mmap(sys: &System, args: [isize; 5]) -> isize {
    let result = (|| -> SysResult<()> {
        let slot = ptr_arg::<*mut u8>(args[0])?;
        let len = len_arg(args[1])?;
        let flags = MmapFlags::from_bits(u32_arg(args[2])?).ok_or(SysError::Invalid)?;
        let fd = fd_arg(args[3])?;
        let offset = u64::try_from(args[4]).map_err(|_| SysError::Invalid)?;

        // SAFETY: the caller provides a readable and writable `addr` slot.
        let addr = unsafe { slot.read_unaligned() };
        // SAFETY: the host contract is forwarded from the caller.
        let mapped = unsafe { sys.mmap(addr, len, flags, fd, offset) }?;
        // SAFETY: as above.
        unsafe { slot.write_unaligned(mapped.as_ptr()) };
        Ok(())
    })();
    encode_unit(result)
}

unsafe fn sys_exit(sys: &System, args: [isize; 5]) -> isize {
    // hosts keep only the low bits of an exit status
    #[allow(clippy::cast_possible_truncation)]
    let status = args[0] as i32;
    sys.exit(status)
}

unsafe fn sys_sleep(sys: &System, args: [isize; 5]) -> isize {
    let result = (|| -> SysResult<()> {
        let seconds = u64::try_from(args[0]).map_err(|_| SysError::Invalid)?;
        let nanoseconds = u64::try_from(args[1]).map_err(|_| SysError::Invalid)?;
        sys.sleep(seconds, nanoseconds)
    })();
    encode_unit(result)
}

unsafe fn sys_pipe(sys: &System, args: [isize; 5]) -> isize {
    let result = (|| -> SysResult<()> {
        let fdv = ptr_arg::<Fd>(args[0])?;
        let flags = u32_arg(args[1])?;
        let fds = sys.pipe(flags)?;
        // SAFETY: the caller provides room for two descriptors at `fdv`.
        unsafe { fdv.cast::<[Fd; 2]>().write_unaligned(fds) };
        Ok(())
    })();
    encode_unit(result)
}

unsafe fn sys_test(sys: &System, args: [isize; 5]) -> isize {
    let result = usize::try_from(args[0])
        .map_err(|_| SysError::NotSupported)
        .and_then(|op| sys.test(op));
    encode_unit(result)
}

unsafe fn sys_ioring_setup(sys: &System, args: [isize; 5]) -> isize {
    let result = (|| -> SysResult<Fd> {
        let entries = u32_arg(args[0])?;
        let slot = ptr_arg::<IoringParams>(args[1])?;
        // SAFETY: the caller provides a readable and writable params block.
        let mut params = unsafe { slot.read_unaligned() };
        let fd = sys.ioring_setup(entries, &mut params)?;
        // SAFETY: as above.
        unsafe { slot.write_unaligned(params) };
        Ok(fd)
    })();
    encode_result(result)
}

unsafe fn sys_ioring_enter(sys: &System, args: [isize; 5]) -> isize {
    let result = (|| -> SysResult<usize> {
        let fd = fd_arg(args[0])?;
        let to_submit = u32_arg(args[1])?;
        let min_complete = u32_arg(args[2])?;
        let flags = IoringEnterFlags::from_bits(u32_arg(args[3])?).ok_or(SysError::Invalid)?;
        sys.ioring_enter(fd, to_submit, min_complete, flags)
    })();
    encode_result(result)
}

unsafe fn sys_ioring_register(sys: &System, args: [isize; 5]) -> isize {
    let result = (|| -> SysResult<usize> {
        let fd = fd_arg(args[0])?;
        let opcode = u32_arg(args[1])?;
        #[allow(clippy::cast_sign_loss)]
        let arg = ptr::with_exposed_provenance::<u8>(args[2] as usize);
        let nr_args = u32_arg(args[3])?;
        sys.ioring_register(fd, opcode, arg, nr_args)
    })();
    encode_result(result)
}

unsafe fn sys_unsupported(_sys: &System, _args: [isize; 5]) -> isize {
    SysError::NotSupported.as_isize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemConfig;
    use crate::host::NullHost;

    fn system() -> System {
        System::new(NullHost, SystemConfig::default())
    }

    fn call(sys: &System, op: SysOp, args: [isize; 5]) -> isize {
        // SAFETY: tests pass only null or live pointers.
        unsafe { dispatch(sys, op.as_raw(), args) }
    }

    #[test]
    fn test_table_is_total() {
        for (i, op) in SysOp::ALL.into_iter().enumerate() {
            assert_eq!(table_index(op), i);
            assert_eq!(SYSCALL_TABLE[i].op, op);
        }
        assert_eq!(SYSCALL_TABLE.len(), SysOp::ALL.len());
    }

    #[test]
    fn test_unknown_op() {
        let sys = system();
        for op in [2, 4, 424, 9999, 10001, usize::MAX] {
            // SAFETY: no pointers are passed.
            assert_eq!(unsafe { dispatch(&sys, op, [0; 5]) }, -2);
        }
    }

    #[test]
    fn test_stubs_not_supported() {
        let sys = system();
        for op in [SysOp::Seek, SysOp::StatAt, SysOp::RemoveAt, SysOp::RenameAt] {
            assert_eq!(call(&sys, op, [0; 5]), SysError::NotSupported.as_isize());
            assert!(!is_implemented(op));
        }
        assert_eq!(
            call(&sys, SysOp::IoringEnter, [3, 1, 0, 0, 0]),
            SysError::NotSupported.as_isize()
        );
        assert_eq!(
            call(&sys, SysOp::IoringRegister, [3, 0, 0, 0, 0]),
            SysError::NotSupported.as_isize()
        );
    }

    #[test]
    fn test_null_pointers() {
        let sys = system();
        let fault = SysError::MemFault.as_isize();
        assert_eq!(call(&sys, SysOp::Read, [0, 0, 4, 0, 0]), fault);
        assert_eq!(call(&sys, SysOp::Write, [1, 0, 4, 0, 0]), fault);
        assert_eq!(call(&sys, SysOp::OpenAt, [-100, 0, 0, 0, 0]), fault);
        assert_eq!(call(&sys, SysOp::Mmap, [0, 64, 0, -1, 0]), fault);
        assert_eq!(call(&sys, SysOp::Pipe, [0, 0, 0, 0, 0]), fault);
        assert_eq!(call(&sys, SysOp::IoringSetup, [1, 0, 0, 0, 0]), fault);
    }

    #[test]
    fn test_bad_words() {
        let sys = system();
        let mut buf = [0u8; 4];
        let addr = buf.as_mut_ptr().expose_provenance() as isize;
        assert_eq!(
            call(&sys, SysOp::Read, [0, addr, -1, 0, 0]),
            SysError::Invalid.as_isize()
        );
        assert_eq!(
            call(&sys, SysOp::Close, [isize::MAX, 0, 0, 0, 0]),
            SysError::BadFd.as_isize()
        );
        assert_eq!(
            call(&sys, SysOp::Sleep, [0, 1_000_000_000, 0, 0, 0]),
            SysError::Invalid.as_isize()
        );
        assert_eq!(
            call(&sys, SysOp::IoringSetup, [-1, addr, 0, 0, 0]),
            SysError::Invalid.as_isize()
        );
    }

    #[test]
    fn test_path_scan() {
        let sys = system();
        let mut long = vec![b'a'; PATH_MAX + 8];
        long.push(0);
        let addr = long.as_ptr().expose_provenance() as isize;
        assert_eq!(
            call(&sys, SysOp::OpenAt, [-100, addr, 0, 0, 0]),
            SysError::NameTooLong.as_isize()
        );

        let special = b"/sys/nothing\0";
        let addr = special.as_ptr().expose_provenance() as isize;
        assert_eq!(
            call(&sys, SysOp::OpenAt, [-100, addr, 0, 0, 0]),
            SysError::NotFound.as_isize()
        );

        let bad = b"/\xff\0";
        let addr = bad.as_ptr().expose_provenance() as isize;
        assert_eq!(
            call(&sys, SysOp::OpenAt, [-100, addr, 0, 0, 0]),
            SysError::BadName.as_isize()
        );
    }

    #[test]
    fn test_test_op() {
        let sys = system();
        for op in SysOp::ALL {
            let expected = if is_implemented(op) {
                0
            } else {
                SysError::NotSupported.as_isize()
            };
            let raw = op.as_raw() as isize;
            assert_eq!(call(&sys, SysOp::Test, [raw, 0, 0, 0, 0]), expected);
        }
        assert_eq!(
            call(&sys, SysOp::Test, [-1, 0, 0, 0, 0]),
            SysError::NotSupported.as_isize()
        );
    }
}
