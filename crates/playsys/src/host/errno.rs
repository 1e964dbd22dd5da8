// playsys/src/host/errno.rs
//! Host errno translation
//!
//! Every host error number maps to exactly one [`SysError`]. Values with no
//! closer match become [`SysError::Invalid`], so the table is total.

use playsys_abi::SysError;

/// Translate a host errno value
#[must_use]
pub const fn from_errno(errno: i32) -> SysError {
    match errno {
        libc::EINVAL => SysError::Invalid,
        libc::EBADF => SysError::BadFd,
        libc::ENOENT => SysError::NotFound,
        libc::ENAMETOOLONG => SysError::NameTooLong,
        libc::ENOTDIR | libc::ELOOP | libc::EILSEQ => SysError::BadName,
        libc::EINTR | libc::ECANCELED | libc::EAGAIN => SysError::Canceled,
        libc::ENOSYS | libc::EOPNOTSUPP | libc::ENODEV | libc::ENXIO | libc::ESPIPE => {
            SysError::NotSupported
        }
        libc::EEXIST => SysError::Exists,
        libc::EPIPE => SysError::End,
        libc::EACCES | libc::EPERM | libc::EROFS => SysError::Access,
        libc::ENOMEM | libc::ENFILE | libc::EMFILE | libc::ENOSPC | libc::EDQUOT => {
            SysError::NoMemory
        }
        libc::EFAULT => SysError::MemFault,
        libc::EOVERFLOW | libc::EFBIG | libc::ERANGE => SysError::Overflow,
        _ => SysError::Invalid,
    }
}

/// Translate the calling thread's current errno
#[must_use]
pub fn last_error() -> SysError {
    let errno = std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(libc::EINVAL);
    let err = from_errno(errno);
    log::warn!("[HOST] errno {errno} -> {err:?}");
    err
}
