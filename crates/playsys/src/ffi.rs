// playsys/src/ffi.rs
//! C entry point for generated bindings

use spin::Lazy;

use crate::config::SystemConfig;
use crate::system::System;

/// Process-wide system behind [`p_syscall`]
static SYSTEM: Lazy<System> = Lazy::new(|| {
    #[cfg(unix)]
    let host = crate::host::PosixHost;
    #[cfg(not(unix))]
    let host = crate::host::NullHost;
    System::new(host, SystemConfig::default())
});

/// Global system used by [`p_syscall`]
#[must_use]
pub fn global() -> &'static System {
    &SYSTEM
}

/// Multiplexed syscall entry point
///
/// Returns a non-negative result or a negative error code.
///
/// # Safety
///
/// See [`System::dispatch`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn p_syscall(
    op: usize,
    a1: isize,
    a2: isize,
    a3: isize,
    a4: isize,
    a5: isize,
) -> isize {
    // SAFETY: forwarded from the caller.
    unsafe { SYSTEM.dispatch(op, [a1, a2, a3, a4, a5]) }
}
