// playsys/src/lib.rs
//! Playsys - portable syscall personality layer
//!
//! One calling convention (an operation code plus five word arguments, a
//! non-negative result or a small negative error code) on top of different
//! host kernels. Fd-bearing operations are first offered to an in-process
//! virtual file table; whatever no virtual file claims falls through to the
//! host.
//!
//! # Modules
//!
//! - [`system`]: the [`System`] context and its typed operations
//! - [`syscall`]: the raw dispatch table and `/sys` special files
//! - [`vfile`]: the virtual file table and capability objects
//! - [`ioring`]: shared submission/completion rings and their pool
//! - [`host`]: the host kernel abstraction and its backends
//! - [`config`]: construction-time settings
//! - [`ffi`]: the C entry point `p_syscall`

#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod ffi;
pub mod host;
pub mod ioring;
pub mod syscall;
pub mod system;
pub mod vfile;

pub use config::SystemConfig;
pub use host::{Host, NullHost};
#[cfg(unix)]
pub use host::PosixHost;
pub use system::System;
pub use vfile::{Capabilities, VFile, VFileDesc, VFileFlags, VFileKind, VFileOps, VFileTable};

pub use playsys_abi as abi;
pub use playsys_abi::{SysError, SysOp, SysResult};
