// playsys_abi/src/lib.rs
//! Playsys Shared ABI Definitions
//!
//! This crate provides the wire-level Application Binary Interface shared
//! between the syscall personality layer and the code calling into it
//! (including generated C/TypeScript bindings).
//!
//! # Architecture
//!
//! Every operation goes through one multiplexed entry point taking an
//! operation code and five word-sized arguments. Results are a non-negative
//! value on success or one of a small, closed set of negative error codes.
//!
//! The ioring interface uses two ring buffers in memory shared between the
//! application and the driver:
//! - **Submission Queue (SQ)**: application writes requests, driver reads
//! - **Completion Queue (CQ)**: driver writes results, application reads
//!
//! # Modules
//!
//! - [`error`]: The closed syscall error enumeration
//! - [`native`]: Operation codes and open/mmap flag words
//! - [`ioring`]: Ring setup parameters, offsets, SQE/CQE layouts and flags

#![no_std]
#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod ioring;
pub mod native;

// Re-export commonly used types
pub use error::{ErrorCategory, SysError, SysResult};
pub use ioring::{
    Cqe, CqFlags, CqOffsets, CqeFlags, IoringEnterFlags, IoringFeatures, IoringParams,
    IoringSetupFlags, Sqe, SqFlags, SqOffsets, SqeFlags, IORING_OFF_CQ_RING, IORING_OFF_SQES,
    IORING_OFF_SQ_RING,
};
pub use native::{AccessMode, Fd, MmapFlags, OpenFlags, SysOp, AT_FDCWD, FD_STDERR, FD_STDIN, FD_STDOUT};

/// Version of the syscall API, reported by the `/sys/uname` special file
pub const SYS_API_VERSION: u32 = 1;
