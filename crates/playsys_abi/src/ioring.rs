// playsys_abi/src/ioring.rs
//! ioring ABI
//!
//! Wire structures for the shared submission/completion ring facility. The
//! layouts are byte-compatible with Linux io_uring's setup/mmap handshake.
//!
//! # Memory Layout
//!
//! ```text
//! Sqe (64 bytes, repr(C)):
//! +0   opcode (1)
//! +1   flags (1)
//! +2   ioprio (2)
//! +4   fd (4)
//! +8   off (8)
//! +16  addr (8)
//! +24  len (4)
//! +28  op_flags (4)
//! +32  user_data (8)
//! +40  buf_index (2)
//! +42  personality (2)
//! +44  file_index (4)
//! +48  _pad2 (16)
//! = 64 bytes
//!
//! Cqe (16 bytes, repr(C)):
//! +0   user_data (8)
//! +8   res (4)
//! +12  flags (4)
//! = 16 bytes
//! ```

use bitflags::bitflags;

use crate::native::Fd;

/// mmap offset selecting the shared control block (which also holds the
/// completion entries and the submission index array)
pub const IORING_OFF_SQ_RING: u64 = 0;

/// mmap offset of the completion ring in split-mapping layouts
///
/// Rings created here always advertise [`IoringFeatures::SINGLE_MMAP`], so
/// this offset is never accepted; it is kept so bindings stay complete.
pub const IORING_OFF_CQ_RING: u64 = 0x800_0000;

/// mmap offset selecting the submission queue entry array
pub const IORING_OFF_SQES: u64 = 0x1000_0000;

bitflags! {
    /// Flags for [`IoringParams::flags`]
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IoringSetupFlags: u32 {
        /// io_context is polled
        const IOPOLL     = 1 << 0;
        /// SQ poll thread
        const SQPOLL     = 1 << 1;
        /// sq_thread_cpu is valid
        const SQ_AFF     = 1 << 2;
        /// App defines CQ size
        const CQSIZE     = 1 << 3;
        /// Clamp SQ/CQ ring sizes
        const CLAMP      = 1 << 4;
        /// Attach to existing wq
        const ATTACH_WQ  = 1 << 5;
        /// Start with ring disabled
        const R_DISABLED = 1 << 6;
    }
}

impl IoringSetupFlags {
    /// Flags that need kernel-thread backing, which this engine never has
    pub const UNSUPPORTED: Self = Self::IOPOLL
        .union(Self::SQPOLL)
        .union(Self::CQSIZE)
        .union(Self::SQ_AFF)
        .union(Self::ATTACH_WQ);
}

bitflags! {
    /// Flags for [`IoringParams::features`]
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IoringFeatures: u32 {
        /// SQ and CQ rings are mapped with a single mmap call
        const SINGLE_MMAP     = 1 << 0;
        /// Completion events are never dropped
        const NODROP          = 1 << 1;
        /// Submission data is stable once submitted
        const SUBMIT_STABLE   = 1 << 2;
        /// Offset -1 means current file position
        const RW_CUR_POS      = 1 << 3;
        /// Requests use the submitter's personality
        const CUR_PERSONALITY = 1 << 4;
        /// Internal poll for readiness
        const FAST_POLL       = 1 << 5;
        /// 32-bit poll events
        const POLL_32BITS     = 1 << 6;
        /// SQPOLL works with non-fixed files
        const SQPOLL_NONFIXED = 1 << 7;
        /// Extended enter arguments
        const EXT_ARG         = 1 << 8;
        /// Native worker threads
        const NATIVE_WORKERS  = 1 << 9;
        /// Resource tags
        const RSRC_TAGS       = 1 << 10;
    }
}

bitflags! {
    /// Flags for [`Sqe::flags`]
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SqeFlags: u8 {
        /// Use fixed fileset
        const FIXED_FILE    = 1 << 0;
        /// Issue after inflight IO
        const IO_DRAIN      = 1 << 1;
        /// Links next sqe
        const IO_LINK       = 1 << 2;
        /// Like LINK, but stronger
        const IO_HARDLINK   = 1 << 3;
        /// Always go async
        const ASYNC         = 1 << 4;
        /// Select buffer from sqe->buf_group
        const BUFFER_SELECT = 1 << 5;
    }
}

bitflags! {
    /// Flags for [`Cqe::flags`]
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CqeFlags: u32 {
        /// The upper 16 bits are the buffer ID
        const BUFFER = 1 << 0;
        /// Parent SQE will generate more CQE entries
        const MORE   = 1 << 1;
    }
}

bitflags! {
    /// Runtime flags in the control block's `sq_flags` (driver-written)
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SqFlags: u32 {
        /// Needs ioring_enter wakeup
        const NEED_WAKEUP = 1 << 0;
        /// CQ ring has overflown
        const CQ_OVERFLOW = 1 << 1;
    }
}

bitflags! {
    /// Runtime flags in the control block's `cq_flags` (application-written)
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CqFlags: u32 {
        /// Disable eventfd notifications
        const EVENTFD_DISABLED = 1 << 0;
    }
}

bitflags! {
    /// Flags for the `ioring_enter` operation
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IoringEnterFlags: u32 {
        /// Wait for completions
        const GETEVENTS = 1 << 0;
        /// Wake up the SQ poll thread
        const SQ_WAKEUP = 1 << 1;
        /// Wait for SQ space
        const SQ_WAIT   = 1 << 2;
        /// Extended argument
        const EXT_ARG   = 1 << 3;
    }
}

/// Byte offsets of the submission queue fields inside the control block
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqOffsets {
    /// Offset of the SQ head (driver-written)
    pub head: u32,
    /// Offset of the SQ tail (application-written)
    pub tail: u32,
    /// Offset of the SQ ring mask
    pub ring_mask: u32,
    /// Offset of the SQ entry count
    pub ring_entries: u32,
    /// Offset of the runtime SQ flags
    pub flags: u32,
    /// Offset of the dropped-submission counter
    pub dropped: u32,
    /// Offset of the SQ index array
    pub array: u32,
    /// Reserved
    pub resv1: u32,
    /// Reserved
    pub resv2: u64,
}

/// Byte offsets of the completion queue fields inside the control block
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CqOffsets {
    /// Offset of the CQ head (application-written)
    pub head: u32,
    /// Offset of the CQ tail (driver-written)
    pub tail: u32,
    /// Offset of the CQ ring mask
    pub ring_mask: u32,
    /// Offset of the CQ entry count
    pub ring_entries: u32,
    /// Offset of the overflow counter
    pub overflow: u32,
    /// Offset of the CQE array
    pub cqes: u32,
    /// Offset of the runtime CQ flags
    pub flags: u32,
    /// Reserved
    pub resv1: u32,
    /// Reserved
    pub resv2: u64,
}

/// ioring configuration, passed to `ioring_setup`; updated with the
/// resulting sizes, features and field offsets on success
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoringParams {
    /// Submission queue entries (output)
    pub sq_entries: u32,
    /// Completion queue entries (output)
    pub cq_entries: u32,
    /// `IoringSetupFlags` bits (input)
    pub flags: u32,
    /// CPU for the SQ poll thread
    pub sq_thread_cpu: u32,
    /// SQ poll thread idle time
    pub sq_thread_idle: u32,
    /// `IoringFeatures` bits (output)
    pub features: u32,
    /// Worker queue to attach to
    pub wq_fd: u32,
    /// Reserved, must be zero
    pub resv: [u32; 3],
    /// Submission queue offsets (output)
    pub sq_off: SqOffsets,
    /// Completion queue offsets (output)
    pub cq_off: CqOffsets,
}

impl IoringParams {
    /// Create parameters requesting the given setup flags
    #[must_use]
    pub fn with_flags(flags: IoringSetupFlags) -> Self {
        Self {
            flags: flags.bits(),
            ..Self::default()
        }
    }

    /// Setup flags, retaining unknown bits
    #[must_use]
    pub const fn setup_flags(&self) -> IoringSetupFlags {
        IoringSetupFlags::from_bits_retain(self.flags)
    }

    /// Published features
    #[must_use]
    pub const fn features(&self) -> IoringFeatures {
        IoringFeatures::from_bits_retain(self.features)
    }
}

/// Submission queue entry ("SQE")
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sqe {
    /// Type of operation for this sqe
    pub opcode: u8,
    /// `SqeFlags` bits
    pub flags: u8,
    /// I/O priority for the request
    pub ioprio: u16,
    /// File descriptor to do I/O on
    pub fd: Fd,
    /// Offset into file
    pub off: u64,
    /// Pointer to buffer or iovecs
    pub addr: u64,
    /// Buffer size or number of iovecs
    pub len: u32,
    /// Operation-specific flags
    pub op_flags: u32,
    /// Data passed back at completion time
    pub user_data: u64,
    /// Index into fixed buffers, if used
    pub buf_index: u16,
    /// Personality to use, if used
    pub personality: u16,
    /// Splice input descriptor or file index
    pub file_index: u32,
    /// Padding
    pub _pad2: [u64; 2],
}

/// Completion queue entry ("CQE")
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cqe {
    /// `user_data` of the originating SQE
    pub user_data: u64,
    /// Result code for this event
    pub res: i32,
    /// `CqeFlags` bits
    pub flags: u32,
}

impl Cqe {
    /// Create a completion entry
    #[must_use]
    pub const fn new(user_data: u64, res: i32, flags: CqeFlags) -> Self {
        Self {
            user_data,
            res,
            flags: flags.bits(),
        }
    }
}

// Compile-time size checks
const _: () = assert!(core::mem::size_of::<Sqe>() == 64, "Sqe must be 64 bytes");
const _: () = assert!(core::mem::size_of::<Cqe>() == 16, "Cqe must be 16 bytes");
const _: () = assert!(core::mem::size_of::<SqOffsets>() == 40);
const _: () = assert!(core::mem::size_of::<CqOffsets>() == 40);
const _: () = assert!(
    core::mem::size_of::<IoringParams>() == 120,
    "IoringParams must be 120 bytes"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqe_field_offsets() {
        assert_eq!(core::mem::offset_of!(Sqe, fd), 4);
        assert_eq!(core::mem::offset_of!(Sqe, off), 8);
        assert_eq!(core::mem::offset_of!(Sqe, addr), 16);
        assert_eq!(core::mem::offset_of!(Sqe, len), 24);
        assert_eq!(core::mem::offset_of!(Sqe, user_data), 32);
        assert_eq!(core::mem::offset_of!(Sqe, buf_index), 40);
        assert_eq!(core::mem::offset_of!(Sqe, file_index), 44);
    }

    #[test]
    fn test_params_field_offsets() {
        assert_eq!(core::mem::offset_of!(IoringParams, resv), 28);
        assert_eq!(core::mem::offset_of!(IoringParams, sq_off), 40);
        assert_eq!(core::mem::offset_of!(IoringParams, cq_off), 80);
    }

    #[test]
    fn test_unsupported_setup_flags() {
        let unsupported = IoringSetupFlags::UNSUPPORTED;
        assert!(unsupported.contains(IoringSetupFlags::IOPOLL));
        assert!(unsupported.contains(IoringSetupFlags::SQPOLL));
        assert!(unsupported.contains(IoringSetupFlags::CQSIZE));
        assert!(unsupported.contains(IoringSetupFlags::SQ_AFF));
        assert!(unsupported.contains(IoringSetupFlags::ATTACH_WQ));
        assert!(!unsupported.contains(IoringSetupFlags::CLAMP));
        assert!(!unsupported.contains(IoringSetupFlags::R_DISABLED));
    }

    #[test]
    fn test_params_flags() {
        let p = IoringParams::with_flags(IoringSetupFlags::CLAMP);
        assert_eq!(p.flags, 16);
        assert_eq!(p.setup_flags(), IoringSetupFlags::CLAMP);
    }
}
