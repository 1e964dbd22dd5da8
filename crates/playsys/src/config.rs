// playsys/src/config.rs
//! System configuration

use playsys_abi::Fd;

/// Lowest descriptor minted by the virtual file table
///
/// Host kernels hand out low descriptors; keeping virtual files far above
/// them avoids collisions without coordinating with the host.
pub const VFILE_FD_BASE: Fd = 0x4000_0000;

/// Initial number of virtual file slots
pub const VFILE_INITIAL_CAPACITY: usize = 32;

/// Number of ioring contexts that may be live at once
pub const IORING_POOL_CAPACITY: usize = 8;

/// Longest accepted path argument, in bytes (excluding the terminator)
pub const PATH_MAX: usize = 4096;

/// Construction-time settings for a [`crate::System`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemConfig {
    /// First descriptor of the virtual file range
    pub vfile_fd_base: Fd,
    /// Slots reserved by the virtual file table on first use
    pub vfile_initial_capacity: usize,
    /// Maximum number of live ioring contexts
    pub ioring_pool_capacity: usize,
    /// Cap on the total bytes of live ring memory, if any
    pub ring_memory_limit: Option<usize>,
}

impl SystemConfig {
    /// Set the first descriptor of the virtual file range
    #[must_use]
    pub const fn with_vfile_fd_base(mut self, base: Fd) -> Self {
        self.vfile_fd_base = base;
        self
    }

    /// Set the ioring pool capacity
    #[must_use]
    pub const fn with_ioring_pool_capacity(mut self, capacity: usize) -> Self {
        self.ioring_pool_capacity = capacity;
        self
    }

    /// Cap the total live ring memory
    #[must_use]
    pub const fn with_ring_memory_limit(mut self, limit: usize) -> Self {
        self.ring_memory_limit = Some(limit);
        self
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            vfile_fd_base: VFILE_FD_BASE,
            vfile_initial_capacity: VFILE_INITIAL_CAPACITY,
            ioring_pool_capacity: IORING_POOL_CAPACITY,
            ring_memory_limit: None,
        }
    }
}
