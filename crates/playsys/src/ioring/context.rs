// playsys/src/ioring/context.rs
//! ioring context
//!
//! One ring: its validated setup request, its memory, and the mmap lookup
//! that hands that memory to the application.

use core::ptr::NonNull;

use playsys_abi::{
    IoringFeatures, IoringParams, IoringSetupFlags, SysError, SysResult, IORING_OFF_SQES,
    IORING_OFF_SQ_RING,
};

use super::ring::{DriverRing, RingGeometry, RingLayout, Rings};

/// Largest submission ring a caller may request
pub const IORING_MAX_ENTRIES: u32 = 32768;

/// Largest completion ring
pub const IORING_MAX_CQ_ENTRIES: u32 = 2 * IORING_MAX_ENTRIES;

const _: () = assert!(IORING_MAX_ENTRIES.is_power_of_two());

/// Features published to every caller
pub const SUPPORTED_FEATURES: IoringFeatures =
    IoringFeatures::SINGLE_MMAP.union(IoringFeatures::NODROP);

/// Validated ring request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingRequest {
    /// Setup flags (known and supported bits only)
    pub flags: IoringSetupFlags,
    /// Memory geometry for the rounded ring sizes
    pub geometry: RingGeometry,
}

impl RingRequest {
    /// Validate a setup request
    ///
    /// Checks, in order: reserved fields, unknown flag bits, flags this
    /// engine cannot honour, `entries == 0`, and `entries` above
    /// [`IORING_MAX_ENTRIES`] (clamped with [`IoringSetupFlags::CLAMP`],
    /// rejected otherwise). The submission ring is `entries` rounded up to
    /// a power of two; the completion ring is twice that.
    pub fn new(entries: u32, params: &IoringParams) -> SysResult<Self> {
        if params.resv.iter().any(|&word| word != 0) {
            return Err(SysError::Invalid);
        }

        let flags = IoringSetupFlags::from_bits(params.flags).ok_or(SysError::Invalid)?;
        if flags.intersects(IoringSetupFlags::UNSUPPORTED) {
            log::warn!(
                "[IORING] setup rejected: unsupported flags {:?}",
                flags & IoringSetupFlags::UNSUPPORTED
            );
            return Err(SysError::NotSupported);
        }

        let entries = match entries {
            0 => return Err(SysError::Invalid),
            n if n > IORING_MAX_ENTRIES => {
                if !flags.contains(IoringSetupFlags::CLAMP) {
                    log::warn!("[IORING] setup rejected: {n} entries");
                    return Err(SysError::Invalid);
                }
                IORING_MAX_ENTRIES
            }
            n => n,
        };

        // entries <= IORING_MAX_ENTRIES, so neither step can overflow
        let sq_entries = entries.next_power_of_two();
        let cq_entries = 2 * sq_entries;

        Ok(Self {
            flags,
            geometry: RingGeometry::new(sq_entries, cq_entries)?,
        })
    }
}

/// Live ring
#[derive(Debug)]
pub struct IoringContext {
    flags: IoringSetupFlags,
    rings: Rings,
    layout: RingLayout,
}

impl IoringContext {
    /// Allocate the ring described by `request`
    ///
    /// Either the whole ring exists afterwards or nothing was allocated.
    pub fn new(request: &RingRequest) -> SysResult<Self> {
        let layout = RingLayout::new(&request.geometry)?;
        layout.validate()?;
        let rings = Rings::new(request.geometry)?;
        Ok(Self {
            flags: request.flags,
            rings,
            layout,
        })
    }

    /// Setup flags the ring was created with
    #[must_use]
    pub const fn flags(&self) -> IoringSetupFlags {
        self.flags
    }

    /// Ring memory
    #[must_use]
    pub const fn rings(&self) -> &Rings {
        &self.rings
    }

    /// Bytes of memory held by this ring
    #[must_use]
    pub const fn memory_size(&self) -> usize {
        self.rings.rings_memory().len() + self.rings.sqes_memory().len()
    }

    /// Driver-side view of the ring
    pub fn driver(&mut self) -> DriverRing<'_> {
        self.rings.driver()
    }

    /// Fill in the output fields of `params`
    pub fn publish(&self, params: &mut IoringParams) -> SysResult<()> {
        let geometry = self.rings.geometry();
        params.sq_entries = geometry.sq_entries;
        params.cq_entries = geometry.cq_entries;
        params.features = SUPPORTED_FEATURES.bits();
        params.sq_off = self.layout.sq_offsets()?;
        params.cq_off = self.layout.cq_offsets()?;
        Ok(())
    }

    /// Resolve an mmap request
    ///
    /// [`IORING_OFF_SQ_RING`] selects the control block (which also holds
    /// the completion entries and the SQ index array), [`IORING_OFF_SQES`]
    /// the submission entries. Anything else, or a length of zero or past
    /// the end of the region, is [`SysError::Invalid`].
    pub fn region(&self, offset: u64, len: usize) -> SysResult<NonNull<u8>> {
        let memory = match offset {
            IORING_OFF_SQ_RING => self.rings.rings_memory(),
            IORING_OFF_SQES => self.rings.sqes_memory(),
            _ => return Err(SysError::Invalid),
        };
        if len == 0 || len > memory.len() {
            return Err(SysError::Invalid);
        }
        Ok(memory.as_ptr())
    }
}
