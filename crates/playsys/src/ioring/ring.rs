// playsys/src/ioring/ring.rs
//! Ring buffer memory for ioring
//!
//! This module owns the memory shared between the driver (this crate) and
//! the application, and the only code that touches it.
//!
//! ## Memory Layout
//!
//! Two allocations per ring, both cache-line aligned:
//!
//! ```text
//! control block (mmap offset IORING_OFF_SQ_RING):
//! +0     sq.head            driver writes
//! +64    sq.tail            application writes
//! +128   cq.head            application writes
//! +192   cq.tail            driver writes
//! +256   sq_ring_mask       constant
//! +260   cq_ring_mask       constant
//! +264   sq_ring_entries    constant
//! +268   cq_ring_entries    constant
//! +272   sq_dropped         driver writes
//! +276   sq_flags           driver writes
//! +280   cq_flags           application writes
//! +284   cq_overflow        driver writes
//! +320   cqes[cq_entries]   driver writes
//! +N     sq_array[sq_entries] (N = next cache line) application writes
//!
//! SQE array (mmap offset IORING_OFF_SQES):
//! +0     sqes[sq_entries]   application writes
//! ```
//!
//! ## Ordering
//!
//! Every cross-side index is an `AtomicU32`. A writer publishes with a
//! `Release` store after the entry it covers is written; the reader loads
//! the index with `Acquire` before touching the entry. Concretely:
//!
//! - application: write SQE and `sq_array` slot, then `Release` SQ tail
//! - driver: `Acquire` SQ tail, copy the SQE out, then `Release` SQ head
//! - driver: `Acquire` CQ head (slot free), write CQE, then `Release` CQ tail
//! - application: `Acquire` CQ tail, copy the CQE out, then `Release` CQ head
//!
//! Dropping any of these lets one side observe an index before the entry
//! behind it, i.e. read a stale entry.

use core::alloc::Layout;
use core::mem::{offset_of, size_of};
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, Ordering};

use playsys_abi::{Cqe, CqOffsets, IoringParams, Sqe, SqFlags, SqOffsets, SysError, SysResult};

/// Alignment of the shared allocations and of the head/tail words
pub const CACHE_LINE: usize = 64;

/// Word padded out to its own cache line
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct CacheAligned<T>(pub T);

/// Head and tail of one ring
#[repr(C)]
#[derive(Debug, Default)]
pub struct RingIndex {
    /// Consumer position
    pub head: CacheAligned<AtomicU32>,
    /// Producer position
    pub tail: CacheAligned<AtomicU32>,
}

/// Fixed front of the shared control block
///
/// Head/tail values are free-running counters; mask them with the ring mask
/// to get a slot index.
#[repr(C)]
#[derive(Debug)]
pub struct ControlBlock {
    /// Submission ring: driver owns head, application owns tail
    pub sq: RingIndex,
    /// Completion ring: application owns head, driver owns tail
    pub cq: RingIndex,
    /// `sq_ring_entries - 1`
    pub sq_ring_mask: u32,
    /// `cq_ring_entries - 1`
    pub cq_ring_mask: u32,
    /// Submission ring size (power of two)
    pub sq_ring_entries: u32,
    /// Completion ring size (power of two)
    pub cq_ring_entries: u32,
    /// Submissions dropped for carrying an invalid index
    pub sq_dropped: AtomicU32,
    /// Runtime [`SqFlags`]
    pub sq_flags: AtomicU32,
    /// Runtime [`playsys_abi::CqFlags`]
    pub cq_flags: AtomicU32,
    /// Completions lost because the ring was full
    pub cq_overflow: AtomicU32,
    /// Start of the completion entry array
    pub cqes: CacheAligned<[Cqe; 0]>,
}

const _: () = assert!(offset_of!(ControlBlock, sq) == 0);
const _: () = assert!(offset_of!(ControlBlock, cq) == 128);
const _: () = assert!(offset_of!(ControlBlock, sq_ring_mask) == 256);
const _: () = assert!(offset_of!(ControlBlock, cq_overflow) == 284);
const _: () = assert!(offset_of!(ControlBlock, cqes) == 320);
const _: () = assert!(size_of::<ControlBlock>() == 320);

/// Round `value` up to a multiple of `align` (a power of two)
const fn align_up(value: usize, align: usize) -> Option<usize> {
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Sizes and offsets of one ring's memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingGeometry {
    /// Submission ring size
    pub sq_entries: u32,
    /// Completion ring size
    pub cq_entries: u32,
    /// Offset of the SQ index array inside the control block allocation
    pub sq_array_offset: usize,
    /// Bytes in the control block allocation
    pub rings_size: usize,
    /// Bytes in the SQE allocation
    pub sqes_size: usize,
}

impl RingGeometry {
    /// Compute the geometry for the given ring sizes
    ///
    /// Every step is overflow-checked; a size that does not fit is
    /// [`SysError::Overflow`].
    pub fn new(sq_entries: u32, cq_entries: u32) -> SysResult<Self> {
        let cq = usize::try_from(cq_entries).map_err(|_| SysError::Overflow)?;
        let sq = usize::try_from(sq_entries).map_err(|_| SysError::Overflow)?;

        let cqes_size = size_of::<Cqe>()
            .checked_mul(cq)
            .ok_or(SysError::Overflow)?;
        let cqes_end = offset_of!(ControlBlock, cqes)
            .checked_add(cqes_size)
            .ok_or(SysError::Overflow)?;
        let sq_array_offset = align_up(cqes_end, CACHE_LINE).ok_or(SysError::Overflow)?;
        let sq_array_size = size_of::<u32>()
            .checked_mul(sq)
            .ok_or(SysError::Overflow)?;
        let rings_size = sq_array_offset
            .checked_add(sq_array_size)
            .ok_or(SysError::Overflow)?;
        let sqes_size = size_of::<Sqe>()
            .checked_mul(sq)
            .ok_or(SysError::Overflow)?;

        Ok(Self {
            sq_entries,
            cq_entries,
            sq_array_offset,
            rings_size,
            sqes_size,
        })
    }

    /// Total bytes across both allocations
    pub fn total_size(&self) -> SysResult<usize> {
        self.rings_size
            .checked_add(self.sqes_size)
            .ok_or(SysError::Overflow)
    }
}

/// One entry of a [`RingLayout`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    /// Field name
    pub name: &'static str,
    /// Byte offset in the control block
    pub offset: usize,
    /// Byte size
    pub size: usize,
    /// Required alignment
    pub align: usize,
}

impl FieldLayout {
    const fn word(name: &'static str, offset: usize) -> Self {
        Self {
            name,
            offset,
            size: size_of::<u32>(),
            align: align_of::<u32>(),
        }
    }

    const fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.size)
    }
}

/// Versioned description of the control block layout
///
/// Built from the [`ControlBlock`] definition and a [`RingGeometry`], then
/// validated before any offset is published, so that the integers handed to
/// the application are checked rather than assumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingLayout {
    /// Layout version
    pub version: u32,
    /// Size of the control block allocation
    pub size: usize,
    /// Fields, ascending by offset
    pub fields: [FieldLayout; 14],
}

impl RingLayout {
    /// Current layout version
    pub const VERSION: u32 = 1;

    /// Describe the control block for `geometry`
    pub fn new(geometry: &RingGeometry) -> SysResult<Self> {
        let cq = usize::try_from(geometry.cq_entries).map_err(|_| SysError::Overflow)?;
        let sq = usize::try_from(geometry.sq_entries).map_err(|_| SysError::Overflow)?;
        let cqes_size = size_of::<Cqe>()
            .checked_mul(cq)
            .ok_or(SysError::Overflow)?;
        let sq_array_size = size_of::<u32>()
            .checked_mul(sq)
            .ok_or(SysError::Overflow)?;

        let sq_base = offset_of!(ControlBlock, sq);
        let cq_base = offset_of!(ControlBlock, cq);
        let head = offset_of!(RingIndex, head);
        let tail = offset_of!(RingIndex, tail);

        Ok(Self {
            version: Self::VERSION,
            size: geometry.rings_size,
            fields: [
                FieldLayout::word("sq.head", sq_base + head),
                FieldLayout::word("sq.tail", sq_base + tail),
                FieldLayout::word("cq.head", cq_base + head),
                FieldLayout::word("cq.tail", cq_base + tail),
                FieldLayout::word("sq_ring_mask", offset_of!(ControlBlock, sq_ring_mask)),
                FieldLayout::word("cq_ring_mask", offset_of!(ControlBlock, cq_ring_mask)),
                FieldLayout::word("sq_ring_entries", offset_of!(ControlBlock, sq_ring_entries)),
                FieldLayout::word("cq_ring_entries", offset_of!(ControlBlock, cq_ring_entries)),
                FieldLayout::word("sq_dropped", offset_of!(ControlBlock, sq_dropped)),
                FieldLayout::word("sq_flags", offset_of!(ControlBlock, sq_flags)),
                FieldLayout::word("cq_flags", offset_of!(ControlBlock, cq_flags)),
                FieldLayout::word("cq_overflow", offset_of!(ControlBlock, cq_overflow)),
                FieldLayout {
                    name: "cqes",
                    offset: offset_of!(ControlBlock, cqes),
                    size: cqes_size,
                    align: CACHE_LINE,
                },
                FieldLayout {
                    name: "sq_array",
                    offset: geometry.sq_array_offset,
                    size: sq_array_size,
                    align: align_of::<u32>(),
                },
            ],
        })
    }

    /// Check every field is in bounds, aligned, and disjoint from the next
    pub fn validate(&self) -> SysResult<()> {
        let mut prev_end = 0usize;
        for field in &self.fields {
            let end = field.end().ok_or(SysError::Overflow)?;
            if end > self.size || field.offset % field.align != 0 || field.offset < prev_end {
                log::warn!("[IORING] bad ring layout at field {}", field.name);
                return Err(SysError::Invalid);
            }
            prev_end = end;
        }
        Ok(())
    }

    /// Offset of the named field
    #[must_use]
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.offset)
    }

    fn offset_u32(&self, name: &str) -> SysResult<u32> {
        let offset = self.offset_of(name).ok_or(SysError::Invalid)?;
        u32::try_from(offset).map_err(|_| SysError::Overflow)
    }

    /// Submission queue offsets to publish
    pub fn sq_offsets(&self) -> SysResult<SqOffsets> {
        Ok(SqOffsets {
            head: self.offset_u32("sq.head")?,
            tail: self.offset_u32("sq.tail")?,
            ring_mask: self.offset_u32("sq_ring_mask")?,
            ring_entries: self.offset_u32("sq_ring_entries")?,
            flags: self.offset_u32("sq_flags")?,
            dropped: self.offset_u32("sq_dropped")?,
            array: self.offset_u32("sq_array")?,
            ..SqOffsets::default()
        })
    }

    /// Completion queue offsets to publish
    pub fn cq_offsets(&self) -> SysResult<CqOffsets> {
        Ok(CqOffsets {
            head: self.offset_u32("cq.head")?,
            tail: self.offset_u32("cq.tail")?,
            ring_mask: self.offset_u32("cq_ring_mask")?,
            ring_entries: self.offset_u32("cq_ring_entries")?,
            overflow: self.offset_u32("cq_overflow")?,
            cqes: self.offset_u32("cqes")?,
            flags: self.offset_u32("cq_flags")?,
            ..CqOffsets::default()
        })
    }
}

/// Zeroed, cache-line aligned heap block, freed on drop
#[derive(Debug)]
pub struct RingMemory {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: RingMemory uniquely owns its allocation; all shared access goes
// through atomics or through the single-writer discipline documented above.
unsafe impl Send for RingMemory {}
// SAFETY: see above.
unsafe impl Sync for RingMemory {}

impl RingMemory {
    /// Allocate `size` zeroed bytes
    ///
    /// An impossible layout is [`SysError::Overflow`]; allocator failure is
    /// [`SysError::NoMemory`].
    pub fn zeroed(size: usize) -> SysResult<Self> {
        let layout = Layout::from_size_align(size.max(1), CACHE_LINE)
            .map_err(|_| SysError::Overflow)?;
        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(SysError::NoMemory)?;
        Ok(Self { ptr, layout })
    }

    /// Start of the block
    #[must_use]
    pub const fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Size of the block in bytes
    #[must_use]
    pub const fn len(&self) -> usize {
        self.layout.size()
    }

    /// Whether the block is empty (never true)
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }
}

impl Drop for RingMemory {
    fn drop(&mut self) {
        // SAFETY: ptr was returned by alloc_zeroed with this layout.
        unsafe { std::alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// Both allocations of one ring
#[derive(Debug)]
pub struct Rings {
    geometry: RingGeometry,
    rings: RingMemory,
    sqes: RingMemory,
}

impl Rings {
    /// Allocate and initialize ring memory
    ///
    /// Either both blocks are live on return or neither is.
    pub fn new(geometry: RingGeometry) -> SysResult<Self> {
        let rings = RingMemory::zeroed(geometry.rings_size)?;
        // `rings` is dropped (freed) if this fails
        let sqes = RingMemory::zeroed(geometry.sqes_size)?;

        let cb = rings.as_ptr().as_ptr().cast::<ControlBlock>();
        // SAFETY: the block is at least size_of::<ControlBlock>() bytes,
        // aligned to CACHE_LINE, and not yet shared with anyone.
        unsafe {
            (&raw mut (*cb).sq_ring_mask).write(geometry.sq_entries - 1);
            (&raw mut (*cb).cq_ring_mask).write(geometry.cq_entries - 1);
            (&raw mut (*cb).sq_ring_entries).write(geometry.sq_entries);
            (&raw mut (*cb).cq_ring_entries).write(geometry.cq_entries);
        }

        Ok(Self {
            geometry,
            rings,
            sqes,
        })
    }

    /// Ring geometry
    #[must_use]
    pub const fn geometry(&self) -> &RingGeometry {
        &self.geometry
    }

    /// Control block allocation
    #[must_use]
    pub const fn rings_memory(&self) -> &RingMemory {
        &self.rings
    }

    /// SQE allocation
    #[must_use]
    pub const fn sqes_memory(&self) -> &RingMemory {
        &self.sqes
    }

    /// Shared view of the control block
    #[must_use]
    pub fn control(&self) -> &ControlBlock {
        // SAFETY: initialized in new(); every field written after that is
        // atomic, so shared references stay valid while the application
        // writes through its mapping.
        unsafe { self.rings.as_ptr().cast::<ControlBlock>().as_ref() }
    }

    /// Submissions the driver has not consumed yet
    #[must_use]
    pub fn sq_pending(&self) -> u32 {
        let cb = self.control();
        cb.sq.tail.0
            .load(Ordering::Acquire)
            .wrapping_sub(cb.sq.head.0.load(Ordering::Acquire))
    }

    /// Completions the application has not consumed yet
    #[must_use]
    pub fn cq_ready(&self) -> u32 {
        let cb = self.control();
        cb.cq.tail.0
            .load(Ordering::Acquire)
            .wrapping_sub(cb.cq.head.0.load(Ordering::Acquire))
    }

    /// Driver-side view
    ///
    /// `&mut self` makes the driver the only writer of its fields.
    pub fn driver(&mut self) -> DriverRing<'_> {
        DriverRing { rings: self }
    }

    fn sq_array_slot(&self, index: u32) -> *mut u32 {
        let offset = self.geometry.sq_array_offset + (index as usize) * size_of::<u32>();
        // SAFETY: index is masked by the caller, so the slot is in bounds.
        unsafe { self.rings.as_ptr().as_ptr().add(offset).cast() }
    }

    fn cqe_slot(&self, index: u32) -> *mut Cqe {
        let offset = offset_of!(ControlBlock, cqes) + (index as usize) * size_of::<Cqe>();
        // SAFETY: index is masked by the caller, so the slot is in bounds.
        unsafe { self.rings.as_ptr().as_ptr().add(offset).cast() }
    }

    fn sqe_slot(&self, index: u32) -> *const Sqe {
        // SAFETY: index < sq_entries is checked by the caller.
        unsafe { self.sqes.as_ptr().cast::<Sqe>().as_ptr().add(index as usize) }
    }
}

/// Driver side of a ring
///
/// Sole writer of SQ head, CQ tail, `sq_dropped`, `sq_flags`, `cq_overflow`
/// and every CQE slot.
#[derive(Debug)]
pub struct DriverRing<'a> {
    rings: &'a mut Rings,
}

impl DriverRing<'_> {
    /// Take the next submission
    ///
    /// Entries whose `sq_array` index is out of range are skipped and
    /// counted in `sq_dropped`.
    pub fn next_submission(&mut self) -> Option<Sqe> {
        let rings = &*self.rings;
        let cb = rings.control();
        let mask = cb.sq_ring_mask;
        let entries = cb.sq_ring_entries;

        let mut head = cb.sq.head.0.load(Ordering::Relaxed);
        loop {
            // pairs with the application's Release store of the tail
            let tail = cb.sq.tail.0.load(Ordering::Acquire);
            if head == tail {
                return None;
            }

            // SAFETY: masked slot is inside the sq_array.
            let index = unsafe { rings.sq_array_slot(head & mask).read() };
            head = head.wrapping_add(1);

            if index >= entries {
                let dropped = cb.sq_dropped.load(Ordering::Relaxed);
                cb.sq_dropped.store(dropped.wrapping_add(1), Ordering::Release);
                cb.sq.head.0.store(head, Ordering::Release);
                log::debug!("[IORING] dropped submission with index {index}");
                continue;
            }

            // SAFETY: index < sq_entries; the SQE is copied out before the
            // head store hands the slot back to the application.
            let sqe = unsafe { rings.sqe_slot(index).read() };
            cb.sq.head.0.store(head, Ordering::Release);
            return Some(sqe);
        }
    }

    /// Post a completion
    ///
    /// When the ring is full the event is counted in `cq_overflow`,
    /// [`SqFlags::CQ_OVERFLOW`] is raised, and the call fails with
    /// [`SysError::Overflow`].
    pub fn post_completion(&mut self, cqe: Cqe) -> SysResult<()> {
        let rings = &*self.rings;
        let cb = rings.control();

        let tail = cb.cq.tail.0.load(Ordering::Relaxed);
        // pairs with the application's Release store of the head
        let head = cb.cq.head.0.load(Ordering::Acquire);
        if tail.wrapping_sub(head) >= cb.cq_ring_entries {
            let overflow = cb.cq_overflow.load(Ordering::Relaxed);
            cb.cq_overflow.store(overflow.wrapping_add(1), Ordering::Release);
            let flags = cb.sq_flags.load(Ordering::Relaxed);
            cb.sq_flags
                .store(flags | SqFlags::CQ_OVERFLOW.bits(), Ordering::Release);
            return Err(SysError::Overflow);
        }

        // SAFETY: the slot at tail is free (tail - head < entries) and only
        // the driver writes CQE slots.
        unsafe { rings.cqe_slot(tail & cb.cq_ring_mask).write(cqe) };
        cb.cq.tail.0.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Raise or clear runtime SQ flags
    pub fn set_sq_flags(&mut self, flags: SqFlags) {
        self.rings
            .control()
            .sq_flags
            .store(flags.bits(), Ordering::Release);
    }
}

/// Application side of a ring, driven through the published offsets
///
/// Sole writer of SQ tail, CQ head, `cq_flags` and every SQE slot.
#[derive(Debug)]
pub struct AppRing {
    ring: NonNull<u8>,
    sqes: NonNull<Sqe>,
    params: IoringParams,
}

impl AppRing {
    /// Attach to mapped ring memory
    ///
    /// # Safety
    ///
    /// `ring` and `sqes` must be the regions mapped at
    /// [`playsys_abi::IORING_OFF_SQ_RING`] and [`playsys_abi::IORING_OFF_SQES`]
    /// for the ring `params` was returned for, they must stay mapped while
    /// this value lives, and no other application-side view may exist.
    #[must_use]
    pub const unsafe fn new(ring: NonNull<u8>, sqes: NonNull<u8>, params: IoringParams) -> Self {
        Self {
            ring,
            sqes: sqes.cast(),
            params,
        }
    }

    fn word(&self, offset: u32) -> &AtomicU32 {
        // SAFETY: offsets come from setup and point at aligned u32 fields
        // inside the mapped control block.
        unsafe { self.ring.add(offset as usize).cast::<AtomicU32>().as_ref() }
    }

    fn constant(&self, offset: u32) -> u32 {
        self.word(offset).load(Ordering::Relaxed)
    }

    /// Queue a submission
    ///
    /// Fails with [`SysError::Overflow`] when the submission ring is full.
    pub fn push_submission(&mut self, sqe: Sqe) -> SysResult<()> {
        let off = self.params.sq_off;
        let entries = self.constant(off.ring_entries);
        let mask = self.constant(off.ring_mask);

        // pairs with the driver's Release store of the head
        let head = self.word(off.head).load(Ordering::Acquire);
        let tail = self.word(off.tail).load(Ordering::Relaxed);
        if tail.wrapping_sub(head) >= entries {
            return Err(SysError::Overflow);
        }

        let slot = tail & mask;
        // SAFETY: slot < sq_entries; the driver has released it (head check).
        unsafe {
            self.sqes.add(slot as usize).write(sqe);
            self.ring
                .add(off.array as usize + slot as usize * size_of::<u32>())
                .cast::<u32>()
                .write(slot);
        }
        self.word(off.tail)
            .store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Take the next completion
    pub fn pop_completion(&mut self) -> Option<Cqe> {
        let off = self.params.cq_off;
        let mask = self.constant(off.ring_mask);

        // pairs with the driver's Release store of the tail
        let tail = self.word(off.tail).load(Ordering::Acquire);
        let head = self.word(off.head).load(Ordering::Relaxed);
        if head == tail {
            return None;
        }

        // SAFETY: slot is masked into the CQE array and was published by
        // the tail load above.
        let cqe = unsafe {
            self.ring
                .add(off.cqes as usize + (head & mask) as usize * size_of::<Cqe>())
                .cast::<Cqe>()
                .read()
        };
        self.word(off.head)
            .store(head.wrapping_add(1), Ordering::Release);
        Some(cqe)
    }

    /// Runtime SQ flags
    #[must_use]
    pub fn sq_flags(&self) -> SqFlags {
        SqFlags::from_bits_retain(self.word(self.params.sq_off.flags).load(Ordering::Acquire))
    }

    /// Completions lost to a full ring
    #[must_use]
    pub fn cq_overflow(&self) -> u32 {
        self.word(self.params.cq_off.overflow)
            .load(Ordering::Acquire)
    }

    /// Submissions dropped for carrying an invalid index
    #[must_use]
    pub fn sq_dropped(&self) -> u32 {
        self.word(self.params.sq_off.dropped)
            .load(Ordering::Acquire)
    }

    /// Write a raw `sq_array` entry and publish it, bypassing slot checks
    #[cfg(test)]
    pub(crate) fn push_raw_index(&mut self, index: u32) {
        let off = self.params.sq_off;
        let mask = self.constant(off.ring_mask);
        let tail = self.word(off.tail).load(Ordering::Relaxed);
        // SAFETY: masked slot is inside the sq_array.
        unsafe {
            self.ring
                .add(off.array as usize + (tail & mask) as usize * size_of::<u32>())
                .cast::<u32>()
                .write(index);
        }
        self.word(off.tail)
            .store(tail.wrapping_add(1), Ordering::Release);
    }
}
