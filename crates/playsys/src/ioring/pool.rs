// playsys/src/ioring/pool.rs
//! ioring instance pool
//!
//! A fixed number of ring slots. Freed slots go on a free list and are
//! reused; each slot carries a generation so a handle to a freed ring can
//! never reach the ring that replaced it.
//!
//! Every ring sits behind its own lock. The pool lock only guards the slot
//! table and is never held while a ring is in use, so work on one ring may
//! freely set up, map or release others (itself included).
//!
//! # Handle Layout
//!
//! ```text
//! RingHandle = u64
//! [63..32] Generation number (32 bits)
//! [31..0]  Slot index (32 bits)
//! ```

use core::fmt;
use std::sync::Arc;

use spin::Mutex;

use playsys_abi::{IoringParams, SysError, SysResult};

use super::context::{IoringContext, RingRequest};

/// Generation-checked reference to a pool slot
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RingHandle(u64);

impl RingHandle {
    const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | index as u64)
    }

    /// Slot index
    #[must_use]
    #[inline]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Slot generation
    #[must_use]
    #[inline]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Encoded value
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for RingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingHandle")
            .field("index", &self.index())
            .field("gen", &self.generation())
            .finish()
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    ring: Option<Arc<Mutex<IoringContext>>>,
    bytes: usize,
}

#[derive(Debug)]
struct PoolInner {
    slots: Vec<Slot>,
    free: Vec<u32>,
    capacity: usize,
    memory_limit: Option<usize>,
    live_bytes: usize,
}

impl PoolInner {
    fn slot(&mut self, handle: RingHandle) -> SysResult<&mut Slot> {
        self.slots
            .get_mut(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation() && slot.ring.is_some())
            .ok_or(SysError::BadFd)
    }

    /// Pick a slot index without claiming it
    fn vacant(&self) -> SysResult<u32> {
        if let Some(&index) = self.free.last() {
            return Ok(index);
        }
        if self.slots.len() < self.capacity {
            return u32::try_from(self.slots.len()).map_err(|_| SysError::NoMemory);
        }
        Err(SysError::NoMemory)
    }
}

/// Pool of live rings
pub struct IoringPool {
    inner: Mutex<PoolInner>,
}

impl IoringPool {
    /// Create a pool holding at most `capacity` rings and, if given, at most
    /// `memory_limit` bytes of ring memory
    #[must_use]
    pub const fn new(capacity: usize, memory_limit: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                slots: Vec::new(),
                free: Vec::new(),
                capacity,
                memory_limit,
                live_bytes: 0,
            }),
        }
    }

    /// Create a ring and publish its parameters into `params`
    ///
    /// Nothing is left allocated when this fails.
    pub fn setup(&self, entries: u32, params: &mut IoringParams) -> SysResult<RingHandle> {
        let request = RingRequest::new(entries, params)?;
        let size = request.geometry.total_size()?;

        let mut inner = self.inner.lock();
        let index = inner.vacant()?;
        if let Some(limit) = inner.memory_limit {
            let needed = inner
                .live_bytes
                .checked_add(size)
                .ok_or(SysError::NoMemory)?;
            if needed > limit {
                log::warn!("[IORING] setup rejected: ring memory limit {limit} reached");
                return Err(SysError::NoMemory);
            }
        }

        let ring = IoringContext::new(&request)?;
        ring.publish(params)?;
        let bytes = ring.memory_size();

        if inner.free.last() == Some(&index) {
            inner.free.pop();
        } else {
            inner.slots.push(Slot::default());
        }
        inner.live_bytes += bytes;

        let slot = &mut inner.slots[index as usize];
        slot.ring = Some(Arc::new(Mutex::new(ring)));
        slot.bytes = bytes;
        let handle = RingHandle::new(index, slot.generation);

        log::debug!(
            "[IORING] setup slot={index} gen={} sq={} cq={} bytes={bytes}",
            handle.generation(),
            params.sq_entries,
            params.cq_entries
        );
        Ok(handle)
    }

    /// Run `f` on a live ring
    ///
    /// Only that ring's lock is held while `f` runs. Releasing the ring from
    /// inside `f` frees the slot at once; the memory goes when `f` returns.
    pub fn with<R>(
        &self,
        handle: RingHandle,
        f: impl FnOnce(&mut IoringContext) -> R,
    ) -> SysResult<R> {
        let ring = {
            let mut inner = self.inner.lock();
            let slot = inner.slot(handle)?;
            slot.ring.clone().ok_or(SysError::BadFd)?
        };
        let mut ctx = ring.lock();
        Ok(f(&mut ctx))
    }

    /// Free a ring and its memory
    ///
    /// A handle whose ring is already freed is [`SysError::BadFd`].
    pub fn release(&self, handle: RingHandle) -> SysResult<()> {
        let (ring, bytes) = {
            let mut inner = self.inner.lock();
            let slot = inner.slot(handle)?;
            let ring = slot.ring.take().ok_or(SysError::BadFd)?;
            let bytes = core::mem::take(&mut slot.bytes);
            slot.generation = slot.generation.wrapping_add(1);
            inner.live_bytes = inner.live_bytes.saturating_sub(bytes);
            inner.free.push(handle.index());
            (ring, bytes)
        };
        drop(ring);

        log::debug!("[IORING] teardown slot={} bytes={bytes}", handle.index());
        Ok(())
    }

    /// Number of live rings
    #[must_use]
    pub fn live(&self) -> usize {
        let inner = self.inner.lock();
        inner.slots.len() - inner.free.len()
    }

    /// Bytes of live ring memory
    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.inner.lock().live_bytes
    }
}

impl fmt::Debug for IoringPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("IoringPool")
            .field("live", &(inner.slots.len() - inner.free.len()))
            .field("capacity", &inner.capacity)
            .field("live_bytes", &inner.live_bytes)
            .finish()
    }
}
