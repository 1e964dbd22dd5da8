// playsys/src/ioring/mod.rs
//! Shared submission/completion rings ("ioring")
//!
//! A ring is created by `ioring_setup`, which returns a virtual file. The
//! application reaches the ring memory only by calling `mmap` on that file
//! with one of the magic offsets, and frees it by closing the file.
//!
//! # Architecture
//!
//! ```text
//! Application                          Driver (this crate)
//! ┌─────────────────┐                ┌─────────────────┐
//! │ SQ tail, SQEs  ─┼── shared mem ──┼► SQ head        │
//! │                 │                │                 │
//! │ CQ head        ◄┼── shared mem ──┼─ CQ tail, CQEs  │
//! └─────────────────┘                └─────────────────┘
//! ```
//!
//! Submission processing (`ioring_enter`) and resource registration
//! (`ioring_register`) are not implemented and always report
//! [`SysError::NotSupported`].

pub mod context;
pub mod pool;
pub mod ring;

use core::any::Any;
use core::ptr::NonNull;
use std::sync::Arc;

use playsys_abi::{Fd, IoringParams, MmapFlags, SysError, SysResult};

use crate::host::Host;
use crate::vfile::{Capabilities, VFile, VFileDesc, VFileKind, VFileOps, VFileTable};

pub use context::{IoringContext, RingRequest, IORING_MAX_ENTRIES, SUPPORTED_FEATURES};
pub use pool::{IoringPool, RingHandle};
pub use ring::{AppRing, DriverRing, RingGeometry, RingLayout};

/// Description of ring virtual files
pub const IORING_VFILE: VFileDesc = VFileDesc::new(VFileKind::Ioring, "[ioring]");

/// Virtual file wrapping one pooled ring
#[derive(Debug)]
pub struct IoringFile {
    pool: Arc<IoringPool>,
    handle: RingHandle,
}

impl IoringFile {
    /// Pool slot of the ring
    #[must_use]
    pub const fn handle(&self) -> RingHandle {
        self.handle
    }
}

impl VFileOps for IoringFile {
    fn capabilities(&self) -> Capabilities {
        Capabilities::RELEASE | Capabilities::MMAP
    }

    fn release(&self, _file: &VFile) -> SysResult<()> {
        self.pool.release(self.handle)
    }

    fn mmap(
        &self,
        _file: &VFile,
        len: usize,
        _flags: MmapFlags,
        offset: u64,
    ) -> SysResult<NonNull<u8>> {
        self.pool.with(self.handle, |ring| ring.region(offset, len))?
    }
}

/// Create a ring and the virtual file that owns it
///
/// `params` is read for the request and, on success, receives the ring sizes,
/// features and field offsets. On failure nothing stays allocated.
pub fn setup(
    table: &VFileTable,
    pool: &Arc<IoringPool>,
    host: &dyn Host,
    entries: u32,
    params: &mut IoringParams,
) -> SysResult<Fd> {
    let mut published = *params;
    let handle = pool.setup(entries, &mut published)?;
    let resource = Arc::new(IoringFile {
        pool: Arc::clone(pool),
        handle,
    });

    match table.open(host, IORING_VFILE, resource) {
        Ok(file) => {
            *params = published;
            Ok(file.fd)
        }
        Err(e) => {
            let _ = pool.release(handle);
            Err(e)
        }
    }
}

/// Run the driver side of the ring behind `fd`
///
/// This is the hook a submission processor would use; `fd` must name a ring
/// created by [`setup`]. Only this ring is locked while `f` runs, so `f` may
/// close it or touch other rings.
pub fn with_driver<R>(
    table: &VFileTable,
    fd: Fd,
    f: impl FnOnce(&mut DriverRing<'_>) -> R,
) -> SysResult<R> {
    let file = table.lookup(fd).ok_or(SysError::BadFd)?;
    if file.kind != VFileKind::Ioring {
        return Err(SysError::BadFd);
    }
    let ring = ring_file(&file).ok_or(SysError::BadFd)?;
    ring.pool.with(ring.handle, |ctx| f(&mut ctx.driver()))
}

fn ring_file(file: &VFile) -> Option<&IoringFile> {
    let any: &dyn Any = &*file.resource;
    any.downcast_ref::<IoringFile>()
}
