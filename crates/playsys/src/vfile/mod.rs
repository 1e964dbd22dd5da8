// playsys/src/vfile/mod.rs
//! Virtual file table
//!
//! Virtual files are in-process resources addressed by descriptors, sitting
//! in front of the host's own descriptor space. Each record carries a
//! capability object ([`VFileOps`]); fd-bearing syscalls consult the table
//! first and fall through to the host only when no record claims the call.
//!
//! # Descriptor Space
//!
//! ```text
//! 0 ......................... vfile_fd_base ............... i32::MAX
//! |  host descriptors          |  minted virtual descriptors        |
//! ```
//!
//! Pipe-backed records are the exception: their key is a real host pipe end,
//! so plain reads and writes on it reach the host.
//!
//! # Locking
//!
//! The table sits behind a [`spin::Mutex`]. Records are cloned out of the
//! lock before any capability is invoked, so a resource may freely call back
//! into the table.

mod map;

use core::any::Any;
use core::fmt;
use core::ptr::NonNull;
use std::sync::Arc;

use bitflags::bitflags;
use spin::Mutex;

use playsys_abi::{Fd, MmapFlags, OpenFlags, SysError, SysResult};

use crate::config::SystemConfig;
use crate::host::Host;

pub use map::FdMap;

/// Content tag of a virtual file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VFileKind {
    /// GPU device
    GpuDevice,
    /// GUI surface
    GuiSurface,
    /// Shared submission/completion ring
    Ioring,
    /// Embedder-defined resource
    User(u16),
}

bitflags! {
    /// Behaviour bits of a virtual file
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VFileFlags: u32 {
        /// Backed by a host pipe; the caller gets the read end
        const PIPE_R = 1 << 0;
        /// Backed by a host pipe; the caller gets the write end
        const PIPE_W = 1 << 1;
    }
}

impl VFileFlags {
    /// Either pipe direction
    pub const PIPE: Self = Self::PIPE_R.union(Self::PIPE_W);
}

bitflags! {
    /// Operations a virtual file implements
    ///
    /// An absent bit means "not supported for this resource", which is
    /// distinct from "no virtual file at this descriptor".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u32 {
        /// Cleanup hook run by close
        const RELEASE = 1 << 0;
        /// Read
        const READ    = 1 << 1;
        /// Write
        const WRITE   = 1 << 2;
        /// Open relative to this file
        const OPENAT  = 1 << 3;
        /// Map memory
        const MMAP    = 1 << 4;
    }
}

/// Capability object of a virtual file
///
/// Only the methods whose bit is present in [`VFileOps::capabilities`] are
/// ever called. Resources are `Any` so owners can recover their concrete
/// type from a record.
pub trait VFileOps: Any + Send + Sync + fmt::Debug {
    /// Implemented operations
    fn capabilities(&self) -> Capabilities;

    /// Release resources; the record is removed whatever this returns
    fn release(&self, _file: &VFile) -> SysResult<()> {
        Err(SysError::NotSupported)
    }

    /// Read into `buf`
    fn read(&self, _file: &VFile, _buf: &mut [u8]) -> SysResult<usize> {
        Err(SysError::NotSupported)
    }

    /// Write from `buf`
    fn write(&self, _file: &VFile, _buf: &[u8]) -> SysResult<usize> {
        Err(SysError::NotSupported)
    }

    /// Open `path` relative to this file
    fn openat(
        &self,
        _file: &VFile,
        _path: &core::ffi::CStr,
        _flags: OpenFlags,
        _mode: u32,
    ) -> SysResult<Fd> {
        Err(SysError::NotSupported)
    }

    /// Map `len` bytes selected by `offset`
    fn mmap(
        &self,
        _file: &VFile,
        _len: usize,
        _flags: MmapFlags,
        _offset: u64,
    ) -> SysResult<NonNull<u8>> {
        Err(SysError::NotSupported)
    }
}

/// Static description of a virtual file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VFileDesc {
    /// Content tag
    pub kind: VFileKind,
    /// Behaviour bits
    pub flags: VFileFlags,
    /// Diagnostic name, e.g. `"[ioring]"`
    pub name: &'static str,
}

impl VFileDesc {
    /// Describe a plain (not pipe-backed) virtual file
    #[must_use]
    pub const fn new(kind: VFileKind, name: &'static str) -> Self {
        Self {
            kind,
            flags: VFileFlags::empty(),
            name,
        }
    }

    /// Set behaviour bits
    #[must_use]
    pub const fn with_flags(mut self, flags: VFileFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Virtual file record
#[derive(Clone)]
pub struct VFile {
    /// Descriptor the record is keyed by
    pub fd: Fd,
    /// Content tag
    pub kind: VFileKind,
    /// Behaviour bits
    pub flags: VFileFlags,
    /// Diagnostic name
    pub name: &'static str,
    /// Internal pipe end, for pipe-backed records
    pub peer: Option<Fd>,
    /// Capability object
    pub resource: Arc<dyn VFileOps>,
}

impl VFile {
    /// Whether the resource implements `cap`
    #[must_use]
    pub fn supports(&self, cap: Capabilities) -> bool {
        self.resource.capabilities().contains(cap)
    }

    /// Whether the key is a real host pipe end
    #[must_use]
    pub const fn is_pipe_backed(&self) -> bool {
        self.flags.intersects(VFileFlags::PIPE)
    }
}

impl fmt::Debug for VFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VFile")
            .field("fd", &self.fd)
            .field("kind", &self.kind)
            .field("flags", &self.flags)
            .field("name", &self.name)
            .field("peer", &self.peer)
            .field("caps", &self.resource.capabilities())
            .finish()
    }
}

/// Process-local table of virtual files
pub struct VFileTable {
    map: Mutex<FdMap<VFile>>,
}

impl VFileTable {
    /// Create an empty table
    #[must_use]
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            map: Mutex::new(FdMap::new(
                config.vfile_fd_base,
                config.vfile_initial_capacity,
            )),
        }
    }

    /// Number of live records
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }

    /// Live descriptors, ascending
    #[must_use]
    pub fn descriptors(&self) -> Vec<Fd> {
        self.map.lock().keys().to_vec()
    }

    /// Mint a descriptor in the virtual range and store a record there
    ///
    /// The new descriptor is one greater than the largest live key, or the
    /// range base when that is larger.
    pub fn allocate(&self, desc: VFileDesc, resource: Arc<dyn VFileOps>) -> SysResult<Fd> {
        self.map.lock().allocate_with(|fd| VFile {
            fd,
            kind: desc.kind,
            flags: desc.flags,
            name: desc.name,
            peer: None,
            resource,
        })
    }

    /// Store a record at an explicit descriptor
    ///
    /// Returns the record it replaced, if any.
    pub fn insert_at(
        &self,
        fd: Fd,
        desc: VFileDesc,
        peer: Option<Fd>,
        resource: Arc<dyn VFileOps>,
    ) -> SysResult<Option<VFile>> {
        let file = VFile {
            fd,
            kind: desc.kind,
            flags: desc.flags,
            name: desc.name,
            peer,
            resource,
        };
        self.map.lock().insert_at(fd, file)
    }

    /// Look up the record for `fd`
    #[must_use]
    pub fn lookup(&self, fd: Fd) -> Option<VFile> {
        self.map.lock().get(fd).cloned()
    }

    /// Whether `fd` names a virtual file
    #[must_use]
    pub fn contains(&self, fd: Fd) -> bool {
        self.map.lock().get(fd).is_some()
    }

    /// Delete the record for `fd`
    pub fn remove(&self, fd: Fd) -> Option<VFile> {
        self.map.lock().remove(fd)
    }

    /// Create a virtual file
    ///
    /// Pipe-backed files get a fresh host pipe: with [`VFileFlags::PIPE_R`]
    /// the record (and the caller) holds the read end and `peer` is the
    /// write end; [`VFileFlags::PIPE_W`] swaps the two. Other files get a
    /// minted descriptor.
    pub fn open(
        &self,
        host: &dyn Host,
        desc: VFileDesc,
        resource: Arc<dyn VFileOps>,
    ) -> SysResult<VFile> {
        let pipe = desc.flags & VFileFlags::PIPE;
        if pipe == VFileFlags::PIPE {
            return Err(SysError::Invalid);
        }

        if pipe.is_empty() {
            let fd = self.allocate(desc, Arc::clone(&resource))?;
            log::debug!("[VFILE] open {} fd={fd:#x} kind={:?}", desc.name, desc.kind);
            return Ok(VFile {
                fd,
                kind: desc.kind,
                flags: desc.flags,
                name: desc.name,
                peer: None,
                resource,
            });
        }

        let [read_end, write_end] = host.pipe()?;
        let (fd, peer) = if pipe.contains(VFileFlags::PIPE_R) {
            (read_end, write_end)
        } else {
            (write_end, read_end)
        };

        match self.insert_at(fd, desc, Some(peer), Arc::clone(&resource)) {
            Ok(Some(stale)) => {
                log::warn!("[VFILE] replaced stale record {} at fd={fd}", stale.name);
            }
            Ok(None) => {}
            Err(e) => {
                let _ = host.close(read_end);
                let _ = host.close(write_end);
                return Err(e);
            }
        }

        log::debug!(
            "[VFILE] open {} fd={fd} peer={peer} kind={:?}",
            desc.name,
            desc.kind
        );
        Ok(VFile {
            fd,
            kind: desc.kind,
            flags: desc.flags,
            name: desc.name,
            peer: Some(peer),
            resource,
        })
    }

    /// Close a virtual file
    ///
    /// Returns `None` when `fd` is not a virtual file so the caller can fall
    /// through to the host. Otherwise removes the record, runs `release` (if
    /// implemented) and, for pipe-backed files, closes both host ends. The
    /// result is `release`'s.
    ///
    /// Of two racing closes exactly one takes the record; the other sees a
    /// plain descriptor.
    pub fn close(&self, host: &dyn Host, fd: Fd) -> Option<SysResult<()>> {
        let file = self.remove(fd)?;

        let released = if file.supports(Capabilities::RELEASE) {
            file.resource.release(&file)
        } else {
            Ok(())
        };

        if let Some(peer) = file.peer {
            let _ = host.close(peer);
            let _ = host.close(file.fd);
        }

        log::debug!("[VFILE] close {} fd={fd:#x} -> {released:?}", file.name);
        Some(released)
    }
}

impl fmt::Debug for VFileTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VFileTable")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Counter {
        releases: AtomicUsize,
    }

    impl VFileOps for Counter {
        fn capabilities(&self) -> Capabilities {
            Capabilities::RELEASE | Capabilities::READ
        }

        fn release(&self, _file: &VFile) -> SysResult<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Err(SysError::End)
        }

        fn read(&self, _file: &VFile, buf: &mut [u8]) -> SysResult<usize> {
            buf.fill(7);
            Ok(buf.len())
        }
    }

    #[derive(Debug)]
    struct Inert;

    impl VFileOps for Inert {
        fn capabilities(&self) -> Capabilities {
            Capabilities::empty()
        }
    }

    fn table() -> VFileTable {
        VFileTable::new(&SystemConfig::default())
    }

    const DESC: VFileDesc = VFileDesc::new(VFileKind::User(1), "[test]");

    #[test]
    fn test_allocate_lookup_remove() {
        let t = table();
        let a = t.allocate(DESC, Arc::new(Inert)).unwrap();
        let file = t.lookup(a).unwrap();
        assert_eq!(file.fd, a);
        assert_eq!(file.flags, VFileFlags::empty());
        assert!(t.remove(a).is_some());
        assert!(t.lookup(a).is_none());
        assert!(t.remove(a).is_none());
    }

    #[test]
    fn test_open_plain_mints_in_range() {
        let t = table();
        let file = t.open(&NullHost, DESC, Arc::new(Inert)).unwrap();
        assert_eq!(file.fd, 0x4000_0000);
        assert_eq!(file.peer, None);
        assert!(t.contains(file.fd));
    }

    #[test]
    fn test_open_both_pipe_flags_invalid() {
        let t = table();
        let desc = DESC.with_flags(VFileFlags::PIPE);
        assert_eq!(
            t.open(&NullHost, desc, Arc::new(Inert)).unwrap_err(),
            SysError::Invalid
        );
        assert!(t.is_empty());
    }

    #[test]
    fn test_open_pipe_without_host_pipes() {
        let t = table();
        let desc = DESC.with_flags(VFileFlags::PIPE_R);
        assert_eq!(
            t.open(&NullHost, desc, Arc::new(Inert)).unwrap_err(),
            SysError::NotSupported
        );
        assert!(t.is_empty());
    }

    #[test]
    fn test_close_propagates_release_and_removes() {
        let t = table();
        let counter = Arc::new(Counter::default());
        let file = t.open(&NullHost, DESC, counter.clone()).unwrap();

        assert_eq!(t.close(&NullHost, file.fd), Some(Err(SysError::End)));
        assert_eq!(counter.releases.load(Ordering::SeqCst), 1);
        assert!(!t.contains(file.fd));

        // not a virtual file any more
        assert_eq!(t.close(&NullHost, file.fd), None);
        assert_eq!(counter.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_without_release() {
        let t = table();
        let fd = t.allocate(DESC, Arc::new(Inert)).unwrap();
        assert_eq!(t.close(&NullHost, fd), Some(Ok(())));
        assert!(t.is_empty());
    }

    #[test]
    fn test_capability_dispatch() {
        let t = table();
        let fd = t.allocate(DESC, Arc::new(Counter::default())).unwrap();
        let file = t.lookup(fd).unwrap();
        assert!(file.supports(Capabilities::READ));
        assert!(!file.supports(Capabilities::WRITE));
        let mut buf = [0u8; 3];
        assert_eq!(file.resource.read(&file, &mut buf), Ok(3));
        assert_eq!(buf, [7, 7, 7]);
        assert_eq!(file.resource.write(&file, b"x"), Err(SysError::NotSupported));
    }

    #[test]
    fn test_insert_at_replaces() {
        let t = table();
        assert!(t.insert_at(5, DESC, None, Arc::new(Inert)).unwrap().is_none());
        let desc = VFileDesc::new(VFileKind::Ioring, "[other]");
        let old = t.insert_at(5, desc, None, Arc::new(Inert)).unwrap().unwrap();
        assert_eq!(old.name, "[test]");
        assert_eq!(t.lookup(5).unwrap().kind, VFileKind::Ioring);
        assert_eq!(t.len(), 1);
    }
}
