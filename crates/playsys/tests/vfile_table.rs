// playsys/tests/vfile_table.rs
//! Virtual file table behaviour through the public API

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use playsys::abi::{OpenFlags, AT_FDCWD};
use playsys::{
    Capabilities, NullHost, SysError, SysResult, System, SystemConfig, VFile, VFileDesc,
    VFileFlags, VFileKind, VFileOps, VFileTable,
};

#[derive(Debug)]
struct Inert;

impl VFileOps for Inert {
    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }
}

/// Serves a fixed string and swallows writes
#[derive(Debug)]
struct Banner(&'static [u8]);

impl VFileOps for Banner {
    fn capabilities(&self) -> Capabilities {
        Capabilities::READ | Capabilities::WRITE | Capabilities::OPENAT
    }

    fn read(&self, _file: &VFile, buf: &mut [u8]) -> SysResult<usize> {
        let n = buf.len().min(self.0.len());
        buf[..n].copy_from_slice(&self.0[..n]);
        Ok(n)
    }

    fn write(&self, _file: &VFile, buf: &[u8]) -> SysResult<usize> {
        Ok(buf.len())
    }

    fn openat(
        &self,
        _file: &VFile,
        _path: &core::ffi::CStr,
        _flags: OpenFlags,
        _mode: u32,
    ) -> SysResult<i32> {
        Err(SysError::Access)
    }
}

const DESC: VFileDesc = VFileDesc::new(VFileKind::User(7), "[banner]");

fn table() -> VFileTable {
    VFileTable::new(&SystemConfig::default())
}

#[test]
fn allocate_is_monotonic() {
    let t = table();
    let base = SystemConfig::default().vfile_fd_base;

    let a = t.allocate(DESC, Arc::new(Inert)).unwrap();
    let b = t.allocate(DESC, Arc::new(Inert)).unwrap();
    let c = t.allocate(DESC, Arc::new(Inert)).unwrap();
    assert_eq!([a, b, c], [base, base + 1, base + 2]);

    // removing an interior key does not lower the next key
    t.remove(b).unwrap();
    assert_eq!(t.allocate(DESC, Arc::new(Inert)).unwrap(), base + 3);

    // removing the largest key does
    t.remove(base + 3).unwrap();
    t.remove(c).unwrap();
    assert_eq!(t.allocate(DESC, Arc::new(Inert)).unwrap(), base + 1);
}

#[test]
fn explicit_keys_stay_sorted() {
    let t = table();
    for fd in [9, 3, 12, 5] {
        assert!(t.insert_at(fd, DESC, None, Arc::new(Inert)).unwrap().is_none());
    }
    let minted = t.allocate(DESC, Arc::new(Inert)).unwrap();
    assert_eq!(t.descriptors(), vec![3, 5, 9, 12, minted]);

    assert_eq!(t.remove(5).unwrap().fd, 5);
    assert!(t.lookup(5).is_none());
    assert_eq!(t.lookup(9).unwrap().fd, 9);
    assert_eq!(t.descriptors(), vec![3, 9, 12, minted]);
}

#[test]
fn allocation_from_many_threads() {
    let t = Arc::new(table());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let t = Arc::clone(&t);
            thread::spawn(move || {
                (0..100)
                    .map(|_| t.allocate(DESC, Arc::new(Inert)).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for fd in handle.join().unwrap() {
            assert!(seen.insert(fd), "descriptor {fd} handed out twice");
        }
    }
    assert_eq!(t.len(), 400);
}

#[test]
fn capability_owns_the_call() {
    let sys = System::new(NullHost, SystemConfig::default());
    let file = sys.open_vfile(DESC, Arc::new(Banner(b"hello"))).unwrap();

    let mut buf = [0u8; 16];
    assert_eq!(sys.read(file.fd, &mut buf), Ok(5));
    assert_eq!(&buf[..5], b"hello");
    assert_eq!(sys.write(file.fd, b"ignored"), Ok(7));
    assert_eq!(
        sys.openat(file.fd, "child", OpenFlags::RONLY, 0),
        Err(SysError::Access)
    );
}

#[test]
fn missing_capability_falls_through_or_rejects() {
    let sys = System::new(NullHost, SystemConfig::default());
    let file = sys.open_vfile(DESC, Arc::new(Inert)).unwrap();

    let mut buf = [0u8; 4];
    assert_eq!(sys.read(file.fd, &mut buf), Err(SysError::NotSupported));
    assert_eq!(sys.write(file.fd, &buf), Err(SysError::NotSupported));

    // openat and mmap reach the host, which here has nothing to offer
    assert_eq!(
        sys.openat(file.fd, "child", OpenFlags::RONLY, 0),
        Err(SysError::NotSupported)
    );
    // SAFETY: the null host never maps anything.
    let mapped = unsafe { sys.mmap(core::ptr::null_mut(), 64, Default::default(), file.fd, 0) };
    assert_eq!(mapped, Err(SysError::NotSupported));
}

#[test]
fn plain_descriptors_go_to_the_host() {
    let sys = System::new(NullHost, SystemConfig::default());
    let mut buf = [0u8; 4];
    assert_eq!(sys.read(0, &mut buf), Err(SysError::BadFd));
    assert_eq!(sys.close(17), Err(SysError::BadFd));
    assert_eq!(
        sys.openat(AT_FDCWD, "/tmp/x", OpenFlags::RONLY, 0),
        Err(SysError::NotSupported)
    );
}

#[test]
fn conflicting_pipe_flags_rejected() {
    let sys = System::new(NullHost, SystemConfig::default());
    let desc = DESC.with_flags(VFileFlags::PIPE_R | VFileFlags::PIPE_W);
    assert_eq!(
        sys.open_vfile(desc, Arc::new(Inert)).unwrap_err(),
        SysError::Invalid
    );
    assert!(sys.vfiles().is_empty());
}

/// Counts releases and takes its time about each one
#[derive(Debug, Default)]
struct Slow {
    releases: AtomicUsize,
}

impl VFileOps for Slow {
    fn capabilities(&self) -> Capabilities {
        Capabilities::RELEASE
    }

    fn release(&self, _file: &VFile) -> SysResult<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        Ok(())
    }
}

#[test]
fn racing_closes_release_once() {
    let sys = Arc::new(System::new(NullHost, SystemConfig::default()));
    let slow = Arc::new(Slow::default());
    let fd = sys.open_vfile(DESC, slow.clone()).unwrap().fd;

    let closers: Vec<_> = (0..2)
        .map(|_| {
            let sys = Arc::clone(&sys);
            thread::spawn(move || sys.close(fd))
        })
        .collect();
    let mut results: Vec<_> = closers.into_iter().map(|h| h.join().unwrap()).collect();
    results.sort_by_key(|r| r.as_ref().err().map(|e| e.as_i32()));

    // the loser sees a plain descriptor, which the null host rejects
    assert_eq!(results, vec![Ok(()), Err(SysError::BadFd)]);
    assert_eq!(slow.releases.load(Ordering::SeqCst), 1);
    assert!(sys.vfiles().is_empty());
}

#[cfg(unix)]
mod posix {
    use super::*;

    #[test]
    fn pipe_backed_read_end() {
        let sys = System::posix();
        let desc = DESC.with_flags(VFileFlags::PIPE_R);
        let file = sys.open_vfile(desc, Arc::new(Inert)).unwrap();
        let peer = file.peer.unwrap();
        assert!(file.fd < sys.config().vfile_fd_base);

        assert_eq!(sys.host().write(peer, b"ping"), Ok(4));
        let mut buf = [0u8; 8];
        assert_eq!(sys.read(file.fd, &mut buf), Ok(4));
        assert_eq!(&buf[..4], b"ping");

        assert_eq!(sys.close(file.fd), Ok(()));
        assert!(!sys.vfiles().contains(file.fd));
    }

    #[test]
    fn pipe_backed_write_end() {
        let sys = System::posix();
        let desc = DESC.with_flags(VFileFlags::PIPE_W);
        let file = sys.open_vfile(desc, Arc::new(Inert)).unwrap();
        let peer = file.peer.unwrap();

        assert_eq!(sys.write(file.fd, b"pong"), Ok(4));
        let mut buf = [0u8; 8];
        assert_eq!(sys.host().read(peer, &mut buf), Ok(4));
        assert_eq!(&buf[..4], b"pong");

        assert_eq!(sys.close(file.fd), Ok(()));
    }
}
