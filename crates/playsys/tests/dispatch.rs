// playsys/tests/dispatch.rs
//! Raw entry point: word decoding, special files and host fall-through

use core::ptr;

use playsys::abi::{IoringParams, SysOp, IORING_OFF_SQES, IORING_OFF_SQ_RING};
use playsys::{NullHost, SysError, System, SystemConfig};

fn word<T>(p: *const T) -> isize {
    p.expose_provenance() as isize
}

fn call(sys: &System, op: SysOp, args: [isize; 5]) -> isize {
    // SAFETY: every pointer passed by these tests is live for the call.
    unsafe { sys.dispatch(op.as_raw(), args) }
}

#[test]
fn unknown_codes() {
    let sys = System::new(NullHost, SystemConfig::default());
    for op in [2, 5, 61, 428, 10_001] {
        // SAFETY: no pointers.
        assert_eq!(unsafe { sys.dispatch(op, [0; 5]) }, SysError::SysOp.as_isize());
    }
}

#[test]
fn every_code_reaches_one_handler() {
    let sys = System::new(NullHost, SystemConfig::default());
    for op in SysOp::ALL {
        if op == SysOp::Exit {
            continue;
        }
        let res = call(&sys, op, [0; 5]);
        assert_ne!(res, SysError::SysOp.as_isize(), "{op}");
    }
}

#[test]
fn ioring_through_raw_words() {
    let sys = System::new(NullHost, SystemConfig::default());
    let mut params = IoringParams::default();
    let fd = call(&sys, SysOp::IoringSetup, [8, word(&raw mut params), 0, 0, 0]);
    assert!(fd >= 0x4000_0000, "{fd}");
    assert_eq!(params.sq_entries, 8);
    assert_eq!(params.cq_entries, 16);

    let mut addr: *mut u8 = ptr::null_mut();
    let slot = word(&raw mut addr);
    let len = params.sq_off.array as isize + 32;
    assert_eq!(
        call(&sys, SysOp::Mmap, [slot, len, 3, fd, IORING_OFF_SQ_RING as isize]),
        0
    );
    assert!(!addr.is_null());
    let ring = addr;

    assert_eq!(
        call(&sys, SysOp::Mmap, [slot, 8 * 64, 3, fd, IORING_OFF_SQES as isize]),
        0
    );
    assert_ne!(addr, ring);

    assert_eq!(
        call(&sys, SysOp::IoringEnter, [fd, 1, 0, 0, 0]),
        SysError::NotSupported.as_isize()
    );
    assert_eq!(
        call(&sys, SysOp::IoringRegister, [fd, 0, 0, 0, 0]),
        SysError::NotSupported.as_isize()
    );

    assert_eq!(call(&sys, SysOp::Close, [fd, 0, 0, 0, 0]), 0);
    assert_eq!(
        call(&sys, SysOp::Close, [fd, 0, 0, 0, 0]),
        SysError::BadFd.as_isize()
    );
}

#[test]
fn failed_setup_leaves_params_alone() {
    let sys = System::new(NullHost, SystemConfig::default());
    let mut params = IoringParams::default();
    assert_eq!(
        call(&sys, SysOp::IoringSetup, [0, word(&raw mut params), 0, 0, 0]),
        SysError::Invalid.as_isize()
    );
    assert_eq!(params, IoringParams::default());
}

#[test]
fn test_op_reports_stubs() {
    let sys = System::new(NullHost, SystemConfig::default());
    let query = |op: SysOp| call(&sys, SysOp::Test, [op.as_raw() as isize, 0, 0, 0, 0]);
    assert_eq!(query(SysOp::OpenAt), 0);
    assert_eq!(query(SysOp::Pipe), 0);
    assert_eq!(query(SysOp::Test), 0);
    assert_eq!(query(SysOp::RenameAt), SysError::NotSupported.as_isize());
    assert_eq!(query(SysOp::IoringRegister), SysError::NotSupported.as_isize());
}

#[cfg(unix)]
mod posix {
    use super::*;
    use std::ffi::CString;
    use std::fs;

    use playsys::abi::{OpenFlags, AT_FDCWD};
    use playsys::syscall::special;

    #[test]
    fn host_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        let path = path.to_str().unwrap();
        let sys = System::posix();

        let flags = OpenFlags::WONLY | OpenFlags::CREATE | OpenFlags::TRUNC;
        let fd = sys.openat(AT_FDCWD, path, flags, 0o644).unwrap();
        assert_eq!(sys.write(fd, b"hello host"), Ok(10));
        sys.close(fd).unwrap();
        assert_eq!(fs::read(path).unwrap(), b"hello host");

        let fd = sys.openat(AT_FDCWD, path, OpenFlags::RONLY, 0).unwrap();
        let mut buf = [0u8; 32];
        assert_eq!(sys.read(fd, &mut buf), Ok(10));
        assert_eq!(sys.read(fd, &mut buf), Ok(0));
        sys.close(fd).unwrap();

        let missing = dir.path().join("missing");
        assert_eq!(
            sys.openat(AT_FDCWD, missing.to_str().unwrap(), OpenFlags::RONLY, 0),
            Err(SysError::NotFound)
        );

        let flags = OpenFlags::WONLY | OpenFlags::CREATE | OpenFlags::EXCL;
        assert_eq!(sys.openat(AT_FDCWD, path, flags, 0o644), Err(SysError::Exists));
    }

    #[test]
    fn host_files_through_raw_words() {
        let dir = tempfile::tempdir().unwrap();
        let path = CString::new(dir.path().join("raw.bin").to_str().unwrap()).unwrap();
        let sys = System::posix();

        let flags = (OpenFlags::RW | OpenFlags::CREATE).bits() as isize;
        let fd = call(&sys, SysOp::OpenAt, [-100, word(path.as_ptr()), flags, 0o600, 0]);
        assert!(fd >= 0, "{fd}");

        let data = b"0123456789";
        assert_eq!(
            call(&sys, SysOp::Write, [fd, word(data.as_ptr()), 10, 0, 0]),
            10
        );
        assert_eq!(call(&sys, SysOp::Close, [fd, 0, 0, 0, 0]), 0);
    }

    #[test]
    fn pipe_through_raw_words() {
        let sys = System::posix();
        let mut fdv = [-1i32; 2];
        assert_eq!(
            call(&sys, SysOp::Pipe, [word(fdv.as_mut_ptr()), 1, 0, 0, 0]),
            SysError::Invalid.as_isize()
        );
        assert_eq!(call(&sys, SysOp::Pipe, [word(fdv.as_mut_ptr()), 0, 0, 0, 0]), 0);
        let [r, w] = fdv.map(|fd| fd as isize);
        assert!(r >= 0 && w >= 0);

        let msg = b"abc";
        assert_eq!(call(&sys, SysOp::Write, [w, word(msg.as_ptr()), 3, 0, 0]), 3);
        let mut buf = [0u8; 8];
        assert_eq!(call(&sys, SysOp::Read, [r, word(buf.as_mut_ptr()), 8, 0, 0]), 3);
        assert_eq!(&buf[..3], msg);

        assert_eq!(call(&sys, SysOp::Close, [r, 0, 0, 0, 0]), 0);
        assert_eq!(call(&sys, SysOp::Close, [w, 0, 0, 0, 0]), 0);
    }

    #[test]
    fn uname_special_file() {
        let sys = System::posix();
        let fd = sys.openat(AT_FDCWD, "/sys/uname", OpenFlags::RONLY, 0).unwrap();
        let mut buf = [0u8; 128];
        let n = sys.read(fd, &mut buf).unwrap();
        let text = std::str::from_utf8(&buf[..n]).unwrap();
        assert_eq!(text, special::uname());
        assert!(text.ends_with(" 1\n"));
        sys.close(fd).unwrap();

        assert_eq!(
            sys.openat(AT_FDCWD, "/sys/kernel", OpenFlags::RONLY, 0),
            Err(SysError::NotFound)
        );
    }

    #[test]
    fn sleep_briefly() {
        let sys = System::posix();
        assert_eq!(call(&sys, SysOp::Sleep, [0, 1_000, 0, 0, 0]), 0);
        assert_eq!(
            call(&sys, SysOp::Sleep, [0, 1_000_000_000, 0, 0, 0]),
            SysError::Invalid.as_isize()
        );
    }
}
