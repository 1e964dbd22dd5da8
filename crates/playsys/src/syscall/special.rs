// playsys/src/syscall/special.rs
//! Special files under `/sys`

use playsys_abi::{Fd, SysError, SysResult, SYS_API_VERSION};

use crate::host::Host;

/// Path prefix of the special file namespace
pub const SPECIAL_PREFIX: &str = "/sys/";

/// Contents of `/sys/uname`: `"<os>-<arch> <api version>\n"`
#[must_use]
pub fn uname() -> String {
    format!(
        "{}-{} {}\n",
        std::env::consts::OS,
        std::env::consts::ARCH,
        SYS_API_VERSION
    )
}

/// Open the special file `name` (the path with [`SPECIAL_PREFIX`] removed)
pub fn open(host: &dyn Host, name: &str) -> SysResult<Fd> {
    match name {
        "uname" => open_filled_pipe(host, uname().as_bytes()),
        _ => Err(SysError::NotFound),
    }
}

/// Return the read end of a host pipe holding `contents`
fn open_filled_pipe(host: &dyn Host, contents: &[u8]) -> SysResult<Fd> {
    let [read_end, write_end] = host.pipe()?;

    let mut rest = contents;
    while !rest.is_empty() {
        match host.write(write_end, rest) {
            Ok(0) => {
                let _ = host.close(write_end);
                let _ = host.close(read_end);
                return Err(SysError::End);
            }
            Ok(n) => rest = &rest[n..],
            Err(e) => {
                let _ = host.close(write_end);
                let _ = host.close(read_end);
                return Err(e);
            }
        }
    }

    host.close(write_end)?;
    Ok(read_end)
}
