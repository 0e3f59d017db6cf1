//! Advisory byte-range locks
//!
//! Used only when `Config::file_locking` is set. Each lock covers exactly the
//! bytes of one header field, index entry or payload access and is released
//! when the guard drops. On non-unix targets locking is a no-op.
//!
//! These locks stop torn reads and writes of a single field between
//! processes. Multi-step sequences (delete then compact, growth relocation)
//! are not atomic across processes.

use std::fs::File;
use std::io;

/// Lock mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Shared,
    Exclusive,
}

/// Held byte-range lock; unlocks on drop
pub struct RangeLock {
    #[cfg(unix)]
    fd: std::os::unix::io::RawFd,
    #[allow(dead_code)]
    start: u64,
    #[allow(dead_code)]
    len: u64,
    active: bool,
}

impl RangeLock {
    /// Acquire a lock over `[start, start + len)`, blocking until granted.
    ///
    /// Returns an inactive guard when `enabled` is false or `len` is zero.
    pub fn acquire(file: &File, start: u64, len: u64, kind: LockKind, enabled: bool) -> io::Result<Self> {
        if !enabled || len == 0 {
            return Ok(Self::inactive(file, start, len));
        }
        Self::lock(file, start, len, kind)
    }

    #[cfg(unix)]
    fn inactive(file: &File, start: u64, len: u64) -> Self {
        use std::os::unix::io::AsRawFd;
        Self {
            fd: file.as_raw_fd(),
            start,
            len,
            active: false,
        }
    }

    #[cfg(not(unix))]
    fn inactive(_file: &File, start: u64, len: u64) -> Self {
        Self {
            start,
            len,
            active: false,
        }
    }

    #[cfg(unix)]
    fn lock(file: &File, start: u64, len: u64, kind: LockKind) -> io::Result<Self> {
        use std::os::unix::io::AsRawFd;

        let fd = file.as_raw_fd();
        let lock_type = match kind {
            LockKind::Shared => libc::F_RDLCK,
            LockKind::Exclusive => libc::F_WRLCK,
        };
        fcntl_lock(fd, start, len, lock_type as libc::c_short, libc::F_SETLKW)?;

        Ok(Self {
            fd,
            start,
            len,
            active: true,
        })
    }

    #[cfg(not(unix))]
    fn lock(file: &File, start: u64, len: u64, _kind: LockKind) -> io::Result<Self> {
        Ok(Self::inactive(file, start, len))
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for RangeLock {
    fn drop(&mut self) {
        if self.active {
            self.release();
        }
    }
}

impl RangeLock {
    #[cfg(unix)]
    fn release(&mut self) {
        let unlock = libc::F_UNLCK as libc::c_short;
        if let Err(e) = fcntl_lock(self.fd, self.start, self.len, unlock, libc::F_SETLK) {
            tracing::warn!(offset = self.start, len = self.len, "failed to release range lock: {}", e);
        }
        self.active = false;
    }

    #[cfg(not(unix))]
    fn release(&mut self) {
        self.active = false;
    }
}

#[cfg(unix)]
fn fcntl_lock(
    fd: std::os::unix::io::RawFd,
    start: u64,
    len: u64,
    lock_type: libc::c_short,
    cmd: libc::c_int,
) -> io::Result<()> {
    // SAFETY: `flock` is a plain C struct; all-zero is a valid starting value.
    let mut request: libc::flock = unsafe { std::mem::zeroed() };
    request.l_type = lock_type;
    request.l_whence = libc::SEEK_SET as libc::c_short;
    request.l_start = start as libc::off_t;
    request.l_len = len as libc::off_t;

    // SAFETY: `fd` is an open descriptor owned by the caller's `File` and
    // `request` outlives the call.
    let rc = unsafe { libc::fcntl(fd, cmd, &mut request) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
