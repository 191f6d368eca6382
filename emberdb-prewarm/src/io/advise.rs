//! Advisory read-ahead hints.
//!
//! Follows PostgreSQL's FilePrefetch approach: posix_fadvise(WILLNEED)
//! where POSIX.1-2001 provides it, fcntl(F_RDADVISE) on macOS. On
//! platforms with neither, no hint is issued and the caller must not
//! count the block as prefetched.

use std::os::unix::io::RawFd;

/// Hint the kernel that `len` bytes at `offset` of `fd` will be read soon.
/// Returns true only if the kernel accepted the hint.
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
#[inline]
pub fn advise_willneed(fd: RawFd, offset: u64, len: usize) -> bool {
    loop {
        let ret = unsafe {
            libc::posix_fadvise(
                fd,
                offset as libc::off_t,
                len as libc::off_t,
                libc::POSIX_FADV_WILLNEED,
            )
        };
        // posix_fadvise returns the error number directly.
        if ret == libc::EINTR {
            continue;
        }
        return ret == 0;
    }
}

#[cfg(target_os = "macos")]
#[inline]
pub fn advise_willneed(fd: RawFd, offset: u64, len: usize) -> bool {
    let ra = libc::radvisory {
        ra_offset: offset as libc::off_t,
        ra_count: len.min(libc::c_int::MAX as usize) as libc::c_int,
    };
    let ret = unsafe { libc::fcntl(fd, libc::F_RDADVISE, &ra) };
    // fcntl returns -1 on error, anything else on success.
    ret != -1
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "macos"
)))]
#[inline]
pub fn advise_willneed(_fd: RawFd, _offset: u64, _len: usize) -> bool {
    false
}
