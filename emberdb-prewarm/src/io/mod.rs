pub mod advise;

use libc::{close, fstat, open, pread, stat, O_RDONLY};
use std::ffi::CString;
use std::io;
use std::mem::MaybeUninit;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

pub const STORAGE_SECTOR_SIZE: usize = 4096;

/// Align given input length to storage sector size.
#[inline]
pub fn align_to_sector_size(len: usize) -> usize {
    (len + STORAGE_SECTOR_SIZE - 1) / STORAGE_SECTOR_SIZE * STORAGE_SECTOR_SIZE
}

/// Read-only file backed by a raw descriptor.
///
/// All reads are positioned, so one instance can be shared between
/// threads without coordination.
pub struct FileIO {
    fd: RawFd,
}

unsafe impl Send for FileIO {}
unsafe impl Sync for FileIO {}

impl AsRawFd for FileIO {
    #[inline]
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl FileIO {
    /// Open an existing file for positioned reads.
    #[inline]
    pub fn open_readonly(file_path: impl AsRef<Path>) -> io::Result<FileIO> {
        let path = file_path.as_ref().to_string_lossy();
        let c_string = CString::new(path.as_bytes())
            .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
        let fd = unsafe { open(c_string.as_ptr(), O_RDONLY) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(FileIO { fd })
    }

    /// Get the logical size of this file.
    #[inline]
    pub fn file_size(&self) -> io::Result<u64> {
        unsafe {
            let mut s = MaybeUninit::<stat>::zeroed();
            let retcode = fstat(self.fd, s.as_mut_ptr());
            if retcode != 0 {
                debug_assert!(retcode == -1);
                return Err(io::Error::last_os_error());
            }
            Ok(s.assume_init_ref().st_size as u64)
        }
    }

    /// Read up to `buf.len()` bytes at given offset.
    /// Returns the number of bytes read, 0 at end of file.
    #[inline]
    pub fn pread(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        loop {
            let ret = unsafe {
                pread(
                    self.fd,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    offset as libc::off_t,
                )
            };
            if ret >= 0 {
                return Ok(ret as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    /// Read exactly `buf.len()` bytes at given offset.
    /// Fails with `UnexpectedEof` if the file ends before the buffer is full.
    #[inline]
    pub fn pread_exact(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let mut done = 0usize;
        while done < buf.len() {
            let n = self.pread(&mut buf[done..], offset + done as u64)?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
            }
            done += n;
        }
        Ok(())
    }
}

impl Drop for FileIO {
    #[inline]
    fn drop(&mut self) {
        unsafe {
            close(self.fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_to_sector_size() {
        assert_eq!(align_to_sector_size(0), 0);
        assert_eq!(align_to_sector_size(1), STORAGE_SECTOR_SIZE);
        assert_eq!(align_to_sector_size(STORAGE_SECTOR_SIZE), STORAGE_SECTOR_SIZE);
        assert_eq!(
            align_to_sector_size(STORAGE_SECTOR_SIZE + 1),
            STORAGE_SECTOR_SIZE * 2
        );
    }

    #[test]
    fn test_file_io_pread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"hello positioned world").unwrap();

        let file = FileIO::open_readonly(&path).unwrap();
        assert_eq!(file.file_size().unwrap(), 22);

        let mut buf = [0u8; 10];
        file.pread_exact(&mut buf, 6).unwrap();
        assert_eq!(&buf, b"positioned");

        // read past the end returns zero bytes
        let n = file.pread(&mut buf, 100).unwrap();
        assert_eq!(n, 0);
        assert!(file.pread_exact(&mut buf, 20).is_err());
    }

    #[test]
    fn test_file_io_open_missing() {
        assert!(FileIO::open_readonly("no/such/file.bin").is_err());
    }
}
