use crate::error::Result;
use crate::io::FileIO;
use std::sync::Arc;

/// Open file supporting concurrent positioned reads.
pub trait FileHandle: Send + Sync {
    fn path(&self) -> &str;

    fn file_size(&self) -> Result<u64>;

    /// Read up to `buf.len()` bytes at `offset`.
    /// Safe to call from multiple threads on distinct ranges.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;
}

/// Narrow filesystem surface used by the remote prewarming path.
pub trait FileSystem: Send + Sync {
    /// Expand a glob pattern into matching file paths.
    fn glob(&self, pattern: &str) -> Result<Vec<String>>;

    fn open_file(&self, path: &str) -> Result<Arc<dyn FileHandle>>;
}

pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    #[inline]
    fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let mut paths = vec![];
        for entry in glob::glob(pattern)? {
            let path = entry?;
            if path.is_file() {
                paths.push(path.to_string_lossy().into_owned());
            }
        }
        Ok(paths)
    }

    #[inline]
    fn open_file(&self, path: &str) -> Result<Arc<dyn FileHandle>> {
        let io = FileIO::open_readonly(path)?;
        Ok(Arc::new(LocalFileHandle {
            path: path.to_string(),
            io,
        }))
    }
}

struct LocalFileHandle {
    path: String,
    io: FileIO,
}

impl FileHandle for LocalFileHandle {
    #[inline]
    fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    fn file_size(&self) -> Result<u64> {
        Ok(self.io.file_size()?)
    }

    #[inline]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        Ok(self.io.pread(buf, offset)?)
    }
}
