pub mod cache;
pub mod strategy;

use crate::error::Result;
use crate::fs::FileSystem;
use std::collections::HashMap;

pub use cache::{
    parse_remote_cache_mode, CacheModeScope, CacheReader, CacheType, RemoteCacheConfig,
    RemoteCacheManager, RemoteCacheMode,
};
pub use strategy::RemotePrewarmStrategy;

/// One aligned byte range of one remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBlockInfo {
    /// Remote file path, e.g. s3://bucket/file.parquet.
    pub file_path: String,
    /// Byte offset in the file.
    pub offset: u64,
    /// Range size in bytes; the final range of a file may be shorter
    /// than the cache block size.
    pub size: u64,
    /// Total file size.
    pub file_size: u64,
}

/// Map of file path to its ordered block ranges.
pub type RemoteFileBlockMap = HashMap<String, Vec<RemoteBlockInfo>>;

/// Enumerates remote files and slices them into cache-sized ranges.
pub struct RemoteBlockCollector;

impl RemoteBlockCollector {
    /// Collect the block ranges of every file matching `pattern`.
    ///
    /// The ranges of one file tile `[0, file_size)` exactly. An empty
    /// file still yields one zero-size range so the file itself is
    /// represented in the result.
    pub fn collect_remote_blocks(
        fs: &dyn FileSystem,
        pattern: &str,
        block_size: u64,
    ) -> Result<RemoteFileBlockMap> {
        debug_assert!(block_size > 0);
        let mut file_blocks = RemoteFileBlockMap::new();
        let glob_results = fs.glob(pattern)?;
        if glob_results.is_empty() {
            return Ok(file_blocks);
        }

        for file_path in glob_results {
            let file_size = {
                // open just long enough to learn the size
                let handle = fs.open_file(&file_path)?;
                handle.file_size()?
            };

            let range_count = if file_size == 0 {
                1
            } else {
                (file_size + block_size - 1) / block_size
            };
            let mut blocks = Vec::with_capacity(range_count as usize);
            for i in 0..range_count {
                let offset = i * block_size;
                let size = if file_size == 0 {
                    0
                } else {
                    block_size.min(file_size - offset)
                };
                blocks.push(RemoteBlockInfo {
                    file_path: file_path.clone(),
                    offset,
                    size,
                    file_size,
                });
            }
            file_blocks.insert(file_path, blocks);
        }

        Ok(file_blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_collect_no_match() {
        let fs = MockFileSystem::default();
        fs.configure_file_size("/data/real.parquet", MB);

        let map = RemoteBlockCollector::collect_remote_blocks(&fs, "no/match/*.parquet", MB).unwrap();
        assert!(map.is_empty());
        assert_eq!(fs.glob_call_count(), 1);
        assert_eq!(fs.open_file_call_count(), 0);
    }

    #[test]
    fn test_collect_single_file() {
        let fs = MockFileSystem::default();
        fs.configure_file_size("/data/f.parquet", 5 * MB);

        let map = RemoteBlockCollector::collect_remote_blocks(&fs, "/data/*.parquet", MB).unwrap();
        assert_eq!(map.len(), 1);
        let blocks = &map["/data/f.parquet"];
        assert_eq!(blocks.len(), 5);
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(block.offset, i as u64 * MB);
            assert_eq!(block.size, MB);
            assert_eq!(block.file_size, 5 * MB);
        }
    }

    #[test]
    fn test_collect_clamps_final_range() {
        let fs = MockFileSystem::default();
        fs.configure_file_size("/data/f.parquet", 2 * MB + 100);

        let map = RemoteBlockCollector::collect_remote_blocks(&fs, "/data/*.parquet", MB).unwrap();
        let blocks = &map["/data/f.parquet"];
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2].offset, 2 * MB);
        assert_eq!(blocks[2].size, 100);
        // ranges tile the file exactly
        let total: u64 = blocks.iter().map(|b| b.size).sum();
        assert_eq!(total, 2 * MB + 100);
    }

    #[test]
    fn test_collect_empty_file_sentinel() {
        let fs = MockFileSystem::default();
        fs.configure_file_size("/data/empty.parquet", 0);

        let map = RemoteBlockCollector::collect_remote_blocks(&fs, "/data/*.parquet", MB).unwrap();
        let blocks = &map["/data/empty.parquet"];
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].offset, 0);
        assert_eq!(blocks[0].size, 0);
    }

    #[test]
    fn test_collect_multiple_files() {
        let fs = MockFileSystem::default();
        fs.configure_file_size("/data/a.parquet", 1024);
        fs.configure_file_size("/data/b.parquet", 2048);

        let map = RemoteBlockCollector::collect_remote_blocks(&fs, "/data/*.parquet", 1024).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["/data/a.parquet"].len(), 1);
        assert_eq!(map["/data/b.parquet"].len(), 2);
        assert_eq!(fs.open_file_call_count(), 2);
    }
}
