use crate::error::Result;
use crate::fs::{FileHandle, FileSystem};
use crate::remote::cache::{CacheReader, RemoteCacheManager, RemoteCacheMode};
use crate::remote::{RemoteBlockInfo, RemoteFileBlockMap};
use crate::thread::{Task, TaskExecutor};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Pulls remote block ranges through the cache so later reads hit it.
///
/// Each range is realized as one positioned read against the file's
/// shared handle; the bytes themselves are discarded, the side effect
/// on the cache is the point.
pub struct RemotePrewarmStrategy<'a> {
    fs: &'a dyn FileSystem,
    cache: &'a RemoteCacheManager,
    thread_count: usize,
}

impl<'a> RemotePrewarmStrategy<'a> {
    #[inline]
    pub fn new(fs: &'a dyn FileSystem, cache: &'a RemoteCacheManager, thread_count: usize) -> Self {
        RemotePrewarmStrategy {
            fs,
            cache,
            thread_count,
        }
    }

    /// Drop ranges the installed reader already holds.
    fn filter_cached_blocks(
        &self,
        reader: &CacheReader,
        blocks: &[RemoteBlockInfo],
    ) -> Vec<RemoteBlockInfo> {
        blocks
            .iter()
            .filter(|b| !reader.cached(&b.file_path, b.offset))
            .cloned()
            .collect()
    }

    /// Warm up to `max_blocks` uncached ranges of `file_blocks`.
    /// Returns the number of ranges scheduled for warming.
    pub fn execute(
        &self,
        file_blocks: &RemoteFileBlockMap,
        mode: RemoteCacheMode,
        max_blocks: usize,
    ) -> Result<usize> {
        if file_blocks.is_empty() {
            return Ok(0);
        }

        // the requested cache mode holds until this call returns
        let _scope = self.cache.enter_mode(mode);
        let reader = self.cache.current_reader();

        let mut total_blocks = 0usize;
        let mut total_uncached = 0usize;
        // walk files in stable order so budget truncation is deterministic
        let mut file_paths: Vec<&str> = file_blocks.keys().map(|p| p.as_str()).collect();
        file_paths.sort_unstable();
        let mut uncached_file_blocks: Vec<(&str, Vec<RemoteBlockInfo>)> = vec![];
        for file_path in file_paths {
            let blocks = &file_blocks[file_path];
            total_blocks += blocks.len();
            let uncached = self.filter_cached_blocks(&reader, blocks);
            total_uncached += uncached.len();
            uncached_file_blocks.push((file_path, uncached));
        }

        let capacity = self.cache.capacity_info();
        let blocks_to_prewarm = total_uncached.min(capacity.max_blocks).min(max_blocks);
        if blocks_to_prewarm < total_uncached {
            debug!(
                total = total_blocks,
                already_cached = total_blocks - total_uncached,
                uncached = total_uncached,
                granted = blocks_to_prewarm,
                skipped = total_uncached - blocks_to_prewarm,
                "cache capacity limit reached"
            );
        }
        if blocks_to_prewarm == 0 {
            return Ok(0);
        }

        // one handle per file, shared by all of its range reads
        let mut file_handles: HashMap<&str, Arc<dyn FileHandle>> = HashMap::new();
        for (file_path, blocks) in &uncached_file_blocks {
            if blocks.is_empty() {
                continue;
            }
            let handle = self.fs.open_file(file_path)?;
            file_handles.insert(*file_path, handle);
        }

        let mut tasks: Vec<Task<'_>> = Vec::with_capacity(blocks_to_prewarm);
        let reader = &reader;
        'submit: for (file_path, blocks) in &uncached_file_blocks {
            for block in blocks {
                if tasks.len() >= blocks_to_prewarm {
                    break 'submit;
                }
                let handle = Arc::clone(&file_handles[*file_path]);
                tasks.push(Box::new(move || {
                    let mut buf = vec![0u8; block.size as usize];
                    match handle.read_at(&mut buf, block.offset) {
                        Ok(n) => {
                            buf.truncate(n);
                            reader.admit(block, &buf);
                        }
                        Err(e) => {
                            warn!(
                                file = %block.file_path,
                                offset = block.offset,
                                size = block.size,
                                error = %e,
                                "remote prewarm read failed"
                            );
                        }
                    }
                }));
            }
        }

        TaskExecutor::new(self.thread_count.min(tasks.len())).run(tasks);

        Ok(blocks_to_prewarm)
    }
}
