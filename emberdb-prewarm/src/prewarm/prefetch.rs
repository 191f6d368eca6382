use crate::block::{block_file_offset, BlockID};
use crate::error::Result;
use crate::io::advise::advise_willneed;
use crate::io::{FileIO, STORAGE_SECTOR_SIZE};
use crate::prewarm::capacity::blocks_per_task;
use crate::prewarm::{BlockIDSet, LocalPrewarmStrategy, StrategyContext};
use crate::thread::spawn_scoped_named;
use emberdb_catalog::Table;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::thread;
use tracing::warn;

// Hint ~512KB per task; the hints are cheap but the caller pays for
// them later through eviction pressure on its resident set.
const PREFETCH_CHUNK_SIZE: usize = STORAGE_SECTOR_SIZE * 128;

/// Issues OS read-ahead hints for block ranges of the storage file.
/// Nothing is pinned anywhere; the kernel decides what to do.
pub struct PrefetchPrewarm<'a> {
    ctx: StrategyContext<'a>,
}

impl<'a> PrefetchPrewarm<'a> {
    #[inline]
    pub fn new(ctx: StrategyContext<'a>) -> Self {
        PrefetchPrewarm { ctx }
    }
}

/// Issue hints for `sorted_blocks[start_idx..end_idx]` on an already
/// open descriptor. Returns the number of hints the kernel accepted.
fn advise_block_range(
    file: &FileIO,
    sorted_blocks: &[BlockID],
    block_size: usize,
    start_idx: usize,
    end_idx: usize,
    file_size: u64,
) -> usize {
    let mut blocks_prefetched = 0usize;
    for &block_id in &sorted_blocks[start_idx..end_idx] {
        let offset = block_file_offset(block_id, block_size);
        if offset >= file_size {
            // block starts at or beyond EOF, skip it
            continue;
        }
        // near EOF only the remaining bytes are worth hinting
        let amount = (block_size as u64).min(file_size - offset) as usize;
        if amount == 0 {
            continue;
        }
        if advise_willneed(file.as_raw_fd(), offset, amount) {
            blocks_prefetched += 1;
        }
    }
    blocks_prefetched
}

/// Fan hint issuance out over worker threads, each owning its own
/// descriptor. Open or stat failure of the main descriptor yields 0.
fn advise_blocks(
    db_path: &Path,
    sorted_blocks: &[BlockID],
    block_size: usize,
    max_threads: usize,
) -> usize {
    let file = match FileIO::open_readonly(db_path) {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %db_path.display(), error = %e, "cannot open storage file for prefetch");
            return 0;
        }
    };
    let file_size = match file.file_size() {
        Ok(size) => size,
        Err(e) => {
            warn!(path = %db_path.display(), error = %e, "cannot stat storage file for prefetch");
            return 0;
        }
    };

    let total_blocks = sorted_blocks.len();
    let max_threads = max_threads.max(1);
    let task_size = blocks_per_task(block_size, total_blocks, max_threads, PREFETCH_CHUNK_SIZE);
    if task_size == 0 || total_blocks == 0 {
        return 0;
    }

    if max_threads == 1 || task_size >= total_blocks {
        return advise_block_range(&file, sorted_blocks, block_size, 0, total_blocks, file_size);
    }

    let task_count = (total_blocks + task_size - 1) / task_size;
    let mut worker_results = vec![0usize; task_count];
    thread::scope(|s| {
        for (task_index, result) in worker_results.iter_mut().enumerate() {
            let start_idx = task_index * task_size;
            let end_idx = total_blocks.min(start_idx + task_size);
            spawn_scoped_named(s, format!("prefetch-hint-{task_index}"), move || {
                // each worker owns its descriptor, closed on scope exit
                let Ok(local_file) = FileIO::open_readonly(db_path) else {
                    return;
                };
                *result = advise_block_range(
                    &local_file,
                    sorted_blocks,
                    block_size,
                    start_idx,
                    end_idx,
                    file_size,
                );
            });
        }
    });

    worker_results.into_iter().sum()
}

impl LocalPrewarmStrategy for PrefetchPrewarm<'_> {
    fn execute(&self, table: &Table, block_ids: &BlockIDSet) -> Result<usize> {
        self.ctx.check_direct_io("PREFETCH")?;

        if block_ids.is_empty() {
            return Ok(0);
        }
        let mut sorted_blocks: Vec<BlockID> = block_ids.iter().copied().collect();
        sorted_blocks.sort_unstable();

        let capacity = self.ctx.capacity();
        if sorted_blocks.len() > capacity.max_blocks {
            let blocks_skipped = sorted_blocks.len() - capacity.max_blocks;
            warn!(
                table = table.name.as_str(),
                total = sorted_blocks.len(),
                granted = capacity.max_blocks,
                skipped = blocks_skipped,
                "prefetch hint limit reached"
            );
            sorted_blocks.truncate(capacity.max_blocks);
        }
        if sorted_blocks.is_empty() {
            return Ok(0);
        }

        Ok(advise_blocks(
            self.ctx.block_mgr.path(),
            &sorted_blocks,
            capacity.block_size,
            self.ctx.thread_count,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockManager, SingleFileBlockManager, FILE_HEADER_SIZE};
    use crate::buffer::FixedBufferManager;
    use emberdb_catalog::TableKind;
    use semistr::SemiStr;
    use std::sync::Arc;

    const BLOCK_SIZE: usize = 4096;

    fn table() -> Table {
        Table {
            id: 1,
            schema_id: 1,
            name: SemiStr::new("t"),
            kind: TableKind::Native,
        }
    }

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    #[test]
    fn test_prefetch_hints_all_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.ember");
        std::fs::write(&path, vec![0u8; FILE_HEADER_SIZE * 3 + 8 * BLOCK_SIZE]).unwrap();
        let block_mgr = Arc::new(SingleFileBlockManager::open(&path, BLOCK_SIZE).unwrap());
        let buffer_mgr = FixedBufferManager::new(BLOCK_SIZE * 1000, Arc::clone(&block_mgr) as Arc<dyn BlockManager>);

        let block_ids: BlockIDSet = (0..8).collect();
        let ctx = StrategyContext {
            block_mgr: &*block_mgr,
            buffer_mgr: &buffer_mgr,
            thread_count: 4,
            direct_io: false,
        };
        let warmed = PrefetchPrewarm::new(ctx).execute(&table(), &block_ids).unwrap();
        assert_eq!(warmed, 8);
    }

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    #[test]
    fn test_prefetch_skips_blocks_past_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.ember");
        std::fs::write(&path, vec![0u8; FILE_HEADER_SIZE * 3 + 2 * BLOCK_SIZE]).unwrap();
        let block_mgr = Arc::new(SingleFileBlockManager::open(&path, BLOCK_SIZE).unwrap());
        let buffer_mgr = FixedBufferManager::new(BLOCK_SIZE * 1000, Arc::clone(&block_mgr) as Arc<dyn BlockManager>);

        let block_ids: BlockIDSet = [0, 1, 9].into_iter().collect();
        let ctx = StrategyContext {
            block_mgr: &*block_mgr,
            buffer_mgr: &buffer_mgr,
            thread_count: 1,
            direct_io: false,
        };
        let warmed = PrefetchPrewarm::new(ctx).execute(&table(), &block_ids).unwrap();
        assert_eq!(warmed, 2);
    }

    #[test]
    fn test_prefetch_direct_io_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.ember");
        std::fs::write(&path, vec![0u8; FILE_HEADER_SIZE * 3]).unwrap();
        let block_mgr = Arc::new(SingleFileBlockManager::open(&path, BLOCK_SIZE).unwrap());
        let buffer_mgr = FixedBufferManager::new(BLOCK_SIZE * 10, Arc::clone(&block_mgr) as Arc<dyn BlockManager>);

        let block_ids: BlockIDSet = [0].into_iter().collect();
        let ctx = StrategyContext {
            block_mgr: &*block_mgr,
            buffer_mgr: &buffer_mgr,
            thread_count: 1,
            direct_io: true,
        };
        assert!(PrefetchPrewarm::new(ctx).execute(&table(), &block_ids).is_err());
    }

    #[test]
    fn test_advise_blocks_missing_file_returns_zero() {
        let warmed = advise_blocks(Path::new("no/such/db.ember"), &[0, 1], BLOCK_SIZE, 2);
        assert_eq!(warmed, 0);
    }
}
