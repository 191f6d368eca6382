use crate::block::BlockID;
use crate::error::Result;
use crate::io::STORAGE_SECTOR_SIZE;
use crate::prewarm::capacity::blocks_per_task;
use crate::prewarm::{BlockIDSet, LocalPrewarmStrategy, StrategyContext};
use crate::thread::{Task, TaskExecutor};
use emberdb_catalog::Table;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

// ~512KB per read batch aligns with page cache granularity while
// limiting temp buffer usage.
const READ_PREFETCH_TARGET_BYTES: usize = STORAGE_SECTOR_SIZE * 128;

/// Reads blocks into transient buffers so the data lands in the OS
/// page cache without occupying the buffer pool.
pub struct ReadPrewarm<'a> {
    ctx: StrategyContext<'a>,
}

impl<'a> ReadPrewarm<'a> {
    #[inline]
    pub fn new(ctx: StrategyContext<'a>) -> Self {
        ReadPrewarm { ctx }
    }
}

/// Split sorted block ids into maximal runs of consecutive ids,
/// capping each run at `max_run_len` blocks.
fn coalesce_runs(sorted_blocks: &[BlockID], max_run_len: usize) -> Vec<(BlockID, usize)> {
    let mut runs = vec![];
    let mut i = 0usize;
    while i < sorted_blocks.len() {
        let first_block = sorted_blocks[i];
        let mut count = 1usize;
        while i + count < sorted_blocks.len()
            && sorted_blocks[i + count] == first_block + count as BlockID
            && count < max_run_len
        {
            count += 1;
        }
        runs.push((first_block, count));
        i += count;
    }
    runs
}

impl LocalPrewarmStrategy for ReadPrewarm<'_> {
    fn execute(&self, table: &Table, block_ids: &BlockIDSet) -> Result<usize> {
        self.ctx.check_direct_io("READ")?;

        let mut unloaded_handles = self.ctx.unloaded_block_handles(block_ids);
        if unloaded_handles.is_empty() {
            return Ok(0);
        }

        let capacity = self.ctx.capacity();
        let total_blocks = unloaded_handles.len();
        let mut max_batch_size = capacity.max_blocks;
        if max_batch_size == 0 {
            warn!(
                table = table.name.as_str(),
                bytes_available = capacity.available_space,
                block_size = capacity.block_size,
                "insufficient memory to prewarm any blocks"
            );
            return Ok(0);
        }
        if total_blocks > capacity.max_blocks {
            let blocks_skipped = total_blocks - capacity.max_blocks;
            unloaded_handles.truncate(capacity.max_blocks);
            warn!(
                table = table.name.as_str(),
                total = total_blocks,
                granted = capacity.max_blocks,
                skipped = blocks_skipped,
                bytes_available = capacity.available_space,
                "maximum blocks to read limit reached, consider raising the memory limit"
            );
        }

        // sort for sequential reading, then merge consecutive ids so one
        // read request covers a whole run
        unloaded_handles.sort_unstable_by_key(|h| h.block_id());
        let sorted_blocks: Vec<BlockID> =
            unloaded_handles.iter().map(|h| h.block_id()).collect();

        // the read length must also stay within a signed 32-bit byte count
        let run_cap = max_batch_size.min((i32::MAX as usize) / capacity.block_size);
        max_batch_size = run_cap.max(1);

        let task_size = blocks_per_task(
            capacity.block_size,
            capacity.max_blocks,
            self.ctx.thread_count,
            READ_PREFETCH_TARGET_BYTES,
        );
        if task_size == 0 {
            return Ok(0);
        }

        let blocks_read = AtomicUsize::new(0);
        let block_mgr = self.ctx.block_mgr;
        let buffer_mgr = self.ctx.buffer_mgr;
        let block_size = capacity.block_size;

        let mut tasks: Vec<Task<'_>> = vec![];
        for (run_first, run_count) in coalesce_runs(&sorted_blocks, max_batch_size) {
            let mut offset = 0usize;
            while offset < run_count {
                let count = task_size.min(run_count - offset);
                let first_block = run_first + offset as BlockID;
                let blocks_read = &blocks_read;
                tasks.push(Box::new(move || {
                    let total_size = count * block_size;
                    let mut scratch = match buffer_mgr.allocate(total_size) {
                        Ok(buf) => buf,
                        Err(e) => {
                            warn!(
                                first_block,
                                count,
                                error = %e,
                                "READ prewarm could not allocate scratch buffer"
                            );
                            return;
                        }
                    };
                    match block_mgr.read_blocks(scratch.as_mut_slice(), first_block, count) {
                        Ok(()) => {
                            blocks_read.fetch_add(count, Ordering::Relaxed);
                        }
                        Err(e) => {
                            // TODO: the trailing block of a table sometimes reads
                            // out of range here; whether segment metadata points
                            // past the file tail or the block read is off by one
                            // is still unresolved.
                            warn!(
                                first_block,
                                count,
                                error = %e,
                                "READ prewarm failed for block group"
                            );
                        }
                    }
                }));
                offset += count;
            }
        }

        TaskExecutor::new(self.ctx.thread_count).run(tasks);

        Ok(blocks_read.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockManager, SingleFileBlockManager, FILE_HEADER_SIZE};
    use crate::buffer::{BufferManager, FixedBufferManager};
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

    #[test]
    fn test_coalesce_runs() {
        assert_eq!(
            coalesce_runs(&[100, 101, 102, 200, 201], 16),
            vec![(100, 3), (200, 2)]
        );
        assert_eq!(coalesce_runs(&[5], 16), vec![(5, 1)]);
        // a long run splits at the cap boundary
        assert_eq!(
            coalesce_runs(&[0, 1, 2, 3, 4], 2),
            vec![(0, 2), (2, 2), (4, 1)]
        );
        assert!(coalesce_runs(&[], 16).is_empty());
    }

    #[test]
    fn test_read_prewarm_counts_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.ember");
        std::fs::write(&path, vec![0u8; FILE_HEADER_SIZE * 3 + 210 * BLOCK_SIZE]).unwrap();
        let block_mgr = Arc::new(SingleFileBlockManager::open(&path, BLOCK_SIZE).unwrap());
        let buffer_mgr = FixedBufferManager::new(BLOCK_SIZE * 1000, Arc::clone(&block_mgr) as Arc<dyn BlockManager>);

        let block_ids: BlockIDSet = [100, 101, 102, 200, 201].into_iter().collect();
        let ctx = StrategyContext {
            block_mgr: &*block_mgr,
            buffer_mgr: &buffer_mgr,
            thread_count: 4,
            direct_io: false,
        };
        let warmed = ReadPrewarm::new(ctx).execute(&table(), &block_ids).unwrap();
        assert_eq!(warmed, 5);
        // scratch buffers are all released afterwards
        assert_eq!(buffer_mgr.used_memory(), 0);
    }

    #[test]
    fn test_read_prewarm_direct_io_rejected() {
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
        assert!(ReadPrewarm::new(ctx).execute(&table(), &block_ids).is_err());
        // no allocation happened
        assert_eq!(buffer_mgr.used_memory(), 0);
    }

    #[test]
    fn test_read_prewarm_swallows_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.ember");
        std::fs::write(&path, vec![0u8; FILE_HEADER_SIZE * 3 + 2 * BLOCK_SIZE]).unwrap();
        let block_mgr = Arc::new(SingleFileBlockManager::open(&path, BLOCK_SIZE).unwrap());
        let buffer_mgr = FixedBufferManager::new(BLOCK_SIZE * 100, Arc::clone(&block_mgr) as Arc<dyn BlockManager>);

        // block 50 lies past the end of the file; the strategy keeps going
        let block_ids: BlockIDSet = [0, 1, 50].into_iter().collect();
        let ctx = StrategyContext {
            block_mgr: &*block_mgr,
            buffer_mgr: &buffer_mgr,
            thread_count: 1,
            direct_io: false,
        };
        let warmed = ReadPrewarm::new(ctx).execute(&table(), &block_ids).unwrap();
        assert_eq!(warmed, 2);
    }
}
