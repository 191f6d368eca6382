use crate::error::Result;
use crate::prewarm::capacity::blocks_per_task;
use crate::prewarm::{BlockIDSet, LocalPrewarmStrategy, StrategyContext};
use crate::thread::{Task, TaskExecutor};
use emberdb_catalog::Table;
use tracing::warn;

// ~4MB batches (16 default 256KB blocks) balance per-task overhead
// against buffer pool pressure.
const BUFFER_PREFETCH_TARGET_BYTES: usize = 4 * 1024 * 1024;

/// Loads blocks into the engine's buffer pool via batched prefetch.
pub struct BufferPrewarm<'a> {
    ctx: StrategyContext<'a>,
}

impl<'a> BufferPrewarm<'a> {
    #[inline]
    pub fn new(ctx: StrategyContext<'a>) -> Self {
        BufferPrewarm { ctx }
    }
}

impl LocalPrewarmStrategy for BufferPrewarm<'_> {
    fn execute(&self, table: &Table, block_ids: &BlockIDSet) -> Result<usize> {
        let mut unloaded_handles = self.ctx.unloaded_block_handles(block_ids);
        if unloaded_handles.is_empty() {
            return Ok(0);
        }

        let capacity = self.ctx.capacity();
        let total_blocks = block_ids.len();
        let already_cached = total_blocks - unloaded_handles.len();
        let blocks_to_prewarm = unloaded_handles.len();

        if unloaded_handles.len() > capacity.max_blocks {
            let blocks_skipped = unloaded_handles.len() - capacity.max_blocks;
            unloaded_handles.truncate(capacity.max_blocks);
            warn!(
                table = table.name.as_str(),
                total = total_blocks,
                already_cached,
                requested = blocks_to_prewarm,
                granted = capacity.max_blocks,
                skipped = blocks_skipped,
                bytes_needed = blocks_to_prewarm * capacity.block_size,
                bytes_available = capacity.available_space,
                "buffer pool capacity limit reached"
            );
        }
        if unloaded_handles.is_empty() {
            return Ok(0);
        }

        // sequential file order gives the kernel read-ahead friendly patterns
        unloaded_handles.sort_unstable_by_key(|h| h.block_id());

        let task_size = blocks_per_task(
            capacity.block_size,
            capacity.max_blocks,
            self.ctx.thread_count,
            BUFFER_PREFETCH_TARGET_BYTES,
        );
        if task_size == 0 {
            return Ok(0);
        }

        if self.ctx.thread_count == 1 || task_size >= unloaded_handles.len() {
            for chunk in unloaded_handles.chunks(task_size) {
                self.ctx.buffer_mgr.prefetch(chunk);
            }
            return Ok(unloaded_handles.len());
        }

        let buffer_mgr = self.ctx.buffer_mgr;
        let tasks: Vec<Task<'_>> = unloaded_handles
            .chunks(task_size)
            .map(|chunk| Box::new(move || buffer_mgr.prefetch(chunk)) as Task<'_>)
            .collect();
        TaskExecutor::new(self.ctx.thread_count).run(tasks);

        Ok(unloaded_handles.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockManager, BlockState, SingleFileBlockManager, FILE_HEADER_SIZE};
    use crate::buffer::{BufferManager, FixedBufferManager};
    use crate::prewarm::StrategyContext;
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

    fn block_file(dir: &tempfile::TempDir, blocks: usize) -> std::path::PathBuf {
        let path = dir.path().join("db.ember");
        std::fs::write(&path, vec![0u8; FILE_HEADER_SIZE * 3 + blocks * BLOCK_SIZE]).unwrap();
        path
    }

    #[test]
    fn test_buffer_prewarm_two_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = block_file(&dir, 202);
        let block_mgr = Arc::new(SingleFileBlockManager::open(&path, BLOCK_SIZE).unwrap());
        let buffer_mgr = FixedBufferManager::new(BLOCK_SIZE * 1000, Arc::clone(&block_mgr) as Arc<dyn BlockManager>);

        let block_ids: BlockIDSet = [100, 101, 102, 200, 201].into_iter().collect();
        let ctx = StrategyContext {
            block_mgr: &*block_mgr,
            buffer_mgr: &buffer_mgr,
            thread_count: 4,
            direct_io: false,
        };
        let warmed = BufferPrewarm::new(ctx).execute(&table(), &block_ids).unwrap();
        assert_eq!(warmed, 5);
        for id in [100, 101, 102, 200, 201] {
            assert!(buffer_mgr.contains_block(id));
            assert_eq!(block_mgr.register_block(id).state(), BlockState::Loaded);
        }
    }

    #[test]
    fn test_buffer_prewarm_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = block_file(&dir, 4);
        let block_mgr = Arc::new(SingleFileBlockManager::open(&path, BLOCK_SIZE).unwrap());
        let buffer_mgr = FixedBufferManager::new(BLOCK_SIZE * 100, Arc::clone(&block_mgr) as Arc<dyn BlockManager>);

        let block_ids: BlockIDSet = [0, 1, 2, 3].into_iter().collect();
        let ctx = StrategyContext {
            block_mgr: &*block_mgr,
            buffer_mgr: &buffer_mgr,
            thread_count: 2,
            direct_io: false,
        };
        assert_eq!(BufferPrewarm::new(ctx).execute(&table(), &block_ids).unwrap(), 4);

        // the pool keeps the warmed handles registered, so a second
        // call finds every block loaded
        let ctx = StrategyContext {
            block_mgr: &*block_mgr,
            buffer_mgr: &buffer_mgr,
            thread_count: 2,
            direct_io: false,
        };
        assert_eq!(BufferPrewarm::new(ctx).execute(&table(), &block_ids).unwrap(), 0);
    }

    #[test]
    fn test_buffer_prewarm_capacity_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = block_file(&dir, 10);
        let block_mgr = Arc::new(SingleFileBlockManager::open(&path, BLOCK_SIZE).unwrap());
        // head-room for 5 blocks: 5 * 4096 / 0.8 rounds to 25600 bytes
        let buffer_mgr = FixedBufferManager::new(BLOCK_SIZE * 100 / 16, Arc::clone(&block_mgr) as Arc<dyn BlockManager>);

        let block_ids: BlockIDSet = (0..10).collect();
        let ctx = StrategyContext {
            block_mgr: &*block_mgr,
            buffer_mgr: &buffer_mgr,
            thread_count: 1,
            direct_io: false,
        };
        let warmed = BufferPrewarm::new(ctx).execute(&table(), &block_ids).unwrap();
        assert_eq!(warmed, 5);
        assert!(buffer_mgr.used_memory() <= BLOCK_SIZE * 100 / 16);
    }
}
