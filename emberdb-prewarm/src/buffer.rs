use crate::block::{BlockHandle, BlockID, BlockManager, BlockState};
use crate::error::{Error, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Memory-accounted view of the engine's block cache.
pub trait BufferManager: Send + Sync {
    /// Maximum bytes the buffer pool may hold.
    fn max_memory(&self) -> usize;

    /// Bytes currently held by cached blocks and scratch allocations.
    fn used_memory(&self) -> usize;

    /// Allocate a scratch buffer counted against the memory limit.
    /// The reservation is released when the buffer is dropped.
    fn allocate(&self, len: usize) -> Result<ScratchBuffer>;

    /// Load the unloaded handles of `batch` into the pool.
    /// Best effort: individual read failures are logged and skipped,
    /// and loading stops once the memory budget is exhausted.
    fn prefetch(&self, batch: &[Arc<BlockHandle>]);
}

/// Temporary buffer whose bytes count against the pool's memory limit
/// until dropped.
pub struct ScratchBuffer {
    data: Box<[u8]>,
    used: Arc<AtomicUsize>,
}

impl ScratchBuffer {
    #[inline]
    fn new(len: usize, used: Arc<AtomicUsize>) -> Self {
        ScratchBuffer {
            data: vec![0u8; len].into_boxed_slice(),
            used,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for ScratchBuffer {
    #[inline]
    fn drop(&mut self) {
        self.used.fetch_sub(self.data.len(), Ordering::AcqRel);
    }
}

/// One block resident in the pool.
///
/// The pool keeps the block's handle alive, so re-registering a
/// resident id yields this handle and observes its loaded state.
struct ResidentBlock {
    data: Arc<[u8]>,
    // keeps the registration alive while the block is resident
    _handle: Arc<BlockHandle>,
}

/// Buffer manager with a fixed byte budget and no eviction.
///
/// Loaded blocks stay resident until the manager is dropped, which is
/// enough for cache warming: eviction pressure is the host engine's
/// concern, head-room accounting is ours.
pub struct FixedBufferManager {
    max_memory: usize,
    used: Arc<AtomicUsize>,
    pool: DashMap<BlockID, ResidentBlock>,
    block_mgr: Arc<dyn BlockManager>,
}

impl FixedBufferManager {
    #[inline]
    pub fn new(max_memory: usize, block_mgr: Arc<dyn BlockManager>) -> Self {
        FixedBufferManager {
            max_memory,
            used: Arc::new(AtomicUsize::new(0)),
            pool: DashMap::new(),
            block_mgr,
        }
    }

    #[inline]
    pub fn contains_block(&self, block_id: BlockID) -> bool {
        self.pool.contains_key(&block_id)
    }

    /// Bytes of a resident block, if it is in the pool.
    #[inline]
    pub fn block_data(&self, block_id: BlockID) -> Option<Arc<[u8]>> {
        self.pool.get(&block_id).map(|r| Arc::clone(&r.data))
    }

    /// Reserve `len` bytes, failing if the budget would be exceeded.
    #[inline]
    fn reserve(&self, len: usize) -> Result<()> {
        loop {
            let used = self.used.load(Ordering::Acquire);
            let new_used = used + len;
            if new_used > self.max_memory {
                return Err(Error::InsufficientMemory(len));
            }
            if self
                .used
                .compare_exchange_weak(used, new_used, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(());
            }
        }
    }
}

impl BufferManager for FixedBufferManager {
    #[inline]
    fn max_memory(&self) -> usize {
        self.max_memory
    }

    #[inline]
    fn used_memory(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    #[inline]
    fn allocate(&self, len: usize) -> Result<ScratchBuffer> {
        self.reserve(len)?;
        Ok(ScratchBuffer::new(len, Arc::clone(&self.used)))
    }

    fn prefetch(&self, batch: &[Arc<BlockHandle>]) {
        let block_size = self.block_mgr.block_alloc_size();
        for handle in batch {
            if handle.state() == BlockState::Loaded {
                continue;
            }
            // pool residency is authoritative; a handle lagging behind
            // it is aligned here rather than reloaded
            if self.pool.contains_key(&handle.block_id()) {
                handle.set_state(BlockState::Loaded);
                continue;
            }
            if self.reserve(block_size).is_err() {
                warn!(
                    used = self.used_memory(),
                    max = self.max_memory,
                    "buffer pool exhausted while prefetching, stopping batch"
                );
                return;
            }
            let mut data = vec![0u8; block_size];
            match self.block_mgr.read_blocks(&mut data, handle.block_id(), 1) {
                Ok(()) => {
                    self.pool.insert(
                        handle.block_id(),
                        ResidentBlock {
                            data: data.into(),
                            _handle: Arc::clone(handle),
                        },
                    );
                    handle.set_state(BlockState::Loaded);
                }
                Err(e) => {
                    self.used.fetch_sub(block_size, Ordering::AcqRel);
                    warn!(
                        block_id = handle.block_id(),
                        error = %e,
                        "failed to load block into buffer pool"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{SingleFileBlockManager, FILE_HEADER_SIZE};

    fn block_file(dir: &tempfile::TempDir, blocks: usize, block_size: usize) -> std::path::PathBuf {
        let path = dir.path().join("db.ember");
        let mut data = vec![0u8; FILE_HEADER_SIZE * 3 + blocks * block_size];
        for b in 0..blocks {
            let start = FILE_HEADER_SIZE * 3 + b * block_size;
            data[start..start + block_size].fill((b % 251) as u8);
        }
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_scratch_buffer_accounting() {
        let dir = tempfile::tempdir().unwrap();
        let path = block_file(&dir, 1, 4096);
        let block_mgr = Arc::new(SingleFileBlockManager::open(&path, 4096).unwrap());
        let buffer_mgr = FixedBufferManager::new(10_000, block_mgr as Arc<dyn BlockManager>);

        let buf = buffer_mgr.allocate(8_000).unwrap();
        assert_eq!(buffer_mgr.used_memory(), 8_000);
        assert!(buffer_mgr.allocate(8_000).is_err());
        drop(buf);
        assert_eq!(buffer_mgr.used_memory(), 0);
        assert!(buffer_mgr.allocate(8_000).is_ok());
    }

    #[test]
    fn test_prefetch_loads_and_marks_handles() {
        let block_size = 4096usize;
        let dir = tempfile::tempdir().unwrap();
        let path = block_file(&dir, 4, block_size);
        let block_mgr = Arc::new(SingleFileBlockManager::open(&path, block_size).unwrap());
        let buffer_mgr = FixedBufferManager::new(block_size * 8, Arc::clone(&block_mgr) as Arc<dyn BlockManager>);

        let handles: Vec<_> = (0..4).map(|id| block_mgr.register_block(id)).collect();
        buffer_mgr.prefetch(&handles);
        assert!(handles.iter().all(|h| h.state() == BlockState::Loaded));
        assert!((0..4).all(|id| buffer_mgr.contains_block(id)));
        assert_eq!(buffer_mgr.used_memory(), block_size * 4);
        assert!(buffer_mgr.block_data(2).unwrap().iter().all(|&x| x == 2));

        // a second prefetch of loaded handles changes nothing
        buffer_mgr.prefetch(&handles);
        assert_eq!(buffer_mgr.used_memory(), block_size * 4);

        // the pool keeps the registrations alive, so dropping every
        // caller-side handle and re-registering still observes residency
        drop(handles);
        assert_eq!(block_mgr.register_block(2).state(), BlockState::Loaded);
    }

    #[test]
    fn test_prefetch_stops_at_budget() {
        let block_size = 4096usize;
        let dir = tempfile::tempdir().unwrap();
        let path = block_file(&dir, 4, block_size);
        let block_mgr = Arc::new(SingleFileBlockManager::open(&path, block_size).unwrap());
        let buffer_mgr = FixedBufferManager::new(block_size * 2, Arc::clone(&block_mgr) as Arc<dyn BlockManager>);

        let handles: Vec<_> = (0..4).map(|id| block_mgr.register_block(id)).collect();
        buffer_mgr.prefetch(&handles);
        let loaded = handles
            .iter()
            .filter(|h| h.state() == BlockState::Loaded)
            .count();
        assert_eq!(loaded, 2);
        assert_eq!(buffer_mgr.used_memory(), block_size * 2);
    }

    #[test]
    fn test_prefetch_skips_unreadable_block() {
        let block_size = 4096usize;
        let dir = tempfile::tempdir().unwrap();
        let path = block_file(&dir, 2, block_size);
        let block_mgr = Arc::new(SingleFileBlockManager::open(&path, block_size).unwrap());
        let buffer_mgr = FixedBufferManager::new(block_size * 8, Arc::clone(&block_mgr) as Arc<dyn BlockManager>);

        // block 9 lies past the end of the file
        let handles = vec![block_mgr.register_block(0), block_mgr.register_block(9)];
        buffer_mgr.prefetch(&handles);
        assert_eq!(handles[0].state(), BlockState::Loaded);
        assert_eq!(handles[1].state(), BlockState::Unloaded);
        assert_eq!(buffer_mgr.used_memory(), block_size);
    }
}
