use crate::error::Result;
use crate::io::FileIO;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

pub use emberdb_catalog::{BlockID, INVALID_BLOCK};

/// Size of one file header. The single-file layout keeps a main header
/// and two alternating meta headers before the first block.
pub const FILE_HEADER_SIZE: usize = 4096;

pub const DEFAULT_BLOCK_ALLOC_SIZE: usize = 256 * 1024;

/// Returns the byte offset of given block in the single-file layout.
/// Blocks start right after the three file headers.
#[inline]
pub fn block_file_offset(block_id: BlockID, block_alloc_size: usize) -> u64 {
    FILE_HEADER_SIZE as u64 * 3 + block_id as u64 * block_alloc_size as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockState {
    Unloaded = 0,
    Loaded = 1,
}

/// Shared registration of one block.
///
/// Handles are created by [`BlockManager::register_block`] and stay
/// alive as long as anyone holds them; the registry keeps only weak
/// references, so release is implicit.
#[derive(Debug)]
pub struct BlockHandle {
    block_id: BlockID,
    state: AtomicU8,
}

impl BlockHandle {
    #[inline]
    pub(crate) fn new(block_id: BlockID) -> Self {
        BlockHandle {
            block_id,
            state: AtomicU8::new(BlockState::Unloaded as u8),
        }
    }

    #[inline]
    pub fn block_id(&self) -> BlockID {
        self.block_id
    }

    #[inline]
    pub fn state(&self) -> BlockState {
        match self.state.load(Ordering::Acquire) {
            0 => BlockState::Unloaded,
            _ => BlockState::Loaded,
        }
    }

    #[inline]
    pub(crate) fn set_state(&self, state: BlockState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Block-level access to a table storage file.
pub trait BlockManager: Send + Sync {
    /// Allocation size of one block in bytes.
    fn block_alloc_size(&self) -> usize;

    /// Register a block and return its shared handle.
    /// Repeated registration of the same id returns the same handle
    /// while anyone still holds it.
    fn register_block(&self, block_id: BlockID) -> Arc<BlockHandle>;

    /// Read `count` consecutive blocks starting at `first_block` into `buf`.
    /// `buf` must hold at least `count * block_alloc_size()` bytes.
    fn read_blocks(&self, buf: &mut [u8], first_block: BlockID, count: usize) -> Result<()>;

    /// Path of the backing storage file.
    fn path(&self) -> &Path;
}

/// Block manager over one storage file.
pub struct SingleFileBlockManager {
    path: PathBuf,
    block_alloc_size: usize,
    file: FileIO,
    registry: DashMap<BlockID, Weak<BlockHandle>>,
}

impl SingleFileBlockManager {
    #[inline]
    pub fn open(path: impl Into<PathBuf>, block_alloc_size: usize) -> Result<Self> {
        let path = path.into();
        let file = FileIO::open_readonly(&path)?;
        Ok(SingleFileBlockManager {
            path,
            block_alloc_size,
            file,
            registry: DashMap::new(),
        })
    }
}

impl BlockManager for SingleFileBlockManager {
    #[inline]
    fn block_alloc_size(&self) -> usize {
        self.block_alloc_size
    }

    #[inline]
    fn register_block(&self, block_id: BlockID) -> Arc<BlockHandle> {
        match self.registry.entry(block_id) {
            Entry::Occupied(mut occ) => {
                if let Some(handle) = occ.get().upgrade() {
                    return handle;
                }
                let handle = Arc::new(BlockHandle::new(block_id));
                occ.insert(Arc::downgrade(&handle));
                handle
            }
            Entry::Vacant(vac) => {
                let handle = Arc::new(BlockHandle::new(block_id));
                vac.insert(Arc::downgrade(&handle));
                handle
            }
        }
    }

    #[inline]
    fn read_blocks(&self, buf: &mut [u8], first_block: BlockID, count: usize) -> Result<()> {
        let len = count * self.block_alloc_size;
        debug_assert!(buf.len() >= len);
        let offset = block_file_offset(first_block, self.block_alloc_size);
        self.file.pread_exact(&mut buf[..len], offset)?;
        Ok(())
    }

    #[inline]
    fn path(&self) -> &Path {
        &self.path
    }
}
