pub mod buffer;
pub mod capacity;
pub mod collector;
pub mod prefetch;
pub mod read;

use crate::block::{BlockHandle, BlockID, BlockManager, BlockState};
use crate::buffer::BufferManager;
use crate::error::{Error, Result};
use crate::prewarm::capacity::{buffer_capacity, BufferCapacityInfo};
use emberdb_catalog::Table;
use std::collections::HashSet;
use std::sync::Arc;

pub use crate::prewarm::buffer::BufferPrewarm;
pub use crate::prewarm::collector::BlockCollector;
pub use crate::prewarm::prefetch::PrefetchPrewarm;
pub use crate::prewarm::read::ReadPrewarm;

/// Deduplicated block ids of one table.
pub type BlockIDSet = HashSet<BlockID>;

/// Where warmed data should land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrewarmMode {
    /// Load blocks into the engine's own buffer pool.
    #[default]
    Buffer,
    /// Read blocks through the OS page cache without pinning them.
    Read,
    /// Issue non-blocking OS read-ahead hints.
    Prefetch,
}

/// Parse an optional mode argument. Absent means BUFFER.
#[inline]
pub fn parse_prewarm_mode(mode: Option<&str>) -> Result<PrewarmMode> {
    let Some(mode) = mode else {
        return Ok(PrewarmMode::Buffer);
    };
    match mode.to_ascii_lowercase().as_str() {
        "buffer" => Ok(PrewarmMode::Buffer),
        "read" => Ok(PrewarmMode::Read),
        "prefetch" => Ok(PrewarmMode::Prefetch),
        other => Err(Error::InvalidInput(format!(
            "invalid prewarm mode '{other}', valid modes are: 'buffer', 'read', 'prefetch'"
        ))),
    }
}

/// Shared capabilities of the local strategies.
///
/// One context is built per invocation and holds non-owning references
/// to the engine's managers.
pub struct StrategyContext<'a> {
    pub block_mgr: &'a dyn BlockManager,
    pub buffer_mgr: &'a dyn BufferManager,
    pub thread_count: usize,
    pub direct_io: bool,
}

impl StrategyContext<'_> {
    /// Page-cache strategies are pointless under direct I/O, which
    /// bypasses the OS page cache entirely.
    #[inline]
    pub fn check_direct_io(&self, strategy_name: &str) -> Result<()> {
        if self.direct_io {
            return Err(Error::InvalidInput(format!(
                "{strategy_name} prewarming is not effective when direct I/O is enabled. \
                 Direct I/O bypasses the OS page cache. \
                 Use the BUFFER mode instead to warm the internal buffer pool."
            )));
        }
        Ok(())
    }

    /// Snapshot of current buffer-pool head-room.
    #[inline]
    pub fn capacity(&self) -> BufferCapacityInfo {
        buffer_capacity(
            self.block_mgr.block_alloc_size(),
            self.buffer_mgr.max_memory(),
            self.buffer_mgr.used_memory(),
        )
    }

    /// Register all ids and keep only the handles still unloaded.
    /// Order of the result is unspecified.
    #[inline]
    pub fn unloaded_block_handles(&self, block_ids: &BlockIDSet) -> Vec<Arc<BlockHandle>> {
        let mut unloaded = Vec::with_capacity(block_ids.len());
        for &block_id in block_ids {
            let handle = self.block_mgr.register_block(block_id);
            if handle.state() == BlockState::Unloaded {
                unloaded.push(handle);
            }
        }
        unloaded
    }
}

/// A local prewarming strategy, consumed by a single execute call.
pub trait LocalPrewarmStrategy {
    /// Warm the given blocks of `table`.
    /// Returns the number of blocks the strategy acted upon; blocks
    /// that are already resident or do not exist are skipped silently.
    fn execute(&self, table: &Table, block_ids: &BlockIDSet) -> Result<usize>;
}

/// Create a local strategy for the given mode.
#[inline]
pub fn create_local_strategy<'a>(
    mode: PrewarmMode,
    ctx: StrategyContext<'a>,
) -> Result<Box<dyn LocalPrewarmStrategy + 'a>> {
    match mode {
        PrewarmMode::Buffer => Ok(Box::new(BufferPrewarm::new(ctx))),
        PrewarmMode::Read => Ok(Box::new(ReadPrewarm::new(ctx))),
        PrewarmMode::Prefetch => {
            if cfg!(windows) {
                return Err(Error::NotSupported("PREFETCH prewarming on Windows"));
            }
            Ok(Box::new(PrefetchPrewarm::new(ctx)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prewarm_mode() {
        assert_eq!(parse_prewarm_mode(None).unwrap(), PrewarmMode::Buffer);
        assert_eq!(parse_prewarm_mode(Some("buffer")).unwrap(), PrewarmMode::Buffer);
        assert_eq!(parse_prewarm_mode(Some("READ")).unwrap(), PrewarmMode::Read);
        assert_eq!(
            parse_prewarm_mode(Some("Prefetch")).unwrap(),
            PrewarmMode::Prefetch
        );
        assert!(matches!(
            parse_prewarm_mode(Some("warm")),
            Err(Error::InvalidInput(_))
        ));
    }
}
