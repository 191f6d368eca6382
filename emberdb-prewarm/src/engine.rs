//! Engine wiring for the prewarming subsystem.
//!
//! The engine owns the catalog, the block and buffer managers, the
//! filesystem and the remote cache, and hands strategies the narrow
//! slices of itself they need.

use crate::block::{BlockManager, SingleFileBlockManager, DEFAULT_BLOCK_ALLOC_SIZE};
use crate::buffer::{BufferManager, FixedBufferManager};
use crate::error::Result;
use crate::fs::{FileSystem, LocalFileSystem};
use crate::prewarm::StrategyContext;
use crate::remote::{RemoteCacheConfig, RemoteCacheManager};
use crate::thread::default_thread_count;
use byte_unit::Byte;
use emberdb_catalog::mem_impl::MemCatalog;
use emberdb_catalog::{Catalog, SchemaSpec};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

const DEFAULT_DB_FILE_PATH: &str = "data.ember";
const DEFAULT_MAX_MEM_SIZE: Byte = Byte::from_u64(1024 * 1024 * 1024); // by default 1GB

pub const DEFAULT_SCHEMA: &str = "main";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    db_path: String,
    block_alloc_size: usize,
}

impl Default for StorageConfig {
    #[inline]
    fn default() -> Self {
        StorageConfig {
            db_path: String::from(DEFAULT_DB_FILE_PATH),
            block_alloc_size: DEFAULT_BLOCK_ALLOC_SIZE,
        }
    }
}

impl StorageConfig {
    #[inline]
    pub fn with_main_dir(mut self, main_dir: impl AsRef<Path>) -> Self {
        let path = main_dir.as_ref().join(&self.db_path);
        self.db_path = path.to_string_lossy().to_string();
        self
    }

    #[inline]
    pub fn db_path(mut self, db_path: impl Into<String>) -> Self {
        self.db_path = db_path.into();
        self
    }

    #[inline]
    pub fn block_alloc_size(mut self, block_alloc_size: usize) -> Self {
        self.block_alloc_size = block_alloc_size;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    max_mem_size: Byte,
}

impl Default for BufferConfig {
    #[inline]
    fn default() -> Self {
        BufferConfig {
            max_mem_size: DEFAULT_MAX_MEM_SIZE,
        }
    }
}

impl BufferConfig {
    #[inline]
    pub fn max_mem_size<T>(mut self, max_mem_size: T) -> Self
    where
        Byte: From<T>,
    {
        self.max_mem_size = Byte::from(max_mem_size);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Worker threads for prewarm fan-out; 0 means auto-detect.
    pub threads: usize,
    /// Whether the engine bypasses the OS page cache for table I/O.
    pub direct_io: bool,
    pub storage: StorageConfig,
    pub buffer: BufferConfig,
    pub remote: RemoteCacheConfig,
}

impl EngineConfig {
    #[inline]
    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    #[inline]
    pub fn buffer(mut self, buffer: BufferConfig) -> Self {
        self.buffer = buffer;
        self
    }

    #[inline]
    pub fn remote(mut self, remote: RemoteCacheConfig) -> Self {
        self.remote = remote;
        self
    }

    #[inline]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    #[inline]
    pub fn direct_io(mut self, direct_io: bool) -> Self {
        self.direct_io = direct_io;
        self
    }

    #[inline]
    pub fn build(self) -> Result<Engine> {
        let block_mgr = Arc::new(SingleFileBlockManager::open(
            &self.storage.db_path,
            self.storage.block_alloc_size,
        )?);
        let buffer_mgr = Arc::new(FixedBufferManager::new(
            self.buffer.max_mem_size.as_u64() as usize,
            Arc::clone(&block_mgr) as Arc<dyn BlockManager>,
        ));
        let remote_cache = Arc::new(RemoteCacheManager::new(self.remote.clone()));
        let catalog = Arc::new(MemCatalog::default());
        // the default schema always exists
        catalog.create_schema(SchemaSpec::new(DEFAULT_SCHEMA))?;
        let thread_count = if self.threads == 0 {
            default_thread_count()
        } else {
            self.threads
        };
        Ok(Engine {
            config: self,
            catalog,
            block_mgr,
            buffer_mgr,
            fs: Arc::new(LocalFileSystem),
            remote_cache,
            thread_count,
        })
    }
}

pub struct Engine {
    config: EngineConfig,
    catalog: Arc<MemCatalog>,
    block_mgr: Arc<SingleFileBlockManager>,
    buffer_mgr: Arc<FixedBufferManager>,
    fs: Arc<dyn FileSystem>,
    remote_cache: Arc<RemoteCacheManager>,
    thread_count: usize,
}

impl Engine {
    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn catalog(&self) -> &dyn Catalog {
        &*self.catalog
    }

    #[inline]
    pub fn buffer_mgr(&self) -> &FixedBufferManager {
        &self.buffer_mgr
    }

    #[inline]
    pub fn file_system(&self) -> &dyn FileSystem {
        &*self.fs
    }

    #[inline]
    pub fn remote_cache(&self) -> &RemoteCacheManager {
        &self.remote_cache
    }

    #[inline]
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Capability slice handed to one local strategy execution.
    #[inline]
    pub fn strategy_context(&self) -> StrategyContext<'_> {
        StrategyContext {
            block_mgr: &*self.block_mgr,
            buffer_mgr: &*self.buffer_mgr,
            thread_count: self.thread_count,
            direct_io: self.config.direct_io,
        }
    }
}
