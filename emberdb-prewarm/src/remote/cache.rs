//! Remote-object cache state and the scoped cache-mode swap.

use crate::error::{Error, Result};
use crate::prewarm::capacity::{buffer_capacity, BufferCapacityInfo};
use crate::remote::RemoteBlockInfo;
use byte_unit::Byte;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

const DEFAULT_REMOTE_BLOCK_SIZE: Byte = Byte::from_u64(1024 * 1024); // 1MB cache granularity
const DEFAULT_REMOTE_CACHE_MAX_SIZE: Byte = Byte::from_u64(4 * 1024 * 1024 * 1024); // 4GB
const DEFAULT_REMOTE_CACHE_DIR: &str = "remote-cache";

/// Tier an installed cache reader writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    InMemory,
    OnDisk,
}

/// Caller-requested cache mode for one remote prewarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemoteCacheMode {
    InMemory,
    OnDisk,
    /// Disk-backed with the memory tier fronting it; maps to the
    /// on-disk reader, which keeps a memory front regardless.
    Both,
    /// Keep whatever cache type is currently installed.
    #[default]
    UseCurrent,
}

impl RemoteCacheMode {
    /// Cache type this mode installs, or None for use-current.
    #[inline]
    pub fn cache_type(self) -> Option<CacheType> {
        match self {
            RemoteCacheMode::InMemory => Some(CacheType::InMemory),
            RemoteCacheMode::OnDisk | RemoteCacheMode::Both => Some(CacheType::OnDisk),
            RemoteCacheMode::UseCurrent => None,
        }
    }
}

/// Parse an optional cache-mode argument. Absent means use-current.
#[inline]
pub fn parse_remote_cache_mode(mode: Option<&str>) -> Result<RemoteCacheMode> {
    let Some(mode) = mode else {
        return Ok(RemoteCacheMode::UseCurrent);
    };
    match mode.to_ascii_lowercase().as_str() {
        "in_mem" | "in_memory" => Ok(RemoteCacheMode::InMemory),
        "on_disk" | "disk" => Ok(RemoteCacheMode::OnDisk),
        "both" => Ok(RemoteCacheMode::Both),
        other => Err(Error::InvalidInput(format!(
            "invalid cache mode '{other}', valid modes are: 'in_mem', 'on_disk', 'both'"
        ))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCacheConfig {
    block_size: Byte,
    max_size: Byte,
    cache_dir: String,
    cache_type: CacheType,
}

impl Default for RemoteCacheConfig {
    #[inline]
    fn default() -> Self {
        RemoteCacheConfig {
            block_size: DEFAULT_REMOTE_BLOCK_SIZE,
            max_size: DEFAULT_REMOTE_CACHE_MAX_SIZE,
            cache_dir: String::from(DEFAULT_REMOTE_CACHE_DIR),
            cache_type: CacheType::OnDisk,
        }
    }
}

impl RemoteCacheConfig {
    #[inline]
    pub fn block_size<T>(mut self, block_size: T) -> Self
    where
        Byte: From<T>,
    {
        self.block_size = Byte::from(block_size);
        self
    }

    #[inline]
    pub fn max_size<T>(mut self, max_size: T) -> Self
    where
        Byte: From<T>,
    {
        self.max_size = Byte::from(max_size);
        self
    }

    #[inline]
    pub fn cache_dir(mut self, cache_dir: impl Into<String>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    #[inline]
    pub fn cache_type(mut self, cache_type: CacheType) -> Self {
        self.cache_type = cache_type;
        self
    }

    #[inline]
    pub fn block_size_bytes(&self) -> u64 {
        self.block_size.as_u64()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    file_path: String,
    offset: u64,
}

/// In-memory block store shared by every installed reader.
///
/// Swapping readers changes which tier new blocks are persisted to,
/// not what is already warm; otherwise a scoped mode switch would
/// throw the warmed blocks away on exit.
#[derive(Debug, Default)]
struct MemStore {
    blocks: DashMap<CacheKey, Arc<[u8]>>,
    used: AtomicUsize,
}

/// One installed view of the remote cache.
///
/// The shared memory tier always fronts reads; the on-disk type
/// additionally persists each block to the cache directory.
#[derive(Debug)]
pub struct CacheReader {
    cache_type: CacheType,
    cache_dir: PathBuf,
    store: Arc<MemStore>,
}

impl CacheReader {
    #[inline]
    fn new(cache_type: CacheType, cache_dir: PathBuf, store: Arc<MemStore>) -> Self {
        CacheReader {
            cache_type,
            cache_dir,
            store,
        }
    }

    #[inline]
    pub fn cache_type(&self) -> CacheType {
        self.cache_type
    }

    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.store.used.load(Ordering::Acquire)
    }

    /// Whether the range starting at `offset` of `file_path` is cached.
    #[inline]
    pub fn cached(&self, file_path: &str, offset: u64) -> bool {
        let key = CacheKey {
            file_path: file_path.to_string(),
            offset,
        };
        if self.store.blocks.contains_key(&key) {
            return true;
        }
        self.cache_type == CacheType::OnDisk && self.disk_path(&key).is_file()
    }

    /// Record `data` as the cached content of one block range.
    pub fn admit(&self, block: &RemoteBlockInfo, data: &[u8]) {
        let key = CacheKey {
            file_path: block.file_path.clone(),
            offset: block.offset,
        };
        if self.cache_type == CacheType::OnDisk {
            let path = self.disk_path(&key);
            if let Err(e) = std::fs::create_dir_all(&self.cache_dir)
                .and_then(|_| std::fs::write(&path, data))
            {
                warn!(
                    file = %block.file_path,
                    offset = block.offset,
                    error = %e,
                    "failed to persist cache block"
                );
            }
        }
        if self.store.blocks.insert(key, Arc::from(data)).is_none() {
            self.store.used.fetch_add(data.len(), Ordering::AcqRel);
        }
    }

    #[inline]
    fn disk_path(&self, key: &CacheKey) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        key.file_path.hash(&mut hasher);
        self.cache_dir
            .join(format!("{:016x}-{:08x}.blk", hasher.finish(), key.offset))
    }
}

struct CacheState {
    cache_type: CacheType,
    reader: Arc<CacheReader>,
}

/// Process-global remote cache configuration.
///
/// The cache type and the installed reader are shared mutable state.
/// Scoped swaps from concurrent callers with different modes are not
/// serialized here; the last restore wins.
pub struct RemoteCacheManager {
    config: RemoteCacheConfig,
    store: Arc<MemStore>,
    state: Mutex<CacheState>,
}

impl RemoteCacheManager {
    #[inline]
    pub fn new(config: RemoteCacheConfig) -> Self {
        let store = Arc::new(MemStore::default());
        let reader = Arc::new(CacheReader::new(
            config.cache_type,
            PathBuf::from(&config.cache_dir),
            Arc::clone(&store),
        ));
        RemoteCacheManager {
            store,
            state: Mutex::new(CacheState {
                cache_type: config.cache_type,
                reader,
            }),
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &RemoteCacheConfig {
        &self.config
    }

    #[inline]
    pub fn cache_type(&self) -> CacheType {
        self.state.lock().cache_type
    }

    #[inline]
    pub fn current_reader(&self) -> Arc<CacheReader> {
        Arc::clone(&self.state.lock().reader)
    }

    /// Head-room snapshot of the remote cache.
    #[inline]
    pub fn capacity_info(&self) -> BufferCapacityInfo {
        let used = self.store.used.load(Ordering::Acquire);
        buffer_capacity(
            self.config.block_size.as_u64() as usize,
            self.config.max_size.as_u64() as usize,
            used.min(self.config.max_size.as_u64() as usize),
        )
    }

    /// Switch the cache type for the lifetime of the returned scope.
    ///
    /// For use-current the scope is a no-op. Otherwise the current type
    /// and reader are captured and reinstated when the scope drops, on
    /// every exit path including panics.
    #[inline]
    pub fn enter_mode(&self, mode: RemoteCacheMode) -> CacheModeScope<'_> {
        let saved = mode.cache_type().map(|cache_type| {
            let mut state = self.state.lock();
            let saved = (state.cache_type, Arc::clone(&state.reader));
            state.cache_type = cache_type;
            state.reader = Arc::new(CacheReader::new(
                cache_type,
                PathBuf::from(&self.config.cache_dir),
                Arc::clone(&self.store),
            ));
            saved
        });
        CacheModeScope {
            manager: self,
            saved,
        }
    }
}

/// Guard restoring the cache type and reader captured at scope entry.
pub struct CacheModeScope<'a> {
    manager: &'a RemoteCacheManager,
    saved: Option<(CacheType, Arc<CacheReader>)>,
}

impl Drop for CacheModeScope<'_> {
    #[inline]
    fn drop(&mut self) {
        if let Some((cache_type, reader)) = self.saved.take() {
            let mut state = self.manager.state.lock();
            state.cache_type = cache_type;
            state.reader = reader;
        }
    }
}
