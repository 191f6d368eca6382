//! Caller-facing prewarm entry points.
//!
//! These carry the argument semantics of the SQL surface: optional
//! mode and schema arguments with defaults, case-insensitive mode
//! strings, and an `i64` count of warmed blocks as the result.

use crate::engine::{Engine, DEFAULT_SCHEMA};
use crate::error::{Error, Result};
use crate::prewarm::{create_local_strategy, parse_prewarm_mode, BlockCollector};
use crate::remote::{parse_remote_cache_mode, RemoteBlockCollector, RemotePrewarmStrategy};
use emberdb_catalog::TableKind;

/// Warm the blocks of a local table.
///
/// `mode` is one of `buffer`, `read`, `prefetch` (case-insensitive,
/// default `buffer`); `schema` defaults to `main`. Returns the number
/// of blocks warmed.
pub fn prewarm(
    engine: &Engine,
    table_name: &str,
    mode: Option<&str>,
    schema: Option<&str>,
) -> Result<i64> {
    if table_name.trim().is_empty() {
        return Err(Error::InvalidInput("table name cannot be empty".to_string()));
    }
    let mode = parse_prewarm_mode(mode)?;
    let schema_name = schema.unwrap_or(DEFAULT_SCHEMA);

    let catalog = engine.catalog();
    let schema = catalog
        .find_schema_by_name(schema_name)
        .ok_or(Error::SchemaNotFound)?;
    let table = catalog
        .find_table_by_name(schema.id, table_name)
        .ok_or(Error::TableNotFound)?;
    if table.kind != TableKind::Native {
        return Err(Error::TableNotNative(table_name.to_string()));
    }

    let block_ids = BlockCollector::collect_table_blocks(catalog, table.id);
    if block_ids.is_empty() {
        return Ok(0);
    }

    let strategy = create_local_strategy(mode, engine.strategy_context())?;
    let blocks_prewarmed = strategy.execute(&table, &block_ids)?;
    Ok(blocks_prewarmed as i64)
}

/// Warm remote files matching a glob pattern into the remote cache.
///
/// `cache_mode` is one of `in_mem`/`in_memory`, `on_disk`/`disk`,
/// `both` (absent keeps the current cache type); `max_blocks` bounds
/// the number of ranges fetched. Returns the number of blocks warmed.
pub fn prewarm_remote(
    engine: &Engine,
    pattern: &str,
    cache_mode: Option<&str>,
    max_blocks: Option<i64>,
) -> Result<i64> {
    if pattern.trim().is_empty() {
        return Err(Error::InvalidInput("pattern cannot be empty".to_string()));
    }
    let mode = parse_remote_cache_mode(cache_mode)?;
    let max_blocks = match max_blocks {
        None => usize::MAX,
        Some(n) if n < 0 => {
            return Err(Error::InvalidInput(
                "max_blocks cannot be negative".to_string(),
            ));
        }
        Some(n) => n as usize,
    };

    let block_size = engine.remote_cache().config().block_size_bytes();
    let file_blocks =
        RemoteBlockCollector::collect_remote_blocks(engine.file_system(), pattern, block_size)?;
    if file_blocks.is_empty() {
        return Ok(0);
    }

    let strategy = RemotePrewarmStrategy::new(
        engine.file_system(),
        engine.remote_cache(),
        engine.thread_count(),
    );
    let blocks_prewarmed = strategy.execute(&file_blocks, mode, max_blocks)?;
    Ok(blocks_prewarmed as i64)
}
