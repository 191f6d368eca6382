use crate::block::INVALID_BLOCK;
use crate::prewarm::BlockIDSet;
use emberdb_catalog::{Catalog, TableID};

/// Collects block ids from a table's column segments.
pub struct BlockCollector;

impl BlockCollector {
    /// Enumerate the persistent blocks of given table.
    ///
    /// Transient segments and invalid block ids are skipped. Segment
    /// enumeration may itself page in a few metadata blocks (string
    /// dictionary headers and the like); that side effect is tolerated.
    pub fn collect_table_blocks(catalog: &dyn Catalog, table_id: TableID) -> BlockIDSet {
        let segments = catalog.column_segments(table_id);
        let mut block_ids = BlockIDSet::with_capacity(segments.len() * 2);
        for segment in &segments {
            if !segment.persistent {
                continue;
            }
            if segment.block_id != INVALID_BLOCK {
                block_ids.insert(segment.block_id);
            }
            for &additional_block in &segment.additional_blocks {
                if additional_block != INVALID_BLOCK {
                    block_ids.insert(additional_block);
                }
            }
        }
        block_ids
    }
}
