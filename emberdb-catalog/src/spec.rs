use crate::{ColumnSegmentInfo, TableKind};
use semistr::SemiStr;

#[derive(Debug)]
pub struct SchemaSpec {
    pub schema_name: SemiStr,
}

impl SchemaSpec {
    #[inline]
    pub fn new(schema_name: &str) -> Self {
        Self {
            schema_name: SemiStr::new(schema_name),
        }
    }
}

#[derive(Debug)]
pub struct TableSpec {
    pub table_name: SemiStr,
    pub kind: TableKind,
    pub segments: Vec<SegmentSpec>,
}

impl TableSpec {
    #[inline]
    pub fn new(table_name: &str, kind: TableKind) -> Self {
        Self {
            table_name: SemiStr::new(table_name),
            kind,
            segments: vec![],
        }
    }

    #[inline]
    pub fn with_segment(mut self, segment: SegmentSpec) -> Self {
        self.segments.push(segment);
        self
    }
}

#[derive(Debug)]
pub struct SegmentSpec {
    pub column_name: SemiStr,
    pub persistent: bool,
    pub block_id: i64,
    pub additional_blocks: Vec<i64>,
}

impl SegmentSpec {
    #[inline]
    pub fn persistent(column_name: &str, block_id: i64) -> Self {
        Self {
            column_name: SemiStr::new(column_name),
            persistent: true,
            block_id,
            additional_blocks: vec![],
        }
    }

    #[inline]
    pub fn transient(column_name: &str) -> Self {
        Self {
            column_name: SemiStr::new(column_name),
            persistent: false,
            block_id: crate::INVALID_BLOCK,
            additional_blocks: vec![],
        }
    }

    #[inline]
    pub fn with_additional_blocks(mut self, blocks: Vec<i64>) -> Self {
        self.additional_blocks = blocks;
        self
    }
}

impl From<&SegmentSpec> for ColumnSegmentInfo {
    #[inline]
    fn from(src: &SegmentSpec) -> Self {
        ColumnSegmentInfo {
            column_name: src.column_name.clone(),
            persistent: src.persistent,
            block_id: src.block_id,
            additional_blocks: src.additional_blocks.clone(),
        }
    }
}
