pub mod error;
pub mod mem_impl;
pub mod spec;

use crate::error::Result;
use semistr::SemiStr;

pub use spec::*;

pub type ObjID = u64;
pub type TableID = ObjID;
pub type SchemaID = ObjID;

/// Identifier of a persistent block within a table's storage file.
/// Negative values are reserved; [`INVALID_BLOCK`] marks a segment
/// that has no backing block.
pub type BlockID = i64;

pub const INVALID_BLOCK: BlockID = -1;

/// Catalog maintains metadata of all database objects.
/// It could be shared between threads.
pub trait Catalog: Send + Sync {
    fn create_schema(&self, schema: SchemaSpec) -> Result<SchemaID>;

    fn drop_schema(&self, schema_name: &str) -> Result<()>;

    fn all_schemas(&self) -> Vec<Schema>;

    fn exists_schema(&self, schema_name: &str) -> bool;

    fn find_schema_by_name(&self, schema_name: &str) -> Option<Schema>;

    fn find_schema(&self, schema_id: SchemaID) -> Option<Schema>;

    fn create_table(&self, schema_id: SchemaID, table_spec: TableSpec) -> Result<TableID>;

    fn drop_table(&self, schema_id: SchemaID, table_name: &str) -> Result<()>;

    fn all_tables_in_schema(&self, schema_id: SchemaID) -> Vec<Table>;

    fn exists_table(&self, schema_id: SchemaID, table_name: &str) -> bool;

    fn find_table_by_name(&self, schema_id: SchemaID, table_name: &str) -> Option<Table>;

    fn find_table(&self, table_id: TableID) -> Option<Table>;

    /// Returns the column-segment metadata of given table.
    /// Empty if the table does not exist or has no persistent storage yet.
    fn column_segments(&self, table_id: TableID) -> Vec<ColumnSegmentInfo>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub id: SchemaID,
    pub name: SemiStr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub id: TableID,
    pub schema_id: SchemaID,
    pub name: SemiStr,
    pub kind: TableKind,
}

/// Kind of a cataloged table.
/// Only native tables are backed by the engine's own block storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Table stored in the engine's single-file block layout.
    Native,
    /// Table backed by an external source, e.g. a view or attached file.
    External,
}

/// Storage metadata of one column segment.
///
/// A segment owns one primary block and, for compressed or
/// dictionary-encoded columns, a list of auxiliary blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSegmentInfo {
    pub column_name: SemiStr,
    /// Whether the segment has been persisted to the storage file.
    /// In-memory segments have no blocks to enumerate.
    pub persistent: bool,
    pub block_id: BlockID,
    pub additional_blocks: Vec<BlockID>,
}
