use crate::error::{Error, Result};
use crate::{
    Catalog, ColumnSegmentInfo, ObjID, Schema, SchemaID, SchemaSpec, Table, TableID, TableSpec,
};
use indexmap::IndexMap;
use parking_lot::RwLock;
use semistr::SemiStr;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MemCatalog {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    schemas: IndexMap<SemiStr, Schema>,
    tables: IndexMap<SchemaID, Vec<Table>>,
    table_details: HashMap<TableID, TableDetails>,
    obj_id_gen: ObjID,
}

#[derive(Debug)]
struct TableDetails {
    table: Table,
    segments: Vec<ColumnSegmentInfo>,
}

impl Inner {
    #[inline]
    fn all_schemas(&self) -> Vec<Schema> {
        self.schemas.values().cloned().collect()
    }

    #[inline]
    fn exists_schema(&self, schema_name: &str) -> bool {
        self.schemas.contains_key(schema_name)
    }

    #[inline]
    fn find_schema_by_name(&self, schema_name: &str) -> Option<Schema> {
        self.schemas.get(schema_name).cloned()
    }

    #[inline]
    fn find_schema(&self, schema_id: SchemaID) -> Option<Schema> {
        self.schemas.values().find(|s| s.id == schema_id).cloned()
    }

    #[inline]
    fn all_tables_in_schema(&self, schema_id: SchemaID) -> Vec<Table> {
        self.tables.get(&schema_id).cloned().unwrap_or_default()
    }

    #[inline]
    fn exists_table(&self, schema_id: SchemaID, table_name: &str) -> bool {
        self.tables
            .get(&schema_id)
            .map(|ts| ts.iter().any(|t| t.name == table_name))
            .unwrap_or_default()
    }

    #[inline]
    fn find_table_by_name(&self, schema_id: SchemaID, table_name: &str) -> Option<Table> {
        self.tables
            .get(&schema_id)
            .and_then(|ts| ts.iter().find(|t| t.name == table_name).cloned())
    }

    #[inline]
    fn find_table(&self, table_id: TableID) -> Option<Table> {
        self.table_details.get(&table_id).map(|td| td.table.clone())
    }

    #[inline]
    fn column_segments(&self, table_id: TableID) -> Vec<ColumnSegmentInfo> {
        self.table_details
            .get(&table_id)
            .map(|td| td.segments.clone())
            .unwrap_or_default()
    }

    #[inline]
    fn next_obj_id(&mut self) -> ObjID {
        self.obj_id_gen += 1;
        self.obj_id_gen
    }
}

impl Catalog for MemCatalog {
    #[inline]
    fn create_schema(&self, schema: SchemaSpec) -> Result<SchemaID> {
        let mut g = self.inner.write();
        if g.exists_schema(&schema.schema_name) {
            return Err(Error::SchemaAlreadyExists);
        }
        let id = g.next_obj_id();
        g.schemas.insert(
            schema.schema_name.clone(),
            Schema {
                id,
                name: schema.schema_name,
            },
        );
        Ok(id)
    }

    #[inline]
    fn drop_schema(&self, schema_name: &str) -> Result<()> {
        let mut g = self.inner.write();
        let schema = g
            .find_schema_by_name(schema_name)
            .ok_or(Error::SchemaNotFound)?;
        if g.tables.get(&schema.id).map(|ts| !ts.is_empty()).unwrap_or(false) {
            return Err(Error::SchemaNotDeleted);
        }
        g.schemas.shift_remove(schema_name);
        g.tables.shift_remove(&schema.id);
        Ok(())
    }

    #[inline]
    fn all_schemas(&self) -> Vec<Schema> {
        self.inner.read().all_schemas()
    }

    #[inline]
    fn exists_schema(&self, schema_name: &str) -> bool {
        self.inner.read().exists_schema(schema_name)
    }

    #[inline]
    fn find_schema_by_name(&self, schema_name: &str) -> Option<Schema> {
        self.inner.read().find_schema_by_name(schema_name)
    }

    #[inline]
    fn find_schema(&self, schema_id: SchemaID) -> Option<Schema> {
        self.inner.read().find_schema(schema_id)
    }

    #[inline]
    fn create_table(&self, schema_id: SchemaID, table_spec: TableSpec) -> Result<TableID> {
        let mut g = self.inner.write();
        if g.find_schema(schema_id).is_none() {
            return Err(Error::SchemaNotFound);
        }
        if g.exists_table(schema_id, &table_spec.table_name) {
            return Err(Error::TableAlreadyExists);
        }
        let id = g.next_obj_id();
        let table = Table {
            id,
            schema_id,
            name: table_spec.table_name.clone(),
            kind: table_spec.kind,
        };
        let segments = table_spec.segments.iter().map(ColumnSegmentInfo::from).collect();
        g.tables.entry(schema_id).or_default().push(table.clone());
        g.table_details.insert(id, TableDetails { table, segments });
        Ok(id)
    }

    #[inline]
    fn drop_table(&self, schema_id: SchemaID, table_name: &str) -> Result<()> {
        let mut g = self.inner.write();
        let table = g
            .find_table_by_name(schema_id, table_name)
            .ok_or(Error::TableNotFound)?;
        if let Some(ts) = g.tables.get_mut(&schema_id) {
            ts.retain(|t| t.id != table.id);
        }
        g.table_details.remove(&table.id);
        Ok(())
    }

    #[inline]
    fn all_tables_in_schema(&self, schema_id: SchemaID) -> Vec<Table> {
        self.inner.read().all_tables_in_schema(schema_id)
    }

    #[inline]
    fn exists_table(&self, schema_id: SchemaID, table_name: &str) -> bool {
        self.inner.read().exists_table(schema_id, table_name)
    }

    #[inline]
    fn find_table_by_name(&self, schema_id: SchemaID, table_name: &str) -> Option<Table> {
        self.inner.read().find_table_by_name(schema_id, table_name)
    }

    #[inline]
    fn find_table(&self, table_id: TableID) -> Option<Table> {
        self.inner.read().find_table(table_id)
    }

    #[inline]
    fn column_segments(&self, table_id: TableID) -> Vec<ColumnSegmentInfo> {
        self.inner.read().column_segments(table_id)
    }
}
