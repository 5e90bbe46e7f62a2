// Catalog
//
// In-memory registry of tables and indexes. Persistence of the catalog
// itself is out of scope; the disk metadata page reserves a root pointer
// for a future on-disk format.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::common::config::HashTableConfig;
use crate::common::types::{IndexOid, Rid, TableOid};
use crate::catalog::schema::Schema;
use crate::index::hash::{DiskExtendibleHashTable, IndexError};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::table::{DataValue, HeapError, TableHeap, Tuple};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Table {0} already exists")]
    TableExists(String),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Index {0} already exists")]
    IndexExists(String),

    #[error("Heap error: {0}")]
    Heap(#[from] HeapError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

pub struct TableInfo {
    pub oid: TableOid,
    pub name: String,
    pub schema: Schema,
    pub heap: Arc<TableHeap>,
}

pub struct IndexInfo {
    pub oid: IndexOid,
    pub name: String,
    pub table_name: String,
    /// Column positions in the table schema forming the key
    pub key_attrs: Vec<usize>,
    pub is_primary: bool,
    pub index: DiskExtendibleHashTable<Vec<DataValue>, Rid>,
}

impl IndexInfo {
    /// Extract this index's key from a full table tuple.
    pub fn key_from_tuple(&self, tuple: &Tuple) -> Vec<DataValue> {
        self.key_attrs
            .iter()
            .map(|&i| tuple.value(i).clone())
            .collect()
    }
}

pub struct Catalog {
    bpm: Arc<BufferPoolManager>,
    tables: HashMap<TableOid, Arc<TableInfo>>,
    table_names: HashMap<String, TableOid>,
    indexes: HashMap<IndexOid, Arc<IndexInfo>>,
    index_names: HashMap<String, IndexOid>,
    table_indexes: HashMap<String, Vec<IndexOid>>,
    next_table_oid: TableOid,
    next_index_oid: IndexOid,
}

impl Catalog {
    pub fn new(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            tables: HashMap::new(),
            table_names: HashMap::new(),
            indexes: HashMap::new(),
            index_names: HashMap::new(),
            table_indexes: HashMap::new(),
            next_table_oid: 0,
            next_index_oid: 0,
        }
    }

    pub fn create_table(
        &mut self,
        name: impl Into<String>,
        schema: Schema,
    ) -> Result<Arc<TableInfo>, CatalogError> {
        let name = name.into();
        if self.table_names.contains_key(&name) {
            return Err(CatalogError::TableExists(name));
        }
        let heap = Arc::new(TableHeap::new(self.bpm.clone())?);
        let oid = self.next_table_oid;
        self.next_table_oid += 1;

        let info = Arc::new(TableInfo {
            oid,
            name: name.clone(),
            schema,
            heap,
        });
        self.tables.insert(oid, info.clone());
        self.table_names.insert(name.clone(), oid);
        self.table_indexes.entry(name).or_default();
        Ok(info)
    }

    pub fn create_index(
        &mut self,
        index_name: impl Into<String>,
        table_name: &str,
        key_attrs: Vec<usize>,
        is_primary: bool,
        config: HashTableConfig,
    ) -> Result<Arc<IndexInfo>, CatalogError> {
        let index_name = index_name.into();
        if self.index_names.contains_key(&index_name) {
            return Err(CatalogError::IndexExists(index_name));
        }
        if !self.table_names.contains_key(table_name) {
            return Err(CatalogError::TableNotFound(table_name.to_string()));
        }

        let index = DiskExtendibleHashTable::new(index_name.clone(), self.bpm.clone(), config)?;
        let oid = self.next_index_oid;
        self.next_index_oid += 1;

        let info = Arc::new(IndexInfo {
            oid,
            name: index_name.clone(),
            table_name: table_name.to_string(),
            key_attrs,
            is_primary,
            index,
        });
        self.indexes.insert(oid, info.clone());
        self.index_names.insert(index_name, oid);
        self.table_indexes
            .entry(table_name.to_string())
            .or_default()
            .push(oid);
        Ok(info)
    }

    pub fn table(&self, oid: TableOid) -> Option<Arc<TableInfo>> {
        self.tables.get(&oid).cloned()
    }

    pub fn table_by_name(&self, name: &str) -> Option<Arc<TableInfo>> {
        let oid = self.table_names.get(name)?;
        self.tables.get(oid).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.table_names.keys().cloned().collect()
    }

    pub fn index(&self, oid: IndexOid) -> Option<Arc<IndexInfo>> {
        self.indexes.get(&oid).cloned()
    }

    pub fn indexes_for_table(&self, table_name: &str) -> Vec<Arc<IndexInfo>> {
        self.table_indexes
            .get(table_name)
            .map(|oids| {
                oids.iter()
                    .filter_map(|oid| self.indexes.get(oid).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The primary-key index of a table, if one was declared.
    pub fn primary_index_for_table(&self, table_name: &str) -> Option<Arc<IndexInfo>> {
        self.indexes_for_table(table_name)
            .into_iter()
            .find(|idx| idx.is_primary)
    }
}
