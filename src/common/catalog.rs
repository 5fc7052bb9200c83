use std::collections::HashMap;

use crate::{
    error::{DbError, DbResult},
    heap::HeapTable,
    storage::Schema,
    types::{Pod, ResultPod},
    utils::HandyRwLock,
};

/// Table registry: table id to heap table. Memory-only; tables are
/// re-registered at startup before recovery runs.
pub struct Catalog {
    map: HashMap<u32, Pod<HeapTable>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn add_table(&mut self, table_pod: Pod<HeapTable>) {
        let id = table_pod.rl().get_id();
        self.map.insert(id, table_pod);
    }

    pub fn get_table(&self, table_id: &u32) -> ResultPod<HeapTable> {
        self.map
            .get(table_id)
            .cloned()
            .ok_or_else(|| DbError::not_found(format!("table {} is not in the catalog", table_id)))
    }

    pub fn get_schema(&self, table_id: &u32) -> DbResult<Schema> {
        let table_pod = self.get_table(table_id)?;
        let schema = table_pod.rl().get_schema().clone();
        Ok(schema)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
