#![allow(dead_code)]

use std::path::PathBuf;

use tiny_db::{
    heap::BufferPool,
    storage::{Cell, Field, Schema, Type},
    transaction::ConcurrentStatus,
    types::{new_pod, Pod},
    utils,
    Database, HeapTable, Transaction, Tuple,
};

/// # Conduct the initialization
///
/// - Set up log output.
/// - Rebuild the database singleton (empty buffer pool, catalog, lock
///   table).
/// - Truncate the write-ahead log.
/// - Restore the default lock timeouts.
pub fn setup() {
    utils::init_log();

    Database::reset();
    Database::mut_log_manager().reset().unwrap();

    ConcurrentStatus::set_s_lock_timeout_ms(tiny_db::transaction::DEFAULT_S_LOCK_TIMEOUT_MS);
    ConcurrentStatus::set_x_lock_timeout_ms(tiny_db::transaction::DEFAULT_X_LOCK_TIMEOUT_MS);
}

/// Rebuild the in-memory state only, leaving every file on disk as it
/// is. This is what a crash looks like to the storage core.
pub fn simulate_crash() {
    Database::reset();
}

pub fn test_path(name: &str) -> PathBuf {
    Database::global().get_path().join(format!("{}.db", name))
}

/// A fresh table of `columns` int fields backed by a new file.
pub fn new_int_table(name: &str, columns: usize) -> Pod<HeapTable> {
    let path = test_path(name);
    let _ = std::fs::remove_file(&path);

    let schema = Schema::small_int(columns);
    let table_pod: Pod<HeapTable> = new_pod(HeapTable::new(&path, &schema).unwrap());
    Database::mut_catalog().add_table(table_pod.clone());
    table_pod
}

pub fn int_string_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", Type::Int64),
        Field::new("name", Type::String),
    ])
}

/// A fresh (id int, name string) table backed by a new file.
pub fn new_int_string_table(name: &str) -> Pod<HeapTable> {
    let path = test_path(name);
    let _ = std::fs::remove_file(&path);

    let table_pod: Pod<HeapTable> = new_pod(HeapTable::new(&path, &int_string_schema()).unwrap());
    Database::mut_catalog().add_table(table_pod.clone());
    table_pod
}

/// Re-open an existing table file after a simulated crash and put it
/// back in the catalog; recovery needs the schema to rebuild pages.
pub fn reopen_table(name: &str, schema: &Schema) -> Pod<HeapTable> {
    let path = test_path(name);

    let table_pod: Pod<HeapTable> = new_pod(HeapTable::new(&path, schema).unwrap());
    Database::mut_catalog().add_table(table_pod.clone());
    table_pod
}

/// Insert an all-`key` int row through the buffer pool.
pub fn insert_row(table: &HeapTable, tx: &Transaction, key: i64) {
    let tuple = Tuple::new_int_tuples(key, table.get_schema().fields_count());
    BufferPool::insert_tuple(tx, table.get_id(), &tuple).unwrap();
}

/// Insert an (id, name) row through the buffer pool.
pub fn insert_id_name(table: &HeapTable, tx: &Transaction, id: i64, name: &str) {
    let tuple = Tuple::new(&[Cell::new_int64(id), Cell::new_string(name)]);
    BufferPool::insert_tuple(tx, table.get_id(), &tuple).unwrap();
}

/// Count the rows whose first cell equals `key`.
pub fn look_for(table: &HeapTable, tx: &Transaction, key: i64) -> usize {
    let mut count = 0;
    let mut iter = table.iter(tx);
    while let Some(tuple) = iter.next().unwrap() {
        if tuple.get_cell(0).get_int64().unwrap() == key {
            count += 1;
        }
    }
    count
}

/// All (id, name) rows of a table, in scan order.
pub fn scan_id_name(table: &HeapTable, tx: &Transaction) -> Vec<(i64, String)> {
    let mut rows = Vec::new();
    let mut iter = table.iter(tx);
    while let Some(tuple) = iter.next().unwrap() {
        rows.push((
            tuple.get_cell(0).get_int64().unwrap(),
            tuple.get_cell(1).get_string().unwrap(),
        ));
    }
    rows
}

/// Run recovery with the guards taken in the required order (buffer
/// pool first, then the log).
pub fn run_recovery() {
    let mut buffer_pool = Database::mut_buffer_pool();
    let mut log_manager = Database::mut_log_manager();
    log_manager.recover(&mut buffer_pool).unwrap();
}

/// Write a checkpoint with the guards taken in the required order.
pub fn run_checkpoint() {
    let mut buffer_pool = Database::mut_buffer_pool();
    let mut log_manager = Database::mut_log_manager();
    log_manager.log_checkpoint(&mut buffer_pool).unwrap();
}

/// Flush every cached page, logging the updates first; used to exercise
/// the WAL path in the middle of a transaction.
pub fn flush_all_pages() {
    let mut buffer_pool = Database::mut_buffer_pool();
    let mut log_manager = Database::mut_log_manager();
    buffer_pool.flush_all_pages(&mut log_manager).unwrap();
}

pub fn wal_path() -> PathBuf {
    Database::global().get_path().join("wal.log")
}
