use std::{
    mem,
    path::PathBuf,
    sync::{Once, RwLockReadGuard, RwLockWriteGuard},
};

use log::error;

use super::Catalog;
use crate::{
    heap::buffer_pool::BufferPool,
    transaction::{ConcurrentStatus, LogManager},
    types::{new_pod, Pod},
    utils::HandyRwLock,
};

/// We collect all global variables here.
///
/// These variables cannot be initialized as static items, because their
/// initialization relies on non-const functions (e.g. `HashMap::new`).
/// They live behind a lazily created singleton so every component sees
/// the same buffer pool, catalog, lock table and log.
pub struct Database {
    path: PathBuf,

    buffer_pool: Pod<BufferPool>,
    catalog: Pod<Catalog>,
    concurrent_status: Pod<ConcurrentStatus>,
    log_manager: Pod<LogManager>,
}

static mut SINGLETON: *mut Database = 0 as *mut Database;

impl Database {
    fn new() -> Self {
        let db_name = "default_db";
        let db_path = PathBuf::from("data").join(db_name);
        if !db_path.exists() {
            std::fs::create_dir_all(&db_path).unwrap();
        }

        let log_path = db_path.join("wal.log");
        let log_manager = LogManager::new(&log_path).unwrap();

        Self {
            path: db_path,

            buffer_pool: new_pod(BufferPool::new()),
            catalog: new_pod(Catalog::new()),
            concurrent_status: new_pod(ConcurrentStatus::new()),
            log_manager: new_pod(log_manager),
        }
    }

    /// Rebuild the in-memory state of the database; used by tests and
    /// to simulate a crash. The log file itself is left untouched.
    ///
    /// Actions:
    /// - Buffer pool, catalog and lock table are recreated empty.
    /// - The log manager is reopened on the existing log file.
    /// - The page size goes back to the default.
    pub fn reset() {
        BufferPool::reset_page_size();

        // drop the singleton if it's already initialized
        unsafe {
            if !SINGLETON.is_null() {
                mem::drop(Box::from_raw(SINGLETON));
            }
        }

        let singleton = Self::new();

        unsafe {
            // put it in the heap so it can outlive this call
            SINGLETON = mem::transmute(Box::new(singleton));
        }
    }

    /// Write a final checkpoint and stop. I/O failures here are logged
    /// and swallowed; the next startup recovers from whatever made it
    /// to disk.
    pub fn shutdown() {
        let mut buffer_pool = Self::mut_buffer_pool();
        let mut log_manager = Self::mut_log_manager();

        if let Err(e) = log_manager.log_checkpoint(&mut buffer_pool) {
            error!("checkpoint on shutdown failed: {}", e);
        }
    }

    pub fn buffer_pool() -> RwLockReadGuard<'static, BufferPool> {
        Self::global().buffer_pool.rl()
    }

    pub fn mut_buffer_pool() -> RwLockWriteGuard<'static, BufferPool> {
        Self::global().buffer_pool.wl()
    }

    pub fn catalog() -> RwLockReadGuard<'static, Catalog> {
        Self::global().catalog.rl()
    }

    pub fn mut_catalog() -> RwLockWriteGuard<'static, Catalog> {
        Self::global().catalog.wl()
    }

    pub fn concurrent_status() -> RwLockReadGuard<'static, ConcurrentStatus> {
        Self::global().concurrent_status.rl()
    }

    pub fn mut_concurrent_status() -> RwLockWriteGuard<'static, ConcurrentStatus> {
        Self::global().concurrent_status.wl()
    }

    pub fn log_manager() -> RwLockReadGuard<'static, LogManager> {
        Self::global().log_manager.rl()
    }

    pub fn mut_log_manager() -> RwLockWriteGuard<'static, LogManager> {
        Self::global().log_manager.wl()
    }

    pub fn global() -> &'static Self {
        static ONCE: Once = Once::new();

        ONCE.call_once(|| {
            let singleton = Self::new();

            unsafe {
                // put it in the heap so it can outlive this call
                SINGLETON = mem::transmute(Box::new(singleton));
            }
        });

        unsafe { SINGLETON.as_ref().unwrap() }
    }

    pub fn get_path(&self) -> PathBuf {
        self.path.clone()
    }
}
