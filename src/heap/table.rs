use std::{
    collections::hash_map::DefaultHasher,
    fs::{File, OpenOptions},
    hash::{Hash, Hasher},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use log::debug;

use crate::{
    error::{DbError, DbResult},
    heap::{
        buffer_pool::BufferPool,
        page::HeapPage,
        page_id::HeapPageID,
    },
    storage::{Schema, Tuple},
    transaction::{Permission, Transaction},
    types::{Pod, ResultPod},
};

/// A heap file: one table stored as an unordered sequence of fixed-size
/// slotted pages. All page traffic goes through the buffer pool; only
/// `read_page`/`write_page` touch the file itself.
pub struct HeapTable {
    pub name: String,

    file_path: PathBuf,
    table_id: u32,
    schema: Schema,

    file: Mutex<File>,
}

impl HeapTable {
    pub fn new<P: AsRef<Path>>(path: P, schema: &Schema) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        // the table id must survive restarts, since log records refer to
        // it: hash the absolute path with fixed-key SipHash
        let file_path = path.as_ref().canonicalize()?;
        let mut hasher = DefaultHasher::new();
        file_path.hash(&mut hasher);
        let table_id = hasher.finish() as u32;

        let name = path.as_ref().display().to_string();

        Ok(Self {
            name,
            file_path,
            table_id,
            schema: schema.clone(),
            file: Mutex::new(file),
        })
    }

    pub fn get_id(&self) -> u32 {
        self.table_id
    }

    pub fn get_schema(&self) -> &Schema {
        &self.schema
    }

    pub fn get_file_path(&self) -> &Path {
        &self.file_path
    }

    fn get_file(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap()
    }

    /// Number of whole pages in the file. A trailing partial page (which
    /// should never exist) is ignored rather than counted.
    pub fn num_pages(&self) -> DbResult<usize> {
        let len = self.get_file().metadata()?.len();
        Ok((len / BufferPool::get_page_size() as u64) as usize)
    }

    /// Read one page from disk, bypassing the buffer pool.
    pub fn read_page(&self, pid: &HeapPageID) -> DbResult<HeapPage> {
        if pid.table_id != self.table_id {
            return Err(DbError::invalid_argument(format!(
                "{} does not belong to table {}",
                pid, self.table_id
            )));
        }
        if pid.page_index as usize >= self.num_pages()? {
            return Err(DbError::invalid_argument(format!(
                "{} is beyond the end of the file ({} pages)",
                pid,
                self.num_pages()?
            )));
        }

        let page_size = BufferPool::get_page_size();
        let mut buf = vec![0u8; page_size];
        {
            let mut file = self.get_file();
            file.seek(SeekFrom::Start(
                pid.page_index as u64 * page_size as u64,
            ))?;
            file.read_exact(&mut buf)?;
        }

        HeapPage::new(pid, &buf, &self.schema)
    }

    /// Overwrite one page on disk. The write is synced so a crash never
    /// leaves a torn page behind the WAL's back.
    pub fn write_page(&self, page: &HeapPage) -> DbResult<()> {
        self.write_page_to_disk(&page.get_pid(), &page.get_page_data())
    }

    pub fn write_page_to_disk(&self, pid: &HeapPageID, data: &[u8]) -> DbResult<()> {
        let page_size = BufferPool::get_page_size();
        if data.len() != page_size {
            return Err(DbError::invalid_argument(format!(
                "page image has {} bytes, expected {}",
                data.len(),
                page_size
            )));
        }

        let mut file = self.get_file();
        file.seek(SeekFrom::Start(
            pid.page_index as u64 * page_size as u64,
        ))?;
        file.write_all(data)?;
        file.sync_data()?;
        Ok(())
    }

    /// Insert `tuple` into the first page with a free slot, appending a
    /// fresh page when every existing one is full. Returns the dirtied
    /// page; the buffer pool marks and caches it.
    pub fn insert_tuple(&self, tx: &Transaction, tuple: &Tuple) -> ResultPod<HeapPage> {
        tuple.check_schema(&self.schema)?;

        let n = self.num_pages()?;
        for i in 0..n {
            let pid = HeapPageID::new(self.table_id, i as u32);
            let page_pod = BufferPool::get_page(tx, Permission::ReadWrite, &pid)?;

            let has_room = {
                let page = page_pod.read().unwrap();
                page.empty_slots_count() > 0
            };
            if has_room {
                page_pod.write().unwrap().insert_tuple(tuple)?;
                return Ok(page_pod);
            }
        }

        // every page is full: extend the file with an empty page, then go
        // through the buffer pool so the insert happens under the lock
        debug!("table {}: appending page {}", self.table_id, n);
        let pid = HeapPageID::new(self.table_id, n as u32);
        self.write_page_to_disk(&pid, &HeapPage::empty_page_data())?;

        let page_pod = BufferPool::get_page(tx, Permission::ReadWrite, &pid)?;
        page_pod.write().unwrap().insert_tuple(tuple)?;
        Ok(page_pod)
    }

    /// Clear the slot named by the tuple's record id. Returns the
    /// dirtied page.
    pub fn delete_tuple(&self, tx: &Transaction, tuple: &Tuple) -> ResultPod<HeapPage> {
        let rid = tuple.get_record_id().ok_or_else(|| {
            DbError::not_found("tuple has no record id; it is not stored on any page")
        })?;
        if rid.pid.table_id != self.table_id {
            return Err(DbError::invalid_argument(format!(
                "{} does not belong to table {}",
                rid.pid, self.table_id
            )));
        }

        let page_pod = BufferPool::get_page(tx, Permission::ReadWrite, &rid.pid)?;
        page_pod.write().unwrap().delete_tuple(rid.slot)?;
        Ok(page_pod)
    }

    /// A restartable scan over every live tuple, in (page, slot) order.
    pub fn iter(&self, tx: &Transaction) -> HeapTableIterator<'_> {
        HeapTableIterator {
            table: self,
            tx: *tx,
            next_page: 0,
            buffered: Vec::new(),
            cursor: 0,
        }
    }

    /// Number of live tuples; scans the whole table.
    pub fn tuples_count(&self, tx: &Transaction) -> DbResult<usize> {
        let mut count = 0;
        let mut iter = self.iter(tx);
        while iter.next()?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}

/// Cursor over a heap table. Pages are fetched with `ReadOnly`
/// permission one at a time; the page count is re-checked on every page
/// boundary so tuples inserted by the owning transaction onto freshly
/// appended pages are not missed.
pub struct HeapTableIterator<'t> {
    table: &'t HeapTable,
    tx: Transaction,

    next_page: u32,
    buffered: Vec<Tuple>,
    cursor: usize,
}

impl HeapTableIterator<'_> {
    pub fn next(&mut self) -> DbResult<Option<Tuple>> {
        loop {
            if self.cursor < self.buffered.len() {
                let tuple = self.buffered[self.cursor].clone();
                self.cursor += 1;
                return Ok(Some(tuple));
            }

            if (self.next_page as usize) >= self.table.num_pages()? {
                return Ok(None);
            }

            let pid = HeapPageID::new(self.table.get_id(), self.next_page);
            let page_pod: Pod<HeapPage> =
                BufferPool::get_page(&self.tx, Permission::ReadOnly, &pid)?;

            self.buffered = page_pod.read().unwrap().iter().collect();
            self.cursor = 0;
            self.next_page += 1;
        }
    }

    /// Restart the scan from the first page.
    pub fn rewind(&mut self) {
        self.next_page = 0;
        self.buffered.clear();
        self.cursor = 0;
    }
}
