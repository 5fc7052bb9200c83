use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use log::debug;

use crate::{
    error::{DbError, DbResult},
    heap::{page::HeapPage, page_id::HeapPageID},
    storage::Tuple,
    transaction::{ConcurrentStatus, LogManager, Permission, Transaction},
    types::{new_pod, Pod, ResultPod},
    utils::HandyRwLock,
    Database,
};

pub const DEFAULT_PAGE_SIZE: usize = 4096;
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);

/// Default number of resident pages.
pub const DEFAULT_PAGES: usize = 50;
static CAPACITY: AtomicUsize = AtomicUsize::new(DEFAULT_PAGES);

/// Bounded cache of resident pages and gatekeeper for every locked page
/// access. Runs NO STEAL / FORCE: dirty pages of live transactions are
/// never evicted, and a committing transaction's dirty pages are all
/// flushed before its COMMIT record is forced.
pub struct BufferPool {
    buffer: HashMap<HeapPageID, Pod<HeapPage>>,
    capacity: usize,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            buffer: HashMap::new(),
            capacity: Self::get_capacity(),
        }
    }

    // THIS FUNCTION SHOULD ONLY BE USED FOR TESTING
    pub fn set_page_size(page_size: usize) {
        PAGE_SIZE.store(page_size, Ordering::Relaxed);
    }

    // THIS FUNCTION SHOULD ONLY BE USED FOR TESTING
    pub fn reset_page_size() {
        PAGE_SIZE.store(DEFAULT_PAGE_SIZE, Ordering::Relaxed);
    }

    pub fn get_page_size() -> usize {
        PAGE_SIZE.load(Ordering::Relaxed)
    }

    /// Capacity applies to pools constructed afterwards (tests set it
    /// before `Database::reset`).
    pub fn set_capacity(capacity: usize) {
        CAPACITY.store(capacity, Ordering::Relaxed);
    }

    pub fn get_capacity() -> usize {
        CAPACITY.load(Ordering::Relaxed)
    }

    /// Retrieve the specified page with the associated permissions.
    /// Will acquire a lock and may block if that lock is held by another
    /// transaction; blocking happens before the pool itself is touched,
    /// so a waiting transaction never stalls the cache.
    ///
    /// The retrieved page is looked up in the cache; on a miss it is
    /// loaded from the owning table, evicting a clean page first when
    /// the pool is full.
    pub fn get_page(
        tx: &Transaction,
        perm: Permission,
        pid: &HeapPageID,
    ) -> ResultPod<HeapPage> {
        ConcurrentStatus::request_lock(tx, &perm.to_lock(), pid)?;
        Database::mut_buffer_pool().fetch_page(pid)
    }

    fn fetch_page(&mut self, pid: &HeapPageID) -> ResultPod<HeapPage> {
        if let Some(page_pod) = self.buffer.get(pid) {
            return Ok(page_pod.clone());
        }

        while self.buffer.len() >= self.capacity {
            self.evict_page()?;
        }

        let table_pod = Database::catalog().get_table(&pid.table_id)?;
        let page = table_pod.rl().read_page(pid)?;

        let page_pod = new_pod(page);
        self.buffer.insert(*pid, page_pod.clone());
        Ok(page_pod)
    }

    /// NO STEAL: only clean pages are eviction candidates. The victim
    /// choice among them is arbitrary.
    fn evict_page(&mut self) -> DbResult<()> {
        let victim = self
            .buffer
            .iter()
            .find(|(_, page)| page.rl().dirtied_by().is_none())
            .map(|(pid, _)| *pid);

        match victim {
            Some(pid) => {
                debug!("evicting {}", pid);
                self.buffer.remove(&pid);
                Ok(())
            }
            None => Err(DbError::storage("all pages are dirty in the buffer pool")),
        }
    }

    /// Add a tuple on behalf of `tx`: route to the owning table, then
    /// mark the dirtied page and cache it (replacing any stale copy).
    pub fn insert_tuple(tx: &Transaction, table_id: u32, tuple: &Tuple) -> DbResult<()> {
        let table_pod = Database::catalog().get_table(&table_id)?;
        let page_pod = table_pod.rl().insert_tuple(tx, tuple)?;

        Self::cache_dirtied(tx, page_pod);
        Ok(())
    }

    /// Remove the tuple named by its record id; symmetric to
    /// `insert_tuple`.
    pub fn delete_tuple(tx: &Transaction, tuple: &Tuple) -> DbResult<()> {
        let rid = tuple.get_record_id().ok_or_else(|| {
            DbError::not_found("tuple has no record id; it is not stored on any page")
        })?;

        let table_pod = Database::catalog().get_table(&rid.pid.table_id)?;
        let page_pod = table_pod.rl().delete_tuple(tx, tuple)?;

        Self::cache_dirtied(tx, page_pod);
        Ok(())
    }

    fn cache_dirtied(tx: &Transaction, page_pod: Pod<HeapPage>) {
        let pid = {
            let mut page = page_pod.wl();
            page.mark_dirty(Some(tx.get_id()));
            page.get_pid()
        };
        Database::mut_buffer_pool().buffer.insert(pid, page_pod);
    }

    /// Commit or abort `tx`'s page state. On commit every page it
    /// dirtied is flushed (WAL record first, then the page); on abort
    /// each one is dropped and the on-disk version reloaded. Lock
    /// release is the caller's job, and must come after this.
    pub fn tx_complete(
        &mut self,
        tx: &Transaction,
        commit: bool,
        log_manager: &mut LogManager,
    ) -> DbResult<()> {
        let tid = tx.get_id();

        let mut pids: Vec<HeapPageID> = self.buffer.keys().cloned().collect();
        pids.sort();

        for pid in pids {
            let page_pod = match self.buffer.get(&pid) {
                Some(p) => p.clone(),
                None => continue,
            };
            if page_pod.rl().dirtied_by() != Some(tid) {
                continue;
            }

            if commit {
                // current content becomes the before image for the next
                // transaction that touches this page
                page_pod.wl().set_before_image();
                self.flush_page(&pid, log_manager)?;
            } else {
                self.discard_page(&pid);
                let table_pod = Database::catalog().get_table(&pid.table_id)?;
                let page = table_pod.rl().read_page(&pid)?;
                self.buffer.insert(pid, new_pod(page));
            }
        }

        Ok(())
    }

    /// Write one page back to its table. The WAL invariant lives here:
    /// the UPDATE record is appended and the log forced before the page
    /// bytes reach the heap file.
    pub fn flush_page(&mut self, pid: &HeapPageID, log_manager: &mut LogManager) -> DbResult<()> {
        let page_pod = match self.buffer.get(pid) {
            Some(p) => p.clone(),
            None => return Ok(()),
        };

        let tid = match page_pod.rl().dirtied_by() {
            Some(tid) => tid,
            None => return Ok(()),
        };

        {
            let page = page_pod.rl();
            log_manager.log_update(tid, &page)?;
            log_manager.force()?;

            let table_pod = Database::catalog().get_table(&pid.table_id)?;
            table_pod.rl().write_page(&page)?;
        }

        page_pod.wl().mark_dirty(None);
        Ok(())
    }

    /// Flush every cached page.
    ///
    /// NB: this writes dirty pages of live transactions to disk, which
    /// only the checkpoint path is allowed to do.
    pub fn flush_all_pages(&mut self, log_manager: &mut LogManager) -> DbResult<()> {
        let pids: Vec<HeapPageID> = self.buffer.keys().cloned().collect();
        for pid in pids {
            self.flush_page(&pid, log_manager)?;
        }
        Ok(())
    }

    /// Drop a page from the cache without writing it. Needed by
    /// rollback and recovery so a restored page is not shadowed by a
    /// stale cached copy.
    pub fn discard_page(&mut self, pid: &HeapPageID) {
        self.buffer.remove(pid);
    }

    /// Recovery-path insert: place a reconstructed page image directly
    /// in the cache, bypassing locking and the capacity check.
    pub fn install_page(&mut self, page: HeapPage) {
        self.buffer.insert(page.get_pid(), new_pod(page));
    }

    pub fn get_cached(&self, pid: &HeapPageID) -> Option<Pod<HeapPage>> {
        self.buffer.get(pid).cloned()
    }

    pub fn cached_count(&self) -> usize {
        self.buffer.len()
    }

    /// Release only the lock `tx` holds on `pid`, leaving the cached
    /// page alone. Risky: dropping a lock mid-transaction breaks 2PL,
    /// so this is reserved for internal cleanup.
    pub fn release_page(tx: &Transaction, pid: &HeapPageID) {
        Database::mut_concurrent_status().release_lock(tx, pid);
    }

    pub fn holds_lock(tx: &Transaction, pid: &HeapPageID) -> bool {
        Database::concurrent_status().holds_lock(tx, pid)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}
