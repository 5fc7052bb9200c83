use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    thread::sleep,
    time::{Duration, Instant},
};

use log::debug;

use crate::{
    error::{DbError, DbResult},
    heap::HeapPageID,
    transaction::Transaction,
    Database,
};

pub const DEFAULT_S_LOCK_TIMEOUT_MS: u64 = 100;
pub const DEFAULT_X_LOCK_TIMEOUT_MS: u64 = 1000;

// Readers give up quickly; writers out-wait them. The asymmetry is the
// whole deadlock-resolution policy.
static S_LOCK_TIMEOUT_MS: AtomicU64 = AtomicU64::new(DEFAULT_S_LOCK_TIMEOUT_MS);
static X_LOCK_TIMEOUT_MS: AtomicU64 = AtomicU64::new(DEFAULT_X_LOCK_TIMEOUT_MS);

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Lock {
    SLock,
    XLock,
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    pub fn to_lock(&self) -> Lock {
        match self {
            Permission::ReadOnly => Lock::SLock,
            Permission::ReadWrite => Lock::XLock,
        }
    }
}

/// Page-granularity lock table for two-phase locking. A page is either
/// unlocked (no entry), shared by one or more transactions, or held
/// exclusively by exactly one.
pub struct ConcurrentStatus {
    s_lock_map: HashMap<HeapPageID, HashSet<Transaction>>,
    x_lock_map: HashMap<HeapPageID, Transaction>,

    hold_pages: HashMap<Transaction, HashSet<HeapPageID>>,
}

impl ConcurrentStatus {
    pub fn new() -> Self {
        Self {
            s_lock_map: HashMap::new(),
            x_lock_map: HashMap::new(),
            hold_pages: HashMap::new(),
        }
    }

    pub fn set_s_lock_timeout_ms(timeout: u64) {
        S_LOCK_TIMEOUT_MS.store(timeout, Ordering::Relaxed);
    }

    pub fn set_x_lock_timeout_ms(timeout: u64) {
        X_LOCK_TIMEOUT_MS.store(timeout, Ordering::Relaxed);
    }

    /// Request a lock on the given page. Blocking: retries until the
    /// lock is granted or the deadline for this lock kind passes, in
    /// which case the requester gets `TransactionAborted` and is
    /// expected to abort. Timeout is the only deadlock detection.
    pub fn request_lock(tx: &Transaction, lock: &Lock, pid: &HeapPageID) -> DbResult<()> {
        let timeout = match lock {
            Lock::SLock => Duration::from_millis(S_LOCK_TIMEOUT_MS.load(Ordering::Relaxed)),
            Lock::XLock => Duration::from_millis(X_LOCK_TIMEOUT_MS.load(Ordering::Relaxed)),
        };

        let start = Instant::now();
        loop {
            {
                let mut status = Database::mut_concurrent_status();
                if status.add_lock(tx, lock, pid) {
                    return Ok(());
                }
            }

            if start.elapsed() >= timeout {
                debug!(
                    "lock wait timed out: {:?} wants {} on {}, status: {:?}",
                    tx,
                    lock,
                    pid,
                    Database::concurrent_status(),
                );
                return Err(DbError::TransactionAborted);
            }

            sleep(Duration::from_millis(10));
        }
    }

    /// Try to grant the lock. Idempotent: re-requesting a lock already
    /// held (or a weaker one) succeeds immediately. Returns false when
    /// the request conflicts with another holder.
    fn add_lock(&mut self, tx: &Transaction, lock: &Lock, pid: &HeapPageID) -> bool {
        if let Some(holder) = self.x_lock_map.get(pid) {
            if holder != tx {
                return false;
            }
            // already exclusive; any request is satisfied
            self.record_hold(tx, pid);
            return true;
        }

        match lock {
            Lock::SLock => {
                self.s_lock_map.entry(*pid).or_default().insert(*tx);
            }
            Lock::XLock => {
                if let Some(holders) = self.s_lock_map.get(pid) {
                    if holders.iter().any(|holder| holder != tx) {
                        return false;
                    }
                    // sole shared holder: upgrade in place
                    self.s_lock_map.remove(pid);
                }
                self.x_lock_map.insert(*pid, *tx);
            }
        }

        self.record_hold(tx, pid);
        true
    }

    fn record_hold(&mut self, tx: &Transaction, pid: &HeapPageID) {
        self.hold_pages.entry(*tx).or_default().insert(*pid);
    }

    /// True iff `tx` is in the shared holder set or is the exclusive
    /// holder.
    pub fn holds_lock(&self, tx: &Transaction, pid: &HeapPageID) -> bool {
        if self.x_lock_map.get(pid) == Some(tx) {
            return true;
        }
        self.s_lock_map
            .get(pid)
            .map_or(false, |holders| holders.contains(tx))
    }

    /// Release one lock. An emptied shared holder set means the page is
    /// unlocked, so the entry is dropped.
    pub fn release_lock(&mut self, tx: &Transaction, pid: &HeapPageID) {
        if let Some(holders) = self.s_lock_map.get_mut(pid) {
            holders.remove(tx);
            if holders.is_empty() {
                self.s_lock_map.remove(pid);
            }
        }

        if self.x_lock_map.get(pid) == Some(tx) {
            self.x_lock_map.remove(pid);
        }

        if let Some(pages) = self.hold_pages.get_mut(tx) {
            pages.remove(pid);
            if pages.is_empty() {
                self.hold_pages.remove(tx);
            }
        }
    }

    /// Release every lock held by `tx`; the second phase of 2PL, called
    /// exactly once at transaction completion.
    pub fn release_locks(&mut self, tx: &Transaction) {
        let pages = match self.hold_pages.remove(tx) {
            Some(pages) => pages,
            None => return,
        };

        for pid in pages {
            if let Some(holders) = self.s_lock_map.get_mut(&pid) {
                holders.remove(tx);
                if holders.is_empty() {
                    self.s_lock_map.remove(&pid);
                }
            }
            if self.x_lock_map.get(&pid) == Some(tx) {
                self.x_lock_map.remove(&pid);
            }
        }
    }
}

impl Default for ConcurrentStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConcurrentStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut depiction = "\n".to_string();

        depiction.push_str("s_lock_map: {");
        for (pid, holders) in self.s_lock_map.iter() {
            depiction.push_str(&format!("\n\t{:?} -> {:?},", pid, holders));
        }
        depiction.push_str("\n}\n");

        depiction.push_str("x_lock_map: {");
        for (pid, holder) in self.x_lock_map.iter() {
            depiction.push_str(&format!("\n\t{:?} -> {:?},", pid, holder));
        }
        depiction.push_str("\n}\n");

        depiction.push_str("hold_pages: {");
        for (tx, pages) in self.hold_pages.iter() {
            depiction.push_str(&format!("\n\t{:?} -> {:?},", tx, pages));
        }
        depiction.push_str("\n}\n");

        write!(f, "{}", depiction)
    }
}
