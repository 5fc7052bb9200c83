use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{error::DbResult, Database};

pub type TransactionID = u64;

static TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// A lightweight transaction handle; the id is the identity. The handle
/// stays on one thread, so it is freely `Copy`.
#[derive(Eq, Hash, PartialEq, Clone, Copy)]
pub struct Transaction {
    // increase monotonically by 1
    uuid: TransactionID,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            uuid: TRANSACTION_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn new_specific_id(id: TransactionID) -> Self {
        Self { uuid: id }
    }

    pub fn get_id(&self) -> TransactionID {
        self.uuid
    }

    /// Write the BEGIN record. Every transaction must start before its
    /// first page access so rollback knows where to stop.
    pub fn start(&self) -> DbResult<()> {
        Database::mut_log_manager().log_begin(self)
    }

    pub fn commit(&self) -> DbResult<()> {
        self.complete(true)
    }

    pub fn abort(&self) -> DbResult<()> {
        self.complete(false)
    }

    /// The single exit point. Acquisition order is buffer pool, then
    /// log; rollback and flushing both touch the two, and taking them
    /// in the other order can deadlock against the flush path.
    fn complete(&self, commit: bool) -> DbResult<()> {
        {
            let mut buffer_pool = Database::mut_buffer_pool();
            let mut log_manager = Database::mut_log_manager();

            if !commit {
                // writes the ABORT record and restores before images
                log_manager.log_abort(self, &mut buffer_pool)?;
            }

            buffer_pool.tx_complete(self, commit, &mut log_manager)?;

            if commit {
                log_manager.log_commit(self)?;
            }
        }

        Database::mut_concurrent_status().release_locks(self);
        Ok(())
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tx_{}", self.uuid)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
