mod concurrent_status;
mod log_manager;
mod tx;

pub use concurrent_status::{
    ConcurrentStatus, Lock, Permission, DEFAULT_S_LOCK_TIMEOUT_MS, DEFAULT_X_LOCK_TIMEOUT_MS,
};
pub use log_manager::LogManager;
pub use tx::{Transaction, TransactionID};
