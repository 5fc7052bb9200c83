use std::sync::{Arc, RwLock};

use crate::error::DbResult;

/// Shared, lockable ownership of a value. Pages, tables and the global
/// components all travel in this shape.
pub type Pod<T> = Arc<RwLock<T>>;

pub type ResultPod<T> = DbResult<Pod<T>>;

pub fn new_pod<T>(value: T) -> Pod<T> {
    Arc::new(RwLock::new(value))
}
