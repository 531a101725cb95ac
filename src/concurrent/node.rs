//! Maps live node handles to their [`LockWord`]. Kept as a side table rather
//! than a field on each node struct, since the node layouts are shared with
//! the single-threaded tree and this crate doesn't want two copies of
//! every `NodeX` struct just to add one field.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::handle::NodeHandle;

use super::lock::LockWord;

#[derive(Default)]
pub struct LockTable {
    locks: RwLock<HashMap<u64, Arc<LockWord>>>,
}

impl LockTable {
    pub fn new() -> LockTable {
        LockTable::default()
    }

    /// Returns the lock for `handle`, creating a fresh (unlocked, not
    /// deleted) one on first access.
    pub fn get_or_insert(&self, handle: NodeHandle) -> Arc<LockWord> {
        debug_assert!(!handle.is_serialized());
        let key = handle.raw();
        if let Some(lock) = self.locks.read().unwrap().get(&key) {
            return Arc::clone(lock);
        }
        let mut locks = self.locks.write().unwrap();
        Arc::clone(locks.entry(key).or_insert_with(|| Arc::new(LockWord::new())))
    }

    /// Marks `handle`'s lock deleted and drops it from the table. The
    /// `Arc` keeps it alive for any reader still holding a clone until
    /// that reader's guard drops.
    pub fn retire(&self, handle: NodeHandle) {
        debug_assert!(!handle.is_serialized());
        let mut locks = self.locks.write().unwrap();
        if let Some(lock) = locks.remove(&handle.raw()) {
            lock.mark_deleted();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::NType;

    #[test]
    fn same_handle_returns_same_lock() {
        let table = LockTable::new();
        let mut h = NodeHandle::UNSET;
        h.set_ptr(1, 2);
        h.set_type(NType::Leaf);
        let a = table.get_or_insert(h);
        let b = table.get_or_insert(h);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn retire_marks_deleted() {
        let table = LockTable::new();
        let mut h = NodeHandle::UNSET;
        h.set_ptr(1, 2);
        h.set_type(NType::Leaf);
        let lock = table.get_or_insert(h);
        table.retire(h);
        assert!(lock.is_deleted());
    }
}
