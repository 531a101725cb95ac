//! The concurrent ART: lock-coupling traversal over the same node family as
//! [`crate::art::Art`], synchronized by a [`LockTable`] of per-node
//! [`LockWord`]s plus a short-held mutex around the underlying slab storage.
//!
//! Rust's aliasing rules need a real synchronization primitive guarding
//! `AllocatorSet` itself — the reference implementation relies on the
//! per-node lock word alone as an implicit fence around slab access, which
//! has no safe Rust equivalent without `unsafe impl Sync`. This crate wraps
//! the slab set in a `Mutex`: readers take it only for the duration of a
//! single node's dispatch and release it before recursing, so a reader
//! never holds it across the crab-latch handoff to a child; a writer holds
//! it for its whole traversal since mutation already requires `&mut
//! AllocatorSet`. The `LockWord`s remain the protocol callers actually
//! observe (coupling, retry-on-delete, upgrade/downgrade).

use std::sync::{Arc, Mutex};

use log::{trace, warn};

use crate::alloc::{new_allocator_set, AllocatorSet};
use crate::config::ArtConfig;
use crate::error::ArtResult;
use crate::handle::{NType, NodeHandle};
use crate::key::ArtKey;
use crate::node::leaf::Leaf;

use super::lock::{LockWord, ReadGuard, WriteGuard};
use super::node::LockTable;

pub struct ConcurrentArt {
    root: Mutex<NodeHandle>,
    allocators: Arc<Mutex<AllocatorSet>>,
    locks: LockTable,
    #[allow(dead_code)]
    config: ArtConfig,
}

impl ConcurrentArt {
    pub fn new() -> ConcurrentArt {
        ConcurrentArt::with_config(ArtConfig::default())
    }

    pub fn with_config(config: ArtConfig) -> ConcurrentArt {
        ConcurrentArt {
            root: Mutex::new(NodeHandle::UNSET),
            allocators: Arc::new(Mutex::new(new_allocator_set())),
            locks: LockTable::new(),
            config,
        }
    }

    fn lock_for(&self, handle: NodeHandle) -> Arc<LockWord> {
        self.locks.get_or_insert(handle)
    }

    pub fn put(&self, key: &ArtKey, doc: u64) -> ArtResult<()> {
        let mut root = self.root.lock().unwrap();
        let mut allocators = self.allocators.lock().unwrap();
        self.insert(&mut allocators, &mut root, key, 0, doc)
    }

    /// Lock-coupling read. Retries the whole traversal if it observes a
    /// deleted node mid-walk (the reuse hazard flagged in §9 of the
    /// design notes).
    pub fn get(&self, key: &ArtKey) -> Vec<u64> {
        loop {
            let mut result = Vec::new();
            if self.try_lookup(key, &mut result) {
                return result;
            }
            warn!("get: retrying traversal after observing a deleted node");
        }
    }

    /// Returns `false` on a retry signal (deleted node observed).
    fn try_lookup(&self, key: &ArtKey, result: &mut Vec<u64>) -> bool {
        let root = *self.root.lock().unwrap();
        if !root.is_set() {
            return true;
        }
        let lock = self.lock_for(root);
        let guard = match ReadGuard::acquire(&lock) {
            Some(g) => g,
            None => return false,
        };
        self.lookup_locked(root, guard, key, 0, result)
    }

    fn lookup_locked(
        &self,
        node: NodeHandle,
        guard: ReadGuard<'_>,
        key: &ArtKey,
        depth: usize,
        result: &mut Vec<u64>,
    ) -> bool {
        let allocators = self.allocators.lock().unwrap();
        match node.get_type().expect("set handle has a type") {
            NType::LeafInlined | NType::Leaf => {
                if depth == key.len() {
                    Leaf::get_doc_ids(&allocators, node, result, usize::MAX);
                }
                drop(guard);
                true
            }
            NType::Node4 | NType::Node16 | NType::Node48 | NType::Node256 => {
                if depth >= key.len() {
                    drop(guard);
                    return true;
                }
                let child = crate::node::get_child(&allocators, node, key.byte_at(depth));
                drop(allocators);
                match child {
                    Some(child) => {
                        let child_lock = self.lock_for(child);
                        let child_guard = match ReadGuard::acquire(&child_lock) {
                            Some(g) => g,
                            None => {
                                drop(guard);
                                return false;
                            }
                        };
                        // Crab-latch: child is already locked before the
                        // parent guard drops here.
                        drop(guard);
                        self.lookup_locked(child, child_guard, key, depth + 1, result)
                    }
                    None => {
                        drop(guard);
                        true
                    }
                }
            }
            NType::Prefix => {
                let bytes = crate::node::prefix::Prefix::get(&allocators, node).bytes().to_vec();
                let next = crate::node::prefix::Prefix::get(&allocators, node).next;
                drop(allocators);
                let matches = depth + bytes.len() <= key.len()
                    && bytes.iter().enumerate().all(|(i, &b)| b == key.byte_at(depth + i));
                if !matches {
                    drop(guard);
                    return true;
                }
                let next_lock = self.lock_for(next);
                let next_guard = match ReadGuard::acquire(&next_lock) {
                    Some(g) => g,
                    None => {
                        drop(guard);
                        return false;
                    }
                };
                drop(guard);
                self.lookup_locked(next, next_guard, key, depth + bytes.len(), result)
            }
        }
    }

    /// Writer protocol: holds the mutated node's exclusive lock for the
    /// duration of its own step; descends by acquiring the child's lock
    /// before releasing the parent's when no restructuring of the parent is
    /// needed, and retains the parent's lock across a split/grow.
    fn insert(
        &self,
        allocators: &mut AllocatorSet,
        node: &mut NodeHandle,
        key: &ArtKey,
        depth: usize,
        doc: u64,
    ) -> ArtResult<()> {
        if !node.is_set() {
            trace!("concurrent insert: creating fresh subtree at depth {depth}");
            return crate::art::new_subtree(allocators, node, key, depth, doc);
        }

        let lock = self.lock_for(*node);
        let _guard = WriteGuard::acquire(&lock);

        match node.get_type().expect("set handle has a type") {
            NType::LeafInlined | NType::Leaf => {
                Leaf::insert(allocators, node, doc)?;
                Ok(())
            }
            NType::Node4 | NType::Node16 | NType::Node48 | NType::Node256 => {
                let byte = key.byte_at(depth);
                if let Some(mut child) = crate::node::get_child(allocators, *node, byte) {
                    self.insert(allocators, &mut child, key, depth + 1, doc)?;
                    crate::node::insert_child_overwrite(allocators, node, byte, child);
                } else {
                    let mut child = NodeHandle::UNSET;
                    crate::art::new_subtree(allocators, &mut child, key, depth + 1, doc)?;
                    crate::node::insert_child(allocators, node, byte, child);
                }
                Ok(())
            }
            NType::Prefix => {
                let bytes = crate::node::prefix::Prefix::get(allocators, *node).bytes().to_vec();
                let mut i = 0;
                while i < bytes.len() && depth + i < key.len() && bytes[i] == key.byte_at(depth + i) {
                    i += 1;
                }
                if i == bytes.len() {
                    let mut next = crate::node::prefix::Prefix::get(allocators, *node).next;
                    self.insert(allocators, &mut next, key, depth + i, doc)?;
                    crate::node::prefix::Prefix::get_mut(allocators, *node).next = next;
                    Ok(())
                } else {
                    let d = depth + i;
                    let mut cur = *node;
                    let (mismatch_byte, remainder) =
                        crate::node::prefix::Prefix::split(allocators, &mut cur, i)?;
                    let mut branch = crate::node::node4::Node4::new(allocators)?;
                    crate::node::insert_child(allocators, &mut branch, mismatch_byte, remainder);
                    let mut new_child = NodeHandle::UNSET;
                    crate::art::new_subtree(allocators, &mut new_child, key, d + 1, doc)?;
                    crate::node::insert_child(allocators, &mut branch, key.byte_at(d), new_child);
                    if cur.is_set() {
                        crate::node::prefix::Prefix::get_mut(allocators, cur).next = branch;
                        *node = cur;
                    } else {
                        *node = branch;
                    }
                    Ok(())
                }
            }
        }
    }
}

impl Default for ConcurrentArt {
    fn default() -> Self {
        ConcurrentArt::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::art_key;

    #[test]
    fn put_then_get_round_trips() {
        let art = ConcurrentArt::new();
        let key = art_key(&10i64);
        art.put(&key, 123).unwrap();
        assert_eq!(art.get(&key), vec![123]);
    }

    #[test]
    fn missing_key_returns_empty() {
        let art = ConcurrentArt::new();
        assert!(art.get(&art_key(&1i64)).is_empty());
    }

    #[test]
    fn concurrent_reader_observes_late_writer() {
        use std::sync::Arc as StdArc;
        use std::thread;
        use std::time::Duration;

        let art = StdArc::new(ConcurrentArt::new());
        let key = art_key(&10i64);

        let writer = {
            let art = StdArc::clone(&art);
            let key = key.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(1));
                art.put(&key, 1).unwrap();
            })
        };

        let found = loop {
            let result = art.get(&key);
            if !result.is_empty() {
                break result;
            }
        };
        writer.join().unwrap();
        assert_eq!(found, vec![1]);
    }
}
