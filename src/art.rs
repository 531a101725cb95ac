//! The single-threaded ART: root handle plus the slab set backing every
//! node type reachable from it.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::trace;

use crate::alloc::{new_allocator_set, AllocatorSet};
use crate::config::ArtConfig;
use crate::error::{ArtError, ArtResult};
use crate::handle::{NType, NodeHandle};
use crate::key::ArtKey;
use crate::metadata::{descriptors, Metadata, RootPointer};
use crate::node::leaf::{Leaf, LeafRemoveOutcome};
use crate::node::node4::Node4;
use crate::node::prefix::Prefix;

/// A key→doc-id multimap backed by an adaptive radix tree.
///
/// `allocators` is reference-counted rather than owned outright so that
/// [`crate::concurrent::merge`] can temporarily share the same slab pool
/// while folding this tree's nodes into a [`crate::concurrent::ConcurrentArt`]
/// without an intermediate deep copy. `owns_data` records whether this
/// instance is the one responsible for that pool's lifetime.
pub struct Art {
    root: NodeHandle,
    allocators: Rc<RefCell<AllocatorSet>>,
    owns_data: bool,
    config: ArtConfig,
}

impl Art {
    pub fn new() -> Art {
        Art::with_config(ArtConfig::default())
    }

    pub fn with_config(config: ArtConfig) -> Art {
        Art {
            root: NodeHandle::UNSET,
            allocators: Rc::new(RefCell::new(new_allocator_set())),
            owns_data: true,
            config,
        }
    }

    /// Builds an `Art` that keeps its metadata sidecar (root pointer +
    /// allocator descriptors) up to date at `path` every time
    /// [`Art::serialize`] or [`Art::fast_serialize`] runs.
    pub fn with_metadata_path(path: impl Into<PathBuf>) -> Art {
        let mut config = ArtConfig::default();
        config.metadata_path = Some(path.into());
        Art::with_config(config)
    }

    /// Builds an `Art` over an allocator pool owned by someone else (used
    /// internally while merging into a concurrent tree). The returned
    /// instance will not free `allocators` on drop.
    pub(crate) fn borrowing(
        root: NodeHandle,
        allocators: Rc<RefCell<AllocatorSet>>,
        config: ArtConfig,
    ) -> Art {
        Art {
            root,
            allocators,
            owns_data: false,
            config,
        }
    }

    pub fn root(&self) -> NodeHandle {
        self.root
    }

    /// Overwrites the root handle directly. Used by
    /// [`crate::concurrent::merge`] to clear this tree's root once its
    /// nodes have been adopted elsewhere, so `Drop` doesn't free them twice.
    pub(crate) fn set_root(&mut self, root: NodeHandle) {
        self.root = root;
    }

    pub fn allocators(&self) -> &Rc<RefCell<AllocatorSet>> {
        &self.allocators
    }

    pub fn config(&self) -> &ArtConfig {
        &self.config
    }

    pub fn put(&mut self, key: &ArtKey, doc: u64) -> ArtResult<()> {
        let mut allocators = self.allocators.borrow_mut();
        insert(&mut allocators, &mut self.root, key, 0, doc)
    }

    /// Returns every doc id associated with `key`, or an empty vector if the
    /// key was never inserted.
    pub fn get(&self, key: &ArtKey) -> Vec<u64> {
        let allocators = self.allocators.borrow();
        let mut result = Vec::new();
        lookup(&allocators, self.root, key, 0, &mut result, usize::MAX);
        result
    }

    /// Removes a single occurrence of `(key, doc)`. Returns `true` if it was
    /// found and removed.
    pub fn remove(&mut self, key: &ArtKey, doc: u64) -> bool {
        let mut allocators = self.allocators.borrow_mut();
        remove(&mut allocators, &mut self.root, key, 0, doc)
    }

    /// Writes the whole tree out through `serializer`, post-order, and
    /// leaves `self.root` as a serialized handle pointing at the written
    /// record. If `self.config().metadata_path` is set, also (re)writes the
    /// metadata sidecar with the resulting root pointer and the current
    /// allocator descriptors. The tree is consumed by this call: further
    /// `get`/`put` calls would dispatch on stale, already-freed slab slots,
    /// so callers should drop this `Art` and reopen the written data with
    /// [`Art::deserialize_root`] or [`Art::deserialize`] instead.
    pub fn serialize<D: crate::serialize::BlockDevice>(
        &mut self,
        serializer: &mut crate::serialize::Serializer<'_, D>,
    ) -> ArtResult<crate::handle::BlockPointer> {
        let bp = {
            let mut allocators = self.allocators.borrow_mut();
            serializer.serialize_node(&mut allocators, &mut self.root)?
        };
        self.write_metadata(RootPointer::Block {
            block_id: bp.block_id,
            offset: bp.offset,
        })?;
        Ok(bp)
    }

    /// Reconstructs an `Art` from a block pointer previously returned by
    /// [`Art::serialize`], reading through `deserializer`.
    pub fn deserialize_root<D: crate::serialize::BlockDevice>(
        deserializer: &crate::serialize::Deserializer<'_, D>,
        bp: crate::handle::BlockPointer,
        config: ArtConfig,
    ) -> ArtResult<Art> {
        let mut allocators = new_allocator_set();
        let root = deserializer.deserialize_subtree(&mut allocators, bp)?;
        Ok(Art {
            root,
            allocators: Rc::new(RefCell::new(allocators)),
            owns_data: true,
            config,
        })
    }

    /// Reopens an `Art` previously written by [`Art::serialize`], reading
    /// the root pointer back out of the metadata file at `metadata_path`
    /// instead of requiring the caller to have kept it around separately.
    pub fn deserialize<D: crate::serialize::BlockDevice>(
        deserializer: &crate::serialize::Deserializer<'_, D>,
        metadata_path: impl Into<PathBuf>,
    ) -> ArtResult<Art> {
        let metadata_path = metadata_path.into();
        let metadata = read_metadata(&metadata_path)?;
        let bp = match metadata.root {
            RootPointer::Block { block_id, offset } => crate::handle::BlockPointer { block_id, offset },
            RootPointer::Buffers { .. } => {
                return Err(ArtError::Corrupt(
                    "metadata file was written by Art::fast_serialize, not Art::serialize".into(),
                ))
            }
        };
        let mut config = ArtConfig::default();
        config.metadata_path = Some(metadata_path);
        Art::deserialize_root(deserializer, bp, config)
    }

    /// Bulk-dumps every slab allocator's raw buffers to `device`, skipping
    /// the per-node record walk [`Art::serialize`] does. Cheaper for large
    /// trees headed for a full reload, at the cost of the index file no
    /// longer being a portable record stream: the dump's handles are only
    /// valid against a `device`/metadata pair reloaded together via
    /// [`Art::fast_deserialize`]. Requires `self.config().metadata_path` to
    /// be set, since the root handle has nowhere else to live.
    pub fn fast_serialize<D: crate::serialize::BlockDevice>(&self, device: &D) -> ArtResult<()> {
        if self.config.metadata_path.is_none() {
            return Err(ArtError::Corrupt(
                "fast_serialize requires a metadata_path to record the root handle".into(),
            ));
        }
        let allocators = self.allocators.borrow();
        let mut buf = Vec::new();
        buf.extend_from_slice(&(allocators.len() as u32).to_le_bytes());
        for slab in allocators.iter() {
            slab.serialize_buffers(&mut buf)?;
        }
        device.write_at(0, &buf)?;
        drop(allocators);
        self.write_metadata(RootPointer::Buffers {
            handle: self.root.raw(),
        })
    }

    /// Reconstructs an `Art` from a dump written by [`Art::fast_serialize`].
    pub fn fast_deserialize<D: crate::serialize::BlockDevice>(
        device: &D,
        metadata_path: impl Into<PathBuf>,
    ) -> ArtResult<Art> {
        let metadata_path = metadata_path.into();
        let metadata = read_metadata(&metadata_path)?;
        let root_raw = match metadata.root {
            RootPointer::Buffers { handle } => handle,
            RootPointer::Block { .. } => {
                return Err(ArtError::Corrupt(
                    "metadata file was written by Art::serialize, not Art::fast_serialize".into(),
                ))
            }
        };

        let mut cursor = crate::serialize::DeviceCursor::new(device);
        let mut count_buf = [0u8; 4];
        std::io::Read::read_exact(&mut cursor, &mut count_buf)?;
        let count = u32::from_le_bytes(count_buf) as usize;
        let mut allocators = Vec::with_capacity(count);
        for _ in 0..count {
            allocators.push(crate::alloc::slab::SlabAllocator::deserialize_buffers(
                &mut cursor,
            )?);
        }

        let mut config = ArtConfig::default();
        config.metadata_path = Some(metadata_path);
        Ok(Art {
            root: NodeHandle::from_raw(root_raw),
            allocators: Rc::new(RefCell::new(allocators)),
            owns_data: true,
            config,
        })
    }

    /// Writes `root` plus the current allocator descriptors to
    /// `self.config().metadata_path`, if one is set. A no-op otherwise.
    fn write_metadata(&self, root: RootPointer) -> ArtResult<()> {
        let Some(path) = self.config.metadata_path.clone() else {
            return Ok(());
        };
        let allocators = self.allocators.borrow();
        let metadata = Metadata {
            root,
            allocators: descriptors(&allocators),
        };
        let file = std::fs::File::create(path)?;
        serde_json::to_writer(file, &metadata)?;
        Ok(())
    }
}

fn read_metadata(path: &Path) -> ArtResult<Metadata> {
    let file = std::fs::File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}

impl Default for Art {
    fn default() -> Self {
        Art::new()
    }
}

impl Drop for Art {
    fn drop(&mut self) {
        if !self.owns_data {
            return;
        }
        if let Ok(mut allocators) = self.allocators.try_borrow_mut() {
            crate::node::free_node(&mut allocators, &mut self.root);
        }
    }
}

/// `insert(node, key, depth, doc)` per the four-branch contract: create a
/// fresh subtree, insert into a leaf, descend through an inner node (growing
/// siblings or synthesizing a new child as needed), or split a prefix chain
/// at the first mismatching byte.
pub(crate) fn insert(
    allocators: &mut AllocatorSet,
    node: &mut NodeHandle,
    key: &ArtKey,
    depth: usize,
    doc: u64,
) -> ArtResult<()> {
    if !node.is_set() {
        trace!("insert: creating fresh subtree at depth {depth}");
        return new_subtree(allocators, node, key, depth, doc);
    }

    match node.get_type().expect("set handle has a type") {
        NType::LeafInlined | NType::Leaf => {
            Leaf::insert(allocators, node, doc)?;
            Ok(())
        }
        NType::Node4 | NType::Node16 | NType::Node48 | NType::Node256 => {
            let byte = key.byte_at(depth);
            if let Some(mut child) = crate::node::get_child(allocators, *node, byte) {
                insert(allocators, &mut child, key, depth + 1, doc)?;
                crate::node::insert_child_overwrite(allocators, node, byte, child);
                Ok(())
            } else {
                let mut child = NodeHandle::UNSET;
                new_subtree(allocators, &mut child, key, depth + 1, doc)?;
                crate::node::insert_child(allocators, node, byte, child);
                Ok(())
            }
        }
        // Processed one prefix node at a time (never the whole chain at
        // once): on a full match against this node's bytes, the recursive
        // call on `.next` writes any handle change (promotion, grow) back
        // into this node before returning, which a multi-node chain walk
        // would lose.
        NType::Prefix => {
            let bytes = Prefix::get(allocators, *node).bytes().to_vec();
            let mut i = 0;
            while i < bytes.len() && depth + i < key.len() && bytes[i] == key.byte_at(depth + i) {
                i += 1;
            }

            if i == bytes.len() {
                let mut next = Prefix::get(allocators, *node).next;
                insert(allocators, &mut next, key, depth + i, doc)?;
                Prefix::get_mut(allocators, *node).next = next;
                Ok(())
            } else {
                let d = depth + i;
                trace!("insert: splitting prefix chain at depth {d} pos {i}");
                let mut cur = *node;
                let (mismatch_byte, remainder) = Prefix::split(allocators, &mut cur, i)?;
                let mut branch = crate::node::node4::Node4::new(allocators)?;

                crate::node::insert_child(allocators, &mut branch, mismatch_byte, remainder);

                let mut new_child = NodeHandle::UNSET;
                new_subtree(allocators, &mut new_child, key, d + 1, doc)?;
                crate::node::insert_child(allocators, &mut branch, key.byte_at(d), new_child);

                if cur.is_set() {
                    // `cur` is the truncated prefix head; `split` already
                    // reset its `next` to unset, so it becomes the branch's
                    // sole predecessor.
                    Prefix::get_mut(allocators, cur).next = branch;
                    *node = cur;
                } else {
                    *node = branch;
                }
                Ok(())
            }
        }
    }
}

/// Builds `[optional prefix] -> inlined leaf` for `key[depth..]` and writes
/// it into `*node`.
pub(crate) fn new_subtree(
    allocators: &mut AllocatorSet,
    node: &mut NodeHandle,
    key: &ArtKey,
    depth: usize,
    doc: u64,
) -> ArtResult<()> {
    let remaining = key.len() - depth;
    let mut leaf = NodeHandle::UNSET;
    Leaf::new_inlined(&mut leaf, doc);

    if remaining == 0 {
        *node = leaf;
        return Ok(());
    }

    let mut head = NodeHandle::UNSET;
    match Prefix::new(allocators, &mut head, key, depth, remaining)? {
        Some(tail) => {
            Prefix::get_mut(allocators, tail).next = leaf;
        }
        None => {
            head = leaf;
        }
    }
    *node = head;
    Ok(())
}

pub(crate) fn lookup(
    allocators: &AllocatorSet,
    node: NodeHandle,
    key: &ArtKey,
    depth: usize,
    result: &mut Vec<u64>,
    max_count: usize,
) -> bool {
    if !node.is_set() {
        return false;
    }
    match node.get_type().expect("set handle has a type") {
        NType::LeafInlined | NType::Leaf => {
            if depth != key.len() {
                return false;
            }
            Leaf::get_doc_ids(allocators, node, result, max_count)
        }
        NType::Node4 | NType::Node16 | NType::Node48 | NType::Node256 => {
            if depth >= key.len() {
                return false;
            }
            match crate::node::get_child(allocators, node, key.byte_at(depth)) {
                Some(child) => lookup(allocators, child, key, depth + 1, result, max_count),
                None => false,
            }
        }
        NType::Prefix => {
            let mut cur = node;
            let mut d = depth;
            match Prefix::traverse(allocators, &mut cur, key, &mut d) {
                None => lookup(allocators, cur, key, d, result, max_count),
                Some(_) => false,
            }
        }
    }
}

/// Removes one occurrence of `doc` under `key`, collapsing empty leaves and
/// shrinking inner nodes whose child count drops to zero back to unset.
pub(crate) fn remove(
    allocators: &mut AllocatorSet,
    node: &mut NodeHandle,
    key: &ArtKey,
    depth: usize,
    doc: u64,
) -> bool {
    if !node.is_set() {
        return false;
    }
    match node.get_type().expect("set handle has a type") {
        NType::LeafInlined | NType::Leaf => {
            if depth != key.len() {
                return false;
            }
            match Leaf::remove(allocators, node, doc) {
                LeafRemoveOutcome::Removed => true,
                LeafRemoveOutcome::NowEmpty => {
                    node.reset();
                    true
                }
                LeafRemoveOutcome::NotFound => false,
            }
        }
        NType::Node4 | NType::Node16 | NType::Node48 | NType::Node256 => {
            if depth >= key.len() {
                return false;
            }
            let byte = key.byte_at(depth);
            match crate::node::get_child(allocators, *node, byte) {
                Some(mut child) => {
                    let removed = remove(allocators, &mut child, key, depth + 1, doc);
                    if removed {
                        if child.is_set() {
                            crate::node::insert_child_overwrite(allocators, node, byte, child);
                        } else {
                            crate::node::remove_child(allocators, node, byte);
                            // `remove_child` shrinks Node16/48/256 down a
                            // class, but a Node4 left with zero children has
                            // nowhere smaller to shrink to; reclaim it
                            // directly rather than leave a dangling empty
                            // inner node in the tree.
                            if node.get_type() == Some(NType::Node4) {
                                match crate::node::child_count(allocators, *node) {
                                    0 => crate::node::free_node(allocators, node),
                                    1 => collapse_single_child(allocators, node),
                                    _ => {}
                                }
                            }
                        }
                    }
                    removed
                }
                None => false,
            }
        }
        // Single prefix node at a time, same reasoning as `insert`: the
        // recursive call's handle change must be written back into this
        // node's `.next`, which a multi-node chain walk can't do.
        NType::Prefix => {
            let bytes = Prefix::get(allocators, *node).bytes().to_vec();
            if depth + bytes.len() > key.len()
                || bytes.iter().enumerate().any(|(i, &b)| b != key.byte_at(depth + i))
            {
                return false;
            }
            let mut next = Prefix::get(allocators, *node).next;
            let removed = remove(allocators, &mut next, key, depth + bytes.len(), doc);
            if removed {
                Prefix::get_mut(allocators, *node).next = next;
            }
            removed
        }
    }
}

/// Collapses a `Node4` left with exactly one child back into a one-byte
/// prefix node pointing directly at that child, reclaiming the `Node4`
/// slot. Mirrors `Concatenate`'s own shrink use: the eliminated node's sole
/// `(byte, child)` edge becomes a prefix edge instead, so a branch that
/// thinned out to a single path doesn't keep paying for an inner-node
/// dispatch at every lookup.
fn collapse_single_child(allocators: &mut AllocatorSet, node: &mut NodeHandle) {
    debug_assert_eq!(node.get_type(), Some(NType::Node4));
    let (byte, child) = {
        let n = Node4::get(allocators, *node);
        debug_assert_eq!(n.count, 1);
        (n.keys[0], n.children[0])
    };
    allocators[NType::Node4.allocator_index()].free(*node);
    let mut collapsed = NodeHandle::UNSET;
    Prefix::concatenate(allocators, &mut collapsed, byte, child)
        .expect("concatenate allocation failure is unrecoverable for this call shape");
    *node = collapsed;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::art_key;

    #[test]
    fn put_then_get_round_trips_single_key() {
        let mut art = Art::new();
        let key = art_key(&10i64);
        art.put(&key, 123).unwrap();
        assert_eq!(art.get(&key), vec![123]);
    }

    #[test]
    fn inline_leaf_promotes_to_chain_on_repeat_insert() {
        let mut art = Art::new();
        let key = art_key(&10i64);
        art.put(&key, 123).unwrap();
        art.put(&key, 124).unwrap();
        art.put(&key, 123).unwrap();
        assert_eq!(art.get(&key), vec![123, 124, 123]);
    }

    #[test]
    fn distinct_keys_branch_into_an_inner_node() {
        let mut art = Art::new();
        let k1 = art_key(&1i64);
        let k2 = art_key(&2i64);
        art.put(&k1, 1).unwrap();
        art.put(&k2, 2).unwrap();
        assert_eq!(art.get(&k1), vec![1]);
        assert_eq!(art.get(&k2), vec![2]);
    }

    #[test]
    fn missing_key_returns_empty() {
        let art = Art::new();
        let key = art_key(&42i64);
        assert!(art.get(&key).is_empty());
    }

    #[test]
    fn node_grows_through_all_thresholds() {
        let mut art = Art::new();
        for i in 0..300i32 {
            art.put(&art_key(&i), i as u64).unwrap();
        }
        for i in 0..300i32 {
            assert_eq!(art.get(&art_key(&i)), vec![i as u64]);
        }
    }

    #[test]
    fn remove_deletes_single_occurrence() {
        let mut art = Art::new();
        let key = art_key(&7i64);
        art.put(&key, 1).unwrap();
        art.put(&key, 2).unwrap();
        assert!(art.remove(&key, 1));
        assert_eq!(art.get(&key), vec![2]);
    }

    #[test]
    fn remove_of_last_doc_clears_the_key() {
        let mut art = Art::new();
        let key = art_key(&7i64);
        art.put(&key, 1).unwrap();
        assert!(art.remove(&key, 1));
        assert!(art.get(&key).is_empty());
    }

    #[test]
    fn remove_collapses_node4_with_one_remaining_child() {
        let mut art = Art::new();
        let k1 = art_key(&1i64);
        let k2 = art_key(&2i64);
        art.put(&k1, 1).unwrap();
        art.put(&k2, 2).unwrap();
        // `k1`/`k2` diverge on their last byte, branching into a Node4 above
        // an inlined leaf on each side.
        assert!(art.remove(&k1, 1));
        assert!(art.get(&k1).is_empty());
        assert_eq!(art.get(&k2), vec![2]);
    }
}
