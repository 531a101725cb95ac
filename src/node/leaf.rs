//! Leaves. A key with a single inserted doc id never touches a slab at all
//! — it lives entirely inside the node handle as [`NType::LeafInlined`].
//! The second insert into the same key promotes it to a chain of
//! slab-backed [`Leaf`] nodes.

use crate::alloc::AllocatorSet;
use crate::config::LEAF_SIZE;
use crate::handle::{NType, NodeHandle};

#[repr(C)]
pub struct Leaf {
    pub count: u8,
    pub row_ids: [u64; LEAF_SIZE],
    pub next: NodeHandle,
}

/// What happened to the chain as a result of [`Leaf::remove`].
pub enum LeafRemoveOutcome {
    /// `row_id` was removed; the chain (possibly now empty) survives.
    Removed,
    /// `row_id` was not found anywhere in the chain.
    NotFound,
    /// The chain held exactly one doc id, which was removed; the caller
    /// must reset its own handle to `node` rather than leave it dangling.
    /// This resolves the open question the reference implementation left
    /// unaddressed (see design notes).
    NowEmpty,
}

impl Leaf {
    pub fn new_inlined(node: &mut NodeHandle, doc_id: u64) {
        node.reset();
        node.set_doc_id(doc_id);
    }

    pub fn get<'a>(allocators: &'a AllocatorSet, handle: NodeHandle) -> &'a Leaf {
        debug_assert_eq!(handle.get_type(), Some(NType::Leaf));
        allocators[NType::Leaf.allocator_index()].get::<Leaf>(handle)
    }

    pub fn get_mut<'a>(allocators: &'a mut AllocatorSet, handle: NodeHandle) -> &'a mut Leaf {
        debug_assert_eq!(handle.get_type(), Some(NType::Leaf));
        allocators[NType::Leaf.allocator_index()].get_mut::<Leaf>(handle)
    }

    pub fn total_count(allocators: &AllocatorSet, node: NodeHandle) -> usize {
        debug_assert!(node.is_set() && !node.is_serialized());
        if node.get_type() == Some(NType::LeafInlined) {
            return 1;
        }
        let mut count = 0;
        let mut cur = node;
        while cur.is_set() {
            let leaf = Leaf::get(allocators, cur);
            count += leaf.count as usize;
            cur = leaf.next;
        }
        count
    }

    /// Appends every doc id in chain order to `result`. Returns `false`
    /// (without partially writing) if doing so would exceed `max_count`.
    pub fn get_doc_ids(
        allocators: &AllocatorSet,
        node: NodeHandle,
        result: &mut Vec<u64>,
        max_count: usize,
    ) -> bool {
        debug_assert!(node.is_set());
        if result.len() + Leaf::total_count(allocators, node) > max_count {
            return false;
        }
        if node.get_type() == Some(NType::LeafInlined) {
            result.push(node.doc_id());
            return true;
        }
        let mut cur = node;
        while cur.is_set() {
            let leaf = Leaf::get(allocators, cur);
            result.extend_from_slice(&leaf.row_ids[..leaf.count as usize]);
            cur = leaf.next;
        }
        true
    }

    /// Inserts `row_id`, promoting an inlined leaf to a one-element chain
    /// first if necessary, then appending to the tail.
    pub fn insert(
        allocators: &mut AllocatorSet,
        node: &mut NodeHandle,
        row_id: u64,
    ) -> crate::error::ArtResult<()> {
        debug_assert!(node.is_set() && !node.is_serialized());
        if node.get_type() == Some(NType::LeafInlined) {
            Leaf::move_inlined_to_leaf(allocators, node)?;
        }

        let mut tail = *node;
        loop {
            let next = Leaf::get(allocators, tail).next;
            if !next.is_set() {
                break;
            }
            tail = next;
        }

        let full = Leaf::get(allocators, tail).count as usize == LEAF_SIZE;
        if full {
            let new_tail = crate::node::allocate(allocators, NType::Leaf)?;
            {
                let nl = Leaf::get_mut(allocators, new_tail);
                nl.count = 0;
                nl.next = NodeHandle::UNSET;
            }
            Leaf::get_mut(allocators, tail).next = new_tail;
            tail = new_tail;
        }

        let leaf = Leaf::get_mut(allocators, tail);
        leaf.row_ids[leaf.count as usize] = row_id;
        leaf.count += 1;
        Ok(())
    }

    fn move_inlined_to_leaf(
        allocators: &mut AllocatorSet,
        node: &mut NodeHandle,
    ) -> crate::error::ArtResult<()> {
        debug_assert_eq!(node.get_type(), Some(NType::LeafInlined));
        let doc_id = node.doc_id();
        let h = crate::node::allocate(allocators, NType::Leaf)?;
        {
            let leaf = Leaf::get_mut(allocators, h);
            leaf.count = 1;
            leaf.row_ids[0] = doc_id;
            leaf.next = NodeHandle::UNSET;
        }
        *node = h;
        Ok(())
    }

    pub fn free(allocators: &mut AllocatorSet, node: NodeHandle) {
        let mut cur = node;
        while cur.is_set() && !cur.is_serialized() {
            let next = Leaf::get(allocators, cur).next;
            allocators[NType::Leaf.allocator_index()].free(cur);
            cur = next;
        }
    }

    /// Removes the first occurrence of `row_id` by swapping it with the
    /// chain's last element and shrinking the tail's count. Unlike the
    /// reference implementation, this never leaves `*node` pointing at a
    /// freed node: [`LeafRemoveOutcome::NowEmpty`] tells the caller to
    /// clear its own handle.
    pub fn remove(
        allocators: &mut AllocatorSet,
        node: &mut NodeHandle,
        row_id: u64,
    ) -> LeafRemoveOutcome {
        debug_assert!(node.is_set() && !node.is_serialized());
        if node.get_type() == Some(NType::LeafInlined) {
            return if node.doc_id() == row_id {
                LeafRemoveOutcome::NowEmpty
            } else {
                LeafRemoveOutcome::NotFound
            };
        }

        let mut found = false;
        let mut cur = *node;
        'outer: loop {
            let leaf = Leaf::get(allocators, cur);
            let count = leaf.count as usize;
            for i in 0..count {
                if leaf.row_ids[i] == row_id {
                    found = true;
                    break 'outer;
                }
            }
            let next = leaf.next;
            if !next.is_set() {
                break;
            }
            cur = next;
        }
        if !found {
            return LeafRemoveOutcome::NotFound;
        }

        // find the tail to pop its last row id
        let mut tail = *node;
        loop {
            let next = Leaf::get(allocators, tail).next;
            if !next.is_set() {
                break;
            }
            tail = next;
        }
        let tail_leaf = Leaf::get_mut(allocators, tail);
        tail_leaf.count -= 1;
        let last = tail_leaf.row_ids[tail_leaf.count as usize];
        let tail_now_empty = tail_leaf.count == 0;

        let at = Leaf::get(allocators, cur);
        let pos = at.row_ids[..at.count as usize]
            .iter()
            .position(|&r| r == row_id);
        if let Some(pos) = pos {
            if !(cur == tail && pos as u8 == Leaf::get(allocators, tail).count) {
                Leaf::get_mut(allocators, cur).row_ids[pos] = last;
            }
        }

        if tail_now_empty {
            if tail == *node {
                allocators[NType::Leaf.allocator_index()].free(tail);
                return LeafRemoveOutcome::NowEmpty;
            }
            // unlink the now-empty tail from its parent chain node.
            let mut prev = *node;
            loop {
                let next = Leaf::get(allocators, prev).next;
                if next == tail {
                    break;
                }
                prev = next;
            }
            Leaf::get_mut(allocators, prev).next = NodeHandle::UNSET;
            allocators[NType::Leaf.allocator_index()].free(tail);
        }

        LeafRemoveOutcome::Removed
    }

    /// Appends every doc id reachable from `r_node` onto the tail of
    /// `l_node` (promoting `l_node` from inlined first if necessary), then
    /// resets `r_node`.
    pub fn merge(
        allocators: &mut AllocatorSet,
        l_node: &mut NodeHandle,
        r_node: &mut NodeHandle,
    ) -> crate::error::ArtResult<()> {
        debug_assert!(l_node.is_set() && r_node.is_set());

        if r_node.get_type() == Some(NType::LeafInlined) {
            Leaf::insert(allocators, l_node, r_node.doc_id())?;
            r_node.reset();
            return Ok(());
        }

        if l_node.get_type() == Some(NType::LeafInlined) {
            Leaf::move_inlined_to_leaf(allocators, l_node)?;
        }

        let mut cur = *r_node;
        while cur.is_set() {
            let (count, row_ids, next) = {
                let leaf = Leaf::get(allocators, cur);
                (leaf.count as usize, leaf.row_ids, leaf.next)
            };
            for &id in &row_ids[..count] {
                Leaf::insert(allocators, l_node, id)?;
            }
            cur = next;
        }
        Leaf::free(allocators, *r_node);
        r_node.reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::new_allocator_set;

    #[test]
    fn insert_promotes_inline_then_chains() {
        let mut allocators = new_allocator_set();
        let mut node = NodeHandle::UNSET;
        Leaf::new_inlined(&mut node, 123);
        assert_eq!(node.get_type(), Some(NType::LeafInlined));

        Leaf::insert(&mut allocators, &mut node, 124).unwrap();
        assert_eq!(node.get_type(), Some(NType::Leaf));

        Leaf::insert(&mut allocators, &mut node, 123).unwrap();

        let mut out = Vec::new();
        assert!(Leaf::get_doc_ids(&allocators, node, &mut out, 10));
        assert_eq!(out, vec![123, 124, 123]);
    }

    #[test]
    fn insert_spills_across_chain_nodes() {
        let mut allocators = new_allocator_set();
        let mut node = NodeHandle::UNSET;
        Leaf::new_inlined(&mut node, 0);
        for i in 1..=(LEAF_SIZE as u64 * 2) {
            Leaf::insert(&mut allocators, &mut node, i).unwrap();
        }
        assert_eq!(Leaf::total_count(&allocators, node), LEAF_SIZE * 2 + 1);
    }

    #[test]
    fn get_doc_ids_respects_max_count() {
        let mut allocators = new_allocator_set();
        let mut node = NodeHandle::UNSET;
        Leaf::new_inlined(&mut node, 1);
        Leaf::insert(&mut allocators, &mut node, 2).unwrap();
        let mut out = Vec::new();
        assert!(!Leaf::get_doc_ids(&allocators, node, &mut out, 1));
        assert!(out.is_empty());
    }
}
