//! Sixteen-way inner node. Still a linear key array (no SIMD search here —
//! that's a reference-implementation detail tied to SSE comparisons this
//! crate doesn't depend on), but spacious enough to defer the next grow.

use crate::alloc::AllocatorSet;
use crate::config::NODE_16_CAPACITY;
use crate::handle::{NType, NodeHandle};
use crate::node::InnerNode;

#[repr(C)]
pub struct Node16 {
    pub count: u8,
    pub keys: [u8; NODE_16_CAPACITY],
    pub children: [NodeHandle; NODE_16_CAPACITY],
}

impl InnerNode for Node16 {
    const CAPACITY: usize = NODE_16_CAPACITY;
    const NTYPE: NType = NType::Node16;

    fn count(&self) -> usize {
        self.count as usize
    }

    fn children(&self) -> Vec<NodeHandle> {
        self.children[..self.count as usize].to_vec()
    }

    fn get_child(&self, byte: u8) -> Option<NodeHandle> {
        self.keys[..self.count as usize]
            .iter()
            .position(|&k| k == byte)
            .map(|i| self.children[i])
    }
}

impl Node16 {
    pub fn get<'a>(allocators: &'a AllocatorSet, handle: NodeHandle) -> &'a Node16 {
        debug_assert_eq!(handle.get_type(), Some(NType::Node16));
        allocators[NType::Node16.allocator_index()].get::<Node16>(handle)
    }

    pub fn get_mut<'a>(allocators: &'a mut AllocatorSet, handle: NodeHandle) -> &'a mut Node16 {
        debug_assert_eq!(handle.get_type(), Some(NType::Node16));
        allocators[NType::Node16.allocator_index()].get_mut::<Node16>(handle)
    }

    pub fn free(allocators: &mut AllocatorSet, handle: NodeHandle) {
        let children = Node16::get(allocators, handle).children();
        for mut child in children {
            crate::node::free_node(allocators, &mut child);
        }
    }

    /// Replaces `*node` (a full [`super::node4::Node4`]) with an equivalent
    /// freshly allocated `Node16`, then frees the old node.
    pub fn grow_from_4(
        allocators: &mut AllocatorSet,
        node: &mut NodeHandle,
    ) -> crate::error::ArtResult<()> {
        let old = *node;
        let (count, keys4, children4) = {
            let n4 = super::node4::Node4::get(allocators, old);
            (n4.count, n4.keys, n4.children)
        };
        let h = crate::node::allocate(allocators, NType::Node16)?;
        {
            let n16 = Node16::get_mut(allocators, h);
            n16.count = count;
            n16.keys = [0; NODE_16_CAPACITY];
            n16.keys[..count as usize].copy_from_slice(&keys4[..count as usize]);
            n16.children = [NodeHandle::UNSET; NODE_16_CAPACITY];
            n16.children[..count as usize].copy_from_slice(&children4[..count as usize]);
        }
        allocators[NType::Node4.allocator_index()].free(old);
        *node = h;
        Ok(())
    }

    /// Replaces `*node` (a sparse `Node16`, below the shrink threshold) with
    /// an equivalent [`super::node4::Node4`].
    pub fn shrink_to_4(
        allocators: &mut AllocatorSet,
        node: &mut NodeHandle,
    ) -> crate::error::ArtResult<()> {
        let old = *node;
        let (count, keys16, children16) = {
            let n16 = Node16::get(allocators, old);
            (n16.count, n16.keys, n16.children)
        };
        debug_assert!(count as usize <= crate::config::NODE_4_CAPACITY);
        let h = super::node4::Node4::new(allocators)?;
        {
            let n4 = super::node4::Node4::get_mut(allocators, h);
            n4.count = count;
            n4.keys[..count as usize].copy_from_slice(&keys16[..count as usize]);
            n4.children[..count as usize].copy_from_slice(&children16[..count as usize]);
        }
        allocators[NType::Node16.allocator_index()].free(old);
        *node = h;
        Ok(())
    }

    /// Inserts `byte -> child` at its sorted position, shifting later
    /// entries right, growing to a [`super::node48::Node48`] in place first
    /// if this node is already at capacity.
    pub fn insert_child(
        allocators: &mut AllocatorSet,
        node: &mut NodeHandle,
        byte: u8,
        child: NodeHandle,
    ) {
        let full = Node16::get(allocators, *node).is_full();
        if full {
            super::node48::Node48::grow_from_16(allocators, node)
                .expect("grow allocation failure is unrecoverable for this call shape");
            super::node48::Node48::insert_child(allocators, node, byte, child);
            return;
        }
        let n = Node16::get_mut(allocators, *node);
        let count = n.count as usize;
        let pos = n.keys[..count].iter().position(|&k| k > byte).unwrap_or(count);
        for i in (pos..count).rev() {
            n.keys[i + 1] = n.keys[i];
            n.children[i + 1] = n.children[i];
        }
        n.keys[pos] = byte;
        n.children[pos] = child;
        n.count += 1;
    }

    /// Removes `byte`'s entry, shifting later entries left to keep `keys`
    /// strictly increasing.
    pub fn remove_child(allocators: &mut AllocatorSet, node: NodeHandle, byte: u8) {
        let n = Node16::get_mut(allocators, node);
        let count = n.count as usize;
        if let Some(pos) = n.keys[..count].iter().position(|&k| k == byte) {
            for i in pos..count - 1 {
                n.keys[i] = n.keys[i + 1];
                n.children[i] = n.children[i + 1];
            }
            n.count -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::new_allocator_set;
    use crate::node::leaf::Leaf;

    #[test]
    fn grow_from_4_preserves_entries() {
        let mut allocators = new_allocator_set();
        let mut node = super::super::node4::Node4::new(&mut allocators).unwrap();
        for b in 0..5u8 {
            let mut leaf = NodeHandle::UNSET;
            Leaf::new_inlined(&mut leaf, b as u64);
            super::super::node4::Node4::insert_child(&mut allocators, &mut node, b, leaf);
        }
        assert_eq!(node.get_type(), Some(NType::Node16));
        let n = Node16::get(&allocators, node);
        assert_eq!(n.count(), 5);
        for b in 0..5u8 {
            assert_eq!(n.get_child(b).unwrap().doc_id(), b as u64);
        }
    }

    #[test]
    fn insert_child_keeps_keys_sorted_regardless_of_insertion_order() {
        let mut allocators = new_allocator_set();
        let mut node = super::super::node4::Node4::new(&mut allocators).unwrap();
        for b in [10u8, 2, 30, 1, 20, 3] {
            let mut leaf = NodeHandle::UNSET;
            Leaf::new_inlined(&mut leaf, b as u64);
            super::super::node4::Node4::insert_child(&mut allocators, &mut node, b, leaf);
        }
        assert_eq!(node.get_type(), Some(NType::Node16));
        let n = Node16::get(&allocators, node);
        let mut expected = [10u8, 2, 30, 1, 20, 3];
        expected.sort_unstable();
        assert_eq!(&n.keys[..6], &expected[..]);
    }

    #[test]
    fn remove_child_shifts_left_and_preserves_order() {
        let mut allocators = new_allocator_set();
        let mut node = super::super::node4::Node4::new(&mut allocators).unwrap();
        for b in 0..6u8 {
            let mut leaf = NodeHandle::UNSET;
            Leaf::new_inlined(&mut leaf, b as u64);
            super::super::node4::Node4::insert_child(&mut allocators, &mut node, b, leaf);
        }
        assert_eq!(node.get_type(), Some(NType::Node16));
        Node16::remove_child(&mut allocators, node, 2);
        let n = Node16::get(&allocators, node);
        assert_eq!(n.count(), 5);
        assert_eq!(&n.keys[..5], &[0, 1, 3, 4, 5]);
    }
}
