//! Smallest inner node: a linear scan over up to 4 (byte, child) pairs kept
//! in insertion order. Cheapest to scan, cheapest to grow out of.

use crate::alloc::AllocatorSet;
use crate::config::NODE_4_CAPACITY;
use crate::handle::{NType, NodeHandle};
use crate::node::InnerNode;

#[repr(C)]
pub struct Node4 {
    pub count: u8,
    pub keys: [u8; NODE_4_CAPACITY],
    pub children: [NodeHandle; NODE_4_CAPACITY],
}

impl InnerNode for Node4 {
    const CAPACITY: usize = NODE_4_CAPACITY;
    const NTYPE: NType = NType::Node4;

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

impl Node4 {
    pub fn new(allocators: &mut AllocatorSet) -> crate::error::ArtResult<NodeHandle> {
        let h = crate::node::allocate(allocators, NType::Node4)?;
        let n = Node4::get_mut(allocators, h);
        n.count = 0;
        n.keys = [0; NODE_4_CAPACITY];
        n.children = [NodeHandle::UNSET; NODE_4_CAPACITY];
        Ok(h)
    }

    pub fn get<'a>(allocators: &'a AllocatorSet, handle: NodeHandle) -> &'a Node4 {
        debug_assert_eq!(handle.get_type(), Some(NType::Node4));
        allocators[NType::Node4.allocator_index()].get::<Node4>(handle)
    }

    pub fn get_mut<'a>(allocators: &'a mut AllocatorSet, handle: NodeHandle) -> &'a mut Node4 {
        debug_assert_eq!(handle.get_type(), Some(NType::Node4));
        allocators[NType::Node4.allocator_index()].get_mut::<Node4>(handle)
    }

    pub fn free(allocators: &mut AllocatorSet, handle: NodeHandle) {
        let children = Node4::get(allocators, handle).children();
        for mut child in children {
            crate::node::free_node(allocators, &mut child);
        }
    }

    /// Inserts `byte -> child` at its sorted position, shifting later
    /// entries right, growing to a [`super::node16::Node16`] in place first
    /// if this node is already at capacity.
    pub fn insert_child(
        allocators: &mut AllocatorSet,
        node: &mut NodeHandle,
        byte: u8,
        child: NodeHandle,
    ) {
        let full = Node4::get(allocators, *node).is_full();
        if full {
            super::node16::Node16::grow_from_4(allocators, node)
                .expect("grow allocation failure is unrecoverable for this call shape");
            super::node16::Node16::insert_child(allocators, node, byte, child);
            return;
        }
        let n = Node4::get_mut(allocators, *node);
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
        let n = Node4::get_mut(allocators, node);
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

    #[test]
    fn insert_and_get_child_round_trip() {
        let mut allocators = new_allocator_set();
        let mut h = Node4::new(&mut allocators).unwrap();
        let mut leaf = NodeHandle::UNSET;
        super::super::leaf::Leaf::new_inlined(&mut leaf, 99);
        Node4::insert_child(&mut allocators, &mut h, b'a', leaf);
        let n = Node4::get(&allocators, h);
        assert_eq!(n.get_child(b'a').unwrap().doc_id(), 99);
    }

    #[test]
    fn insert_child_keeps_keys_sorted_regardless_of_insertion_order() {
        let mut allocators = new_allocator_set();
        let mut h = Node4::new(&mut allocators).unwrap();
        for b in [b'c', b'a', b'd', b'b'] {
            let mut leaf = NodeHandle::UNSET;
            super::super::leaf::Leaf::new_inlined(&mut leaf, b as u64);
            Node4::insert_child(&mut allocators, &mut h, b, leaf);
        }
        let n = Node4::get(&allocators, h);
        assert_eq!(&n.keys[..4], b"abcd");
    }

    #[test]
    fn remove_child_shifts_left_and_preserves_order() {
        let mut allocators = new_allocator_set();
        let mut h = Node4::new(&mut allocators).unwrap();
        let mut l1 = NodeHandle::UNSET;
        super::super::leaf::Leaf::new_inlined(&mut l1, 1);
        let mut l2 = NodeHandle::UNSET;
        super::super::leaf::Leaf::new_inlined(&mut l2, 2);
        let mut l3 = NodeHandle::UNSET;
        super::super::leaf::Leaf::new_inlined(&mut l3, 3);
        Node4::insert_child(&mut allocators, &mut h, b'a', l1);
        Node4::insert_child(&mut allocators, &mut h, b'b', l2);
        Node4::insert_child(&mut allocators, &mut h, b'c', l3);
        Node4::remove_child(&mut allocators, h, b'a');
        let n = Node4::get(&allocators, h);
        assert_eq!(n.count(), 2);
        assert_eq!(&n.keys[..2], b"bc");
        assert_eq!(n.get_child(b'b').unwrap().doc_id(), 2);
        assert_eq!(n.get_child(b'c').unwrap().doc_id(), 3);
    }
}
