//! 48-way inner node. `keys` is now indexed directly by byte value and
//! stores `index + 1` into `children` (0 means "absent"), trading the
//! linear scan for an O(1) lookup at the cost of a full 256-byte key table.

use crate::alloc::AllocatorSet;
use crate::config::{NODE_48_CAPACITY, NODE_48_SHRINK_THRESHOLD};
use crate::handle::{NType, NodeHandle};
use crate::node::InnerNode;

#[repr(C)]
pub struct Node48 {
    pub count: u8,
    pub keys: [u8; 256],
    pub children: [NodeHandle; NODE_48_CAPACITY],
}

impl InnerNode for Node48 {
    const CAPACITY: usize = NODE_48_CAPACITY;
    const NTYPE: NType = NType::Node48;

    fn count(&self) -> usize {
        self.count as usize
    }

    fn children(&self) -> Vec<NodeHandle> {
        self.children[..self.count as usize].to_vec()
    }

    fn get_child(&self, byte: u8) -> Option<NodeHandle> {
        let idx = self.keys[byte as usize];
        if idx == 0 {
            None
        } else {
            Some(self.children[idx as usize - 1])
        }
    }
}

impl Node48 {
    pub fn new(allocators: &mut AllocatorSet) -> crate::error::ArtResult<NodeHandle> {
        let h = crate::node::allocate(allocators, NType::Node48)?;
        let n = Node48::get_mut(allocators, h);
        n.count = 0;
        n.keys = [0; 256];
        n.children = [NodeHandle::UNSET; NODE_48_CAPACITY];
        Ok(h)
    }

    pub fn get<'a>(allocators: &'a AllocatorSet, handle: NodeHandle) -> &'a Node48 {
        debug_assert_eq!(handle.get_type(), Some(NType::Node48));
        allocators[NType::Node48.allocator_index()].get::<Node48>(handle)
    }

    pub fn get_mut<'a>(allocators: &'a mut AllocatorSet, handle: NodeHandle) -> &'a mut Node48 {
        debug_assert_eq!(handle.get_type(), Some(NType::Node48));
        allocators[NType::Node48.allocator_index()].get_mut::<Node48>(handle)
    }

    pub fn free(allocators: &mut AllocatorSet, handle: NodeHandle) {
        let children = Node48::get(allocators, handle).children();
        for mut child in children {
            crate::node::free_node(allocators, &mut child);
        }
    }

    pub fn grow_from_16(
        allocators: &mut AllocatorSet,
        node: &mut NodeHandle,
    ) -> crate::error::ArtResult<()> {
        let old = *node;
        let (count, keys16, children16) = {
            let n16 = super::node16::Node16::get(allocators, old);
            (n16.count, n16.keys, n16.children)
        };
        let h = crate::node::allocate(allocators, NType::Node48)?;
        {
            let n48 = Node48::get_mut(allocators, h);
            n48.count = count;
            n48.keys = [0; 256];
            n48.children = [NodeHandle::UNSET; NODE_48_CAPACITY];
            for i in 0..count as usize {
                n48.keys[keys16[i] as usize] = (i + 1) as u8;
                n48.children[i] = children16[i];
            }
        }
        allocators[NType::Node16.allocator_index()].free(old);
        *node = h;
        Ok(())
    }

    /// Shrinks back to a [`super::node16::Node16`] once occupancy drops
    /// below [`NODE_48_SHRINK_THRESHOLD`].
    pub fn shrink_to_16(
        allocators: &mut AllocatorSet,
        node: &mut NodeHandle,
    ) -> crate::error::ArtResult<()> {
        let old = *node;
        let (count, keys48, children48) = {
            let n48 = Node48::get(allocators, old);
            (n48.count, n48.keys, n48.children)
        };
        debug_assert!(count as usize <= NODE_48_SHRINK_THRESHOLD);
        let h = crate::node::allocate(allocators, NType::Node16)?;
        {
            let n16 = super::node16::Node16::get_mut(allocators, h);
            n16.count = 0;
            n16.keys = [0; crate::config::NODE_16_CAPACITY];
            n16.children = [NodeHandle::UNSET; crate::config::NODE_16_CAPACITY];
            for byte in 0..256usize {
                let idx = keys48[byte];
                if idx != 0 {
                    let i = n16.count as usize;
                    n16.keys[i] = byte as u8;
                    n16.children[i] = children48[idx as usize - 1];
                    n16.count += 1;
                }
            }
        }
        allocators[NType::Node48.allocator_index()].free(old);
        *node = h;
        Ok(())
    }

    pub fn insert_child(
        allocators: &mut AllocatorSet,
        node: &mut NodeHandle,
        byte: u8,
        child: NodeHandle,
    ) {
        let full = Node48::get(allocators, *node).is_full();
        if full {
            super::node256::Node256::grow_from_48(allocators, node)
                .expect("grow allocation failure is unrecoverable for this call shape");
            super::node256::Node256::insert_child(allocators, node, byte, child);
            return;
        }
        let n = Node48::get_mut(allocators, *node);
        let i = n.count as usize;
        n.children[i] = child;
        n.keys[byte as usize] = (i + 1) as u8;
        n.count += 1;
    }

    pub fn remove_child(allocators: &mut AllocatorSet, node: NodeHandle, byte: u8) {
        let n = Node48::get_mut(allocators, node);
        let idx = n.keys[byte as usize];
        if idx == 0 {
            return;
        }
        let removed = idx as usize - 1;
        let last = n.count as usize - 1;
        if removed != last {
            let moved_child = n.children[last];
            n.children[removed] = moved_child;
            if let Some(moved_key) = n.keys.iter().position(|&k| k as usize == last + 1) {
                n.keys[moved_key] = (removed + 1) as u8;
            }
        }
        n.keys[byte as usize] = 0;
        n.count -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::new_allocator_set;
    use crate::node::leaf::Leaf;

    #[test]
    fn grow_from_16_preserves_entries() {
        let mut allocators = new_allocator_set();
        let mut node = super::super::node4::Node4::new(&mut allocators).unwrap();
        for b in 0..17u8 {
            let mut leaf = NodeHandle::UNSET;
            Leaf::new_inlined(&mut leaf, b as u64);
            crate::node::insert_child(&mut allocators, &mut node, b, leaf);
        }
        assert_eq!(node.get_type(), Some(NType::Node48));
        for b in 0..17u8 {
            assert_eq!(
                crate::node::get_child(&allocators, node, b).unwrap().doc_id(),
                b as u64
            );
        }
    }

    #[test]
    fn remove_child_keeps_index_consistent() {
        let mut allocators = new_allocator_set();
        let mut h = Node48::new(&mut allocators).unwrap();
        let mut l1 = NodeHandle::UNSET;
        Leaf::new_inlined(&mut l1, 1);
        let mut l2 = NodeHandle::UNSET;
        Leaf::new_inlined(&mut l2, 2);
        Node48::insert_child(&mut allocators, &mut h, b'a', l1);
        Node48::insert_child(&mut allocators, &mut h, b'b', l2);
        Node48::remove_child(&mut allocators, h, b'a');
        assert_eq!(Node48::get(&allocators, h).get_child(b'b').unwrap().doc_id(), 2);
        assert!(Node48::get(&allocators, h).get_child(b'a').is_none());
    }
}
