//! Widest inner node: a direct 256-entry child array indexed by byte value.
//! Never grows further; shrinks back to [`super::node48::Node48`] once
//! occupancy drops below [`crate::config::NODE_256_SHRINK_THRESHOLD`].

use crate::alloc::AllocatorSet;
use crate::config::{NODE_256_CAPACITY, NODE_256_SHRINK_THRESHOLD};
use crate::handle::{NType, NodeHandle};
use crate::node::InnerNode;

#[repr(C)]
pub struct Node256 {
    pub count: u16,
    pub children: [NodeHandle; NODE_256_CAPACITY],
}

impl InnerNode for Node256 {
    const CAPACITY: usize = NODE_256_CAPACITY;
    const NTYPE: NType = NType::Node256;

    fn count(&self) -> usize {
        self.count as usize
    }

    fn children(&self) -> Vec<NodeHandle> {
        self.children.iter().copied().filter(|c| c.is_set()).collect()
    }

    fn get_child(&self, byte: u8) -> Option<NodeHandle> {
        let c = self.children[byte as usize];
        if c.is_set() {
            Some(c)
        } else {
            None
        }
    }
}

impl Node256 {
    pub fn new(allocators: &mut AllocatorSet) -> crate::error::ArtResult<NodeHandle> {
        let h = crate::node::allocate(allocators, NType::Node256)?;
        let n = Node256::get_mut(allocators, h);
        n.count = 0;
        n.children = [NodeHandle::UNSET; NODE_256_CAPACITY];
        Ok(h)
    }

    pub fn get<'a>(allocators: &'a AllocatorSet, handle: NodeHandle) -> &'a Node256 {
        debug_assert_eq!(handle.get_type(), Some(NType::Node256));
        allocators[NType::Node256.allocator_index()].get::<Node256>(handle)
    }

    pub fn get_mut<'a>(allocators: &'a mut AllocatorSet, handle: NodeHandle) -> &'a mut Node256 {
        debug_assert_eq!(handle.get_type(), Some(NType::Node256));
        allocators[NType::Node256.allocator_index()].get_mut::<Node256>(handle)
    }

    pub fn free(allocators: &mut AllocatorSet, handle: NodeHandle) {
        let children = Node256::get(allocators, handle).children();
        for mut child in children {
            crate::node::free_node(allocators, &mut child);
        }
    }

    pub fn grow_from_48(
        allocators: &mut AllocatorSet,
        node: &mut NodeHandle,
    ) -> crate::error::ArtResult<()> {
        let old = *node;
        let (count, keys48, children48) = {
            let n48 = super::node48::Node48::get(allocators, old);
            (n48.count, n48.keys, n48.children)
        };
        let h = crate::node::allocate(allocators, NType::Node256)?;
        {
            let n256 = Node256::get_mut(allocators, h);
            n256.count = count as u16;
            n256.children = [NodeHandle::UNSET; NODE_256_CAPACITY];
            for byte in 0..256usize {
                let idx = keys48[byte];
                if idx != 0 {
                    n256.children[byte] = children48[idx as usize - 1];
                }
            }
        }
        allocators[NType::Node48.allocator_index()].free(old);
        *node = h;
        Ok(())
    }

    /// Shrinks back to a [`super::node48::Node48`] once occupancy drops
    /// below [`NODE_256_SHRINK_THRESHOLD`].
    pub fn shrink_to_48(
        allocators: &mut AllocatorSet,
        node: &mut NodeHandle,
    ) -> crate::error::ArtResult<()> {
        let old = *node;
        let (count, children256) = {
            let n256 = Node256::get(allocators, old);
            (n256.count, n256.children)
        };
        debug_assert!(count as usize <= NODE_256_SHRINK_THRESHOLD);
        let h = crate::node::allocate(allocators, NType::Node48)?;
        {
            let n48 = super::node48::Node48::get_mut(allocators, h);
            n48.count = 0;
            n48.keys = [0; 256];
            n48.children = [NodeHandle::UNSET; crate::config::NODE_48_CAPACITY];
            for byte in 0..256usize {
                let c = children256[byte];
                if c.is_set() {
                    let i = n48.count as usize;
                    n48.children[i] = c;
                    n48.keys[byte] = (i + 1) as u8;
                    n48.count += 1;
                }
            }
        }
        allocators[NType::Node256.allocator_index()].free(old);
        *node = h;
        Ok(())
    }

    pub fn insert_child(
        allocators: &mut AllocatorSet,
        node: &mut NodeHandle,
        byte: u8,
        child: NodeHandle,
    ) {
        let n = Node256::get_mut(allocators, *node);
        debug_assert!(!n.children[byte as usize].is_set());
        n.children[byte as usize] = child;
        n.count += 1;
    }

    pub fn remove_child(allocators: &mut AllocatorSet, node: NodeHandle, byte: u8) {
        let n = Node256::get_mut(allocators, node);
        if n.children[byte as usize].is_set() {
            n.children[byte as usize].reset();
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
    fn grow_from_48_preserves_entries() {
        let mut allocators = new_allocator_set();
        let mut node = super::super::node4::Node4::new(&mut allocators).unwrap();
        for b in 0..49u16 {
            let mut leaf = NodeHandle::UNSET;
            Leaf::new_inlined(&mut leaf, b as u64);
            crate::node::insert_child(&mut allocators, &mut node, b as u8, leaf);
        }
        assert_eq!(node.get_type(), Some(NType::Node256));
        for b in 0..49u16 {
            assert_eq!(
                crate::node::get_child(&allocators, node, b as u8)
                    .unwrap()
                    .doc_id(),
                b as u64
            );
        }
    }

    #[test]
    fn remove_child_clears_slot() {
        let mut allocators = new_allocator_set();
        let mut h = Node256::new(&mut allocators).unwrap();
        let mut leaf = NodeHandle::UNSET;
        Leaf::new_inlined(&mut leaf, 7);
        Node256::insert_child(&mut allocators, &mut h, b'z', leaf);
        Node256::remove_child(&mut allocators, h, b'z');
        assert!(Node256::get(&allocators, h).get_child(b'z').is_none());
    }
}
