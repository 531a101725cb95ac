//! The ART node family and the dispatch that ties them together.
//!
//! Node variants form a closed tagged union keyed by the handle's type
//! field (see [`crate::handle::NType`]); rather than a vtable, every
//! operation that varies by node kind is an exhaustive `match` over that
//! tag, mirroring the macro-generated stride dispatch elsewhere in this
//! crate's ancestry.

pub mod leaf;
pub mod node4;
pub mod node16;
pub mod node48;
pub mod node256;
pub mod prefix;

use crate::alloc::AllocatorSet;
use crate::handle::{NType, NodeHandle};

pub(crate) fn allocate(allocators: &mut AllocatorSet, t: NType) -> crate::error::ArtResult<NodeHandle> {
    allocators[t.allocator_index()].allocate()
}

/// Common surface every inner node (Node4/16/48/256) exposes. Generic code
/// (grow/shrink glue, free, serialize) is written once against this trait;
/// type-specific layout and capacity live in each module.
pub trait InnerNode: Sized {
    const CAPACITY: usize;
    const NTYPE: NType;

    fn count(&self) -> usize;
    fn children(&self) -> Vec<NodeHandle>;
    fn get_child(&self, byte: u8) -> Option<NodeHandle>;
    fn is_full(&self) -> bool {
        self.count() >= Self::CAPACITY
    }
}

/// Free a node and everything reachable from it. Dispatches on the
/// handle's type exactly like `Node::Free` in the reference implementation.
pub fn free_node(allocators: &mut AllocatorSet, node: &mut NodeHandle) {
    if !node.is_set() {
        return;
    }
    if node.is_serialized() {
        node.reset();
        return;
    }
    let t = node.get_type().expect("set, non-serialized handle has a type");
    match t {
        NType::Leaf => leaf::Leaf::free(allocators, *node),
        NType::Prefix => prefix::Prefix::free(allocators, *node),
        NType::LeafInlined => {}
        NType::Node4 => node4::Node4::free(allocators, *node),
        NType::Node16 => node16::Node16::free(allocators, *node),
        NType::Node48 => node48::Node48::free(allocators, *node),
        NType::Node256 => node256::Node256::free(allocators, *node),
    }
    if t != NType::LeafInlined {
        allocators[t.allocator_index()].free(*node);
    }
    node.reset();
}

/// Dispatches `GetChild` to the concrete inner-node type.
pub fn get_child(allocators: &AllocatorSet, node: NodeHandle, byte: u8) -> Option<NodeHandle> {
    let t = node.get_type().expect("set handle has a type");
    match t {
        NType::Node4 => node4::Node4::get(allocators, node).get_child(byte),
        NType::Node16 => node16::Node16::get(allocators, node).get_child(byte),
        NType::Node48 => node48::Node48::get(allocators, node).get_child(byte),
        NType::Node256 => node256::Node256::get(allocators, node).get_child(byte),
        other => unreachable!("GetChild on non-inner node type {:?}", other),
    }
}

/// Dispatches `InsertChild`, growing `node` in place to the next capacity
/// class first if it is already full.
pub fn insert_child(
    allocators: &mut AllocatorSet,
    node: &mut NodeHandle,
    byte: u8,
    child: NodeHandle,
) {
    let t = node.get_type().expect("set handle has a type");
    match t {
        NType::Node4 => node4::Node4::insert_child(allocators, node, byte, child),
        NType::Node16 => node16::Node16::insert_child(allocators, node, byte, child),
        NType::Node48 => node48::Node48::insert_child(allocators, node, byte, child),
        NType::Node256 => node256::Node256::insert_child(allocators, node, byte, child),
        other => unreachable!("InsertChild on non-inner node type {:?}", other),
    }
}

/// Overwrites the child already stored at `byte` with `child`, without
/// touching `count` or triggering a grow. Used after a recursive insert or
/// remove changes a child's own handle (e.g. inline-to-chain promotion, or a
/// grow/shrink one level down) and the parent's slot must be repointed.
pub fn insert_child_overwrite(
    allocators: &mut AllocatorSet,
    node: &mut NodeHandle,
    byte: u8,
    child: NodeHandle,
) {
    let t = node.get_type().expect("set handle has a type");
    match t {
        NType::Node4 => {
            let n = node4::Node4::get_mut(allocators, *node);
            let i = n.keys[..n.count as usize]
                .iter()
                .position(|&k| k == byte)
                .expect("overwrite target must already be present");
            n.children[i] = child;
        }
        NType::Node16 => {
            let n = node16::Node16::get_mut(allocators, *node);
            let i = n.keys[..n.count as usize]
                .iter()
                .position(|&k| k == byte)
                .expect("overwrite target must already be present");
            n.children[i] = child;
        }
        NType::Node48 => {
            let n = node48::Node48::get_mut(allocators, *node);
            let idx = n.keys[byte as usize];
            debug_assert_ne!(idx, 0);
            n.children[idx as usize - 1] = child;
        }
        NType::Node256 => {
            let n = node256::Node256::get_mut(allocators, *node);
            n.children[byte as usize] = child;
        }
        other => unreachable!("insert_child_overwrite on non-inner node type {:?}", other),
    }
}

/// Returns every live `(byte, child)` pair for any inner node type. Used by
/// [`crate::concurrent::merge`], which needs to walk a node's children by
/// byte rather than look one up.
pub fn children_with_bytes(allocators: &AllocatorSet, node: NodeHandle) -> Vec<(u8, NodeHandle)> {
    match node.get_type().expect("set handle has a type") {
        NType::Node4 => {
            let n = node4::Node4::get(allocators, node);
            (0..n.count as usize).map(|i| (n.keys[i], n.children[i])).collect()
        }
        NType::Node16 => {
            let n = node16::Node16::get(allocators, node);
            (0..n.count as usize).map(|i| (n.keys[i], n.children[i])).collect()
        }
        NType::Node48 => {
            let n = node48::Node48::get(allocators, node);
            (0u16..256)
                .filter_map(|b| {
                    let idx = n.keys[b as usize];
                    if idx == 0 {
                        None
                    } else {
                        Some((b as u8, n.children[idx as usize - 1]))
                    }
                })
                .collect()
        }
        NType::Node256 => {
            let n = node256::Node256::get(allocators, node);
            (0u16..256)
                .filter_map(|b| {
                    let c = n.children[b as usize];
                    if c.is_set() {
                        Some((b as u8, c))
                    } else {
                        None
                    }
                })
                .collect()
        }
        other => unreachable!("children_with_bytes on non-inner node type {:?}", other),
    }
}

/// Dispatches live-child count for any inner node type.
pub fn child_count(allocators: &AllocatorSet, node: NodeHandle) -> usize {
    match node.get_type().expect("set handle has a type") {
        NType::Node4 => node4::Node4::get(allocators, node).count(),
        NType::Node16 => node16::Node16::get(allocators, node).count(),
        NType::Node48 => node48::Node48::get(allocators, node).count(),
        NType::Node256 => node256::Node256::get(allocators, node).count(),
        other => unreachable!("child_count on non-inner node type {:?}", other),
    }
}

/// Dispatches `RemoveChild`, then shrinks `node` down to the next smaller
/// capacity class if occupancy has dropped below that class's threshold.
pub fn remove_child(allocators: &mut AllocatorSet, node: &mut NodeHandle, byte: u8) {
    let t = node.get_type().expect("set handle has a type");
    match t {
        NType::Node4 => node4::Node4::remove_child(allocators, *node, byte),
        NType::Node16 => {
            node16::Node16::remove_child(allocators, *node, byte);
            if node16::Node16::get(allocators, *node).count() <= crate::config::NODE_4_CAPACITY {
                node16::Node16::shrink_to_4(allocators, node)
                    .expect("shrink allocation failure is unrecoverable for this call shape");
            }
        }
        NType::Node48 => {
            node48::Node48::remove_child(allocators, *node, byte);
            if node48::Node48::get(allocators, *node).count() < crate::config::NODE_48_SHRINK_THRESHOLD
            {
                node48::Node48::shrink_to_16(allocators, node)
                    .expect("shrink allocation failure is unrecoverable for this call shape");
            }
        }
        NType::Node256 => {
            node256::Node256::remove_child(allocators, *node, byte);
            if node256::Node256::get(allocators, *node).count()
                < crate::config::NODE_256_SHRINK_THRESHOLD
            {
                node256::Node256::shrink_to_48(allocators, node)
                    .expect("shrink allocation failure is unrecoverable for this call shape");
            }
        }
        other => unreachable!("RemoveChild on non-inner node type {:?}", other),
    }
}
