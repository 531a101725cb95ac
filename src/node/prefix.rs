//! Prefix chain: a linked list of nodes compressing a run of single-child
//! trie edges into one logical node, each holding up to [`PREFIX_SIZE`]
//! bytes.

use crate::alloc::AllocatorSet;
use crate::config::PREFIX_SIZE;
use crate::handle::{NType, NodeHandle};
use crate::key::ArtKey;

#[repr(C)]
pub struct Prefix {
    /// `data[0..data[PREFIX_SIZE]]` are the live bytes; `data[PREFIX_SIZE]`
    /// itself is the used length.
    pub data: [u8; PREFIX_SIZE + 1],
    pub next: NodeHandle,
}

impl Prefix {
    fn used_len(&self) -> usize {
        self.data[PREFIX_SIZE] as usize
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.used_len()]
    }

    pub fn get<'a>(allocators: &'a AllocatorSet, handle: NodeHandle) -> &'a Prefix {
        debug_assert_eq!(handle.get_type(), Some(NType::Prefix));
        allocators[NType::Prefix.allocator_index()].get::<Prefix>(handle)
    }

    pub fn get_mut<'a>(allocators: &'a mut AllocatorSet, handle: NodeHandle) -> &'a mut Prefix {
        debug_assert_eq!(handle.get_type(), Some(NType::Prefix));
        allocators[NType::Prefix.allocator_index()].get_mut::<Prefix>(handle)
    }

    pub fn get_byte(allocators: &AllocatorSet, handle: NodeHandle, pos: usize) -> u8 {
        Prefix::get(allocators, handle).data[pos]
    }

    /// Builds a chain storing `key[depth .. depth+count)`, writes its head
    /// into `*node`, and returns the handle of the chain's tail node so the
    /// caller can attach a terminal child into `tail.next`. Returns `None`
    /// (and leaves `*node` untouched) when `count == 0` — no prefix chain
    /// is needed and the caller should write directly into `*node`.
    pub fn new(
        allocators: &mut AllocatorSet,
        node: &mut NodeHandle,
        key: &ArtKey,
        depth: usize,
        count: usize,
    ) -> crate::error::ArtResult<Option<NodeHandle>> {
        if count == 0 {
            return Ok(None);
        }
        let bytes = key.as_bytes();
        let mut handles = Vec::new();
        let mut pos = depth;
        let mut remaining = count;
        while remaining > 0 {
            let n = remaining.min(PREFIX_SIZE);
            let h = crate::node::allocate(allocators, NType::Prefix)?;
            {
                let p = Prefix::get_mut(allocators, h);
                p.data[..n].copy_from_slice(&bytes[pos..pos + n]);
                p.data[PREFIX_SIZE] = n as u8;
                p.next = NodeHandle::UNSET;
            }
            handles.push(h);
            pos += n;
            remaining -= n;
        }
        for w in handles.windows(2) {
            Prefix::get_mut(allocators, w[0]).next = w[1];
        }
        *node = handles[0];
        Ok(Some(*handles.last().unwrap()))
    }

    /// Walks the chain starting at `*cur`, comparing stored bytes against
    /// `key[depth..]`. On a full chain match, `*cur` is advanced to the
    /// terminal (non-prefix) node and `Ok(None)` is returned. On mismatch,
    /// `*cur` is left pointing at the prefix node where the mismatch
    /// occurred and `Ok(Some(position))` gives the index within that node's
    /// `data` where the first differing byte lives.
    pub fn traverse(
        allocators: &AllocatorSet,
        cur: &mut NodeHandle,
        key: &ArtKey,
        depth: &mut usize,
    ) -> Option<usize> {
        loop {
            let prefix = Prefix::get(allocators, *cur);
            let len = prefix.used_len();
            for i in 0..len {
                if *depth >= key.len() || prefix.data[i] != key.byte_at(*depth) {
                    return Some(i);
                }
                *depth += 1;
            }
            let next = prefix.next;
            debug_assert!(next.is_set());
            *cur = next;
            if cur.get_type() != Some(NType::Prefix) {
                return None;
            }
        }
    }

    /// Splits the prefix node at `*cur` at byte position `pos`. After the
    /// call, `*cur`'s data holds only `old[0..pos)` (or the node is freed
    /// entirely and `*cur` reset, when `pos == 0`), and the returned handle
    /// is a new chain holding `old[pos+1..]` followed by the old `next`.
    /// The byte at `old[pos]` is returned for the caller to use as the key
    /// under the new branching node.
    pub fn split(
        allocators: &mut AllocatorSet,
        cur: &mut NodeHandle,
        pos: usize,
    ) -> crate::error::ArtResult<(u8, NodeHandle)> {
        let (mismatch_byte, tail_bytes, old_next) = {
            let p = Prefix::get(allocators, *cur);
            let len = p.used_len();
            let mismatch_byte = p.data[pos];
            let tail_bytes = p.data[pos + 1..len].to_vec();
            (mismatch_byte, tail_bytes, p.next)
        };

        let remainder = if tail_bytes.is_empty() {
            old_next
        } else {
            let h = crate::node::allocate(allocators, NType::Prefix)?;
            let rp = Prefix::get_mut(allocators, h);
            rp.data[..tail_bytes.len()].copy_from_slice(&tail_bytes);
            rp.data[PREFIX_SIZE] = tail_bytes.len() as u8;
            rp.next = old_next;
            h
        };

        if pos == 0 {
            allocators[NType::Prefix.allocator_index()].free(*cur);
            cur.reset();
        } else {
            let p = Prefix::get_mut(allocators, *cur);
            p.data[PREFIX_SIZE] = pos as u8;
            p.next = NodeHandle::UNSET;
        }

        Ok((mismatch_byte, remainder))
    }

    /// Drops the first `n` bytes of the chain at `node` (used when
    /// collapsing an inner node with a single remaining child back into its
    /// parent's prefix).
    pub fn reduce(allocators: &mut AllocatorSet, node: &mut NodeHandle, n: usize) {
        let mut remaining = n;
        while remaining > 0 {
            let p = Prefix::get(allocators, *node);
            let len = p.used_len();
            if remaining < len {
                let next = p.next;
                let tail: Vec<u8> = p.data[remaining..len].to_vec();
                let pm = Prefix::get_mut(allocators, *node);
                pm.data[..tail.len()].copy_from_slice(&tail);
                pm.data[PREFIX_SIZE] = tail.len() as u8;
                pm.next = next;
                return;
            }
            let next = p.next;
            remaining -= len;
            allocators[NType::Prefix.allocator_index()].free(*node);
            *node = next;
        }
    }

    /// Prepends `byte` followed by `child_prefix`'s bytes onto the chain
    /// rooted at `node` (used on shrink, when a node collapses to a single
    /// child and that child is itself a prefix chain).
    pub fn concatenate(
        allocators: &mut AllocatorSet,
        node: &mut NodeHandle,
        byte: u8,
        child_prefix: NodeHandle,
    ) -> crate::error::ArtResult<()> {
        let h = crate::node::allocate(allocators, NType::Prefix)?;
        {
            let p = Prefix::get_mut(allocators, h);
            p.data[0] = byte;
            p.data[PREFIX_SIZE] = 1;
            p.next = child_prefix;
        }
        if node.is_set() {
            // Walk to the tail of the existing chain and splice the new
            // head+byte in after it.
            let mut tail = *node;
            loop {
                let next = Prefix::get(allocators, tail).next;
                if next.get_type() == Some(NType::Prefix) {
                    tail = next;
                } else {
                    break;
                }
            }
            Prefix::get_mut(allocators, tail).next = h;
        } else {
            *node = h;
        }
        Ok(())
    }

    pub fn free(allocators: &mut AllocatorSet, node: NodeHandle) {
        let mut next = Prefix::get(allocators, node).next;
        crate::node::free_node(allocators, &mut next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::new_allocator_set;
    use crate::key::art_key;

    #[test]
    fn new_builds_chain_spanning_multiple_nodes() {
        let mut allocators = new_allocator_set();
        let key = art_key(&0x0102030405060708u64);
        let mut node = NodeHandle::UNSET;
        // force a chain of two: 8 bytes with a cap of PREFIX_SIZE(15) is one
        // node normally, so request more than PREFIX_SIZE to exercise the
        // chaining path directly.
        let long_key = ArtKey::from_bytes((0..20u8).collect());
        let tail = Prefix::new(&mut allocators, &mut node, &long_key, 0, 20)
            .unwrap()
            .unwrap();
        assert_eq!(Prefix::get(&allocators, node).used_len(), PREFIX_SIZE);
        assert_eq!(Prefix::get(&allocators, tail).used_len(), 5);
        let _ = key;
    }

    #[test]
    fn traverse_finds_mismatch_position() {
        let mut allocators = new_allocator_set();
        let key_a = ArtKey::from_bytes(vec![1, 2, 3, 4]);
        let key_b = ArtKey::from_bytes(vec![1, 2, 9, 4]);
        let mut node = NodeHandle::UNSET;
        Prefix::new(&mut allocators, &mut node, &key_a, 0, 4).unwrap();
        let mut cur = node;
        let mut depth = 0;
        let mismatch = Prefix::traverse(&allocators, &mut cur, &key_b, &mut depth);
        assert_eq!(mismatch, Some(2));
    }

    #[test]
    fn split_truncates_and_returns_remainder() {
        let mut allocators = new_allocator_set();
        let key = ArtKey::from_bytes(vec![1, 2, 3, 4, 5]);
        let mut node = NodeHandle::UNSET;
        Prefix::new(&mut allocators, &mut node, &key, 0, 5).unwrap();
        let (byte, remainder) = Prefix::split(&mut allocators, &mut node, 2).unwrap();
        assert_eq!(byte, 3);
        assert_eq!(Prefix::get(&allocators, node).used_len(), 2);
        assert_eq!(Prefix::get(&allocators, remainder).bytes(), &[4, 5]);
    }
}
