//! Folds an offline, single-threaded [`Art`] into a live [`ConcurrentArt`],
//! node by node, consuming the offline tree.
//!
//! The reference algorithm pairs nodes from both trees directly and copies
//! across allocators only where one side is empty. Doing that lazily here
//! would mean holding two `&mut AllocatorSet` borrows (one per tree) alive
//! through the same recursion, which the borrow checker won't allow without
//! `unsafe`. Instead this crate adopts the entire offline subtree into the
//! concurrent tree's allocator pool up front with one deep copy, then merges
//! the two copies with ordinary single-allocator recursion. Slightly more
//! eager than the reference's per-node laziness, but no unsafe code and no
//! cross-allocator bookkeeping.

use crate::alloc::AllocatorSet;
use crate::art::Art;
use crate::error::ArtResult;
use crate::handle::{NType, NodeHandle};
use crate::key::ArtKey;
use crate::node::leaf::Leaf;
use crate::node::prefix::Prefix;

use super::art::ConcurrentArt;

impl ConcurrentArt {
    /// Merges every key in `art` into `self`. `art`'s own tree is emptied by
    /// the time this returns; its `Drop` will free nothing.
    pub fn merge(&self, mut art: Art) -> ArtResult<()> {
        let src_root = art.root();
        if src_root.is_set() {
            let mut root = self.root.lock().unwrap();
            let mut dst_allocators = self.allocators.lock().unwrap();
            let mut adopted = {
                let src_rc = art.allocators().clone();
                let mut src_allocators = src_rc.borrow_mut();
                let adopted = adopt(&mut dst_allocators, &mut src_allocators, src_root)?;
                let mut old_root = src_root;
                crate::node::free_node(&mut src_allocators, &mut old_root);
                adopted
            };
            merge_into(&mut dst_allocators, &mut root, &mut adopted)?;
        }
        art.set_root(NodeHandle::UNSET);
        Ok(())
    }
}

/// Deep-copies `node` and everything reachable from it from `src` into
/// `dst`, returning the freshly allocated handle in `dst`. Inner nodes are
/// always rebuilt starting from a [`crate::node::node4::Node4`] and grown up
/// through the usual dispatch rather than copied at their original capacity
/// class — simpler, and the class is re-derived from the real child count
/// either way.
fn adopt(dst: &mut AllocatorSet, src: &mut AllocatorSet, node: NodeHandle) -> ArtResult<NodeHandle> {
    if !node.is_set() {
        return Ok(NodeHandle::UNSET);
    }
    match node.get_type().expect("set handle has a type") {
        NType::LeafInlined => Ok(node),
        NType::Leaf => {
            let mut new_head = NodeHandle::UNSET;
            let mut new_tail: Option<NodeHandle> = None;
            let mut cur = node;
            loop {
                let (count, row_ids, next) = {
                    let l = Leaf::get(src, cur);
                    (l.count, l.row_ids, l.next)
                };
                let h = crate::node::allocate(dst, NType::Leaf)?;
                {
                    let nl = Leaf::get_mut(dst, h);
                    nl.count = count;
                    nl.row_ids = row_ids;
                    nl.next = NodeHandle::UNSET;
                }
                match new_tail {
                    None => new_head = h,
                    Some(t) => Leaf::get_mut(dst, t).next = h,
                }
                new_tail = Some(h);
                if !next.is_set() {
                    break;
                }
                cur = next;
            }
            Ok(new_head)
        }
        NType::Prefix => {
            let (bytes, next) = {
                let p = Prefix::get(src, node);
                (p.bytes().to_vec(), p.next)
            };
            let new_next = adopt(dst, src, next)?;
            attach_prefix(dst, &bytes, new_next)
        }
        NType::Node4 | NType::Node16 | NType::Node48 | NType::Node256 => {
            let children = crate::node::children_with_bytes(src, node);
            let mut new_node = crate::node::node4::Node4::new(dst)?;
            for (byte, child) in children {
                let adopted_child = adopt(dst, src, child)?;
                crate::node::insert_child(dst, &mut new_node, byte, adopted_child);
            }
            Ok(new_node)
        }
    }
}

/// Builds `bytes -> term` as a fresh prefix chain, or returns `term`
/// unchanged when `bytes` is empty (no chain needed).
fn attach_prefix(allocators: &mut AllocatorSet, bytes: &[u8], term: NodeHandle) -> ArtResult<NodeHandle> {
    if bytes.is_empty() {
        return Ok(term);
    }
    let synthetic_key = ArtKey::from_bytes(bytes.to_vec());
    let mut head = NodeHandle::UNSET;
    let tail = Prefix::new(allocators, &mut head, &synthetic_key, 0, bytes.len())?
        .expect("non-empty byte slice always yields a tail handle");
    Prefix::get_mut(allocators, tail).next = term;
    Ok(head)
}

/// Flattens a (possibly multi-node) prefix chain into its full byte run,
/// the handle of its last prefix node (`None` if `node` isn't a prefix at
/// all), and the terminal non-prefix handle it leads to.
fn flatten_prefix(
    allocators: &AllocatorSet,
    node: NodeHandle,
) -> (Vec<u8>, Option<NodeHandle>, NodeHandle) {
    if node.get_type() != Some(NType::Prefix) {
        return (Vec::new(), None, node);
    }
    let mut bytes = Vec::new();
    let mut cur = node;
    loop {
        let p = Prefix::get(allocators, cur);
        bytes.extend_from_slice(p.bytes());
        let next = p.next;
        if next.get_type() == Some(NType::Prefix) {
            cur = next;
        } else {
            return (bytes, Some(cur), next);
        }
    }
}

/// Frees just the prefix-chain nodes from `node` through `tail` (inclusive),
/// leaving whatever `tail.next` pointed at untouched — used once that
/// terminal has already been relocated elsewhere in the merge.
fn free_prefix_nodes_only(allocators: &mut AllocatorSet, node: NodeHandle, tail: Option<NodeHandle>) {
    let Some(tail) = tail else { return };
    let mut cur = node;
    loop {
        let next = Prefix::get(allocators, cur).next;
        let is_tail = cur == tail;
        allocators[NType::Prefix.allocator_index()].free(cur);
        if is_tail {
            return;
        }
        cur = next;
    }
}

/// Merges `src_node` into `dst_node`, both already living in `allocators`.
/// Consumes `src_node` (resets it to unset) on every path.
fn merge_into(
    allocators: &mut AllocatorSet,
    dst_node: &mut NodeHandle,
    src_node: &mut NodeHandle,
) -> ArtResult<()> {
    if !src_node.is_set() {
        return Ok(());
    }
    if !dst_node.is_set() {
        *dst_node = *src_node;
        src_node.reset();
        return Ok(());
    }

    let (dst_prefix, dst_tail, dst_term) = flatten_prefix(allocators, *dst_node);
    let (src_prefix, src_tail, src_term) = flatten_prefix(allocators, *src_node);
    let common = dst_prefix
        .iter()
        .zip(src_prefix.iter())
        .take_while(|(a, b)| a == b)
        .count();

    if common == dst_prefix.len() && common == src_prefix.len() {
        let mut dst_term_mut = dst_term;
        let mut src_term_mut = src_term;
        merge_terminal(allocators, &mut dst_term_mut, &mut src_term_mut)?;
        write_back(allocators, dst_node, dst_tail, dst_term_mut);
        free_prefix_nodes_only(allocators, *src_node, src_tail);
        src_node.reset();
        return Ok(());
    }

    if common == dst_prefix.len() {
        // dst's prefix is a strict prefix of src's: src has one more byte
        // to resolve as a child of dst's own terminal inner node.
        let byte = src_prefix[common];
        let remainder = attach_prefix(allocators, &src_prefix[common + 1..], src_term)?;
        let mut dst_term_mut = dst_term;
        graft_child(allocators, &mut dst_term_mut, byte, remainder)?;
        write_back(allocators, dst_node, dst_tail, dst_term_mut);
        free_prefix_nodes_only(allocators, *src_node, src_tail);
        src_node.reset();
        return Ok(());
    }

    if common == src_prefix.len() {
        // Symmetric case: dst has one more byte to resolve as a child of
        // src's terminal, which becomes the surviving node at this position.
        let byte = dst_prefix[common];
        let remainder = attach_prefix(allocators, &dst_prefix[common + 1..], dst_term)?;
        free_prefix_nodes_only(allocators, *dst_node, dst_tail);
        let mut src_term_mut = src_term;
        graft_child(allocators, &mut src_term_mut, byte, remainder)?;
        *dst_node = src_term_mut;
        free_prefix_nodes_only(allocators, *src_node, src_tail);
        src_node.reset();
        return Ok(());
    }

    // True divergence at `common`: branch into a fresh Node4 holding both
    // sides' remainders, under the shared head bytes (if any).
    let dst_byte = dst_prefix[common];
    let dst_remainder = attach_prefix(allocators, &dst_prefix[common + 1..], dst_term)?;
    free_prefix_nodes_only(allocators, *dst_node, dst_tail);

    let src_byte = src_prefix[common];
    let src_remainder = attach_prefix(allocators, &src_prefix[common + 1..], src_term)?;
    free_prefix_nodes_only(allocators, *src_node, src_tail);

    let mut branch = crate::node::node4::Node4::new(allocators)?;
    crate::node::insert_child(allocators, &mut branch, dst_byte, dst_remainder);
    crate::node::insert_child(allocators, &mut branch, src_byte, src_remainder);

    *dst_node = attach_prefix(allocators, &dst_prefix[..common], branch)?;
    src_node.reset();
    Ok(())
}

fn write_back(
    allocators: &mut AllocatorSet,
    dst_node: &mut NodeHandle,
    dst_tail: Option<NodeHandle>,
    new_term: NodeHandle,
) {
    match dst_tail {
        Some(tail) => Prefix::get_mut(allocators, tail).next = new_term,
        None => *dst_node = new_term,
    }
}

/// Merges `remainder` into `parent` (an inner node) at `byte`, either
/// recursively merging with whatever is already there or adopting it
/// wholesale into an empty slot.
fn graft_child(
    allocators: &mut AllocatorSet,
    parent: &mut NodeHandle,
    byte: u8,
    remainder: NodeHandle,
) -> ArtResult<()> {
    match crate::node::get_child(allocators, *parent, byte) {
        Some(mut existing) => {
            let mut remainder_mut = remainder;
            merge_into(allocators, &mut existing, &mut remainder_mut)?;
            crate::node::insert_child_overwrite(allocators, parent, byte, existing);
        }
        None => {
            crate::node::insert_child(allocators, parent, byte, remainder);
        }
    }
    Ok(())
}

/// Merges two terminal (non-prefix) handles reached at the same logical
/// tree position. Both are leaves (doc-id chains concatenate) or both are
/// inner nodes (children merge byte-wise); a leaf can never meet an inner
/// node here, since every key indexed by one `Art` shares the same encoded
/// length and a leaf only ever appears once that full length is consumed.
fn merge_terminal(
    allocators: &mut AllocatorSet,
    dst_term: &mut NodeHandle,
    src_term: &mut NodeHandle,
) -> ArtResult<()> {
    match (
        dst_term.get_type().expect("set handle has a type"),
        src_term.get_type().expect("set handle has a type"),
    ) {
        (NType::LeafInlined | NType::Leaf, NType::LeafInlined | NType::Leaf) => {
            let mut ids = Vec::new();
            Leaf::get_doc_ids(allocators, *src_term, &mut ids, usize::MAX);
            for id in ids {
                Leaf::insert(allocators, dst_term, id)?;
            }
            Leaf::free(allocators, *src_term);
            src_term.reset();
            Ok(())
        }
        (
            NType::Node4 | NType::Node16 | NType::Node48 | NType::Node256,
            NType::Node4 | NType::Node16 | NType::Node48 | NType::Node256,
        ) => {
            let src_type = src_term.get_type().unwrap();
            for (byte, src_child) in crate::node::children_with_bytes(allocators, *src_term) {
                graft_child(allocators, dst_term, byte, src_child)?;
            }
            allocators[src_type.allocator_index()].free(*src_term);
            src_term.reset();
            Ok(())
        }
        _ => unreachable!("leaf/inner node mismatch during merge: incompatible key types"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArtConfig;
    use crate::key::art_key;

    #[test]
    fn merge_adopts_into_empty_concurrent_tree() {
        let mut offline = Art::new();
        offline.put(&art_key(&1i64), 10).unwrap();
        offline.put(&art_key(&2i64), 20).unwrap();

        let concurrent = ConcurrentArt::with_config(ArtConfig::default());
        concurrent.merge(offline).unwrap();

        assert_eq!(concurrent.get(&art_key(&1i64)), vec![10]);
        assert_eq!(concurrent.get(&art_key(&2i64)), vec![20]);
    }

    #[test]
    fn merge_combines_overlapping_and_disjoint_keys() {
        let mut offline = Art::new();
        offline.put(&art_key(&5i64), 1).unwrap();
        offline.put(&art_key(&5i64), 2).unwrap();
        offline.put(&art_key(&9i64), 3).unwrap();

        let concurrent = ConcurrentArt::with_config(ArtConfig::default());
        concurrent.put(&art_key(&5i64), 99).unwrap();
        concurrent.put(&art_key(&100i64), 7).unwrap();

        concurrent.merge(offline).unwrap();

        let mut fives = concurrent.get(&art_key(&5i64));
        fives.sort_unstable();
        assert_eq!(fives, vec![1, 2, 99]);
        assert_eq!(concurrent.get(&art_key(&9i64)), vec![3]);
        assert_eq!(concurrent.get(&art_key(&100i64)), vec![7]);
    }

    #[test]
    fn merge_empties_the_offline_tree() {
        let mut offline = Art::new();
        offline.put(&art_key(&1i64), 10).unwrap();
        let concurrent = ConcurrentArt::with_config(ArtConfig::default());
        concurrent.merge(offline).unwrap();
        // The consumed `Art` was moved into `merge`; nothing left to assert
        // on directly, but dropping a fresh empty one here exercises the
        // same `set_root(UNSET)` + `Drop` path without double-freeing.
        drop(Art::new());
    }
}
