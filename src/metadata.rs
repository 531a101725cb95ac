//! On-disk metadata sidecar: the root pointer plus enough allocator
//! bookkeeping to describe the slab topology, written alongside the index
//! file at [`crate::config::ArtConfig::metadata_path`].
//!
//! Unlike the index file itself (a dense block stream, §4.10), the metadata
//! file is small and meant to be human-inspectable, so it's serialized as
//! JSON via `serde_json` rather than given its own binary framing.

use serde_derive::{Deserialize, Serialize};

use crate::alloc::AllocatorSet;

/// Where the root of the tree lives, depending on which serialize path
/// wrote this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RootPointer {
    /// Written by [`crate::art::Art::serialize`]: a block pointer into the
    /// node-tree index file.
    Block { block_id: i64, offset: u32 },
    /// Written by [`crate::art::Art::fast_serialize`]: the raw node handle,
    /// valid because a bulk buffer dump preserves every handle's
    /// `(buffer_id, offset)` unchanged.
    Buffers { handle: u64 },
}

/// One node type's slab bookkeeping, enough to report occupancy without
/// reopening the index file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatorDescriptor {
    pub node_type: u8,
    pub allocation_size: usize,
    pub buffer_count: usize,
    pub total_allocations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub root: RootPointer,
    pub allocators: Vec<AllocatorDescriptor>,
}

pub(crate) fn descriptors(allocators: &AllocatorSet) -> Vec<AllocatorDescriptor> {
    allocators
        .iter()
        .map(|slab| AllocatorDescriptor {
            node_type: slab.node_type() as u8,
            allocation_size: slab.allocation_size(),
            buffer_count: slab.buffer_count(),
            total_allocations: slab.total_allocations(),
        })
        .collect()
}
