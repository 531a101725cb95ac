pub mod byte;
pub mod slab;

pub use byte::{ByteAllocator, SystemByteAllocator};
pub use slab::SlabAllocator;

use crate::handle::NType;

/// One slab allocator per node type that owns a slab slot, indexed by
/// [`NType::allocator_index`]. `LeafInlined` never appears here — it has no
/// slab footprint.
pub type AllocatorSet = Vec<SlabAllocator>;

pub fn new_allocator_set() -> AllocatorSet {
    vec![
        SlabAllocator::new(NType::Prefix, std::mem::size_of::<crate::node::prefix::Prefix>()),
        SlabAllocator::new(NType::Leaf, std::mem::size_of::<crate::node::leaf::Leaf>()),
        SlabAllocator::new(NType::Node4, std::mem::size_of::<crate::node::node4::Node4>()),
        SlabAllocator::new(NType::Node16, std::mem::size_of::<crate::node::node16::Node16>()),
        SlabAllocator::new(NType::Node48, std::mem::size_of::<crate::node::node48::Node48>()),
        SlabAllocator::new(
            NType::Node256,
            std::mem::size_of::<crate::node::node256::Node256>(),
        ),
    ]
}
