//! The packed 64-bit node handle.
//!
//! Bit layout (low to high):
//!
//! ```text
//! [ 0 .. 32)  buffer_id  (u32)
//! [32 .. 56)  offset     (24 bits)
//! [56 .. 63)  type       (7 bits)
//! [63]        serialized flag
//! ```
//!
//! When `type == LEAF_INLINED`, bits `[0..56)` hold a document id directly
//! instead of a buffer id/offset pair. `data == 0` is the canonical unset
//! value: the type field is zero, which is not a valid [`NType`] discriminant.

const BUFFER_ID_BITS: u32 = 32;
const OFFSET_BITS: u32 = 24;
const TYPE_BITS: u32 = 7;

const OFFSET_SHIFT: u32 = BUFFER_ID_BITS;
const TYPE_SHIFT: u32 = OFFSET_SHIFT + OFFSET_BITS;
const SERIALIZED_SHIFT: u32 = TYPE_SHIFT + TYPE_BITS;

const BUFFER_ID_MASK: u64 = (1u64 << BUFFER_ID_BITS) - 1;
const OFFSET_MASK: u64 = (1u64 << OFFSET_BITS) - 1;
const TYPE_MASK: u64 = (1u64 << TYPE_BITS) - 1;
const DOC_ID_MASK: u64 = (1u64 << (TYPE_SHIFT)) - 1;

/// The closed tagged union of node kinds. Kept as a 7-bit field inside the
/// packed handle rather than dispatched through a vtable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NType {
    Prefix = 1,
    Leaf = 2,
    Node4 = 3,
    Node16 = 4,
    Node48 = 5,
    Node256 = 6,
    LeafInlined = 7,
}

impl NType {
    pub const fn from_u8(v: u8) -> Option<NType> {
        match v {
            1 => Some(NType::Prefix),
            2 => Some(NType::Leaf),
            3 => Some(NType::Node4),
            4 => Some(NType::Node16),
            5 => Some(NType::Node48),
            6 => Some(NType::Node256),
            7 => Some(NType::LeafInlined),
            _ => None,
        }
    }

    /// Index into the per-type allocator vector (0-based, inner-node and
    /// leaf/prefix types only — `LeafInlined` never owns a slab slot).
    pub const fn allocator_index(self) -> usize {
        (self as u8 - 1) as usize
    }
}

/// A node handle: either a slab location or an inlined document id.
///
/// `NodeHandle` is `Copy` and exactly 8 bytes, matching the reference
/// implementation's choice to pack an owning reference into one machine
/// word so inner-node children arrays stay cache-friendly.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeHandle(pub(crate) u64);

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.is_set() {
            return write!(f, "NodeHandle(unset)");
        }
        if self.is_serialized() {
            let bp = self.as_block_pointer();
            return write!(f, "NodeHandle(serialized {:?})", bp);
        }
        match self.get_type() {
            Some(NType::LeafInlined) => {
                write!(f, "NodeHandle(inlined doc={})", self.doc_id())
            }
            Some(t) => write!(
                f,
                "NodeHandle({:?} buffer={} offset={})",
                t,
                self.buffer_id(),
                self.offset()
            ),
            None => write!(f, "NodeHandle(invalid)"),
        }
    }
}

/// `{block_id, offset}` addressing a position in the on-disk index file.
/// Reuses the handle's own buffer_id/offset fields when `serialized` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPointer {
    pub block_id: i64,
    pub offset: u32,
}

pub const INVALID_BLOCK: i64 = -1;

impl Default for BlockPointer {
    fn default() -> Self {
        BlockPointer {
            block_id: INVALID_BLOCK,
            offset: 0,
        }
    }
}

impl BlockPointer {
    pub fn is_valid(self) -> bool {
        self.block_id != INVALID_BLOCK
    }
}

impl NodeHandle {
    pub const UNSET: NodeHandle = NodeHandle(0);

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(data: u64) -> NodeHandle {
        NodeHandle(data)
    }

    pub fn is_set(self) -> bool {
        (self.0 >> TYPE_SHIFT) & TYPE_MASK != 0
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }

    pub fn is_serialized(self) -> bool {
        (self.0 >> SERIALIZED_SHIFT) & 1 == 1
    }

    pub fn get_type(self) -> Option<NType> {
        NType::from_u8(((self.0 >> TYPE_SHIFT) & TYPE_MASK) as u8)
    }

    /// # Panics
    /// In debug builds, if `self` is unset or serialized.
    pub fn set_type(&mut self, t: NType) {
        self.0 = (self.0 & !(TYPE_MASK << TYPE_SHIFT)) | ((t as u64) << TYPE_SHIFT);
    }

    pub fn buffer_id(self) -> u32 {
        debug_assert!(!self.is_serialized());
        (self.0 & BUFFER_ID_MASK) as u32
    }

    pub fn offset(self) -> u32 {
        debug_assert!(!self.is_serialized());
        ((self.0 >> OFFSET_SHIFT) & OFFSET_MASK) as u32
    }

    pub fn set_ptr(&mut self, buffer_id: u32, offset: u32) {
        debug_assert!(offset as u64 <= OFFSET_MASK);
        self.0 = (self.0 & !(BUFFER_ID_MASK | (OFFSET_MASK << OFFSET_SHIFT)))
            | (buffer_id as u64 & BUFFER_ID_MASK)
            | (((offset as u64) & OFFSET_MASK) << OFFSET_SHIFT);
    }

    pub fn doc_id(self) -> u64 {
        debug_assert_eq!(self.get_type(), Some(NType::LeafInlined));
        self.0 & DOC_ID_MASK
    }

    pub fn set_doc_id(&mut self, doc_id: u64) {
        debug_assert!(doc_id <= DOC_ID_MASK);
        self.0 = (self.0 & !DOC_ID_MASK) | (doc_id & DOC_ID_MASK);
        self.set_type(NType::LeafInlined);
    }

    pub fn set_serialized(&mut self) {
        self.0 |= 1u64 << SERIALIZED_SHIFT;
    }

    pub fn unset_serialized(&mut self) {
        self.0 &= !(1u64 << SERIALIZED_SHIFT);
    }

    /// Encode a [`BlockPointer`] into the handle's buffer_id/offset fields
    /// and raise the serialized flag. The node's type tag is preserved so
    /// the caller still knows what kind of record to expect on read-back.
    pub fn set_block_pointer(&mut self, bp: BlockPointer) {
        self.0 = (self.0 & !(BUFFER_ID_MASK | (OFFSET_MASK << OFFSET_SHIFT)))
            | ((bp.block_id as u64) & BUFFER_ID_MASK)
            | (((bp.offset as u64) & OFFSET_MASK) << OFFSET_SHIFT);
        self.set_serialized();
    }

    pub fn as_block_pointer(self) -> BlockPointer {
        debug_assert!(self.is_serialized());
        BlockPointer {
            block_id: (self.0 & BUFFER_ID_MASK) as i64,
            offset: ((self.0 >> OFFSET_SHIFT) & OFFSET_MASK) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_pointer_shape() {
        let mut h = NodeHandle::UNSET;
        h.set_ptr(7, 123);
        h.set_type(NType::Node4);
        assert!(h.is_set());
        assert!(!h.is_serialized());
        assert_eq!(h.buffer_id(), 7);
        assert_eq!(h.offset(), 123);
        assert_eq!(h.get_type(), Some(NType::Node4));
    }

    #[test]
    fn roundtrips_inline_doc_id() {
        let mut h = NodeHandle::UNSET;
        h.set_doc_id(0xDEAD_BEEF);
        assert_eq!(h.get_type(), Some(NType::LeafInlined));
        assert_eq!(h.doc_id(), 0xDEAD_BEEF);
    }

    #[test]
    fn unset_is_not_set() {
        assert!(!NodeHandle::UNSET.is_set());
    }

    #[test]
    fn serialized_round_trips_block_pointer() {
        let mut h = NodeHandle::UNSET;
        h.set_type(NType::Leaf);
        h.set_block_pointer(BlockPointer {
            block_id: 42,
            offset: 900,
        });
        assert!(h.is_serialized());
        assert_eq!(
            h.as_block_pointer(),
            BlockPointer {
                block_id: 42,
                offset: 900
            }
        );
        assert_eq!(h.get_type(), Some(NType::Leaf));
    }
}
