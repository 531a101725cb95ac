//! Fixed-size slab allocator. One instance backs every node type (Prefix,
//! Leaf, Node4, Node16, Node48, Node256); each owns a vector of
//! [`BUFFER_ALLOC_SIZE`](crate::config::BUFFER_ALLOC_SIZE)-byte buffers laid
//! out as `[bitmap][slot 0][slot 1]...`.

use std::io::{Read, Write};
use std::marker::PhantomData;
use std::mem::size_of;

use roaring::RoaringBitmap;

use crate::alloc::byte::{ByteAllocator, SystemByteAllocator};
use crate::config::BUFFER_ALLOC_SIZE;
use crate::error::{ArtError, ArtResult};
use crate::handle::{NType, NodeHandle};

const BITS_PER_WORD: usize = 64;

struct SlabBuffer {
    data: Box<[u8]>,
    allocation_count: usize,
}

/// A pool of fixed-size buffers for one node type.
pub struct SlabAllocator<A: ByteAllocator = SystemByteAllocator> {
    node_type: NType,
    allocation_size: usize,
    bitmask_count: usize,
    allocations_per_buffer: usize,
    allocation_offset: usize,
    buffers: Vec<SlabBuffer>,
    /// Buffer ids with at least one free slot. A `RoaringBitmap` keeps this
    /// sparse — most of the tree's lifetime has only one or two buffers
    /// with free space per node type, out of potentially thousands of
    /// buffers total once serialized + reopened.
    buffers_with_free_space: RoaringBitmap,
    total_allocations: usize,
    allocator: A,
}

impl SlabAllocator<SystemByteAllocator> {
    pub fn new(node_type: NType, allocation_size: usize) -> Self {
        SlabAllocator::with_allocator(node_type, allocation_size, SystemByteAllocator)
    }

    /// Rebuilds a `SlabAllocator` from a dump written by [`Self::serialize_buffers`].
    /// Counterpart of the "fast-serialize" bulk reload path: every buffer's
    /// raw bytes come back unchanged, so handles minted before the dump
    /// (`buffer_id`, `offset`) stay valid against the reloaded allocator.
    pub fn deserialize_buffers<R: Read>(reader: &mut R) -> ArtResult<SlabAllocator> {
        let mut type_byte = [0u8; 1];
        reader.read_exact(&mut type_byte)?;
        let node_type = NType::from_u8(type_byte[0])
            .ok_or_else(|| ArtError::Corrupt("unknown node type byte in buffer dump".into()))?;
        let mut size_buf = [0u8; 8];
        reader.read_exact(&mut size_buf)?;
        let allocation_size = u64::from_le_bytes(size_buf) as usize;
        let mut count_buf = [0u8; 4];
        reader.read_exact(&mut count_buf)?;
        let buffer_count = u32::from_le_bytes(count_buf) as usize;

        let mut slab = SlabAllocator::new(node_type, allocation_size);
        for _ in 0..buffer_count {
            let mut data = vec![0u8; BUFFER_ALLOC_SIZE].into_boxed_slice();
            reader.read_exact(&mut data)?;
            let mut ac_buf = [0u8; 4];
            reader.read_exact(&mut ac_buf)?;
            let allocation_count = u32::from_le_bytes(ac_buf) as usize;

            let buffer_id = slab.buffers.len() as u32;
            if allocation_count < slab.allocations_per_buffer {
                slab.buffers_with_free_space.insert(buffer_id);
            }
            slab.total_allocations += allocation_count;
            slab.buffers.push(SlabBuffer { data, allocation_count });
        }
        Ok(slab)
    }
}

impl<A: ByteAllocator> SlabAllocator<A> {
    pub fn with_allocator(node_type: NType, allocation_size: usize, allocator: A) -> Self {
        debug_assert!(allocation_size > 0);
        let (bitmask_count, allocations_per_buffer) = compute_layout(allocation_size);
        SlabAllocator {
            node_type,
            allocation_size,
            bitmask_count,
            allocations_per_buffer,
            allocation_offset: bitmask_count * size_of::<u64>(),
            buffers: Vec::new(),
            buffers_with_free_space: RoaringBitmap::new(),
            total_allocations: 0,
            allocator,
        }
    }

    pub fn node_type(&self) -> NType {
        self.node_type
    }

    pub fn allocation_size(&self) -> usize {
        self.allocation_size
    }

    pub fn total_allocations(&self) -> usize {
        self.total_allocations
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Reserve a fresh slot and return a handle pointing at it. The slot's
    /// bytes are zeroed (the byte allocator zeroes whole buffers on
    /// creation; a reused slot from a `free` is never re-zeroed, matching
    /// the reference implementation — callers always overwrite every field
    /// of a freshly `New`-ed node).
    pub fn allocate(&mut self) -> ArtResult<NodeHandle> {
        if self.buffers_with_free_space.is_empty() {
            let buffer_id = self.buffers.len() as u32;
            if buffer_id as usize >= u32::MAX as usize {
                return Err(ArtError::Allocation("buffer id space exhausted".into()));
            }
            let data = self.allocator.allocate(BUFFER_ALLOC_SIZE)?;
            self.buffers.push(SlabBuffer {
                data,
                allocation_count: 0,
            });
            self.buffers_with_free_space.insert(buffer_id);
        }

        let buffer_id = self
            .buffers_with_free_space
            .min()
            .expect("just ensured non-empty");

        let offset = self.find_and_set_free_slot(buffer_id)?;

        let buffer = &mut self.buffers[buffer_id as usize];
        buffer.allocation_count += 1;
        self.total_allocations += 1;
        if buffer.allocation_count == self.allocations_per_buffer {
            self.buffers_with_free_space.remove(buffer_id);
        }

        let mut handle = NodeHandle::UNSET;
        handle.set_ptr(buffer_id, offset as u32);
        handle.set_type(self.node_type);
        Ok(handle)
    }

    pub fn free(&mut self, handle: NodeHandle) {
        debug_assert!(!handle.is_serialized());
        let buffer_id = handle.buffer_id();
        let offset = handle.offset() as usize;
        let buffer = &mut self.buffers[buffer_id as usize];
        clear_bit(bitmap_mut(buffer, self.bitmask_count), offset);
        if buffer.allocation_count == self.allocations_per_buffer {
            self.buffers_with_free_space.insert(buffer_id);
        }
        buffer.allocation_count -= 1;
        self.total_allocations -= 1;
    }

    fn find_and_set_free_slot(&mut self, buffer_id: u32) -> ArtResult<usize> {
        let buffer = &mut self.buffers[buffer_id as usize];
        let words = bitmap_mut(buffer, self.bitmask_count);
        for (word_idx, word) in words.iter_mut().enumerate() {
            if *word != u64::MAX {
                // Idiomatic equivalent of the reference implementation's
                // BASE/SHIFT hierarchical descent: the lowest clear bit of
                // a word is the lowest set bit of its complement.
                let bit = (!*word).trailing_zeros() as usize;
                let slot = word_idx * BITS_PER_WORD + bit;
                if slot >= self.allocations_per_buffer {
                    continue;
                }
                *word |= 1u64 << bit;
                return Ok(slot);
            }
        }
        Err(ArtError::Allocation(
            "buffer reported free space but no clear bit was found".into(),
        ))
    }

    fn slot_ptr(&self, handle: NodeHandle) -> *const u8 {
        debug_assert!(!handle.is_serialized());
        let buffer = &self.buffers[handle.buffer_id() as usize];
        let start = self.allocation_offset + handle.offset() as usize * self.allocation_size;
        buffer.data[start..start + self.allocation_size].as_ptr()
    }

    fn slot_ptr_mut(&mut self, handle: NodeHandle) -> *mut u8 {
        debug_assert!(!handle.is_serialized());
        let allocation_offset = self.allocation_offset;
        let allocation_size = self.allocation_size;
        let buffer = &mut self.buffers[handle.buffer_id() as usize];
        let start = allocation_offset + handle.offset() as usize * allocation_size;
        buffer.data[start..start + allocation_size].as_mut_ptr()
    }

    /// # Safety contract
    /// `T` must be the exact struct this allocator was sized for
    /// (`size_of::<T>() <= allocation_size`), and the slot must have been
    /// populated by a matching `get_mut::<T>`. This mirrors the reference
    /// implementation's untyped `Get<T>` cast over a byte buffer.
    pub fn get<T>(&self, handle: NodeHandle) -> &T {
        debug_assert!(size_of::<T>() <= self.allocation_size);
        unsafe { &*(self.slot_ptr(handle) as *const T) }
    }

    pub fn get_mut<T>(&mut self, handle: NodeHandle) -> &mut T {
        debug_assert!(size_of::<T>() <= self.allocation_size);
        unsafe { &mut *(self.slot_ptr_mut(handle) as *mut T) }
    }

    /// Writes every buffer's raw bytes (bitmap + slots) to `writer`,
    /// preceded by a small self-describing header. Used by the
    /// "fast-serialize" bulk reload path, which moves whole buffers instead
    /// of re-walking the node tree: a buffer's own bitmap already marks
    /// which slots are live, so dumping free slots' bytes unchanged is
    /// harmless — holes are permissible.
    pub fn serialize_buffers<W: Write>(&self, writer: &mut W) -> ArtResult<()> {
        writer.write_all(&[self.node_type as u8])?;
        writer.write_all(&(self.allocation_size as u64).to_le_bytes())?;
        writer.write_all(&(self.buffers.len() as u32).to_le_bytes())?;
        for buffer in &self.buffers {
            writer.write_all(&buffer.data)?;
            writer.write_all(&(buffer.allocation_count as u32).to_le_bytes())?;
        }
        Ok(())
    }
}

fn bitmap_mut(buffer: &mut SlabBuffer, bitmask_count: usize) -> &mut [u64] {
    let bytes = &mut buffer.data[..bitmask_count * size_of::<u64>()];
    unsafe { std::slice::from_raw_parts_mut(bytes.as_mut_ptr() as *mut u64, bitmask_count) }
}

fn clear_bit(words: &mut [u64], slot: usize) {
    let word_idx = slot / BITS_PER_WORD;
    let bit = slot % BITS_PER_WORD;
    words[word_idx] &= !(1u64 << bit);
}

/// Computes `(bitmask_count, allocations_per_buffer)` for a given
/// `allocation_size`, such that the bitmap plus the slots it tracks fit in
/// `BUFFER_ALLOC_SIZE` and no bitmap word is asked to track more than its
/// own 64 bits. Mirrors the reference `FixedSizeAllocator` constructor.
fn compute_layout(allocation_size: usize) -> (usize, usize) {
    let bits_per_value = BITS_PER_WORD;
    let mut curr_alloc_size = 0usize;
    let mut bitmask_count = 0usize;
    let mut allocations_per_buffer = 0usize;

    while curr_alloc_size < BUFFER_ALLOC_SIZE {
        if bitmask_count == 0 || (bitmask_count * bits_per_value) % allocations_per_buffer.max(1) == 0
        {
            bitmask_count += 1;
            curr_alloc_size += size_of::<u64>();
        }

        let remaining_alloc_size = BUFFER_ALLOC_SIZE - curr_alloc_size;
        let remaining_allocations = (remaining_alloc_size / allocation_size).min(bits_per_value);

        if remaining_allocations == 0 {
            break;
        }
        allocations_per_buffer += remaining_allocations;
        curr_alloc_size += remaining_allocations * allocation_size;
    }

    (bitmask_count, allocations_per_buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    struct Dummy {
        a: u64,
        b: u64,
    }

    #[test]
    fn layout_fits_in_buffer() {
        let (bitmask_count, per_buffer) = compute_layout(size_of::<Dummy>());
        assert!(bitmask_count * size_of::<u64>() + per_buffer * size_of::<Dummy>() <= BUFFER_ALLOC_SIZE);
        assert!(per_buffer > 0);
    }

    #[test]
    fn allocate_and_free_reuses_slot() {
        let mut slab = SlabAllocator::new(NType::Node4, size_of::<Dummy>());
        let h1 = slab.allocate().unwrap();
        assert_eq!(slab.total_allocations(), 1);
        slab.free(h1);
        assert_eq!(slab.total_allocations(), 0);
        let h2 = slab.allocate().unwrap();
        assert_eq!(h1.buffer_id(), h2.buffer_id());
        assert_eq!(h1.offset(), h2.offset());
    }

    #[test]
    fn allocate_spans_multiple_buffers_when_full() {
        let mut slab = SlabAllocator::new(NType::Node4, size_of::<Dummy>());
        let (_, per_buffer) = compute_layout(size_of::<Dummy>());
        let mut handles = Vec::new();
        for _ in 0..per_buffer + 1 {
            handles.push(slab.allocate().unwrap());
        }
        assert_eq!(slab.buffer_count(), 2);
        assert_ne!(handles[0].buffer_id(), handles[per_buffer].buffer_id());
    }

    #[test]
    fn serialize_buffers_round_trips_live_slots_and_handles() {
        let mut slab = SlabAllocator::new(NType::Node4, size_of::<Dummy>());
        let h1 = slab.allocate().unwrap();
        let h2 = slab.allocate().unwrap();
        slab.get_mut::<Dummy>(h1).a = 11;
        slab.get_mut::<Dummy>(h2).a = 22;
        slab.free(h1);

        let mut buf = Vec::new();
        slab.serialize_buffers(&mut buf).unwrap();

        let mut cursor = &buf[..];
        let restored = SlabAllocator::deserialize_buffers(&mut cursor).unwrap();
        assert_eq!(restored.node_type(), NType::Node4);
        assert_eq!(restored.allocation_size(), size_of::<Dummy>());
        assert_eq!(restored.total_allocations(), 1);
        assert_eq!(restored.get::<Dummy>(h2).a, 22);
    }

    #[test]
    fn get_mut_then_get_round_trips_value() {
        let mut slab = SlabAllocator::new(NType::Node4, size_of::<Dummy>());
        let h = slab.allocate().unwrap();
        {
            let d = slab.get_mut::<Dummy>(h);
            d.a = 7;
            d.b = 9;
        }
        let d = slab.get::<Dummy>(h);
        assert_eq!(d.a, 7);
        assert_eq!(d.b, 9);
    }
}
