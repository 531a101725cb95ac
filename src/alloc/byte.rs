//! The raw byte allocator seam. The system allocator itself is an external
//! collaborator (out of scope per the top-level design), but every slab
//! buffer goes through this trait instead of calling `Vec::with_capacity`
//! directly, so a test can swap in an allocator that counts or fails requests.

use crate::error::{ArtError, ArtResult};

pub trait ByteAllocator: std::fmt::Debug {
    fn allocate(&self, size: usize) -> ArtResult<Box<[u8]>>;
}

/// Default allocator: delegates to the global Rust allocator via a boxed
/// slice. Zeroed on allocation, matching the reference implementation's
/// buffers (a freshly allocated slab must start with an all-clear bitmap).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemByteAllocator;

impl ByteAllocator for SystemByteAllocator {
    fn allocate(&self, size: usize) -> ArtResult<Box<[u8]>> {
        if size == 0 {
            return Err(ArtError::Allocation("zero-sized allocation".into()));
        }
        Ok(vec![0u8; size].into_boxed_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_allocator_zeroes_memory() {
        let a = SystemByteAllocator;
        let buf = a.allocate(64).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }
}
