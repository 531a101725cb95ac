//! Tunables the reference implementation hardcodes as constants. Kept as
//! plain structs with sane `Default`s so tests can shrink the slab buffer
//! size without touching production behavior.

/// Bytes carved out of a single OS-level allocation for a slab buffer.
pub const BUFFER_ALLOC_SIZE: usize = 262_144;

/// Maximum bytes of key data a single prefix node can hold inline.
pub const PREFIX_SIZE: usize = 15;

/// Maximum doc ids a single leaf chain node can hold inline.
pub const LEAF_SIZE: usize = 4;

pub const NODE_4_CAPACITY: usize = 4;
pub const NODE_16_CAPACITY: usize = 16;
pub const NODE_48_CAPACITY: usize = 48;
pub const NODE_256_CAPACITY: usize = 256;

pub const NODE_48_SHRINK_THRESHOLD: usize = 12;
pub const NODE_256_SHRINK_THRESHOLD: usize = 36;

/// Size in bytes of a single block in the on-disk index file.
pub const BLOCK_SIZE: usize = 4096;

/// Bounded retries a spinlock performs before yielding the thread.
pub const SPIN_RETRY_LIMIT: usize = 100;

/// Allocator- and lock-tunables for a single [`crate::art::Art`] or
/// [`crate::concurrent::ConcurrentArt`] instance.
#[derive(Debug, Clone)]
pub struct ArtConfig {
    pub slab: SlabConfig,
    /// Path of the metadata sidecar file, if this tree is backed by disk.
    pub metadata_path: Option<std::path::PathBuf>,
}

impl Default for ArtConfig {
    fn default() -> Self {
        ArtConfig {
            slab: SlabConfig::default(),
            metadata_path: None,
        }
    }
}

/// Per-node-type slab buffer sizing.
#[derive(Debug, Clone, Copy)]
pub struct SlabConfig {
    pub buffer_alloc_size: usize,
}

impl Default for SlabConfig {
    fn default() -> Self {
        SlabConfig {
            buffer_alloc_size: BUFFER_ALLOC_SIZE,
        }
    }
}
