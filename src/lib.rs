//! An adaptive radix tree index engine: a key→doc-id multimap with an
//! inlined-leaf fast path, adaptive Node4/16/48/256 fan-out, a
//! lock-coupled concurrent variant, and block-oriented on-disk persistence.

pub mod alloc;
pub mod art;
pub mod concurrent;
pub mod config;
pub mod error;
pub mod handle;
pub mod key;
pub mod metadata;
pub mod node;
pub mod serialize;

pub use art::Art;
pub use concurrent::ConcurrentArt;
pub use config::ArtConfig;
pub use error::{ArtError, ArtResult};
pub use key::{art_key, ArtKey, Encodable};
pub use metadata::{AllocatorDescriptor, Metadata, RootPointer};
pub use serialize::{BlockDevice, Deserializer, FileBlockDevice, MemBlockDevice, Serializer};
