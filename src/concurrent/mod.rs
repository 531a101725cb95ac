//! Lock-coupled concurrent access to the same node family [`crate::art::Art`]
//! uses single-threaded, plus folding an offline [`crate::art::Art`] into a
//! live [`ConcurrentArt`].

pub mod art;
pub mod lock;
pub mod merge;
pub mod node;

pub use art::ConcurrentArt;
pub use lock::{LockWord, ReadGuard, WriteGuard};
pub use node::LockTable;
