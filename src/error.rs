use std::fmt;

/// Errors that can escape the boundary of this crate.
///
/// Precondition violations (inserting into a node that was never
/// initialized, dereferencing a still-serialized handle, etc.) are not
/// represented here: they are programmer errors and surface as
/// `debug_assert!` failures instead, matching the rest of the tree's
/// trust-the-caller discipline at internal seams.
#[derive(Debug)]
pub enum ArtError {
    /// The byte allocator backing a slab could not satisfy a request.
    Allocation(String),
    /// A read or write against the block device failed.
    Io(std::io::Error),
    /// The on-disk format did not match what the deserializer expected.
    Corrupt(String),
}

impl fmt::Display for ArtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtError::Allocation(msg) => write!(f, "allocation failure: {msg}"),
            ArtError::Io(err) => write!(f, "i/o failure: {err}"),
            ArtError::Corrupt(msg) => write!(f, "corrupt index format: {msg}"),
        }
    }
}

impl std::error::Error for ArtError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArtError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ArtError {
    fn from(err: std::io::Error) -> Self {
        ArtError::Io(err)
    }
}

impl From<serde_json::Error> for ArtError {
    fn from(err: serde_json::Error) -> Self {
        ArtError::Corrupt(format!("metadata (de)serialize failed: {err}"))
    }
}

pub type ArtResult<T> = Result<T, ArtError>;
