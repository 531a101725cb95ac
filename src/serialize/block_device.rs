//! Positional byte storage the serializer writes fixed-size blocks against.
//! A small trait rather than a concrete `File` so `Serializer`/`Deserializer`
//! stay unit-testable against an in-memory buffer.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// Positional read/write against a fixed address space. Implementations
/// must zero-extend reads/writes past current end-of-file rather than
/// error, mirroring the reference's `pread`/`pwrite` usage against a file
/// pre-sized in block-sized chunks.
pub trait BlockDevice: Send + Sync {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;
    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()>;
}

/// File-descriptor-backed device. Opened on construction, closed on `Drop`
/// (via `File`'s own `Drop`), matching the reference `SequentialSerializer`'s
/// fd ownership.
pub struct FileBlockDevice {
    file: File,
}

impl FileBlockDevice {
    pub fn open(path: impl AsRef<Path>) -> io::Result<FileBlockDevice> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(FileBlockDevice { file })
    }
}

impl BlockDevice for FileBlockDevice {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        #[cfg(unix)]
        {
            self.file.read_exact_at(buf, offset)
        }
        #[cfg(not(unix))]
        {
            use std::io::{Read, Seek, SeekFrom};
            let mut f = self.file.try_clone()?;
            f.seek(SeekFrom::Start(offset))?;
            f.read_exact(buf)
        }
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()> {
        #[cfg(unix)]
        {
            self.file.write_all_at(buf, offset)
        }
        #[cfg(not(unix))]
        {
            use std::io::{Seek, SeekFrom, Write};
            let mut f = self.file.try_clone()?;
            f.seek(SeekFrom::Start(offset))?;
            f.write_all(buf)
        }
    }
}

/// In-memory test double. Grows on demand; reads past the current length
/// return zeros rather than erroring, matching a sparse pre-sized file.
#[derive(Default)]
pub struct MemBlockDevice {
    data: Mutex<Vec<u8>>,
}

impl MemBlockDevice {
    pub fn new() -> MemBlockDevice {
        MemBlockDevice::default()
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }
}

impl BlockDevice for MemBlockDevice {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let data = self.data.lock().unwrap();
        let start = offset as usize;
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = data.get(start + i).copied().unwrap_or(0);
        }
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()> {
        let mut data = self.data.lock().unwrap();
        let end = offset as usize + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[offset as usize..end].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_device_reads_back_what_was_written() {
        let dev = MemBlockDevice::new();
        dev.write_at(10, b"hello").unwrap();
        let mut buf = [0u8; 5];
        dev.read_at(10, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn mem_device_reads_unwritten_region_as_zero() {
        let dev = MemBlockDevice::new();
        let mut buf = [0xFFu8; 4];
        dev.read_at(100, &mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0, 0]);
    }

    #[test]
    fn file_device_round_trips_through_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        {
            let dev = FileBlockDevice::open(&path).unwrap();
            dev.write_at(0, b"payload").unwrap();
        }
        let dev = FileBlockDevice::open(&path).unwrap();
        let mut buf = [0u8; 7];
        dev.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"payload");
    }
}
