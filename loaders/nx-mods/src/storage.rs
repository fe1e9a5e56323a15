//! Flat storage container used for prebuilt romfs images
//!
//! A `romfs.storage` blob is a flat container: a header, a path table, and
//! the packed file data. Paths are stored absolute (leading `/`) with `/`
//! separators, and lookups are byte-exact. The resolver relies on two
//! properties of this module: enumeration order is table order, and the
//! builder writes files in exactly the order they were added.

use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;

/// Storage container signature ('NXRF')
pub const STORAGE_SIGNATURE: u32 = 0x4652_584E;

/// Current storage container version
pub const STORAGE_VERSION: u32 = 1;

/// Longest stored path accepted when parsing, in bytes
const MAX_PATH_LEN: u32 = 4096;

/// A single file entry inside a storage container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    /// Absolute path of the file within the container
    pub path: String,
    /// Byte offset of the file data from the start of the blob
    pub offset: u64,
    /// Size of the file data in bytes
    pub size: u64,
}

/// Read-only view over a serialized storage blob
///
/// Cloning is cheap: clones share the underlying buffer. Callers can use
/// [`RomfsStorage::ptr_eq`] to detect that two views are backed by the very
/// same blob, which is how the resolver's identity shortcut is observed.
#[derive(Debug, Clone)]
pub struct RomfsStorage {
    data: Arc<[u8]>,
    entries: Vec<StorageEntry>,
}

impl RomfsStorage {
    /// Parse a storage container from an in-memory blob
    pub fn new(data: Arc<[u8]>) -> Result<Self> {
        let mut cursor = Cursor::new(&data[..]);

        let signature = cursor.read_u32::<LittleEndian>()?;
        if signature != STORAGE_SIGNATURE {
            return Err(Error::invalid_storage(format!(
                "bad signature: 0x{signature:08X}"
            )));
        }

        let version = cursor.read_u32::<LittleEndian>()?;
        if version != STORAGE_VERSION {
            return Err(Error::invalid_storage(format!(
                "unsupported version: {version}"
            )));
        }

        let count = cursor.read_u32::<LittleEndian>()?;
        let mut entries = Vec::with_capacity(count as usize);

        for _ in 0..count {
            let path_len = cursor.read_u32::<LittleEndian>()?;
            if path_len > MAX_PATH_LEN {
                return Err(Error::invalid_storage(format!(
                    "path length {path_len} exceeds limit"
                )));
            }

            let mut path_buf = vec![0u8; path_len as usize];
            cursor.read_exact(&mut path_buf)?;
            let path = String::from_utf8(path_buf).map_err(|_| Error::InvalidUtf8)?;

            let offset = cursor.read_u64::<LittleEndian>()?;
            let size = cursor.read_u64::<LittleEndian>()?;

            let end = offset
                .checked_add(size)
                .ok_or_else(|| Error::invalid_storage("entry range overflow"))?;
            if end > data.len() as u64 {
                return Err(Error::invalid_storage(format!(
                    "entry '{path}' extends past end of blob"
                )));
            }

            entries.push(StorageEntry { path, offset, size });
        }

        Ok(Self { data, entries })
    }

    /// Open a storage container from a file on disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::new(data.into())
    }

    /// Enumerate the container's file entries in table order
    pub fn entries(&self) -> &[StorageEntry] {
        &self.entries
    }

    /// Read a file's contents by its stored path
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.path == path)
            .ok_or_else(|| Error::FileNotFound(path.to_string()))?;
        Ok(self.slice(entry).to_vec())
    }

    /// Borrow the data bytes of an entry
    pub fn slice(&self, entry: &StorageEntry) -> &[u8] {
        &self.data[entry.offset as usize..(entry.offset + entry.size) as usize]
    }

    /// The serialized blob backing this view
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Whether two views share the same underlying blob
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.data, &b.data)
    }
}

/// Builder that serializes (path, data) pairs into one storage blob
///
/// Files are written in the order they were added; the builder performs no
/// reordering or deduplication of its own.
#[derive(Debug, Default)]
pub struct RomfsBuilder {
    files: Vec<(String, Vec<u8>)>,
}

impl RomfsBuilder {
    /// Create a new empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a file for the container
    pub fn add_file(&mut self, path: impl Into<String>, data: Vec<u8>) {
        self.files.push((path.into(), data));
    }

    /// Number of files queued so far
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Serialize the container and return a readable view over it
    pub fn build(self) -> Result<RomfsStorage> {
        let table_size: usize = self
            .files
            .iter()
            .map(|(path, _)| 4 + path.len() + 8 + 8)
            .sum();
        let header_size = 4 + 4 + 4;

        let mut blob = Vec::with_capacity(
            header_size + table_size + self.files.iter().map(|(_, d)| d.len()).sum::<usize>(),
        );

        blob.write_u32::<LittleEndian>(STORAGE_SIGNATURE)?;
        blob.write_u32::<LittleEndian>(STORAGE_VERSION)?;
        blob.write_u32::<LittleEndian>(self.files.len() as u32)?;

        let mut data_offset = (header_size + table_size) as u64;
        for (path, data) in &self.files {
            blob.write_u32::<LittleEndian>(path.len() as u32)?;
            blob.extend_from_slice(path.as_bytes());
            blob.write_u64::<LittleEndian>(data_offset)?;
            blob.write_u64::<LittleEndian>(data.len() as u64)?;
            data_offset += data.len() as u64;
        }

        for (_, data) in &self.files {
            blob.extend_from_slice(data);
        }

        RomfsStorage::new(blob.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_read_back() {
        let mut builder = RomfsBuilder::new();
        builder.add_file("/data/a.bin", b"alpha".to_vec());
        builder.add_file("/data/b.bin", b"beta".to_vec());

        let storage = builder.build().unwrap();
        assert_eq!(storage.entries().len(), 2);
        assert_eq!(storage.read_file("/data/a.bin").unwrap(), b"alpha");
        assert_eq!(storage.read_file("/data/b.bin").unwrap(), b"beta");
    }

    #[test]
    fn test_enumeration_preserves_insertion_order() {
        let mut builder = RomfsBuilder::new();
        builder.add_file("/z.bin", vec![1]);
        builder.add_file("/a.bin", vec![2]);

        let storage = builder.build().unwrap();
        let paths: Vec<_> = storage.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["/z.bin", "/a.bin"]);
    }

    #[test]
    fn test_reparse_round_trip() {
        let mut builder = RomfsBuilder::new();
        builder.add_file("/file.txt", b"contents".to_vec());
        let storage = builder.build().unwrap();

        let reparsed = RomfsStorage::new(storage.as_bytes().to_vec().into()).unwrap();
        assert_eq!(reparsed.read_file("/file.txt").unwrap(), b"contents");
    }

    #[test]
    fn test_bad_signature_rejected() {
        let result = RomfsStorage::new(vec![0u8; 16].into());
        assert!(matches!(result, Err(Error::InvalidStorage(_))));
    }

    #[test]
    fn test_missing_file() {
        let storage = RomfsBuilder::new().build().unwrap();
        assert!(matches!(
            storage.read_file("/nope"),
            Err(Error::FileNotFound(_))
        ));
    }

    #[test]
    fn test_entry_past_end_rejected() {
        let mut builder = RomfsBuilder::new();
        builder.add_file("/a", b"abc".to_vec());
        let mut blob = builder.build().unwrap().as_bytes().to_vec();
        blob.truncate(blob.len() - 1);

        assert!(matches!(
            RomfsStorage::new(blob.into()),
            Err(Error::InvalidStorage(_))
        ));
    }

    #[test]
    fn test_clone_shares_blob() {
        let storage = RomfsBuilder::new().build().unwrap();
        let clone = storage.clone();
        assert!(RomfsStorage::ptr_eq(&storage, &clone));
    }
}
