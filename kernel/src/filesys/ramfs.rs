//! Flat, fixed-capacity file table kept entirely in memory.
//!
//! Capacity is a type parameter so the kernel instance can be large while tests use
//! small tables.

use arrayvec::ArrayString;

use super::{FileKind, FsError};
use crate::constants::fs::MAX_FILENAME;

type FileName = ArrayString<MAX_FILENAME>;

#[derive(Clone, Copy)]
struct FileRecord<const SIZE: usize> {
    in_use: bool,
    name: FileName,
    kind: FileKind,
    size: usize,
    data: [u8; SIZE],
}

impl<const SIZE: usize> FileRecord<SIZE> {
    const EMPTY: Self = FileRecord {
        in_use: false,
        name: ArrayString::new_const(),
        kind: FileKind::Regular,
        size: 0,
        data: [0; SIZE],
    };

    fn info(&self) -> FileInfo<'_> {
        FileInfo {
            name: self.name.as_str(),
            kind: self.kind,
            size: self.size,
        }
    }
}

/// Metadata of one file, borrowed from the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo<'a> {
    pub name: &'a str,
    pub kind: FileKind,
    pub size: usize,
}

/// `FILES` slots of at most `SIZE` bytes each.
pub struct RamFs<const FILES: usize, const SIZE: usize> {
    files: [FileRecord<SIZE>; FILES],
}

impl<const FILES: usize, const SIZE: usize> Default for RamFs<FILES, SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const FILES: usize, const SIZE: usize> RamFs<FILES, SIZE> {
    pub const fn new() -> Self {
        RamFs {
            files: [FileRecord::EMPTY; FILES],
        }
    }

    /// Drops every file.
    pub fn clear(&mut self) {
        for record in self.files.iter_mut() {
            record.in_use = false;
        }
    }

    pub fn create(&mut self, name: &str, kind: FileKind) -> Result<(), FsError> {
        if self.position(name).is_some() {
            log::debug!("[FS] File already exists: {}", name);
            return Err(FsError::AlreadyExists);
        }
        let name = FileName::from(name).map_err(|_| FsError::InvalidName)?;
        if name.is_empty() {
            return Err(FsError::InvalidName);
        }

        let Some(record) = self.files.iter_mut().find(|r| !r.in_use) else {
            log::warn!("[FS] No free file slots");
            return Err(FsError::NoSpace);
        };
        record.in_use = true;
        record.name = name;
        record.kind = kind;
        record.size = 0;
        record.data.fill(0);
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> Result<(), FsError> {
        let index = self.position(name).ok_or(FsError::NotFound)?;
        self.files[index].in_use = false;
        Ok(())
    }

    /// Replaces the contents of a regular file. Returns the number of bytes stored.
    pub fn write(&mut self, name: &str, bytes: &[u8]) -> Result<usize, FsError> {
        let record = self.regular_file_mut(name)?;
        if bytes.len() > SIZE {
            log::debug!("[FS] File too large: {} bytes", bytes.len());
            return Err(FsError::TooLarge(bytes.len()));
        }
        record.data[..bytes.len()].copy_from_slice(bytes);
        record.size = bytes.len();
        Ok(bytes.len())
    }

    /// Copies the start of a regular file into `buf`, truncating to its length.
    pub fn read(&self, name: &str, buf: &mut [u8]) -> Result<usize, FsError> {
        self.read_at(name, 0, buf)
    }

    /// Copies bytes starting at `offset`. Returns 0 once `offset` reaches the end.
    pub fn read_at(&self, name: &str, offset: usize, buf: &mut [u8]) -> Result<usize, FsError> {
        let index = self.position(name).ok_or(FsError::NotFound)?;
        let record = &self.files[index];
        if record.kind != FileKind::Regular {
            return Err(FsError::NotAFile);
        }
        let start = offset.min(record.size);
        let len = buf.len().min(record.size - start);
        buf[..len].copy_from_slice(&record.data[start..start + len]);
        Ok(len)
    }

    pub fn find(&self, name: &str) -> Option<FileInfo<'_>> {
        self.position(name).map(|i| self.files[i].info())
    }

    /// Live files in slot order.
    pub fn entries(&self) -> impl Iterator<Item = FileInfo<'_>> + '_ {
        self.files.iter().filter(|r| r.in_use).map(FileRecord::info)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.files
            .iter()
            .position(|r| r.in_use && r.name.as_str() == name)
    }

    fn regular_file_mut(&mut self, name: &str) -> Result<&mut FileRecord<SIZE>, FsError> {
        let index = self.position(name).ok_or(FsError::NotFound)?;
        let record = &mut self.files[index];
        if record.kind != FileKind::Regular {
            return Err(FsError::NotAFile);
        }
        Ok(record)
    }
}
