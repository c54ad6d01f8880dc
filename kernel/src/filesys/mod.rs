//! In-memory filesystem.

use core::fmt;

pub mod ramfs;

use spin::Mutex;

use crate::constants::fs::{MAX_FILES, MAX_FILE_SIZE};
pub use ramfs::{FileInfo, RamFs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotFound,
    AlreadyExists,
    /// Empty, or longer than the name field holds.
    InvalidName,
    NoSpace,
    NotAFile,
    TooLarge(usize),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::NotFound => write!(f, "File not found"),
            FsError::AlreadyExists => write!(f, "File already exists"),
            FsError::InvalidName => write!(f, "Invalid file name"),
            FsError::NoSpace => write!(f, "No free file slots"),
            FsError::NotAFile => write!(f, "Not a regular file"),
            FsError::TooLarge(size) => write!(f, "File too large: {} bytes", size),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            FileKind::Regular => "file",
            FileKind::Directory => "dir",
        })
    }
}

pub type KernelFs = RamFs<MAX_FILES, MAX_FILE_SIZE>;

pub static FILESYSTEM: Mutex<KernelFs> = Mutex::new(RamFs::new());

const README: &str = "Welcome to NOS - A Teaching Operating System!\n\
This is a simple RISC-V OS for educational purposes.\n";

const INFO: &str = "NOS supports:\n\
- Memory management\n\
- Process scheduling\n\
- Simple file system\n\
- Basic shell\n";

/// Creates the files every fresh system starts with.
pub fn seed<const FILES: usize, const SIZE: usize>(
    fs: &mut RamFs<FILES, SIZE>,
) -> Result<(), FsError> {
    for (name, contents) in [("README.txt", README), ("info.txt", INFO)] {
        fs.create(name, FileKind::Regular)?;
        fs.write(name, contents.as_bytes())?;
    }
    Ok(())
}

/// Clears the kernel filesystem and seeds it.
pub fn init() {
    let mut fs = FILESYSTEM.lock();
    fs.clear();
    log::info!("File system initialized (in-memory)");
    if let Err(e) = seed(&mut fs) {
        log::error!("Failed to create initial files: {}", e);
    }
}
