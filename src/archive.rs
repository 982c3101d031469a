//! Backing stores and the archive format registry.
//!
//! A backing store is anything that can supply files under relative paths:
//! a native directory ([`DirArchive`](crate::dir::DirArchive)) or an archive
//! file opened by one of the registered [`Archiver`]s.

use std::fs;
use std::io::{self, Read, Seek};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, trace};
use crate::dir::DirArchive;
use crate::result::{VfsError, VfsResult};
use crate::zip::ZipArchiver;

/// Description of an archive container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveFormat {
    /// File extension, upper case, without the dot.
    pub extension: &'static str,
    pub description: &'static str,
    pub supports_symlinks: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    Other,
}

/// Metadata for a path inside a backing store or the virtual namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub file_type: FileType,
    /// Size in bytes (0 for directories).
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub read_only: bool,
}

impl Stat {
    pub fn directory(read_only: bool) -> Self {
        Self {
            file_type: FileType::Directory,
            size: 0,
            modified: None,
            read_only,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.file_type == FileType::Regular
    }
}

/// A readable, seekable stream produced by a backing store.
pub trait ReadStream: Read + Seek + Send {
    /// Total length of the stream in bytes.
    fn length(&self) -> io::Result<u64>;
}

impl ReadStream for fs::File {
    fn length(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

/// A mounted backing store.
///
/// Paths are relative, `/`-separated and already sanitized; `""` is the
/// store's root.
pub trait Archive: Send + Sync {
    fn stat(&self, path: &str) -> VfsResult<Stat>;

    /// Names of the direct children of `dir`.
    fn enumerate(&self, dir: &str) -> VfsResult<Vec<String>>;

    fn open_read(&self, path: &str) -> VfsResult<Box<dyn ReadStream>>;

    fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }
}

/// Opens one archive container format.
pub trait Archiver: Send + Sync {
    fn info(&self) -> &ArchiveFormat;

    /// Opens `path` as this format. `Ok(None)` means the file is not in this
    /// format and another archiver should be tried.
    fn open_archive(&self, path: &Path) -> VfsResult<Option<Arc<dyn Archive>>>;
}

static ZIP: ZipArchiver = ZipArchiver;

static ARCHIVERS: [&dyn Archiver; 1] = [&ZIP];

pub fn archivers() -> &'static [&'static dyn Archiver] {
    &ARCHIVERS
}

pub fn supported_archive_types() -> impl Iterator<Item = &'static ArchiveFormat> {
    archivers().iter().map(|archiver| archiver.info())
}

/// Opens a native path as a backing store.
///
/// Directories are always accepted. Files are offered first to archivers
/// whose extension matches, then to the rest.
pub fn open_backing(path: &Path) -> VfsResult<Arc<dyn Archive>> {
    let metadata = fs::metadata(path)
        .map_err(|err| VfsError::from_io(err, &path.display().to_string()))?;
    if metadata.is_dir() {
        debug!(path = %path.display(), "opening directory backing store");
        return Ok(Arc::new(DirArchive::new(path)));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    let (matching, others): (Vec<&dyn Archiver>, Vec<&dyn Archiver>) = archivers()
        .iter()
        .copied()
        .partition(|archiver| archiver.info().extension.eq_ignore_ascii_case(extension));

    for archiver in matching.into_iter().chain(others) {
        trace!(path = %path.display(), format = archiver.info().extension, "trying archiver");
        if let Some(archive) = archiver.open_archive(path)? {
            debug!(path = %path.display(), format = archiver.info().extension, "opened archive");
            return Ok(archive);
        }
    }

    Err(VfsError::UnsupportedFormat(path.to_path_buf()))
}
