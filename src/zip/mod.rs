//! Read-only zip archive support: stored and deflated entries, zip64, CP437 names.

use std::path::Path;
use std::sync::Arc;
use crate::archive::{Archive, ArchiveFormat, Archiver};
use crate::result::VfsResult;
use crate::zip::result::ZipError;
use crate::zip::zip_archive::ZipArchive;

pub mod cp437;
pub mod deflate;
pub mod headers;
pub mod plaintext;
pub mod result;
pub mod zip_archive;
pub mod zip_file;

const ZIP_FORMAT: ArchiveFormat = ArchiveFormat {
    extension: "ZIP",
    description: "PkZip/WinZip/Info-Zip compatible",
    supports_symlinks: false,
};

pub struct ZipArchiver;

impl Archiver for ZipArchiver {
    fn info(&self) -> &ArchiveFormat {
        &ZIP_FORMAT
    }

    fn open_archive(&self, path: &Path) -> VfsResult<Option<Arc<dyn Archive>>> {
        match ZipArchive::new(path) {
            Ok(archive) => Ok(Some(Arc::new(archive))),
            Err(ZipError::NotAnArchive) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
