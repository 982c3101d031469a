use std::collections::TryReserveError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use crate::zip::result::ZipError;

pub type VfsResult<T> = Result<T, VfsError>;

#[derive(Error, Debug)]
pub enum VfsError {
    #[error("initialization failed: {}", .0)]
    Init(String),

    #[error("not found: {}", .0)]
    NotFound(String),

    #[error("{} is neither a directory nor a supported archive", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("{} is not mounted", .0.display())]
    NotMounted(PathBuf),

    #[error("files still open")]
    FilesStillOpen,

    #[error("insecure path: {}", .0)]
    InsecurePath(String),

    #[error("bad filename: {}", .0)]
    BadFilename(String),

    #[error("symbolic links are not permitted: {}", .0)]
    SymlinkForbidden(String),

    #[error("is a directory: {}", .0)]
    IsDirectory(String),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("no write directory is set")]
    NoWriteDir,

    #[error("file is not open for reading")]
    NotOpenForReading,

    #[error("file is not open for writing")]
    NotOpenForWriting,

    #[error("file handle is closed")]
    Closed,

    #[error("out of memory: {}", .0)]
    OutOfMemory(#[from] TryReserveError),

    #[error("{}", .0)]
    Zip(#[from] ZipError),

    #[error("{}", .0)]
    Io(#[from] io::Error),
}

impl VfsError {
    /// Maps native "no such file" errors onto [`VfsError::NotFound`].
    pub(crate) fn from_io(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => VfsError::NotFound(path.to_owned()),
            _ => VfsError::Io(err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound(_) | VfsError::Zip(ZipError::FileNotFound))
    }
}
