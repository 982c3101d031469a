//! Native directory backing store.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;
use crate::archive::{Archive, FileType, ReadStream, Stat};
use crate::result::{VfsError, VfsResult};

/// A real directory on the host filesystem.
///
/// Relative paths are joined onto `root` one component at a time, so
/// `read("src/main.rs")` on a store rooted at `/work` reads `/work/src/main.rs`.
/// Components are sanitized before they get here.
#[derive(Debug, Clone)]
pub struct DirArchive {
    root: PathBuf,
}

impl DirArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn native(&self, path: &str) -> PathBuf {
        let mut native = self.root.clone();
        native.extend(path.split('/').filter(|component| !component.is_empty()));
        native
    }

    /// Opens `path` for writing, truncating it.
    pub fn open_write(&self, path: &str) -> VfsResult<fs::File> {
        trace!(path, "open for writing");
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.native(path))
            .map_err(|err| VfsError::from_io(err, path))
    }

    /// Opens `path` for appending, creating it if needed.
    pub fn open_append(&self, path: &str) -> VfsResult<fs::File> {
        trace!(path, "open for appending");
        fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.native(path))
            .map_err(|err| VfsError::from_io(err, path))
    }

    pub fn mkdir(&self, path: &str) -> VfsResult<()> {
        fs::create_dir_all(self.native(path)).map_err(|err| VfsError::from_io(err, path))
    }

    /// Removes a file or an empty directory.
    pub fn delete(&self, path: &str) -> VfsResult<()> {
        let native = self.native(path);
        let metadata = fs::symlink_metadata(&native).map_err(|err| VfsError::from_io(err, path))?;
        let removed = if metadata.is_dir() {
            fs::remove_dir(&native)
        } else {
            fs::remove_file(&native)
        };
        removed.map_err(|err| VfsError::from_io(err, path))
    }
}

impl Archive for DirArchive {
    fn stat(&self, path: &str) -> VfsResult<Stat> {
        let metadata = fs::symlink_metadata(self.native(path))
            .map_err(|err| VfsError::from_io(err, path))?;
        let file_type = metadata.file_type();
        let file_type = if file_type.is_symlink() {
            FileType::Symlink
        } else if file_type.is_dir() {
            FileType::Directory
        } else if file_type.is_file() {
            FileType::Regular
        } else {
            FileType::Other
        };

        Ok(Stat {
            file_type,
            size: if file_type == FileType::Directory { 0 } else { metadata.len() },
            modified: metadata.modified().ok(),
            read_only: metadata.permissions().readonly(),
        })
    }

    fn enumerate(&self, dir: &str) -> VfsResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.native(dir)).map_err(|err| VfsError::from_io(err, dir))? {
            // Names that are not valid UTF-8 cannot be addressed by a virtual path.
            if let Ok(name) = entry?.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn open_read(&self, path: &str) -> VfsResult<Box<dyn ReadStream>> {
        // `stat` follows symlinks here; whether they may be crossed is decided by the caller.
        let native = self.native(path);
        let metadata = fs::metadata(&native).map_err(|err| VfsError::from_io(err, path))?;
        if metadata.is_dir() {
            return Err(VfsError::IsDirectory(path.to_owned()));
        }
        let file = fs::File::open(native).map_err(|err| VfsError::from_io(err, path))?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io::Read;
    use super::*;

    fn populated() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("data/levels")).unwrap();
        fs::write(dir.path().join("data/levels/one.txt"), b"level one").unwrap();
        fs::write(dir.path().join("data/readme"), b"read me").unwrap();
        dir
    }

    #[test]
    fn stats_files_and_directories() {
        let dir = populated();
        let archive = DirArchive::new(dir.path());

        let file = archive.stat("data/levels/one.txt").unwrap();
        assert!(file.is_file());
        assert_eq!(file.size, 9);

        assert!(archive.stat("data/levels").unwrap().is_dir());
        assert!(archive.stat("").unwrap().is_dir());
        assert!(matches!(archive.stat("data/nope"), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn enumerates_sorted_children() {
        let dir = populated();
        let archive = DirArchive::new(dir.path());
        assert_eq!(archive.enumerate("data").unwrap(), vec!["levels", "readme"]);
        assert_eq!(archive.enumerate("").unwrap(), vec!["data"]);
    }

    #[test]
    fn reads_files_but_not_directories() {
        let dir = populated();
        let archive = DirArchive::new(dir.path());

        let mut stream = archive.open_read("data/readme").unwrap();
        assert_eq!(stream.length().unwrap(), 7);
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "read me");

        assert!(matches!(archive.open_read("data"), Err(VfsError::IsDirectory(_))));
    }

    #[test]
    fn writes_appends_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let archive = DirArchive::new(dir.path());
        archive.mkdir("saves/slot1").unwrap();

        {
            use std::io::Write;
            archive.open_write("saves/slot1/game.sav").unwrap().write_all(b"abc").unwrap();
            archive.open_append("saves/slot1/game.sav").unwrap().write_all(b"def").unwrap();
        }
        assert_eq!(fs::read(dir.path().join("saves/slot1/game.sav")).unwrap(), b"abcdef");

        archive.delete("saves/slot1/game.sav").unwrap();
        archive.delete("saves/slot1").unwrap();
        assert!(!archive.exists("saves/slot1"));
    }

    #[cfg(unix)]
    #[test]
    fn reports_symlinks_without_following() {
        let dir = populated();
        std::os::unix::fs::symlink(dir.path().join("data"), dir.path().join("link")).unwrap();
        let archive = DirArchive::new(dir.path());
        assert_eq!(archive.stat("link").unwrap().file_type, FileType::Symlink);
    }
}
