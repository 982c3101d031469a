use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR_STR};
use std::sync::Arc;
use tracing::{debug, info};
use crate::archive::{self, Archive, ArchiveFormat, Stat};
use crate::dir::DirArchive;
use crate::file::{File, OpenMode};
use crate::mount::{self, MountEntry, MountTable};
use crate::path;
use crate::result::{VfsError, VfsResult};

struct WriteDir {
    path: PathBuf,
    archive: Arc<DirArchive>,
}

impl WriteDir {
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.archive) > 1
    }
}

/// A layered virtual filesystem.
///
/// Backing stores (directories and archives) are mounted into a single
/// namespace and searched in mount-table order. All state lives in this
/// value: create it with [`VirtualFileSystem::init`], mutate the search path
/// through `&mut self`, and drop it (or call [`deinit`](Self::deinit)) to
/// tear everything down.
pub struct VirtualFileSystem {
    base_dir: PathBuf,
    mounts: MountTable,
    write_dir: Option<WriteDir>,
    permit_symlinks: bool,
}

impl VirtualFileSystem {
    /// Initializes a filesystem context.
    ///
    /// `argv0` is the program's first argument, used to locate the base
    /// directory when the running executable cannot be queried directly.
    pub fn init(argv0: &str) -> VfsResult<Self> {
        let base_dir = locate_base_dir(argv0)?;
        info!(base_dir = %base_dir.display(), "virtual filesystem initialized");
        Ok(Self {
            base_dir,
            mounts: MountTable::new(),
            write_dir: None,
            permit_symlinks: false,
        })
    }

    /// Unmounts everything and releases the context.
    pub fn deinit(mut self) {
        debug!(mounts = self.mounts.len(), "virtual filesystem shutting down");
        self.mounts.clear();
        self.write_dir = None;
    }

    /// Directory containing the running executable.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Native directory separator of the host platform.
    pub fn dir_separator() -> &'static str {
        MAIN_SEPARATOR_STR
    }

    pub fn supported_archive_types(&self) -> impl Iterator<Item = &'static ArchiveFormat> {
        archive::supported_archive_types()
    }

    pub fn permit_symbolic_links(&mut self, permit: bool) {
        self.permit_symlinks = permit;
    }

    pub fn symbolic_links_permitted(&self) -> bool {
        self.permit_symlinks
    }

    /// Adds a directory or archive to the search path at `mount_point`.
    ///
    /// With `append` the store is searched after everything already
    /// mounted, otherwise before. Mounting an already mounted path succeeds
    /// without changing the search path.
    pub fn mount(&mut self, backing_path: impl AsRef<Path>, mount_point: &str, append: bool) -> VfsResult<()> {
        let backing_path = backing_path.as_ref();
        let mount_point = path::sanitize(mount_point)?;
        if self.mounts.contains(backing_path) {
            debug!(path = %backing_path.display(), "already mounted");
            return Ok(());
        }

        let archive = archive::open_backing(backing_path)?;
        let entry = MountEntry::new(backing_path, mount_point, append, archive);
        debug!(
            path = %backing_path.display(),
            mount_point = %entry.mount_point(),
            append,
            "mounted"
        );
        self.mounts.insert(entry);
        Ok(())
    }

    /// Removes `backing_path` from the search path.
    ///
    /// Fails if it is not mounted or if files opened through it are still open.
    pub fn unmount(&mut self, backing_path: impl AsRef<Path>) -> VfsResult<()> {
        let backing_path = backing_path.as_ref();
        self.mounts.remove(backing_path)?;
        debug!(path = %backing_path.display(), "unmounted");
        Ok(())
    }

    pub fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    /// Backing paths in search order.
    pub fn search_path(&self) -> Vec<&Path> {
        self.mounts.iter().map(MountEntry::backing_path).collect()
    }

    pub fn mount_point(&self, backing_path: impl AsRef<Path>) -> VfsResult<String> {
        let backing_path = backing_path.as_ref();
        self.mounts
            .find(backing_path)
            .map(MountEntry::mount_point)
            .ok_or_else(|| VfsError::NotMounted(backing_path.to_path_buf()))
    }

    /// The mount entry that supplies `path`.
    pub fn resolve(&self, path: &str) -> VfsResult<&MountEntry> {
        let path = path::sanitize(path)?;
        self.mounts.resolve(&path, self.permit_symlinks)
    }

    /// Backing path of the store that supplies `path`.
    pub fn real_dir(&self, path: &str) -> VfsResult<&Path> {
        self.resolve(path).map(MountEntry::backing_path)
    }

    pub fn stat(&self, path: &str) -> VfsResult<Stat> {
        let path = path::sanitize(path)?;
        if path.is_empty() {
            return Ok(Stat::directory(true));
        }

        let mut failure = None;
        for entry in self.mounts.iter() {
            if entry.is_virtual_parent(&path) {
                return Ok(Stat::directory(true));
            }
            let Some(rel) = entry.relative(&path) else {
                continue;
            };
            if let Err(err) = entry.check_symlinks(rel, self.permit_symlinks) {
                failure.get_or_insert(err);
                continue;
            }
            match entry.archive().stat(rel) {
                Ok(stat) => return Ok(stat),
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }
        Err(failure.unwrap_or(VfsError::NotFound(path)))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }

    pub fn is_directory(&self, path: &str) -> VfsResult<bool> {
        Ok(self.stat(path)?.is_dir())
    }

    /// True if `path` exists and is not a directory.
    pub fn file_exists(&self, path: &str) -> bool {
        self.stat(path).is_ok_and(|stat| !stat.is_dir())
    }

    pub fn dir_exists(&self, path: &str) -> bool {
        self.stat(path).is_ok_and(|stat| stat.is_dir())
    }

    /// Names in the virtual directory `dir`, merged across every store that
    /// provides it, sorted and without duplicates.
    pub fn enumerate_files(&self, dir: &str) -> VfsResult<Vec<String>> {
        let dir = path::sanitize(dir)?;
        let mut names = BTreeSet::new();
        for entry in self.mounts.iter() {
            if let Some(child) = entry.virtual_child(&dir) {
                names.insert(child.to_owned());
                continue;
            }
            let Some(rel) = entry.relative(&dir) else {
                continue;
            };
            if entry.check_symlinks(rel, self.permit_symlinks).is_err() {
                continue;
            }
            if let Ok(children) = entry.archive().enumerate(rel) {
                names.extend(children);
            }
        }
        Ok(names.into_iter().collect())
    }

    /// Opens `path` for reading from the first store, in search order, that has it.
    pub fn open_read(&self, path: &str) -> VfsResult<File> {
        let path = path::sanitize(path)?;
        if path.is_empty() {
            return Err(VfsError::IsDirectory(path));
        }

        let mut failure = None;
        for entry in self.mounts.iter() {
            if entry.is_virtual_parent(&path) {
                return Err(VfsError::IsDirectory(path));
            }
            let Some(rel) = entry.relative(&path) else {
                continue;
            };
            if let Err(err) = entry.check_symlinks(rel, self.permit_symlinks) {
                failure.get_or_insert(err);
                continue;
            }
            match entry.archive().open_read(rel) {
                Ok(stream) => {
                    debug!(path = %path, from = %entry.backing_path().display(), "opened for reading");
                    return Ok(File::reader(path, stream, Arc::clone(entry.archive())));
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }
        Err(failure.unwrap_or(VfsError::NotFound(path)))
    }

    /// Reads the whole file at `path`.
    pub fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        let mut file = self.open_read(path)?;
        let contents = file.read_to_vec()?;
        file.close()?;
        Ok(contents)
    }

    /// Sets the native directory that receives all writes.
    ///
    /// Fails while files opened for writing in the previous write directory
    /// are still open.
    pub fn set_write_dir(&mut self, dir: impl AsRef<Path>) -> VfsResult<()> {
        let dir = dir.as_ref();
        self.release_write_dir()?;
        let metadata = fs::metadata(dir)
            .map_err(|err| VfsError::from_io(err, &dir.display().to_string()))?;
        if !metadata.is_dir() {
            return Err(VfsError::NotADirectory(dir.to_path_buf()));
        }
        debug!(path = %dir.display(), "write directory set");
        self.write_dir = Some(WriteDir {
            path: dir.to_path_buf(),
            archive: Arc::new(DirArchive::new(dir)),
        });
        Ok(())
    }

    /// Disables writing.
    pub fn clear_write_dir(&mut self) -> VfsResult<()> {
        self.release_write_dir()
    }

    pub fn write_dir(&self) -> Option<&Path> {
        self.write_dir.as_ref().map(|write_dir| write_dir.path.as_path())
    }

    fn release_write_dir(&mut self) -> VfsResult<()> {
        if self.write_dir.as_ref().is_some_and(WriteDir::in_use) {
            return Err(VfsError::FilesStillOpen);
        }
        self.write_dir = None;
        Ok(())
    }

    /// Sanitizes `path` and checks it against the write directory.
    fn writable(&self, path: &str) -> VfsResult<(&WriteDir, String)> {
        let path = path::sanitize(path)?;
        let write_dir = self.write_dir.as_ref().ok_or(VfsError::NoWriteDir)?;
        mount::check_symlinks(&*write_dir.archive, &path, self.permit_symlinks)?;
        Ok((write_dir, path))
    }

    /// Creates or truncates `path` in the write directory.
    pub fn open_write(&self, path: &str) -> VfsResult<File> {
        let (write_dir, path) = self.writable(path)?;
        let file = write_dir.archive.open_write(&path)?;
        let origin: Arc<dyn Archive> = write_dir.archive.clone();
        Ok(File::writer(path, OpenMode::Write, file, origin))
    }

    /// Opens `path` in the write directory for appending, creating it if needed.
    pub fn open_append(&self, path: &str) -> VfsResult<File> {
        let (write_dir, path) = self.writable(path)?;
        let file = write_dir.archive.open_append(&path)?;
        let origin: Arc<dyn Archive> = write_dir.archive.clone();
        Ok(File::writer(path, OpenMode::Append, file, origin))
    }

    /// Creates `path` and any missing parents in the write directory.
    pub fn mkdir(&self, path: &str) -> VfsResult<()> {
        let (write_dir, path) = self.writable(path)?;
        write_dir.archive.mkdir(&path)
    }

    /// Removes a file or empty directory from the write directory.
    pub fn delete(&self, path: &str) -> VfsResult<()> {
        let (write_dir, path) = self.writable(path)?;
        if path.is_empty() {
            return Err(VfsError::IsDirectory(path));
        }
        write_dir.archive.delete(&path)
    }
}

fn locate_base_dir(argv0: &str) -> VfsResult<PathBuf> {
    if let Some(dir) = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        return Ok(dir);
    }

    match Path::new(argv0).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent
            .canonicalize()
            .map_err(|err| VfsError::Init(format!("cannot resolve {}: {err}", parent.display()))),
        _ => Err(VfsError::Init(format!(
            "cannot locate the base directory from {argv0:?}"
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn init_finds_base_dir() {
        let vfs = VirtualFileSystem::init("").unwrap();
        assert!(vfs.base_dir().is_dir());
        assert!(vfs.search_path().is_empty());
        assert!(!vfs.symbolic_links_permitted());
        assert!(vfs.write_dir().is_none());
    }

    #[test]
    fn root_always_exists() {
        let vfs = VirtualFileSystem::init("").unwrap();
        assert!(vfs.dir_exists("/"));
        assert!(!vfs.exists("missing.txt"));
        assert!(vfs.enumerate_files("/").unwrap().is_empty());
    }

    #[test]
    fn bad_paths_are_rejected_before_lookup() {
        let vfs = VirtualFileSystem::init("").unwrap();
        assert!(matches!(vfs.open_read("../secret"), Err(VfsError::InsecurePath(_))));
        assert!(matches!(vfs.stat("a:b"), Err(VfsError::BadFilename(_))));
    }

    #[test]
    fn writing_needs_a_write_dir() {
        let vfs = VirtualFileSystem::init("").unwrap();
        assert!(matches!(vfs.open_write("out.txt"), Err(VfsError::NoWriteDir)));
        assert!(matches!(vfs.mkdir("dir"), Err(VfsError::NoWriteDir)));
    }

    #[test]
    fn separator_matches_platform() {
        assert_eq!(VirtualFileSystem::dir_separator(), std::path::MAIN_SEPARATOR.to_string());
    }
}
