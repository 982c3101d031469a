//! The mount table: an ordered search path of backing stores.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use crate::archive::{Archive, FileType};
use crate::path;
use crate::result::{VfsError, VfsResult};

/// A backing store bound to a prefix of the virtual namespace.
pub struct MountEntry {
    backing_path: PathBuf,
    mount_point: String,
    appended: bool,
    archive: Arc<dyn Archive>,
}

impl MountEntry {
    /// `mount_point` must already be sanitized.
    pub fn new(backing_path: impl Into<PathBuf>, mount_point: String, appended: bool, archive: Arc<dyn Archive>) -> Self {
        Self {
            backing_path: backing_path.into(),
            mount_point,
            appended,
            archive,
        }
    }

    pub fn backing_path(&self) -> &Path {
        &self.backing_path
    }

    /// Mount point in display form: `/` for the root, `dir/sub/` otherwise.
    pub fn mount_point(&self) -> String {
        if self.mount_point.is_empty() {
            "/".to_owned()
        } else {
            format!("{}/", self.mount_point)
        }
    }

    pub fn appended(&self) -> bool {
        self.appended
    }

    pub fn archive(&self) -> &Arc<dyn Archive> {
        &self.archive
    }

    /// True while a file opened through this entry is still alive.
    pub fn in_use(&self) -> bool {
        Arc::strong_count(&self.archive) > 1
    }

    /// The part of `path` below this entry's mount point, if the mount point prefixes it.
    pub fn relative<'p>(&self, path: &'p str) -> Option<&'p str> {
        if self.mount_point.is_empty() {
            return Some(path);
        }
        match path.strip_prefix(self.mount_point.as_str())? {
            "" => Some(""),
            rest => rest.strip_prefix('/'),
        }
    }

    /// True if `path` names a directory above the mount point, such as `a`
    /// for an entry mounted at `a/b`.
    pub fn is_virtual_parent(&self, path: &str) -> bool {
        (path.is_empty() && !self.mount_point.is_empty())
            || self
                .mount_point
                .strip_prefix(path)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// The mount point component directly below the virtual directory `dir`.
    pub fn virtual_child<'a>(&'a self, dir: &str) -> Option<&'a str> {
        if !self.is_virtual_parent(dir) {
            return None;
        }
        let rest = if dir.is_empty() {
            self.mount_point.as_str()
        } else {
            &self.mount_point[dir.len() + 1..]
        };
        rest.split('/').next()
    }

    /// Refuses `rel` if it crosses a symbolic link in the backing store.
    pub fn check_symlinks(&self, rel: &str, permit_symlinks: bool) -> VfsResult<()> {
        check_symlinks(&*self.archive, rel, permit_symlinks)
    }
}

/// Refuses `rel` if any of its components is a symbolic link in `archive`.
pub fn check_symlinks(archive: &dyn Archive, rel: &str, permit_symlinks: bool) -> VfsResult<()> {
    if permit_symlinks || rel.is_empty() {
        return Ok(());
    }
    for prefix in path::ancestors(rel).chain(std::iter::once(rel)) {
        match archive.stat(prefix) {
            Ok(stat) if stat.file_type == FileType::Symlink => {
                return Err(VfsError::SymlinkForbidden(prefix.to_owned()));
            }
            Ok(_) => {}
            // Missing components are reported by whatever operation follows.
            Err(_) => break,
        }
    }
    Ok(())
}

/// Mount entries in search order.
#[derive(Default)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MountEntry> {
        self.entries.iter()
    }

    pub fn find(&self, backing_path: &Path) -> Option<&MountEntry> {
        self.entries.iter().find(|entry| entry.backing_path == backing_path)
    }

    pub fn contains(&self, backing_path: &Path) -> bool {
        self.find(backing_path).is_some()
    }

    /// Appends to the end of the search path, or prepends to the front.
    pub fn insert(&mut self, entry: MountEntry) {
        if entry.appended {
            self.entries.push(entry);
        } else {
            self.entries.insert(0, entry);
        }
    }

    /// Removes the entry mounted from `backing_path`.
    ///
    /// Fails without touching the table if nothing is mounted from there or
    /// if files opened through the entry are still alive.
    pub fn remove(&mut self, backing_path: &Path) -> VfsResult<MountEntry> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.backing_path == backing_path)
            .ok_or_else(|| VfsError::NotMounted(backing_path.to_path_buf()))?;
        if self.entries[index].in_use() {
            return Err(VfsError::FilesStillOpen);
        }
        Ok(self.entries.remove(index))
    }

    /// First entry, in search order, whose mount point prefixes `path` and
    /// whose backing store contains the remainder. `path` must be sanitized.
    pub fn resolve(&self, path: &str, permit_symlinks: bool) -> VfsResult<&MountEntry> {
        let mut forbidden = None;
        for entry in &self.entries {
            let Some(rel) = entry.relative(path) else {
                continue;
            };
            if let Err(err) = entry.check_symlinks(rel, permit_symlinks) {
                forbidden.get_or_insert(err);
                continue;
            }
            if entry.archive.exists(rel) {
                return Ok(entry);
            }
        }
        Err(forbidden.unwrap_or_else(|| VfsError::NotFound(path.to_owned())))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
