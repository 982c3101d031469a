//! A layered virtual filesystem.
//!
//! Directories and zip archives are mounted into one `/`-separated
//! namespace. Lookups walk the mount table in order and the first backing
//! store that has the path wins:
//!
//! ```no_run
//! use layerfs::VirtualFileSystem;
//!
//! # fn main() -> layerfs::VfsResult<()> {
//! let mut vfs = VirtualFileSystem::init("layerfs")?;
//! vfs.mount("assets.zip", "/", true)?;
//! vfs.mount("overrides", "/", false)?;
//! let level = vfs.read_file("levels/one.txt")?;
//! # let _ = level;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod zip;
mod dir;
mod file;
mod mount;
mod path;
mod result;
mod vfs;

pub use archive::{Archive, ArchiveFormat, FileType, ReadStream, Stat};
pub use dir::DirArchive;
pub use file::{File, OpenMode};
pub use mount::{MountEntry, MountTable};
pub use result::{VfsError, VfsResult};
pub use vfs::VirtualFileSystem;
pub use zip::zip_archive::ZipArchive;
