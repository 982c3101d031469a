use std::collections::{BTreeSet, HashMap};
use std::fs::{File, OpenOptions};
use std::io;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;
use byteorder::{LittleEndian, ReadBytesExt};
use parking_lot::RwLock;
use tracing::{trace, warn};
use crate::archive::{Archive, FileType, ReadStream, Stat};
use crate::result::{VfsError, VfsResult};
use crate::zip::headers;
use crate::zip::result::{ZipError, ZipResult};
use crate::zip::zip_file::*;

/// A zip file opened as a backing store.
///
/// The central directory is read once up front; entry data is read lazily
/// through the shared file handle.
pub struct ZipArchive {
    pub file: Arc<RwLock<File>>,
    pub entries: HashMap<String, Arc<ZipFileData>>,
    pub dirs: BTreeSet<String>,
}

impl ZipArchive {
    pub fn new(path: impl AsRef<Path>) -> ZipResult<ZipArchive> {
        let file = OpenOptions::new().read(true).open(path)?;
        Self::from_file(file)
    }

    pub fn from_file(mut file: File) -> ZipResult<ZipArchive> {
        let (footer, cde_start_pos) = headers::CentralDirectoryEnd::find_and_parse(&mut file)?;

        if !footer.record_too_small() && footer.disk_number != footer.disk_with_central_directory {
            return Err(ZipError::UnsupportedArchive);
        }

        let (archive_offset, directory_start, number_of_files) =
            Self::get_directory_counts(&mut file, &footer, cde_start_pos)?;

        let file_capacity = if number_of_files > cde_start_pos as usize {
            0
        } else {
            number_of_files
        };

        let mut entries = HashMap::with_capacity(file_capacity);
        let mut dirs = BTreeSet::new();

        if file.seek(io::SeekFrom::Start(directory_start)).is_err() {
            return Err(ZipError::InvalidArchive(
                "Could not seek to start of central directory",
            ));
        }

        for _ in 0..number_of_files {
            match central_header_to_zip_file(&mut file, archive_offset) {
                Ok(zip_file_data) => {
                    let name = zip_file_data.file_name.trim_end_matches('/').to_owned();
                    add_parent_dirs(&mut dirs, &name);
                    if zip_file_data.is_dir() {
                        dirs.insert(name);
                    } else {
                        trace!(name = %name, size = zip_file_data.uncompressed_size, "zip entry");
                        entries.insert(name, Arc::new(zip_file_data));
                    }
                }
                Err(ZipError::UnsupportedCompressionMethod(method)) => {
                    warn!(method, "skipping zip entry with unsupported compression method");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        let file = Arc::new(RwLock::new(file));

        Ok(ZipArchive { file, entries, dirs })
    }

    fn get_directory_counts<T: Read + io::Seek>(
        reader: &mut T,
        footer: &headers::CentralDirectoryEnd,
        cde_start_pos: u64,
    ) -> ZipResult<(u64, u64, usize)> {
        let zip64locator = if headers::seek_to_zip64_locator(reader, footer.zip_file_comment.len()).is_ok()
        {
            match headers::Zip64CentralDirectoryEndLocator::parse(reader) {
                Ok(loc) => Some(loc),
                Err(ZipError::InvalidArchive(_)) => {
                    None
                }
                Err(e) => {
                    return Err(e);
                }
            }
        } else {
            None
        };

        match zip64locator {
            None => {
                let archive_offset = cde_start_pos
                    .checked_sub(footer.central_directory_size as u64)
                    .and_then(|x| x.checked_sub(footer.central_directory_offset as u64))
                    .ok_or(ZipError::InvalidArchive(
                        "Invalid central directory size or offset",
                    ))?;

                let directory_start = footer.central_directory_offset as u64 + archive_offset;
                let number_of_files = footer.number_of_files_on_this_disk as usize;
                Ok((archive_offset, directory_start, number_of_files))
            }
            Some(locator64) => {
                if !footer.record_too_small()
                    && footer.disk_number as u32 != locator64.disk_with_central_directory
                {
                    return Err(ZipError::UnsupportedArchive);
                }

                let search_upper_bound = cde_start_pos
                    .checked_sub(60) // minimum size of Zip64CentralDirectoryEnd + Zip64CentralDirectoryEndLocator
                    .ok_or(ZipError::InvalidArchive(
                        "File cannot contain ZIP64 central directory end",
                    ))?;
                let (footer, archive_offset) = headers::Zip64CentralDirectoryEnd::find_and_parse(
                    reader,
                    locator64.end_of_central_directory_offset,
                    search_upper_bound,
                )?;

                if footer.disk_number != footer.disk_with_central_directory {
                    return Err(ZipError::UnsupportedArchive);
                }

                let directory_start = footer
                    .central_directory_offset
                    .checked_add(archive_offset)
                    .ok_or(ZipError::InvalidArchive("Invalid central directory size or offset"))?;

                Ok((
                    archive_offset,
                    directory_start,
                    footer.number_of_files as usize,
                ))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn by_name(&self, name: &str) -> ZipResult<ZipFile> {
        let data = self
            .entries
            .get(name)
            .ok_or(ZipError::FileNotFound)?;

        let position = {
            let mut file = self.file.write();
            file.seek(io::SeekFrom::Start(data.header_start))?;
            let signature = file.read_u32::<LittleEndian>()?;
            if signature != headers::LOCAL_FILE_HEADER_SIGNATURE {
                return Err(ZipError::InvalidArchive("Invalid local file header"));
            }

            file.stream_position()?
        };

        let reader = find_reader(&self.file, data, position)?;

        Ok(ZipFile::new(reader, data.clone()))
    }
}

fn add_parent_dirs(dirs: &mut BTreeSet<String>, name: &str) {
    let mut end = 0;
    while let Some(offset) = name[end..].find('/') {
        end += offset;
        dirs.insert(name[..end].to_owned());
        end += 1;
    }
}

pub fn central_header_to_zip_file<R: Read + Seek>(
    reader: &mut R,
    archive_offset: u64,
) -> ZipResult<ZipFileData> {
    let central_header_start = reader.stream_position()?;

    let signature = reader.read_u32::<LittleEndian>()?;
    if signature != headers::CENTRAL_DIRECTORY_HEADER_SIGNATURE {
        Err(ZipError::InvalidArchive("Invalid Central Directory header"))
    } else {
        central_header_to_zip_file_inner(reader, archive_offset, central_header_start)
    }
}

impl ReadStream for ZipFile {
    fn length(&self) -> io::Result<u64> {
        Ok(self.len())
    }
}

impl Archive for ZipArchive {
    fn stat(&self, path: &str) -> VfsResult<Stat> {
        if path.is_empty() || self.dirs.contains(path) {
            return Ok(Stat::directory(true));
        }
        let data = self
            .entries
            .get(path)
            .ok_or_else(|| VfsError::NotFound(path.to_owned()))?;
        Ok(Stat {
            file_type: FileType::Regular,
            size: data.uncompressed_size,
            modified: data.modified(),
            read_only: true,
        })
    }

    fn enumerate(&self, dir: &str) -> VfsResult<Vec<String>> {
        if !dir.is_empty() && !self.dirs.contains(dir) {
            return Err(VfsError::NotFound(dir.to_owned()));
        }
        let prefix = if dir.is_empty() { String::new() } else { format!("{dir}/") };
        let children: BTreeSet<String> = self
            .entries
            .keys()
            .chain(self.dirs.iter())
            .filter_map(|name| name.strip_prefix(prefix.as_str()))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_owned)
            .collect();
        Ok(children.into_iter().collect())
    }

    fn open_read(&self, path: &str) -> VfsResult<Box<dyn ReadStream>> {
        if path.is_empty() || self.dirs.contains(path) {
            return Err(VfsError::IsDirectory(path.to_owned()));
        }
        match self.by_name(path) {
            Ok(file) => Ok(Box::new(file)),
            Err(ZipError::FileNotFound) => Err(VfsError::NotFound(path.to_owned())),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;
    use super::add_parent_dirs;

    #[test]
    fn implicit_directories() {
        let mut dirs = BTreeSet::new();
        add_parent_dirs(&mut dirs, "a/b/c.txt");
        add_parent_dirs(&mut dirs, "top.txt");
        add_parent_dirs(&mut dirs, "a/d");
        let dirs: Vec<_> = dirs.into_iter().collect();
        assert_eq!(dirs, vec!["a", "a/b"]);
    }
}
