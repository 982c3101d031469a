use std::io;
use std::io::{Read, Seek, SeekFrom};
use byteorder::{LittleEndian, ReadBytesExt};
use crate::zip::result::{ZipError, ZipResult};

pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;
pub const CENTRAL_DIRECTORY_HEADER_SIGNATURE: u32 = 0x02014b50;
const CENTRAL_DIRECTORY_END_SIGNATURE: u32 = 0x06054b50;
const ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE: u32 = 0x06064b50;
const ZIP64_CENTRAL_DIRECTORY_END_LOCATOR_SIGNATURE: u32 = 0x07064b50;

pub const ZIP64_BYTES_THR: u64 = u32::MAX as u64;

/// Size of the end of central directory record without its comment.
pub const CENTRAL_DIRECTORY_END_SIZE: u64 = 22;
/// Size of the zip64 end of central directory locator.
pub const ZIP64_LOCATOR_SIZE: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unsupported(u16),
}

impl CompressionMethod {
    pub fn from_u16(method: u16) -> Self {
        match method {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            other => CompressionMethod::Unsupported(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AesMode {
    Aes128,
    Aes192,
    Aes256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AesVendorVersion {
    Ae1,
    Ae2,
}

pub struct CentralDirectoryEnd {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub number_of_files_on_this_disk: u16,
    pub number_of_files: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub zip_file_comment: Vec<u8>,
}

impl CentralDirectoryEnd {
    /// Any field saturated at its maximum means the real value lives in the zip64 record.
    pub fn record_too_small(&self) -> bool {
        self.disk_number == u16::MAX
            || self.disk_with_central_directory == u16::MAX
            || self.number_of_files_on_this_disk == u16::MAX
            || self.number_of_files == u16::MAX
            || self.central_directory_size == u32::MAX
            || self.central_directory_offset == u32::MAX
    }

    pub fn parse<T: Read>(reader: &mut T) -> ZipResult<CentralDirectoryEnd> {
        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != CENTRAL_DIRECTORY_END_SIGNATURE {
            return Err(ZipError::InvalidArchive("Invalid digital signature header"));
        }
        let disk_number = reader.read_u16::<LittleEndian>()?;
        let disk_with_central_directory = reader.read_u16::<LittleEndian>()?;
        let number_of_files_on_this_disk = reader.read_u16::<LittleEndian>()?;
        let number_of_files = reader.read_u16::<LittleEndian>()?;
        let central_directory_size = reader.read_u32::<LittleEndian>()?;
        let central_directory_offset = reader.read_u32::<LittleEndian>()?;
        let zip_file_comment_length = reader.read_u16::<LittleEndian>()? as usize;
        let mut zip_file_comment = vec![0; zip_file_comment_length];
        reader.read_exact(&mut zip_file_comment)?;

        Ok(CentralDirectoryEnd {
            disk_number,
            disk_with_central_directory,
            number_of_files_on_this_disk,
            number_of_files,
            central_directory_size,
            central_directory_offset,
            zip_file_comment,
        })
    }

    /// Scans backwards from the end of the file for the end record.
    ///
    /// Returns the record and the position it starts at. A file without
    /// one is not a zip archive at all.
    pub fn find_and_parse<T: Read + Seek>(reader: &mut T) -> ZipResult<(CentralDirectoryEnd, u64)> {
        let file_length = reader.seek(SeekFrom::End(0))?;
        if file_length < CENTRAL_DIRECTORY_END_SIZE {
            return Err(ZipError::NotAnArchive);
        }

        let search_lower_bound =
            file_length.saturating_sub(CENTRAL_DIRECTORY_END_SIZE + u16::MAX as u64);
        let mut pos = file_length - CENTRAL_DIRECTORY_END_SIZE;

        while pos >= search_lower_bound {
            reader.seek(SeekFrom::Start(pos))?;
            if reader.read_u32::<LittleEndian>()? == CENTRAL_DIRECTORY_END_SIGNATURE {
                reader.seek(SeekFrom::Start(pos))?;
                if let Ok(end) = Self::parse(reader) {
                    // The comment must run exactly to the end of the file.
                    let record_end = pos + CENTRAL_DIRECTORY_END_SIZE + end.zip_file_comment.len() as u64;
                    if record_end == file_length {
                        return Ok((end, pos));
                    }
                }
            }
            pos = match pos.checked_sub(1) {
                Some(pos) => pos,
                None => break,
            };
        }

        Err(ZipError::NotAnArchive)
    }
}

pub struct Zip64CentralDirectoryEndLocator {
    pub disk_with_central_directory: u32,
    pub end_of_central_directory_offset: u64,
    pub number_of_disks: u32,
}

impl Zip64CentralDirectoryEndLocator {
    pub fn parse<T: Read>(reader: &mut T) -> ZipResult<Zip64CentralDirectoryEndLocator> {
        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != ZIP64_CENTRAL_DIRECTORY_END_LOCATOR_SIGNATURE {
            return Err(ZipError::InvalidArchive(
                "Invalid zip64 locator digital signature header",
            ));
        }
        let disk_with_central_directory = reader.read_u32::<LittleEndian>()?;
        let end_of_central_directory_offset = reader.read_u64::<LittleEndian>()?;
        let number_of_disks = reader.read_u32::<LittleEndian>()?;

        Ok(Zip64CentralDirectoryEndLocator {
            disk_with_central_directory,
            end_of_central_directory_offset,
            number_of_disks,
        })
    }
}

pub struct Zip64CentralDirectoryEnd {
    pub version_made_by: u16,
    pub version_needed_to_extract: u16,
    pub disk_number: u32,
    pub disk_with_central_directory: u32,
    pub number_of_files_on_this_disk: u64,
    pub number_of_files: u64,
    pub central_directory_size: u64,
    pub central_directory_offset: u64,
}

impl Zip64CentralDirectoryEnd {
    /// Searches `[nominal_offset, search_upper_bound]` for the zip64 end record.
    ///
    /// Data prepended to the archive shifts the record forward; the shift is
    /// returned as the archive offset.
    pub fn find_and_parse<T: Read + Seek>(
        reader: &mut T,
        nominal_offset: u64,
        search_upper_bound: u64,
    ) -> ZipResult<(Zip64CentralDirectoryEnd, u64)> {
        let mut pos = search_upper_bound;

        while pos >= nominal_offset {
            reader.seek(SeekFrom::Start(pos))?;

            if reader.read_u32::<LittleEndian>()? == ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE {
                let archive_offset = pos - nominal_offset;

                let _record_size = reader.read_u64::<LittleEndian>()?;
                let version_made_by = reader.read_u16::<LittleEndian>()?;
                let version_needed_to_extract = reader.read_u16::<LittleEndian>()?;
                let disk_number = reader.read_u32::<LittleEndian>()?;
                let disk_with_central_directory = reader.read_u32::<LittleEndian>()?;
                let number_of_files_on_this_disk = reader.read_u64::<LittleEndian>()?;
                let number_of_files = reader.read_u64::<LittleEndian>()?;
                let central_directory_size = reader.read_u64::<LittleEndian>()?;
                let central_directory_offset = reader.read_u64::<LittleEndian>()?;

                return Ok((
                    Zip64CentralDirectoryEnd {
                        version_made_by,
                        version_needed_to_extract,
                        disk_number,
                        disk_with_central_directory,
                        number_of_files_on_this_disk,
                        number_of_files,
                        central_directory_size,
                        central_directory_offset,
                    },
                    archive_offset,
                ));
            }

            pos = match pos.checked_sub(1) {
                Some(pos) => pos,
                None => break,
            };
        }

        Err(ZipError::InvalidArchive(
            "Could not find ZIP64 central directory end",
        ))
    }
}

pub fn seek_to_zip64_locator<T: Seek>(reader: &mut T, comment_len: usize) -> io::Result<u64> {
    reader.seek(SeekFrom::End(
        -((ZIP64_LOCATOR_SIZE + CENTRAL_DIRECTORY_END_SIZE) as i64 + comment_len as i64),
    ))
}

#[cfg(test)]
mod test {
    use std::io::Cursor;
    use super::*;

    fn empty_archive(comment: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&CENTRAL_DIRECTORY_END_SIGNATURE.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 16]);
        bytes.extend_from_slice(&(comment.len() as u16).to_le_bytes());
        bytes.extend_from_slice(comment);
        bytes
    }

    #[test]
    fn finds_end_record_behind_comment() {
        let mut reader = Cursor::new(empty_archive(b"hello comment"));
        let (end, pos) = CentralDirectoryEnd::find_and_parse(&mut reader).unwrap();
        assert_eq!(pos, 0);
        assert_eq!(end.zip_file_comment, b"hello comment");
        assert_eq!(end.number_of_files, 0);
        assert!(!end.record_too_small());
    }

    #[test]
    fn finds_end_record_after_prefix() {
        let mut bytes = vec![0xAAu8; 100];
        bytes.extend(empty_archive(b""));
        let mut reader = Cursor::new(bytes);
        let (_, pos) = CentralDirectoryEnd::find_and_parse(&mut reader).unwrap();
        assert_eq!(pos, 100);
    }

    #[test]
    fn plain_data_is_not_an_archive() {
        let mut reader = Cursor::new(b"just some text, definitely not a zip file".to_vec());
        assert!(matches!(
            CentralDirectoryEnd::find_and_parse(&mut reader),
            Err(ZipError::NotAnArchive)
        ));

        let mut tiny = Cursor::new(vec![1u8, 2, 3]);
        assert!(matches!(
            CentralDirectoryEnd::find_and_parse(&mut tiny),
            Err(ZipError::NotAnArchive)
        ));
    }

    #[test]
    fn compression_methods() {
        assert_eq!(CompressionMethod::from_u16(0), CompressionMethod::Stored);
        assert_eq!(CompressionMethod::from_u16(8), CompressionMethod::Deflate);
        assert_eq!(CompressionMethod::from_u16(12), CompressionMethod::Unsupported(12));
    }
}
