//! Open file handles.

use std::fmt;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use tracing::trace;
use crate::archive::{Archive, ReadStream};
use crate::result::{VfsError, VfsResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
}

enum Stream {
    Read(Box<dyn ReadStream>),
    Write(fs::File),
}

/// A file opened through the virtual filesystem.
///
/// The handle keeps its backing store alive; the store cannot be unmounted
/// until every handle opened through it has been closed or dropped.
pub struct File {
    path: String,
    mode: OpenMode,
    stream: Option<Stream>,
    // Only its reference count matters: it marks the mount entry as in use.
    #[allow(dead_code)]
    origin: Option<Arc<dyn Archive>>,
}

impl File {
    pub(crate) fn reader(path: String, stream: Box<dyn ReadStream>, origin: Arc<dyn Archive>) -> Self {
        Self {
            path,
            mode: OpenMode::Read,
            stream: Some(Stream::Read(stream)),
            origin: Some(origin),
        }
    }

    pub(crate) fn writer(path: String, mode: OpenMode, file: fs::File, origin: Arc<dyn Archive>) -> Self {
        Self {
            path,
            mode,
            stream: Some(Stream::Write(file)),
            origin: Some(origin),
        }
    }

    /// Virtual path this handle was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    fn stream(&mut self) -> VfsResult<&mut Stream> {
        self.stream.as_mut().ok_or(VfsError::Closed)
    }

    /// Total length in bytes.
    pub fn length(&mut self) -> VfsResult<u64> {
        match self.stream()? {
            Stream::Read(stream) => Ok(stream.length()?),
            Stream::Write(file) => Ok(file.metadata()?.len()),
        }
    }

    /// Reads up to `buf.len()` bytes from the current position.
    ///
    /// Returns fewer bytes only at end of file.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let Stream::Read(stream) = self.stream()? else {
            return Err(VfsError::NotOpenForReading);
        };
        let mut filled = 0;
        while filled < buf.len() {
            match stream.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(read) => filled += read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(filled)
    }

    pub fn write_bytes(&mut self, buf: &[u8]) -> VfsResult<usize> {
        let Stream::Write(file) = self.stream()? else {
            return Err(VfsError::NotOpenForWriting);
        };
        file.write_all(buf)?;
        Ok(buf.len())
    }

    /// Moves the cursor to `position` bytes from the start.
    pub fn seek(&mut self, position: u64) -> VfsResult<()> {
        match self.stream()? {
            Stream::Read(stream) => stream.seek(SeekFrom::Start(position))?,
            Stream::Write(file) => file.seek(SeekFrom::Start(position))?,
        };
        Ok(())
    }

    pub fn tell(&mut self) -> VfsResult<u64> {
        let position = match self.stream()? {
            Stream::Read(stream) => stream.stream_position()?,
            Stream::Write(file) => file.stream_position()?,
        };
        Ok(position)
    }

    pub fn eof(&mut self) -> VfsResult<bool> {
        Ok(self.tell()? >= self.length()?)
    }

    /// Reads everything from the cursor to the end of the file.
    ///
    /// The buffer is reserved up front from the file length; failure to
    /// reserve is reported as [`VfsError::OutOfMemory`].
    pub fn read_to_vec(&mut self) -> VfsResult<Vec<u8>> {
        let remaining = self.length()?.saturating_sub(self.tell()?);
        let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(remaining)?;
        buffer.resize(remaining, 0);
        let read = self.read_bytes(&mut buffer)?;
        buffer.truncate(read);
        Ok(buffer)
    }

    /// Flushes pending writes.
    pub fn flush(&mut self) -> VfsResult<()> {
        if let Stream::Write(file) = self.stream()? {
            file.flush()?;
        }
        Ok(())
    }

    /// Releases the handle. Every later operation, including a second
    /// `close`, fails with [`VfsError::Closed`].
    pub fn close(&mut self) -> VfsResult<()> {
        let stream = self.stream.take().ok_or(VfsError::Closed)?;
        self.origin = None;
        trace!(path = %self.path, "close");
        if let Stream::Write(mut file) = stream {
            file.flush()?;
        }
        Ok(())
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn to_io(err: VfsError) -> io::Error {
    match err {
        VfsError::Io(err) => err,
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}

impl Read for File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream().map_err(to_io)? {
            Stream::Read(stream) => stream.read(buf),
            Stream::Write(_) => Err(to_io(VfsError::NotOpenForReading)),
        }
    }
}

impl Write for File {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.stream().map_err(to_io)? {
            Stream::Write(file) => file.write(buf),
            Stream::Read(_) => Err(to_io(VfsError::NotOpenForWriting)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        File::flush(self).map_err(to_io)
    }
}

impl Seek for File {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self.stream().map_err(to_io)? {
            Stream::Read(stream) => stream.seek(pos),
            Stream::Write(file) => file.seek(pos),
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io::{Read, Seek, SeekFrom};
    use std::sync::Arc;
    use crate::archive::Archive;
    use crate::dir::DirArchive;
    use super::*;

    fn open(dir: &tempfile::TempDir, name: &str) -> File {
        let archive = Arc::new(DirArchive::new(dir.path()));
        let stream = archive.open_read(name).unwrap();
        File::reader(name.to_owned(), stream, archive)
    }

    #[test]
    fn reads_exact_length() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.bin"), b"0123456789").unwrap();
        let mut file = open(&dir, "data.bin");

        assert_eq!(file.length().unwrap(), 10);
        let mut buf = [0u8; 4];
        assert_eq!(file.read_bytes(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(file.tell().unwrap(), 4);

        let mut rest = [0u8; 16];
        assert_eq!(file.read_bytes(&mut rest).unwrap(), 6);
        assert_eq!(&rest[..6], b"456789");
        assert!(file.eof().unwrap());
        assert_eq!(file.read_bytes(&mut rest).unwrap(), 0);
    }

    #[test]
    fn seek_and_read_rest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.bin"), b"abcdefgh").unwrap();
        let mut file = open(&dir, "data.bin");

        file.seek(5).unwrap();
        assert_eq!(file.read_to_vec().unwrap(), b"fgh");

        Seek::seek(&mut file, SeekFrom::Start(0)).unwrap();
        let mut text = String::new();
        file.read_to_string(&mut text).unwrap();
        assert_eq!(text, "abcdefgh");
    }

    #[test]
    fn closed_handles_refuse_everything() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.bin"), b"abc").unwrap();
        let mut file = open(&dir, "data.bin");

        file.close().unwrap();
        assert!(file.is_closed());
        let mut buf = [0u8; 3];
        assert!(matches!(file.read_bytes(&mut buf), Err(VfsError::Closed)));
        assert!(matches!(file.length(), Err(VfsError::Closed)));
        assert!(matches!(file.seek(0), Err(VfsError::Closed)));
        assert!(matches!(file.close(), Err(VfsError::Closed)));
        assert!(file.read(&mut buf).is_err());
    }

    #[test]
    fn read_handles_refuse_writes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.bin"), b"abc").unwrap();
        let mut file = open(&dir, "data.bin");
        assert!(matches!(file.write_bytes(b"x"), Err(VfsError::NotOpenForWriting)));
    }

    #[test]
    fn close_releases_backing_store() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.bin"), b"abc").unwrap();
        let archive: Arc<dyn Archive> = Arc::new(DirArchive::new(dir.path()));
        let stream = archive.open_read("data.bin").unwrap();
        let mut file = File::reader("data.bin".to_owned(), stream, Arc::clone(&archive));

        assert_eq!(Arc::strong_count(&archive), 2);
        file.close().unwrap();
        assert_eq!(Arc::strong_count(&archive), 1);
    }
}
