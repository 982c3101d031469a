use std::fs::File;
use std::io::{Error, ErrorKind, Read, Seek, SeekFrom};
use std::sync::Arc;
use parking_lot::RwLock;

/// Reader over a stored (uncompressed) entry: a window `[start, end)` of the archive file.
pub struct PlaintextReader {
    file: Arc<RwLock<File>>,
    start: u64,
    end: u64,
    position: u64,
}

impl PlaintextReader {
    pub fn new(file: Arc<RwLock<File>>, start: u64, end: u64) -> Self {
        Self {
            file,
            start,
            end,
            position: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }
}

impl Read for PlaintextReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.position >= self.len() {
            return Ok(0);
        }
        let from = self.position + self.start;
        let remaining = self.len() - self.position;
        let limit = remaining.min(buf.len() as u64) as usize;
        let size = {
            let mut file = self.file.write();
            file.seek(SeekFrom::Start(from))?;
            file.read(&mut buf[0..limit])?
        };

        self.position += size as u64;

        Ok(size)
    }
}

impl Seek for PlaintextReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let len = self.len() as i64;
        let position = match pos {
            SeekFrom::Start(pos) => pos as i64,
            SeekFrom::End(pos) => len + pos,
            SeekFrom::Current(pos) => self.position as i64 + pos,
        };
        if position < 0 || position > len {
            return Err(Error::new(ErrorKind::InvalidInput, "Invalid seek input"));
        }
        self.position = position as u64;
        Ok(self.position)
    }
}
