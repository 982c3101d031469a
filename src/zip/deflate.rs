use std::fs::File;
use std::io::{Error, ErrorKind, Read, Seek, SeekFrom};
use std::sync::Arc;
use flate2::{Decompress, FlushDecompress, Status};
use parking_lot::RwLock;

const DEFLATE_BUF_SIZE: usize = 4096;

/// Reader over a raw deflate entry.
///
/// `start..end` is the compressed window in the archive file and `size` the
/// uncompressed length. Deflate streams cannot be entered in the middle, so
/// seeking backwards restarts decompression from the beginning of the entry.
pub struct DeflateReader {
    file: Arc<RwLock<File>>,
    start: u64,
    end: u64,
    size: u64,
    compressed_position: u64,
    position: u64,
    finished: bool,
    decompress: Decompress,
    deflate_buf: [u8; DEFLATE_BUF_SIZE],
    deflate_size: usize,
    deflate_position: usize,
}

impl DeflateReader {
    pub fn new(file: Arc<RwLock<File>>, start: u64, end: u64, size: u64) -> Self {
        Self {
            file,
            start,
            end,
            size,
            compressed_position: 0,
            position: 0,
            finished: false,
            decompress: Decompress::new(false),
            deflate_buf: [0u8; DEFLATE_BUF_SIZE],
            deflate_size: 0,
            deflate_position: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.size
    }

    fn rewind(&mut self) {
        self.decompress.reset(false);
        self.compressed_position = 0;
        self.position = 0;
        self.finished = false;
        self.deflate_size = 0;
        self.deflate_position = 0;
    }

    fn skip(&mut self, mut count: u64) -> std::io::Result<()> {
        let mut scratch = [0u8; DEFLATE_BUF_SIZE];
        while count > 0 {
            let limit = count.min(DEFLATE_BUF_SIZE as u64) as usize;
            let read = self.read(&mut scratch[..limit])?;
            if read == 0 {
                return Err(Error::new(ErrorKind::UnexpectedEof, "deflate stream ended early"));
            }
            count -= read as u64;
        }
        Ok(())
    }
}

impl Read for DeflateReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.finished || self.position >= self.size || buf.is_empty() {
            return Ok(0);
        }
        let limit = (self.size - self.position).min(buf.len() as u64) as usize;
        let buf = &mut buf[..limit];

        loop {
            let (read, consumed, ret, eof);
            {
                if self.deflate_position == self.deflate_size {
                    let from = self.compressed_position + self.start;
                    let limit = (self.end - self.start - self.compressed_position)
                        .min(DEFLATE_BUF_SIZE as u64);
                    {
                        let mut file = self.file.write();
                        file.seek(SeekFrom::Start(from))?;
                        self.deflate_size = file.read(&mut self.deflate_buf[0..limit as usize])?;
                    }
                    self.deflate_position = 0;
                }

                let input = &self.deflate_buf[self.deflate_position..self.deflate_size];

                eof = input.is_empty();

                let before_out = self.decompress.total_out();
                let before_in = self.decompress.total_in();
                let flush = if eof {
                    FlushDecompress::Finish
                } else {
                    FlushDecompress::None
                };

                ret = self.decompress.decompress(input, buf, flush);
                read = (self.decompress.total_out() - before_out) as usize;
                consumed = (self.decompress.total_in() - before_in) as usize;
            }
            self.deflate_position += consumed;
            self.compressed_position += consumed as u64;
            self.position += read as u64;

            match ret {
                Ok(Status::StreamEnd) => {
                    self.finished = true;
                    return Ok(read);
                }
                Ok(Status::Ok | Status::BufError) if read == 0 && !eof => continue,
                Ok(Status::Ok | Status::BufError) if read == 0 => {
                    return Err(Error::new(
                        ErrorKind::UnexpectedEof,
                        "truncated deflate stream",
                    ));
                }
                Ok(Status::Ok | Status::BufError) => return Ok(read),

                Err(..) => {
                    return Err(Error::new(
                        ErrorKind::InvalidData,
                        "corrupt deflate stream",
                    ));
                }
            }
        }
    }
}

impl Seek for DeflateReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(pos) => pos as i64,
            SeekFrom::End(pos) => self.size as i64 + pos,
            SeekFrom::Current(pos) => self.position as i64 + pos,
        };
        if target < 0 || target as u64 > self.size {
            return Err(Error::new(ErrorKind::InvalidInput, "Invalid seek input"));
        }
        let target = target as u64;
        if target < self.position {
            self.rewind();
        }
        self.skip(target - self.position)?;
        Ok(self.position)
    }
}

#[cfg(test)]
mod test {
    use std::io::{Read, Seek, SeekFrom, Write};
    use std::sync::Arc;
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use parking_lot::RwLock;
    use super::DeflateReader;

    fn reader_over(plain: &[u8]) -> DeflateReader {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(plain).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"LEAD").unwrap();
        file.write_all(&compressed).unwrap();
        let end = 4 + compressed.len() as u64;
        DeflateReader::new(Arc::new(RwLock::new(file)), 4, end, plain.len() as u64)
    }

    fn sample() -> Vec<u8> {
        (0..20_000u32).flat_map(|i| format!("line {i}\n").into_bytes()).collect()
    }

    #[test]
    fn inflates_whole_entry() {
        let plain = sample();
        let mut reader = reader_over(&plain);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, plain);
        assert_eq!(reader.read(&mut [0u8; 16]).unwrap(), 0);
    }

    #[test]
    fn seeks_forward_and_back() {
        let plain = sample();
        let mut reader = reader_over(&plain);
        let mut out = [0u8; 10];

        assert_eq!(reader.seek(SeekFrom::Start(50_000)).unwrap(), 50_000);
        reader.read_exact(&mut out).unwrap();
        assert_eq!(&out, &plain[50_000..50_010]);

        assert_eq!(reader.seek(SeekFrom::Start(7)).unwrap(), 7);
        reader.read_exact(&mut out).unwrap();
        assert_eq!(&out, &plain[7..17]);

        let tail = reader.seek(SeekFrom::End(-10)).unwrap();
        assert_eq!(tail, plain.len() as u64 - 10);
        reader.read_exact(&mut out).unwrap();
        assert_eq!(&out, &plain[plain.len() - 10..]);

        assert!(reader.seek(SeekFrom::End(1)).is_err());
    }
}
