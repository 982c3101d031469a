//! Shared fixtures: a minimal zip writer for building test archives.

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};

#[derive(Clone, Copy)]
pub enum Method {
    Stored,
    Deflate,
    /// Any other method id; the contents are written as given.
    Raw(u16),
}

struct Entry {
    name: String,
    method: u16,
    flags: u16,
    crc: u32,
    compressed: Vec<u8>,
    declared_compressed: u64,
    size: u64,
    offset: u64,
}

/// Builds zip archives in memory, entry by entry.
#[derive(Default)]
pub struct ZipBuilder {
    prefix: Vec<u8>,
    entries: Vec<Entry>,
    zip64: bool,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes placed before the archive, as in a self-extracting executable.
    pub fn prefix(mut self, bytes: &[u8]) -> Self {
        self.prefix = bytes.to_vec();
        self
    }

    /// Writes zip64 records: saturated end record fields, a zip64 end record
    /// and locator, and sizes and offsets in 0x0001 extra fields.
    pub fn zip64(mut self) -> Self {
        self.zip64 = true;
        self
    }

    /// Overrides the compressed size recorded for the last entry.
    pub fn declare_compressed_size(mut self, size: u64) -> Self {
        if let Some(entry) = self.entries.last_mut() {
            entry.declared_compressed = size;
        }
        self
    }

    pub fn file(self, name: &str, contents: &[u8], method: Method) -> Self {
        self.entry(name, contents, method, 1 << 11)
    }

    pub fn dir(self, name: &str) -> Self {
        let name = format!("{}/", name.trim_end_matches('/'));
        self.entry(&name, b"", Method::Stored, 1 << 11)
    }

    /// An entry flagged as encrypted; the payload is stored as given.
    pub fn encrypted(self, name: &str, contents: &[u8]) -> Self {
        self.entry(name, contents, Method::Stored, (1 << 11) | 1)
    }

    fn entry(mut self, name: &str, contents: &[u8], method: Method, flags: u16) -> Self {
        let mut crc = Crc::new();
        crc.update(contents);
        let (method, compressed) = match method {
            Method::Stored => (0, contents.to_vec()),
            Method::Raw(method) => (method, contents.to_vec()),
            Method::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
                encoder.write_all(contents).unwrap();
                (8, encoder.finish().unwrap())
            }
        };
        self.entries.push(Entry {
            name: name.to_owned(),
            method,
            flags,
            crc: crc.sum(),
            declared_compressed: compressed.len() as u64,
            compressed,
            size: contents.len() as u64,
            offset: 0,
        });
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        const SATURATED: u32 = u32::MAX;

        // Offsets in the archive are relative to its own start, not the prefix.
        let mut archive = Vec::new();
        for entry in &mut self.entries {
            entry.offset = archive.len() as u64;
            archive.write_u32::<LittleEndian>(0x04034b50).unwrap();
            archive.write_u16::<LittleEndian>(if self.zip64 { 45 } else { 20 }).unwrap();
            archive.write_u16::<LittleEndian>(entry.flags).unwrap();
            archive.write_u16::<LittleEndian>(entry.method).unwrap();
            archive.write_u16::<LittleEndian>(0x6000).unwrap();
            archive.write_u16::<LittleEndian>(0x5821).unwrap();
            archive.write_u32::<LittleEndian>(entry.crc).unwrap();
            if self.zip64 {
                archive.write_u32::<LittleEndian>(SATURATED).unwrap();
                archive.write_u32::<LittleEndian>(SATURATED).unwrap();
                archive.write_u16::<LittleEndian>(entry.name.len() as u16).unwrap();
                archive.write_u16::<LittleEndian>(20).unwrap();
                archive.extend_from_slice(entry.name.as_bytes());
                archive.write_u16::<LittleEndian>(0x0001).unwrap();
                archive.write_u16::<LittleEndian>(16).unwrap();
                archive.write_u64::<LittleEndian>(entry.size).unwrap();
                archive.write_u64::<LittleEndian>(entry.declared_compressed).unwrap();
            } else {
                archive.write_u32::<LittleEndian>(entry.declared_compressed as u32).unwrap();
                archive.write_u32::<LittleEndian>(entry.size as u32).unwrap();
                archive.write_u16::<LittleEndian>(entry.name.len() as u16).unwrap();
                archive.write_u16::<LittleEndian>(0).unwrap();
                archive.extend_from_slice(entry.name.as_bytes());
            }
            archive.extend_from_slice(&entry.compressed);
        }

        let directory_offset = archive.len() as u64;
        for entry in &self.entries {
            archive.write_u32::<LittleEndian>(0x02014b50).unwrap();
            archive.write_u16::<LittleEndian>(20).unwrap();
            archive.write_u16::<LittleEndian>(if self.zip64 { 45 } else { 20 }).unwrap();
            archive.write_u16::<LittleEndian>(entry.flags).unwrap();
            archive.write_u16::<LittleEndian>(entry.method).unwrap();
            archive.write_u16::<LittleEndian>(0x6000).unwrap();
            archive.write_u16::<LittleEndian>(0x5821).unwrap();
            archive.write_u32::<LittleEndian>(entry.crc).unwrap();
            if self.zip64 {
                archive.write_u32::<LittleEndian>(SATURATED).unwrap();
                archive.write_u32::<LittleEndian>(SATURATED).unwrap();
            } else {
                archive.write_u32::<LittleEndian>(entry.declared_compressed as u32).unwrap();
                archive.write_u32::<LittleEndian>(entry.size as u32).unwrap();
            }
            archive.write_u16::<LittleEndian>(entry.name.len() as u16).unwrap();
            archive.write_u16::<LittleEndian>(if self.zip64 { 28 } else { 0 }).unwrap();
            archive.write_u16::<LittleEndian>(0).unwrap();
            archive.write_u16::<LittleEndian>(0).unwrap();
            archive.write_u16::<LittleEndian>(0).unwrap();
            archive.write_u32::<LittleEndian>(0).unwrap();
            if self.zip64 {
                archive.write_u32::<LittleEndian>(SATURATED).unwrap();
            } else {
                archive.write_u32::<LittleEndian>(entry.offset as u32).unwrap();
            }
            archive.extend_from_slice(entry.name.as_bytes());
            if self.zip64 {
                archive.write_u16::<LittleEndian>(0x0001).unwrap();
                archive.write_u16::<LittleEndian>(24).unwrap();
                archive.write_u64::<LittleEndian>(entry.size).unwrap();
                archive.write_u64::<LittleEndian>(entry.declared_compressed).unwrap();
                archive.write_u64::<LittleEndian>(entry.offset).unwrap();
            }
        }
        let directory_size = archive.len() as u64 - directory_offset;
        let count = self.entries.len() as u64;

        if self.zip64 {
            let zip64_end_offset = archive.len() as u64;
            archive.write_u32::<LittleEndian>(0x06064b50).unwrap();
            archive.write_u64::<LittleEndian>(44).unwrap();
            archive.write_u16::<LittleEndian>(45).unwrap();
            archive.write_u16::<LittleEndian>(45).unwrap();
            archive.write_u32::<LittleEndian>(0).unwrap();
            archive.write_u32::<LittleEndian>(0).unwrap();
            archive.write_u64::<LittleEndian>(count).unwrap();
            archive.write_u64::<LittleEndian>(count).unwrap();
            archive.write_u64::<LittleEndian>(directory_size).unwrap();
            archive.write_u64::<LittleEndian>(directory_offset).unwrap();

            archive.write_u32::<LittleEndian>(0x07064b50).unwrap();
            archive.write_u32::<LittleEndian>(0).unwrap();
            archive.write_u64::<LittleEndian>(zip64_end_offset).unwrap();
            archive.write_u32::<LittleEndian>(1).unwrap();
        }

        archive.write_u32::<LittleEndian>(0x06054b50).unwrap();
        archive.write_u16::<LittleEndian>(0).unwrap();
        archive.write_u16::<LittleEndian>(0).unwrap();
        if self.zip64 {
            archive.write_u16::<LittleEndian>(u16::MAX).unwrap();
            archive.write_u16::<LittleEndian>(u16::MAX).unwrap();
            archive.write_u32::<LittleEndian>(SATURATED).unwrap();
            archive.write_u32::<LittleEndian>(SATURATED).unwrap();
        } else {
            archive.write_u16::<LittleEndian>(count as u16).unwrap();
            archive.write_u16::<LittleEndian>(count as u16).unwrap();
            archive.write_u32::<LittleEndian>(directory_size as u32).unwrap();
            archive.write_u32::<LittleEndian>(directory_offset as u32).unwrap();
        }
        archive.write_u16::<LittleEndian>(0).unwrap();

        let mut bytes = self.prefix;
        bytes.extend(archive);
        bytes
    }

    pub fn write_to(self, path: &Path) {
        std::fs::write(path, self.build()).unwrap();
    }
}
