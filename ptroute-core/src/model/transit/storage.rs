//! Segmented little-endian byte regions backing the transit graph store.
//!
//! A region grows by appending fixed-size segments, so offsets handed out
//! earlier stay valid. Integers are 4-byte aligned and never straddle a
//! segment boundary.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::Error;

const MAGIC: u32 = 0x5054_4753;
const VERSION: u32 = 1;
pub(crate) const HEADER_SLOTS: usize = 4;
pub(crate) const DEFAULT_SEGMENT_SIZE: usize = 1 << 20;

#[derive(Debug, Clone)]
pub(crate) struct DataAccess {
    name: &'static str,
    segment_size: usize,
    segments: Vec<Box<[u8]>>,
    header: [u32; HEADER_SLOTS],
}

impl DataAccess {
    pub(crate) fn new(name: &'static str, segment_size: usize) -> Self {
        assert!(
            segment_size.is_power_of_two() && segment_size >= 8,
            "segment size must be a power of two of at least 8 bytes"
        );
        Self {
            name,
            segment_size,
            segments: Vec::new(),
            header: [0; HEADER_SLOTS],
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn capacity(&self) -> u64 {
        (self.segments.len() * self.segment_size) as u64
    }

    pub(crate) fn ensure_capacity(&mut self, bytes: u64) {
        while self.capacity() < bytes {
            self.segments
                .push(vec![0u8; self.segment_size].into_boxed_slice());
        }
    }

    #[inline]
    fn locate(&self, pos: u64) -> (usize, usize) {
        let pos = usize::try_from(pos).unwrap_or(usize::MAX);
        (pos / self.segment_size, pos % self.segment_size)
    }

    #[inline]
    pub(crate) fn get_u32(&self, pos: u64) -> u32 {
        let (segment, offset) = self.locate(pos);
        LittleEndian::read_u32(&self.segments[segment][offset..offset + 4])
    }

    #[inline]
    pub(crate) fn set_u32(&mut self, pos: u64, value: u32) {
        let (segment, offset) = self.locate(pos);
        LittleEndian::write_u32(&mut self.segments[segment][offset..offset + 4], value);
    }

    pub(crate) fn header(&self, slot: usize) -> u32 {
        self.header[slot]
    }

    pub(crate) fn set_header(&mut self, slot: usize, value: u32) {
        self.header[slot] = value;
    }

    /// Writes the region to `path` and syncs it to disk
    pub(crate) fn flush(&self, path: &Path) -> Result<(), Error> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_u32::<LittleEndian>(MAGIC)?;
        writer.write_u32::<LittleEndian>(VERSION)?;
        writer.write_u32::<LittleEndian>(self.segment_size as u32)?;
        writer.write_u32::<LittleEndian>(self.segments.len() as u32)?;
        for value in self.header {
            writer.write_u32::<LittleEndian>(value)?;
        }
        for segment in &self.segments {
            writer.write_all(segment)?;
        }
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        log::debug!(
            "Flushed {} ({} bytes) to {}",
            self.name,
            self.capacity(),
            path.display()
        );
        Ok(())
    }

    pub(crate) fn load(name: &'static str, path: &Path) -> Result<Self, Error> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                Error::StoreCorrupted(format!("missing {name} file {}", path.display()))
            }
            _ => Error::IoError(e),
        })?;
        let mut reader = BufReader::new(file);
        let truncated = |e: std::io::Error| match e.kind() {
            ErrorKind::UnexpectedEof => Error::StoreCorrupted(format!("{name} is truncated")),
            _ => Error::IoError(e),
        };

        if reader.read_u32::<LittleEndian>().map_err(truncated)? != MAGIC {
            return Err(Error::StoreCorrupted(format!("{name} has a foreign header")));
        }
        let version = reader.read_u32::<LittleEndian>().map_err(truncated)?;
        if version != VERSION {
            return Err(Error::StoreCorrupted(format!(
                "{name} has version {version}, expected {VERSION}"
            )));
        }
        let segment_size = reader.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        if !segment_size.is_power_of_two() || segment_size < 8 {
            return Err(Error::StoreCorrupted(format!(
                "{name} has invalid segment size {segment_size}"
            )));
        }
        let segment_count = reader.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        let mut header = [0; HEADER_SLOTS];
        for slot in &mut header {
            *slot = reader.read_u32::<LittleEndian>().map_err(truncated)?;
        }

        let mut segments = Vec::with_capacity(segment_count);
        for _ in 0..segment_count {
            let mut segment = vec![0u8; segment_size].into_boxed_slice();
            reader.read_exact(&mut segment).map_err(truncated)?;
            segments.push(segment);
        }

        Ok(Self {
            name,
            segment_size,
            segments,
            header,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_keeps_earlier_values() {
        let mut da = DataAccess::new("test", 16);
        da.ensure_capacity(8);
        da.set_u32(4, 42);
        da.ensure_capacity(100);
        da.set_u32(96, 7);
        assert_eq!(da.get_u32(4), 42);
        assert_eq!(da.get_u32(96), 7);
        assert_eq!(da.capacity(), 112);
    }

    #[test]
    fn load_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage");
        std::fs::write(&path, b"not a store file at all").unwrap();
        let err = DataAccess::load("garbage", &path).unwrap_err();
        assert!(matches!(err, Error::StoreCorrupted(_)));
    }

    #[test]
    fn missing_file_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let err = DataAccess::load("nodes", &dir.path().join("nodes")).unwrap_err();
        assert!(matches!(err, Error::StoreCorrupted(_)));
    }

    #[test]
    fn flush_and_load_restore_header_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region");
        let mut da = DataAccess::new("region", 32);
        da.ensure_capacity(64);
        da.set_u32(60, 0xdead_beef);
        da.set_header(0, 3);
        da.flush(&path).unwrap();

        let loaded = DataAccess::load("region", &path).unwrap();
        assert_eq!(loaded.header(0), 3);
        assert_eq!(loaded.get_u32(60), 0xdead_beef);
        assert_eq!(loaded.capacity(), 64);
    }
}
