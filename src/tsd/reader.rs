//! TSD file reader and parser

use super::{TsdTables, MAGIC, VERSION_MAJOR, VERSION_MINOR};
use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Oldest format revision the player understands (0.61)
const MIN_VERSION: u16 = 61;

/// Directory entry locating one channel program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEntry {
    /// Absolute offset of the program
    pub offset: usize,
    /// Program size in bytes
    pub size: usize,
}

/// Parsed TSD header and tables
#[derive(Debug, Clone, Default)]
pub struct TsdFile {
    pub major_version: u8,
    pub minor_version: u8,
    pub title: String,
    pub channels: Vec<ChannelEntry>,
    pub table_offset: usize,
    pub tables: TsdTables,
}

impl TsdFile {
    /// Version as `major.minor` (e.g. "0.93")
    pub fn version_string(&self) -> String {
        format!("{}.{:02}", self.major_version, self.minor_version)
    }
}

/// TSD file reader
pub struct TsdReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> TsdReader<'a> {
    /// Create a new reader from raw TSD data
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Get current position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Seek to a position
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8> {
        if self.pos >= self.data.len() {
            return Err(Error::TsdParse("Unexpected end of data".into()));
        }
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    /// Read a 16-bit big-endian value
    pub fn read_u16_be(&mut self) -> Result<u16> {
        let hi = self.read_u8()? as u16;
        let lo = self.read_u8()? as u16;
        Ok((hi << 8) | lo)
    }

    /// Read a 32-bit big-endian value
    pub fn read_u32_be(&mut self) -> Result<u32> {
        let hi = self.read_u16_be()? as u32;
        let lo = self.read_u16_be()? as u32;
        Ok((hi << 16) | lo)
    }

    /// Read bytes into a buffer
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.pos + len > self.data.len() {
            return Err(Error::TsdParse("Unexpected end of data".into()));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Validate magic and version, then parse directory and tables
    pub fn parse(&mut self) -> Result<TsdFile> {
        self.seek(0);
        let magic = self
            .read_bytes(MAGIC.len())
            .map_err(|_| Error::TsdParse("File too small for TSD header".into()))?;
        if magic != MAGIC {
            return Err(Error::TsdParse("magic T'SoundSystem not found".into()));
        }

        let major_version = self.read_u8()?;
        let minor_version = self.read_u8()?;
        let version = major_version as u16 * 100 + minor_version as u16;
        let supported = VERSION_MAJOR as u16 * 100 + VERSION_MINOR as u16;
        if version < MIN_VERSION || version > supported {
            return Err(Error::TsdParse(format!(
                "unsupported format version {}.{:02}",
                major_version, minor_version
            )));
        }

        let title_size = self.read_u16_be()? as usize;
        let title_bytes = self.read_bytes(title_size)?;
        let title = String::from_utf8(title_bytes.to_vec())
            .map_err(|_| Error::TsdParse("Invalid UTF-8 in title".into()))?;
        if title_size & 1 != 0 {
            self.read_u8()?;
        }

        let count = self.read_u16_be()? as usize;
        let mut channels = Vec::with_capacity(count);
        for i in 0..count {
            let offset = self.read_u32_be()? as usize;
            let size = self.read_u32_be()? as usize;
            if offset.checked_add(size).map_or(true, |end| end > self.data.len()) {
                return Err(Error::TsdParse(format!(
                    "channel {} (offset {}, size {}) is out of bounds",
                    i, offset, size
                )));
            }
            channels.push(ChannelEntry { offset, size });
        }

        let table_offset = self.read_u32_be()? as usize;
        if table_offset > self.data.len() {
            return Err(Error::TsdParse(format!(
                "table offset {} is out of bounds",
                table_offset
            )));
        }
        self.seek(table_offset);
        let waves = self.parse_table_block()?;
        let envelopes = self.parse_table_block()?;

        Ok(TsdFile {
            major_version,
            minor_version,
            title,
            channels,
            table_offset,
            tables: TsdTables { waves, envelopes },
        })
    }

    fn parse_table_block(&mut self) -> Result<BTreeMap<u8, Vec<i8>>> {
        let count = self.read_u16_be()?;
        let mut block = BTreeMap::new();
        for _ in 0..count {
            let id = self.read_u8()?;
            let len = self.read_u8()? as usize;
            let values = self.read_bytes(len)?.iter().map(|&b| b as i8).collect();
            block.insert(id, values);
        }
        Ok(block)
    }

    /// Slice of one channel program
    pub fn program(&self, entry: &ChannelEntry) -> &'a [u8] {
        &self.data[entry.offset..entry.offset + entry.size]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsd::TsdWriter;

    fn sample_file() -> Vec<u8> {
        let mut tables = TsdTables::default();
        tables.waves.insert(0, vec![1; 32]);
        tables.envelopes.insert(3, vec![-8, 4]);
        let programs = vec![vec![0x3C, 0x30, 0xFF], vec![0xFF]];
        TsdWriter::new("title", &programs, &tables).to_bytes().unwrap()
    }

    #[test]
    fn test_parse_written_file() {
        let data = sample_file();
        let mut reader = TsdReader::new(&data);
        let file = reader.parse().unwrap();

        assert_eq!(file.version_string(), "0.93");
        assert_eq!(file.title, "title");
        assert_eq!(file.channels.len(), 2);
        assert_eq!(reader.program(&file.channels[0]), &[0x3C, 0x30, 0xFF]);
        assert_eq!(reader.program(&file.channels[1]), &[0xFF]);
        assert_eq!(file.tables.waves[&0].len(), 32);
        assert_eq!(file.tables.envelopes[&3], vec![-8, 4]);
    }

    #[test]
    fn test_bad_magic() {
        let mut data = sample_file();
        data[0] = b'X';
        assert!(TsdReader::new(&data).parse().is_err());
    }

    #[test]
    fn test_unsupported_version() {
        let mut data = sample_file();
        data[15] = 99;
        assert!(TsdReader::new(&data).parse().is_err());
        data[15] = 50;
        assert!(TsdReader::new(&data).parse().is_err());
    }

    #[test]
    fn test_out_of_bounds_directory_entry() {
        let mut data = sample_file();
        // title "title" (5 bytes + pad) puts the first size field at 30..34
        data[32] = 0xF0;
        let err = TsdReader::new(&data).parse().unwrap_err();
        assert!(err.to_string().contains("out of bounds"));
    }
}
