//! TSD file writer

use super::{TsdTables, MAGIC, VERSION_MAJOR, VERSION_MINOR};
use crate::error::Result;
use byteorder::{BigEndian, WriteBytesExt};
use std::io::Write;

/// Serializes compiled channel programs into the TSD layout.
///
/// Every directory offset is computed from sizes that are already known, so
/// the file is produced in one forward pass without seeking back.
pub struct TsdWriter<'a> {
    title: &'a str,
    programs: &'a [Vec<u8>],
    tables: &'a TsdTables,
}

impl<'a> TsdWriter<'a> {
    pub fn new(title: &'a str, programs: &'a [Vec<u8>], tables: &'a TsdTables) -> Self {
        Self {
            title,
            programs,
            tables,
        }
    }

    /// Size of everything before the first channel program
    fn header_size(&self) -> usize {
        let title = self.title.len();
        MAGIC.len() + 2 + 2 + title + (title & 1) + 2 + 8 * self.programs.len() + 4
    }

    /// Write the complete TSD image to `out`
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_all(MAGIC)?;
        out.write_u8(VERSION_MAJOR)?;
        out.write_u8(VERSION_MINOR)?;

        let title = self.title.as_bytes();
        out.write_u16::<BigEndian>(title.len() as u16)?;
        out.write_all(title)?;
        if title.len() & 1 != 0 {
            out.write_u8(0)?;
        }

        out.write_u16::<BigEndian>(self.programs.len() as u16)?;
        let mut offset = self.header_size();
        for program in self.programs {
            out.write_u32::<BigEndian>(offset as u32)?;
            out.write_u32::<BigEndian>(program.len() as u32)?;
            offset += program.len();
        }
        // voice/table area follows the last program
        out.write_u32::<BigEndian>(offset as u32)?;

        for program in self.programs {
            out.write_all(program)?;
        }

        write_table_block(out, &self.tables.waves)?;
        write_table_block(out, &self.tables.envelopes)?;
        Ok(())
    }

    /// Write the TSD image into a new buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.header_size() + 256);
        self.write_to(&mut out)?;
        Ok(out)
    }
}

fn write_table_block<W: Write>(
    out: &mut W,
    block: &std::collections::BTreeMap<u8, Vec<i8>>,
) -> Result<()> {
    out.write_u16::<BigEndian>(block.len() as u16)?;
    for (&id, values) in block {
        out.write_u8(id)?;
        out.write_u8(values.len() as u8)?;
        for &v in values {
            out.write_i8(v)?;
        }
    }
    Ok(())
}
