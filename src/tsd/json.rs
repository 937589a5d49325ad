//! JSON serialization types for TSD data

use super::commands::{self, TsdCommand};
use super::reader::{TsdFile, TsdReader};
use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;

/// Top-level JSON structure for a TSD file
#[derive(Debug, Clone, Serialize)]
pub struct TsdJson {
    /// Format version as a string (e.g., "0.93")
    pub version: String,
    /// Music title
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// Decoded channel programs
    pub channels: Vec<ChannelJson>,
    /// Wave tables by id
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub waves: BTreeMap<u8, Vec<i8>>,
    /// Envelope tables by id
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tables: BTreeMap<u8, Vec<i8>>,
}

/// JSON representation of one channel program
#[derive(Debug, Clone, Serialize)]
pub struct ChannelJson {
    pub offset: usize,
    pub size: usize,
    pub commands: Vec<TsdCommand>,
}

impl TsdJson {
    /// Create a TsdJson from a parsed file and the raw data it came from
    pub fn new(file: &TsdFile, reader: &TsdReader) -> Result<Self> {
        let channels = file
            .channels
            .iter()
            .map(|entry| {
                Ok(ChannelJson {
                    offset: entry.offset,
                    size: entry.size,
                    commands: commands::decode_program(reader.program(entry))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            version: file.version_string(),
            title: file.title.clone(),
            channels,
            waves: file.tables.waves.clone(),
            tables: file.tables.envelopes.clone(),
        })
    }

    /// Parse raw TSD data straight into its JSON model
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = TsdReader::new(data);
        let file = reader.parse()?;
        Self::new(&file, &reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsd::{TsdTables, TsdWriter};

    #[test]
    fn test_json_shape() {
        let programs = vec![vec![0x45, 0x30, 0xFF]];
        let bytes = TsdWriter::new("", &programs, &TsdTables::default())
            .to_bytes()
            .unwrap();
        let json = TsdJson::from_bytes(&bytes).unwrap();
        let value = serde_json::to_value(&json).unwrap();

        assert_eq!(value["version"], "0.93");
        assert!(value.get("title").is_none());
        assert_eq!(value["channels"][0]["commands"][0]["cmd"], "note_on");
        assert_eq!(value["channels"][0]["commands"][0]["note"], 0x45);
        assert_eq!(value["channels"][0]["commands"][1]["cmd"], "end");
    }
}
