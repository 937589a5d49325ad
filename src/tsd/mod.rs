//! TSD binary format: opcodes, writer, reader and command decoder

pub mod commands;
pub mod json;
pub mod opcode;
pub mod reader;
pub mod writer;

use std::collections::BTreeMap;

pub use commands::TsdCommand;
pub use json::TsdJson;
pub use reader::{ChannelEntry, TsdFile, TsdReader};
pub use writer::TsdWriter;

/// File identifier including its terminating NUL
pub const MAGIC: &[u8; 14] = b"T'SoundSystem\0";

/// Format version written by the compiler (0.93)
pub const VERSION_MAJOR: u8 = 0;
pub const VERSION_MINOR: u8 = 93;

/// Entries in every wave table
pub const WAVE_LENGTH: usize = 32;

/// Wave and envelope tables keyed by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TsdTables {
    /// 32-entry signed sample tables
    pub waves: BTreeMap<u8, Vec<i8>>,
    /// Variable length signed step tables
    pub envelopes: BTreeMap<u8, Vec<i8>>,
}
