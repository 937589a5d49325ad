//! TSD opcode space and the small enumerations carried in operands

/// Channel program opcodes
pub mod cmd {
    /// Highest note-on opcode (0x00-0x7F are note numbers)
    pub const LAST_NOTE: u8 = 0x7F;
    pub const NOTE_OFF: u8 = 0x80;
    pub const VOLUME_MONO: u8 = 0x81;
    pub const SUSTAIN: u8 = 0x82;
    pub const DETUNE: u8 = 0x83;
    pub const PORTAMENTO: u8 = 0x84;
    pub const VOLUME_LEFT: u8 = 0x85;
    pub const VOLUME_RIGHT: u8 = 0x86;
    pub const PANPOT: u8 = 0x87;
    pub const RELATIVE_VOLUME_UP: u8 = 0x88;
    pub const RELATIVE_VOLUME_DOWN: u8 = 0x89;
    pub const TEMPO: u8 = 0x90;
    pub const FINENESS: u8 = 0x91;
    pub const KEY_ON_PHASE: u8 = 0x92;
    pub const MULTIPLE: u8 = 0x93;
    pub const PITCH_MODULATION_DELAY: u8 = 0xA0;
    pub const PITCH_MODULATION_DEPTH: u8 = 0xA1;
    pub const PITCH_MODULATION_WIDTH: u8 = 0xA2;
    pub const PITCH_MODULATION_HEIGHT: u8 = 0xA3;
    pub const PITCH_MODULATION_DELTA: u8 = 0xA4;
    pub const AMP_ENVELOPE: u8 = 0xB8;
    pub const NOTE_ENVELOPE: u8 = 0xC8;
    pub const ENDLESS_LOOP_POINT: u8 = 0xE0;
    pub const LOCAL_LOOP_START: u8 = 0xE1;
    pub const LOCAL_LOOP_BREAK: u8 = 0xE2;
    pub const LOCAL_LOOP_END: u8 = 0xE3;
    pub const FREQUENCY_MODE_CHANGE: u8 = 0xF0;
    pub const VOLUME_MODE_CHANGE: u8 = 0xF1;
    pub const FM_IN: u8 = 0xF8;
    pub const FM_OUT: u8 = 0xF9;
    pub const VOICE_CHANGE: u8 = 0xFD;
    pub const MODULE_CHANGE: u8 = 0xFE;
    pub const END: u8 = 0xFF;
}

/// Marker byte announcing a big-endian u16 note length
pub const EXTENDED_LENGTH: u8 = 0xFF;

/// Longest length a note or rest can carry
pub const MAX_LENGTH: u32 = 0xFFFF;

/// Number of local loop slots per channel
pub const MAX_LOCAL_LOOPS: usize = 16;

/// Number of FM pipes shared by the device bank
pub const FM_PIPES: usize = 4;

/// Encode a note/rest length (1 byte, or 0xFF + big-endian u16)
pub fn encode_length(length: u16, out: &mut Vec<u8>) {
    if length < EXTENDED_LENGTH as u16 {
        out.push(length as u8);
    } else {
        out.push(EXTENDED_LENGTH);
        out.extend_from_slice(&length.to_be_bytes());
    }
}

/// Virtual sound generator kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    Psg = 0,
    Fc = 1,
    Noise = 2,
    Sin = 3,
    Scc = 4,
    Osc = 5,
    GbSquare = 13,
    GbWave = 14,
}

impl ModuleType {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Psg),
            1 => Some(Self::Fc),
            2 => Some(Self::Noise),
            3 => Some(Self::Sin),
            4 => Some(Self::Scc),
            5 => Some(Self::Osc),
            13 => Some(Self::GbSquare),
            14 => Some(Self::GbWave),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }
}

/// How a channel's frequency parameter maps to Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyType {
    /// Parameter is Hz
    Normal = 0,
    /// Parameter is an AY-3-8910 tone period
    Msx = 1,
    /// Parameter is a 13-bit tone (7 bits) + fine (6 bits) value
    Fm = 2,
    /// Parameter is a Game Boy 11-bit period
    GbSquare = 3,
}

impl FrequencyType {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Normal),
            1 => Some(Self::Msx),
            2 => Some(Self::Fm),
            3 => Some(Self::GbSquare),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Largest valid parameter for portamento clamping
    pub fn max_param(self) -> Option<i32> {
        match self {
            Self::Normal => Some(0xFFFF),
            Self::Msx => Some(0x0FFF),
            Self::Fm => Some(0x1FFF),
            Self::GbSquare => None,
        }
    }
}

/// Volume curve selected with `@v`
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeType {
    Normal = 0,
    Fm = 1,
}

impl VolumeType {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Normal),
            1 => Some(Self::Fm),
            _ => None,
        }
    }
}

/// Where a sine module sends its output
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FmOutMode {
    Off = 0,
    Accumulate = 1,
    Overwrite = 2,
}

impl FmOutMode {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Off),
            1 => Some(Self::Accumulate),
            2 => Some(Self::Overwrite),
            _ => None,
        }
    }
}

/// Module change operand split into its two halves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedModule {
    /// Raw module id (low nibble)
    pub module: u8,
    /// Raw frequency type id
    pub frequency: u8,
}

/// Split a packed module byte.
///
/// The low nibble is the module id. With bit 7 clear the frequency type sits
/// in bits 4-6; legacy content sets bit 7 alone to request MSX periods.
pub fn unpack_module(value: u8) -> PackedModule {
    let frequency = if value & 0x80 != 0 {
        FrequencyType::Msx.id()
    } else {
        (value >> 4) & 0x07
    };
    PackedModule {
        module: value & 0x0F,
        frequency,
    }
}

/// Build a packed module byte with the frequency type in bits 4-6
pub fn pack_module(module: ModuleType, frequency: FrequencyType) -> u8 {
    (frequency.id() << 4) | module.id()
}

/// Pack an FM pipe operand (upper nibble selector, lower nibble pipe)
pub fn pack_pipe(selector: u8, pipe: u8) -> u8 {
    ((selector & 0x0F) << 4) | (pipe & 0x0F)
}

/// Split an FM pipe operand into (selector, pipe)
pub fn unpack_pipe(value: u8) -> (u8, u8) {
    (value >> 4, value & 0x0F)
}
