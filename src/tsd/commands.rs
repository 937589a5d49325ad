//! TSD command definitions and decoding

use super::opcode::{self, cmd, EXTENDED_LENGTH};
use crate::error::{Error, Result};
use serde::Serialize;

/// A decoded channel program command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum TsdCommand {
    /// Key on a note for `length` ticks
    NoteOn { note: u8, length: u16 },
    /// Key off for `length` ticks
    NoteOff { length: u16 },
    VolumeMono { value: u8 },
    Sustain { level: u8 },
    Detune { value: i8 },
    Portamento { value: i8 },
    VolumeLeft { value: u8 },
    VolumeRight { value: u8 },
    Panpot { value: u8 },
    RelativeVolumeUp { value: u8 },
    RelativeVolumeDown { value: u8 },
    /// Sequencer timer period in samples
    Tempo { value: u16 },
    /// Automation timer period in samples
    Fineness { value: u16 },
    KeyOnPhase { value: u8 },
    Multiple { value: u8 },
    PitchModulationDelay { value: u16 },
    PitchModulationDepth { value: u8 },
    PitchModulationWidth { value: u8 },
    PitchModulationHeight { value: u8 },
    PitchModulationDelta { value: u8 },
    AmpEnvelope { id: u8, wait: u8 },
    NoteEnvelope { id: u8, wait: u8 },
    EndlessLoopPoint,
    LocalLoopStart { id: u8, count: u8 },
    LocalLoopBreak { id: u8 },
    LocalLoopEnd { id: u8 },
    FrequencyModeChange { value: u8 },
    VolumeModeChange { value: u8 },
    FmIn { rate: u8, pipe: u8 },
    FmOut { mode: u8, pipe: u8 },
    VoiceChange { value: u8 },
    /// Packed module change, shown split
    ModuleChange { module: u8, frequency: u8 },
    End,
}

/// Bounds-checked cursor over one channel program
struct ProgramCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ProgramCursor<'a> {
    fn read_u8(&mut self) -> Result<u8> {
        let b = self.data.get(self.pos).copied().ok_or_else(|| {
            Error::TsdParse(format!("operand past program end at offset {}", self.pos))
        })?;
        self.pos += 1;
        Ok(b)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let hi = self.read_u8()? as u16;
        let lo = self.read_u8()? as u16;
        Ok((hi << 8) | lo)
    }

    fn read_length(&mut self) -> Result<u16> {
        let b = self.read_u8()?;
        if b == EXTENDED_LENGTH {
            self.read_u16()
        } else {
            Ok(b as u16)
        }
    }
}

/// Decode the command at `offset`, returning it and the offset of the next one
pub fn decode(data: &[u8], offset: usize) -> Result<(TsdCommand, usize)> {
    let mut c = ProgramCursor { data, pos: offset };
    let op = c.read_u8()?;
    let command = match op {
        0..=cmd::LAST_NOTE => TsdCommand::NoteOn {
            note: op,
            length: c.read_length()?,
        },
        cmd::NOTE_OFF => TsdCommand::NoteOff {
            length: c.read_length()?,
        },
        cmd::VOLUME_MONO => TsdCommand::VolumeMono { value: c.read_u8()? },
        cmd::SUSTAIN => TsdCommand::Sustain { level: c.read_u8()? },
        cmd::DETUNE => TsdCommand::Detune {
            value: c.read_u8()? as i8,
        },
        cmd::PORTAMENTO => TsdCommand::Portamento {
            value: c.read_u8()? as i8,
        },
        cmd::VOLUME_LEFT => TsdCommand::VolumeLeft { value: c.read_u8()? },
        cmd::VOLUME_RIGHT => TsdCommand::VolumeRight { value: c.read_u8()? },
        cmd::PANPOT => TsdCommand::Panpot { value: c.read_u8()? },
        cmd::RELATIVE_VOLUME_UP => TsdCommand::RelativeVolumeUp { value: c.read_u8()? },
        cmd::RELATIVE_VOLUME_DOWN => TsdCommand::RelativeVolumeDown { value: c.read_u8()? },
        cmd::TEMPO => TsdCommand::Tempo { value: c.read_u16()? },
        cmd::FINENESS => TsdCommand::Fineness { value: c.read_u16()? },
        cmd::KEY_ON_PHASE => TsdCommand::KeyOnPhase { value: c.read_u8()? },
        cmd::MULTIPLE => TsdCommand::Multiple { value: c.read_u8()? },
        cmd::PITCH_MODULATION_DELAY => TsdCommand::PitchModulationDelay { value: c.read_u16()? },
        cmd::PITCH_MODULATION_DEPTH => TsdCommand::PitchModulationDepth { value: c.read_u8()? },
        cmd::PITCH_MODULATION_WIDTH => TsdCommand::PitchModulationWidth { value: c.read_u8()? },
        cmd::PITCH_MODULATION_HEIGHT => TsdCommand::PitchModulationHeight { value: c.read_u8()? },
        cmd::PITCH_MODULATION_DELTA => TsdCommand::PitchModulationDelta { value: c.read_u8()? },
        cmd::AMP_ENVELOPE => TsdCommand::AmpEnvelope {
            id: c.read_u8()?,
            wait: c.read_u8()?,
        },
        cmd::NOTE_ENVELOPE => TsdCommand::NoteEnvelope {
            id: c.read_u8()?,
            wait: c.read_u8()?,
        },
        cmd::ENDLESS_LOOP_POINT => TsdCommand::EndlessLoopPoint,
        cmd::LOCAL_LOOP_START => TsdCommand::LocalLoopStart {
            id: c.read_u8()?,
            count: c.read_u8()?,
        },
        cmd::LOCAL_LOOP_BREAK => TsdCommand::LocalLoopBreak { id: c.read_u8()? },
        cmd::LOCAL_LOOP_END => TsdCommand::LocalLoopEnd { id: c.read_u8()? },
        cmd::FREQUENCY_MODE_CHANGE => TsdCommand::FrequencyModeChange { value: c.read_u8()? },
        cmd::VOLUME_MODE_CHANGE => TsdCommand::VolumeModeChange { value: c.read_u8()? },
        cmd::FM_IN => {
            let (rate, pipe) = opcode::unpack_pipe(c.read_u8()?);
            TsdCommand::FmIn { rate, pipe }
        }
        cmd::FM_OUT => {
            let (mode, pipe) = opcode::unpack_pipe(c.read_u8()?);
            TsdCommand::FmOut { mode, pipe }
        }
        cmd::VOICE_CHANGE => TsdCommand::VoiceChange { value: c.read_u8()? },
        cmd::MODULE_CHANGE => {
            let packed = opcode::unpack_module(c.read_u8()?);
            TsdCommand::ModuleChange {
                module: packed.module,
                frequency: packed.frequency,
            }
        }
        cmd::END => TsdCommand::End,
        _ => {
            return Err(Error::TsdParse(format!(
                "unknown opcode 0x{:02X} at offset {}",
                op, offset
            )))
        }
    };
    Ok((command, c.pos))
}

/// Decode a whole channel program up to and including its end command
pub fn decode_program(data: &[u8]) -> Result<Vec<TsdCommand>> {
    let mut commands = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let (command, next) = decode(data, offset)?;
        let end = command == TsdCommand::End;
        commands.push(command);
        if end {
            break;
        }
        offset = next;
    }
    Ok(commands)
}
