//! Per-voice playback state

use crate::tsd::opcode::{FrequencyType, ModuleType, VolumeType, MAX_LOCAL_LOOPS};

/// One `/: ... :/` slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalLoop {
    /// First command of the body
    pub offset: usize,
    /// Iterations left including the current one
    pub count: u8,
    /// Command following the loop end, once seen
    pub end: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Volume {
    pub mode: VolumeType,
    pub l: u8,
    pub r: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frequency {
    pub kind: FrequencyType,
    pub note: u8,
    /// Type dependent parameter (Hz, period or tone/fine)
    pub param: i32,
    /// Resolved frequency last written to the module
    pub hz: u32,
}

/// Trapezoid vibrato
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PitchModulation {
    pub enabled: bool,
    pub delay: u16,
    pub depth: u8,
    pub width: u8,
    pub height: u8,
    pub delta: u8,
    pub delay_count: u16,
    pub width_count: u8,
    pub delta_count: u8,
    pub current_depth: i32,
    /// Offset currently applied to the frequency parameter
    pub current_height: i32,
    /// Step added every `width` ticks
    pub current_diff: i32,
}

impl PitchModulation {
    /// Restart the shape at key-on
    pub fn reset(&mut self) {
        self.delay_count = 0;
        self.width_count = 0;
        self.delta_count = 0;
        self.current_depth = if self.delta > 0 {
            1.min(self.depth as i32)
        } else {
            self.depth as i32
        };
        self.current_height = 0;
        self.current_diff = self.height as i32;
    }
}

/// Table driven stepping shared by the amplitude and note envelopes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Envelope {
    pub enabled: bool,
    pub id: u8,
    pub wait: u8,
    /// Next table entry
    pub step: usize,
    pub count: u8,
}

impl Envelope {
    pub fn select(&mut self, id: u8, wait: u8) {
        self.id = id;
        self.wait = wait;
        self.enabled = wait > 0;
        self.restart();
    }

    pub fn restart(&mut self) {
        self.step = 0;
        self.count = 0;
    }

    /// Count one tick, returning the next table index when due
    pub fn tick(&mut self, table: &[i8]) -> Option<i32> {
        if !self.enabled {
            return None;
        }
        self.count += 1;
        if self.count < self.wait {
            return None;
        }
        self.count = 0;
        let value = table.get(self.step).copied()?;
        self.step += 1;
        Some(value as i32)
    }
}

/// Playback state of one channel program
#[derive(Debug, Clone)]
pub struct PlaybackChannel {
    pub program: Vec<u8>,
    /// Next command to execute
    pub offset: usize,
    /// Sequencer ticks until the next dispatch
    pub wait: u32,
    pub active: bool,
    /// Target of the end command, set by the endless loop marker
    pub loop_offset: Option<usize>,
    /// Whether any tick elapsed since passing the loop marker
    pub waited_since_loop: bool,
    pub local_loops: [LocalLoop; MAX_LOCAL_LOOPS],
    pub sustain_level: u8,
    /// Decaying volume after key-off
    pub sustain_l: i32,
    pub sustain_r: i32,
    pub portamento: i8,
    pub detune: i8,
    pub key_on: bool,
    pub volume: Volume,
    /// bit0 = left, bit1 = right
    pub pan: u8,
    pub frequency: Frequency,
    pub pitch_modulation: PitchModulation,
    pub amp_envelope: Envelope,
    /// Envelope driven volume, reloaded at key-on
    pub envelope_l: i32,
    pub envelope_r: i32,
    pub note_envelope: Envelope,
    /// Frequency parameter offset accumulated by the note envelope
    pub note_offset: i32,
    pub module: ModuleType,
    pub portamento_warned: bool,
}

impl PlaybackChannel {
    pub fn new(program: Vec<u8>) -> Self {
        Self {
            program,
            offset: 0,
            wait: 1,
            active: true,
            loop_offset: None,
            waited_since_loop: false,
            local_loops: [LocalLoop::default(); MAX_LOCAL_LOOPS],
            sustain_level: 0,
            sustain_l: 0,
            sustain_r: 0,
            portamento: 0,
            detune: 0,
            key_on: false,
            volume: Volume {
                mode: VolumeType::Normal,
                l: 0,
                r: 0,
            },
            pan: 3,
            frequency: Frequency {
                kind: FrequencyType::Normal,
                note: 0,
                param: 0,
                hz: 0,
            },
            pitch_modulation: PitchModulation::default(),
            amp_envelope: Envelope::default(),
            envelope_l: 0,
            envelope_r: 0,
            note_envelope: Envelope::default(),
            note_offset: 0,
            module: ModuleType::Psg,
            portamento_warned: false,
        }
    }

    /// Stop interpreting this channel
    pub fn halt(&mut self) {
        self.active = false;
        self.wait = 0;
    }

    /// Parameter including vibrato and note envelope offsets
    pub fn effective_param(&self) -> i32 {
        let mut param = self.frequency.param + self.note_offset;
        if self.pitch_modulation.enabled {
            param += self.pitch_modulation.current_height;
        }
        param
    }

    /// Volume before pan masking: envelope driven when one is active
    pub fn current_volume(&self) -> (i32, i32) {
        if self.amp_envelope.enabled {
            (self.envelope_l, self.envelope_r)
        } else {
            (self.volume.l as i32, self.volume.r as i32)
        }
    }

    /// Zero the sides disabled by the pan mask
    pub fn apply_pan(&self, l: i32, r: i32) -> (i32, i32) {
        (
            if self.pan & 1 != 0 { l } else { 0 },
            if self.pan & 2 != 0 { r } else { 0 },
        )
    }
}
