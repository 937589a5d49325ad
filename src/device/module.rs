//! Virtual sound generators

use crate::tsd::opcode::{FmOutMode, ModuleType, FM_PIPES};

/// Output sample rate in Hz
pub const SAMPLE_RATE: u32 = 44100;

/// Entries in the sine lookup table
pub const SINE_LENGTH: usize = 256;

/// `round(127 * sin(2πi/256))`
pub fn sine_table() -> [i32; SINE_LENGTH] {
    let mut table = [0; SINE_LENGTH];
    for (i, entry) in table.iter_mut().enumerate() {
        let angle = 2.0 * std::f64::consts::PI * i as f64 / SINE_LENGTH as f64;
        *entry = (127.0 * angle.sin()).round() as i32;
    }
    table
}

/// Phase modulation source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FmInput {
    /// Right shift applied to the pipe value; 0 disables the input
    pub rate: u8,
    pub pipe: u8,
}

/// Output routing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FmOutput {
    pub mode: FmOutMode,
    pub pipe: u8,
}

impl Default for FmOutput {
    fn default() -> Self {
        Self {
            mode: FmOutMode::Off,
            pipe: 0,
        }
    }
}

/// One generator slot of the device bank
#[derive(Debug, Clone)]
pub struct Module {
    module_type: ModuleType,
    /// Phase accumulator
    count: u64,
    /// Square parity, or sine table index
    phase: u32,
    /// Frequency in Hz
    pub frequency: u32,
    pub volume_l: i32,
    pub volume_r: i32,
    pub multiple: u32,
    pub voice: u8,
    pub fm_in: FmInput,
    pub fm_out: FmOutput,
}

impl Module {
    pub fn new() -> Self {
        Self {
            module_type: ModuleType::Psg,
            count: 0,
            phase: 0,
            frequency: 0,
            volume_l: 0,
            volume_r: 0,
            multiple: 1,
            voice: 0,
            fm_in: FmInput::default(),
            fm_out: FmOutput::default(),
        }
    }

    pub fn module_type(&self) -> ModuleType {
        self.module_type
    }

    /// Switch generator, restarting its phase and voice
    pub fn set_type(&mut self, module_type: ModuleType) {
        self.module_type = module_type;
        self.count = 0;
        self.phase = 0;
        self.voice = 0;
    }

    pub fn set_volume(&mut self, l: i32, r: i32) {
        self.volume_l = l;
        self.volume_r = r;
    }

    /// Mix one sub-block into `buffer` (interleaved stereo).
    ///
    /// Only PSG and SIN have real generators. FC, NOISE, SCC, OSC and the
    /// Game Boy types are rendered as PSG squares until dedicated emulations
    /// exist; content written against the old player relies on that sound.
    pub fn generate(
        &mut self,
        buffer: &mut [i32],
        pipes: &mut [Vec<i32>; FM_PIPES],
        sine: &[i32; SINE_LENGTH],
    ) {
        match self.module_type {
            ModuleType::Sin => self.generate_sine(buffer, pipes, sine),
            _ => self.generate_psg(buffer),
        }
    }

    fn generate_psg(&mut self, buffer: &mut [i32]) {
        let mut volume_l = self.volume_l << 4;
        let mut volume_r = self.volume_r << 4;
        let plus = self.frequency as u64 * 2 * self.multiple as u64;
        if self.phase == 0 {
            volume_l = -volume_l;
            volume_r = -volume_r;
        }
        for frame in buffer.chunks_exact_mut(2) {
            frame[0] += volume_l;
            frame[1] += volume_r;
            self.count += plus;
            while self.count > SAMPLE_RATE as u64 {
                volume_l = -volume_l;
                volume_r = -volume_r;
                self.count -= SAMPLE_RATE as u64;
                self.phase ^= 1;
            }
        }
    }

    fn generate_sine(
        &mut self,
        buffer: &mut [i32],
        pipes: &mut [Vec<i32>; FM_PIPES],
        sine: &[i32; SINE_LENGTH],
    ) {
        const WRAP: u64 = SAMPLE_RATE as u64 * SINE_LENGTH as u64;
        let step = self.frequency as u64 * SINE_LENGTH as u64 * self.multiple as u64;
        let in_pipe = self.fm_in.pipe as usize % FM_PIPES;
        let out_pipe = self.fm_out.pipe as usize % FM_PIPES;

        for (i, frame) in buffer.chunks_exact_mut(2).enumerate() {
            let mut index = self.phase as i32;
            if self.fm_in.rate != 0 {
                let modulation = pipes[in_pipe].get(i).copied().unwrap_or(0);
                index += modulation >> self.fm_in.rate;
            }
            let value = sine[(index & 0xFF) as usize];
            let out_l = (value * self.volume_l) >> 3;
            let out_r = (value * self.volume_r) >> 3;
            match self.fm_out.mode {
                FmOutMode::Off => {
                    frame[0] += out_l;
                    frame[1] += out_r;
                }
                FmOutMode::Accumulate => {
                    if let Some(slot) = pipes[out_pipe].get_mut(i) {
                        *slot += out_l;
                    }
                }
                FmOutMode::Overwrite => {
                    if let Some(slot) = pipes[out_pipe].get_mut(i) {
                        *slot = out_l;
                    }
                }
            }
            self.count = (self.count + step) % WRAP;
            self.phase = (self.count / SAMPLE_RATE as u64) as u32;
        }
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}
