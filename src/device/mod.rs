//! Virtual device bank: generator modules, FM pipes and the two timers

pub mod module;
pub mod timer;

use crate::tsd::opcode::FM_PIPES;
use std::collections::BTreeMap;

pub use module::{FmInput, FmOutput, Module, SAMPLE_RATE};
pub use timer::{Timer, TimerHandler, TimerId};

/// Bank of generator modules mixed into one interleaved stereo buffer
pub struct DeviceBank {
    buffer: Vec<i32>,
    /// Per-frame scratch buffers shared between modules
    pipes: [Vec<i32>; FM_PIPES],
    modules: Vec<Module>,
    timers: [Timer; 2],
    waves: BTreeMap<u8, Vec<i8>>,
    sine: [i32; module::SINE_LENGTH],
}

impl DeviceBank {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            pipes: std::array::from_fn(|_| Vec::new()),
            modules: Vec::new(),
            timers: [Timer::default(); 2],
            waves: BTreeMap::new(),
            sine: module::sine_table(),
        }
    }

    /// Replace all modules with `count` fresh PSG modules
    pub fn set_max_channel(&mut self, count: usize) {
        self.modules = (0..count).map(|_| Module::new()).collect();
    }

    pub fn max_channel(&self) -> usize {
        self.modules.len()
    }

    pub fn module(&self, index: usize) -> Option<&Module> {
        self.modules.get(index)
    }

    pub fn module_mut(&mut self, index: usize) -> Option<&mut Module> {
        self.modules.get_mut(index)
    }

    /// Register a wave table for wave based generators
    pub fn set_wave(&mut self, id: u8, wave: Vec<i8>) {
        self.waves.insert(id, wave);
    }

    pub fn wave(&self, id: u8) -> Option<&[i8]> {
        self.waves.get(&id).map(Vec::as_slice)
    }

    /// Arm a timer with a period in frames; 0 disables it
    pub fn set_timer(&mut self, id: TimerId, period: u32) {
        self.timers[id.index()].set_period(period);
    }

    pub fn timer(&self, id: TimerId) -> &Timer {
        &self.timers[id.index()]
    }

    /// Generate `length` interleaved entries (two per frame).
    ///
    /// The block is split at every timer expiry so that parameter changes made
    /// by `handler` take effect on the exact frame the timer fired.
    pub fn generate(&mut self, length: usize, handler: &mut dyn TimerHandler) -> &[i32] {
        self.buffer.clear();
        self.buffer.resize(length, 0);

        let frames = length / 2;
        let mut done = 0;
        while done < frames {
            let mut count = frames - done;
            for timer in self.timers.iter().filter(|t| t.enabled) {
                count = count.min(timer.remaining as usize);
            }
            self.render(done, count);
            done += count;

            for id in TimerId::ALL {
                if self.timers[id.index()].advance(count as u32) {
                    handler.on_timer(id, self);
                }
            }
        }
        &self.buffer
    }

    fn render(&mut self, offset: usize, frames: usize) {
        for pipe in self.pipes.iter_mut() {
            pipe.clear();
            pipe.resize(frames, 0);
        }
        let buffer = &mut self.buffer[offset * 2..(offset + frames) * 2];
        for module in self.modules.iter_mut() {
            module.generate(buffer, &mut self.pipes, &self.sine);
        }
    }
}

impl Default for DeviceBank {
    fn default() -> Self {
        Self::new()
    }
}
