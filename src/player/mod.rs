//! TSD player: sequencer plus device bank behind a pull interface

pub mod automation;
pub mod channel;
pub mod sequencer;
pub mod tables;

use crate::device::{DeviceBank, TimerHandler, TimerId};
use crate::error::Result;
use crate::tsd::{TsdFile, TsdReader};

pub use channel::PlaybackChannel;
pub use sequencer::Sequencer;

/// Default period of both timers in frames
pub const DEFAULT_TIMER_COUNT: u32 = 368;

/// Default gain applied by `pull_samples`
pub const DEFAULT_MASTER_VOLUME: i32 = 8;

/// Plays a compiled TSD image
pub struct TsdPlayer {
    sequencer: Sequencer,
    bank: DeviceBank,
    header: Option<TsdFile>,
    master_volume: i32,
}

impl TsdPlayer {
    pub fn new() -> Self {
        Self {
            sequencer: Sequencer::new(),
            bank: DeviceBank::new(),
            header: None,
            master_volume: DEFAULT_MASTER_VOLUME,
        }
    }

    /// Parse `data` and prepare every channel for playback
    pub fn load(&mut self, data: &[u8]) -> Result<()> {
        let mut reader = TsdReader::new(data);
        let file = reader.parse()?;
        log::info!("TSD: version = {}", file.version_string());
        log::info!("TSD: title = {}", file.title);
        log::info!("TSD: channel = {}", file.channels.len());
        for (i, entry) in file.channels.iter().enumerate() {
            log::info!("TSD: ch.{} offset = {}, size = {}", i, entry.offset, entry.size);
        }

        let programs = file
            .channels
            .iter()
            .map(|entry| reader.program(entry).to_vec())
            .collect();
        self.sequencer.reset(programs, file.tables.envelopes.clone());

        self.bank = DeviceBank::new();
        self.bank.set_max_channel(file.channels.len());
        for (&id, wave) in &file.tables.waves {
            self.bank.set_wave(id, wave.clone());
        }
        self.bank.set_timer(TimerId::Automation, DEFAULT_TIMER_COUNT);
        self.bank.set_timer(TimerId::Sequencer, DEFAULT_TIMER_COUNT);

        self.header = Some(file);
        Ok(())
    }

    /// Header of the loaded file
    pub fn header(&self) -> Option<&TsdFile> {
        self.header.as_ref()
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn bank(&self) -> &DeviceBank {
        &self.bank
    }

    pub fn is_playing(&self) -> bool {
        self.sequencer.is_playing()
    }

    pub fn master_volume(&self) -> i32 {
        self.master_volume
    }

    pub fn set_master_volume(&mut self, volume: i32) {
        self.master_volume = volume;
    }

    /// Run one timer callback immediately, without rendering audio
    pub fn tick(&mut self, id: TimerId) {
        self.sequencer.on_timer(id, &mut self.bank);
    }

    /// Raw interleaved stereo mix of `length` entries
    pub fn generate(&mut self, length: usize) -> &[i32] {
        self.bank.generate(length, &mut self.sequencer)
    }

    /// Interleaved stereo samples scaled by the master volume
    pub fn pull_samples(&mut self, length: usize) -> Vec<i16> {
        let gain = self.master_volume;
        self.bank
            .generate(length, &mut self.sequencer)
            .iter()
            .map(|&s| s.saturating_mul(gain).clamp(-32767, 32767) as i16)
            .collect()
    }
}

impl Default for TsdPlayer {
    fn default() -> Self {
        Self::new()
    }
}
