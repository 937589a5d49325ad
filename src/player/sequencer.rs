//! Channel program interpreter

use super::channel::PlaybackChannel;
use super::tables::Tables;
use crate::device::{DeviceBank, FmInput, FmOutput, TimerHandler, TimerId};
use crate::tsd::commands::{self, TsdCommand};
use crate::tsd::opcode::{FmOutMode, FrequencyType, ModuleType, VolumeType};
use std::collections::BTreeMap;

/// Drives every playback channel from the device bank timers
pub struct Sequencer {
    pub(super) channels: Vec<PlaybackChannel>,
    pub(super) envelopes: BTreeMap<u8, Vec<i8>>,
    pub(super) tables: Tables,
}

impl Sequencer {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            envelopes: BTreeMap::new(),
            tables: Tables::new(),
        }
    }

    /// Replace the loaded programs
    pub fn reset(&mut self, programs: Vec<Vec<u8>>, envelopes: BTreeMap<u8, Vec<i8>>) {
        self.channels = programs.into_iter().map(PlaybackChannel::new).collect();
        self.envelopes = envelopes;
    }

    pub fn channels(&self) -> &[PlaybackChannel] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&PlaybackChannel> {
        self.channels.get(index)
    }

    /// True while any channel is still interpreting its program
    pub fn is_playing(&self) -> bool {
        self.channels.iter().any(|ch| ch.active)
    }

    /// One sequencer tick over all channels
    pub fn sequence(&mut self, bank: &mut DeviceBank) {
        for index in 0..self.channels.len() {
            let ch = &mut self.channels[index];
            if !ch.active {
                continue;
            }
            if ch.wait > 0 {
                ch.wait -= 1;
                ch.waited_since_loop = true;
            }
            while self.channels[index].active && self.channels[index].wait == 0 {
                self.step(index, bank);
            }
        }
    }

    /// Decode and execute one command of channel `index`
    fn step(&mut self, index: usize, bank: &mut DeviceBank) {
        let ch = &mut self.channels[index];
        let (command, next) = match commands::decode(&ch.program, ch.offset) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::error!("TSD: ch.{} halted at offset {}: {}", index, ch.offset, e);
                ch.halt();
                return;
            }
        };
        ch.offset = next;
        self.execute(index, command, bank);
    }

    fn execute(&mut self, index: usize, command: TsdCommand, bank: &mut DeviceBank) {
        let ch = &mut self.channels[index];
        match command {
            TsdCommand::NoteOn { note, length } => {
                ch.wait = length as u32;
                ch.key_on = true;
                ch.frequency.note = note;
                let param = self.tables.note_param(ch.frequency.kind, note);
                ch.frequency.param = Tables::detune(ch.frequency.kind, param, ch.detune as i32);
                ch.pitch_modulation.reset();
                ch.amp_envelope.restart();
                ch.envelope_l = ch.volume.l as i32;
                ch.envelope_r = ch.volume.r as i32;
                ch.note_envelope.restart();
                ch.note_offset = 0;
                self.write_frequency(index, bank);
                self.write_volume(index, bank);
            }
            TsdCommand::NoteOff { length } => {
                ch.wait = length as u32;
                if ch.key_on {
                    ch.key_on = false;
                    let (l, r) = ch.current_volume();
                    ch.sustain_l = l;
                    ch.sustain_r = r;
                    if ch.sustain_level == 0 {
                        if let Some(module) = bank.module_mut(index) {
                            module.set_volume(0, 0);
                        }
                    }
                }
            }
            TsdCommand::VolumeMono { value } => {
                ch.volume.l = value;
                ch.volume.r = value;
                self.refresh_volume(index, bank);
            }
            TsdCommand::VolumeLeft { value } => {
                ch.volume.l = value;
                self.refresh_volume(index, bank);
            }
            TsdCommand::VolumeRight { value } => {
                ch.volume.r = value;
                self.refresh_volume(index, bank);
            }
            TsdCommand::RelativeVolumeUp { value } => {
                ch.volume.l = ch.volume.l.saturating_add(value);
                ch.volume.r = ch.volume.r.saturating_add(value);
                self.refresh_volume(index, bank);
            }
            TsdCommand::RelativeVolumeDown { value } => {
                ch.volume.l = ch.volume.l.saturating_sub(value);
                ch.volume.r = ch.volume.r.saturating_sub(value);
                self.refresh_volume(index, bank);
            }
            TsdCommand::Panpot { value } => {
                ch.pan = value & 3;
                self.refresh_volume(index, bank);
            }
            TsdCommand::Sustain { level } => ch.sustain_level = level,
            TsdCommand::Detune { value } => ch.detune = value,
            TsdCommand::Portamento { value } => {
                ch.portamento = value;
                if value != 0 {
                    ch.pitch_modulation.enabled = false;
                }
            }
            // both timers are shared, a zero period would stop every channel
            TsdCommand::Tempo { value: 0 } => self.corrupt(index, "tempo of zero"),
            TsdCommand::Fineness { value: 0 } => self.corrupt(index, "fineness of zero"),
            TsdCommand::Tempo { value } => bank.set_timer(TimerId::Sequencer, value as u32),
            TsdCommand::Fineness { value } => bank.set_timer(TimerId::Automation, value as u32),
            TsdCommand::KeyOnPhase { value } => {
                log::info!("TSD: ch.{} key-on phase {} is not supported", index, value);
            }
            TsdCommand::Multiple { value } => {
                if let Some(module) = bank.module_mut(index) {
                    module.multiple = value as u32;
                }
            }
            TsdCommand::PitchModulationDelay { value } => {
                ch.pitch_modulation.delay = value;
                self.update_pitch_modulation(index);
            }
            TsdCommand::PitchModulationDepth { value } => {
                ch.pitch_modulation.depth = value;
                self.update_pitch_modulation(index);
            }
            TsdCommand::PitchModulationWidth { value } => {
                ch.pitch_modulation.width = value;
                self.update_pitch_modulation(index);
            }
            TsdCommand::PitchModulationHeight { value } => {
                ch.pitch_modulation.height = value;
                self.update_pitch_modulation(index);
            }
            TsdCommand::PitchModulationDelta { value } => {
                ch.pitch_modulation.delta = value;
                self.update_pitch_modulation(index);
            }
            TsdCommand::AmpEnvelope { id, wait } => {
                if wait > 0 && !self.envelopes.contains_key(&id) {
                    log::warn!("TSD: ch.{} uses undefined table {}", index, id);
                }
                ch.amp_envelope.select(id, wait);
            }
            TsdCommand::NoteEnvelope { id, wait } => {
                if wait > 0 && !self.envelopes.contains_key(&id) {
                    log::warn!("TSD: ch.{} uses undefined table {}", index, id);
                }
                ch.note_envelope.select(id, wait);
            }
            TsdCommand::EndlessLoopPoint => {
                ch.loop_offset = Some(ch.offset);
                ch.waited_since_loop = false;
            }
            TsdCommand::LocalLoopStart { id, count } => {
                let Some(slot) = ch.local_loops.get_mut(id as usize) else {
                    return self.corrupt(index, "local loop id out of range");
                };
                slot.offset = ch.offset;
                slot.count = count;
                slot.end = None;
            }
            TsdCommand::LocalLoopBreak { id } => {
                let Some(slot) = ch.local_loops.get(id as usize).copied() else {
                    return self.corrupt(index, "local loop id out of range");
                };
                if slot.count != 1 {
                    return;
                }
                let end = match slot.end {
                    Some(end) => Some(end),
                    None => find_loop_end(&ch.program, ch.offset, id),
                };
                match end {
                    Some(end) => {
                        ch.offset = end;
                        ch.local_loops[id as usize].count = 0;
                    }
                    None => self.corrupt(index, "local loop break without end"),
                }
            }
            TsdCommand::LocalLoopEnd { id } => {
                let offset = ch.offset;
                let Some(slot) = ch.local_loops.get_mut(id as usize) else {
                    return self.corrupt(index, "local loop id out of range");
                };
                slot.end = Some(offset);
                slot.count = slot.count.saturating_sub(1);
                if slot.count > 0 {
                    ch.offset = slot.offset;
                }
            }
            TsdCommand::FrequencyModeChange { value } => match FrequencyType::from_id(value) {
                Some(kind) => ch.frequency.kind = kind,
                None => log::warn!("TSD: ch.{} unknown frequency type {}", index, value),
            },
            TsdCommand::VolumeModeChange { value } => match VolumeType::from_id(value) {
                Some(mode) => ch.volume.mode = mode,
                None => log::warn!("TSD: ch.{} unknown volume type {}", index, value),
            },
            TsdCommand::FmIn { rate, pipe } => {
                if let Some(module) = bank.module_mut(index) {
                    module.fm_in = FmInput { rate, pipe };
                }
            }
            TsdCommand::FmOut { mode, pipe } => {
                let mode = FmOutMode::from_id(mode).unwrap_or_else(|| {
                    log::warn!("TSD: ch.{} unknown FM output mode {}", index, mode);
                    FmOutMode::Off
                });
                if let Some(module) = bank.module_mut(index) {
                    module.fm_out = FmOutput { mode, pipe };
                }
            }
            TsdCommand::VoiceChange { value } => {
                if let Some(module) = bank.module_mut(index) {
                    module.voice = value;
                }
            }
            TsdCommand::ModuleChange { module, frequency } => {
                let kind = ModuleType::from_id(module).unwrap_or_else(|| {
                    log::warn!("TSD: ch.{} unknown module type {}, using PSG", index, module);
                    ModuleType::Psg
                });
                ch.module = kind;
                match FrequencyType::from_id(frequency) {
                    Some(f) => ch.frequency.kind = f,
                    None => log::warn!("TSD: ch.{} unknown frequency type {}", index, frequency),
                }
                if let Some(m) = bank.module_mut(index) {
                    m.set_type(kind);
                }
            }
            TsdCommand::End => match ch.loop_offset {
                Some(offset) if ch.waited_since_loop => {
                    ch.offset = offset;
                    ch.waited_since_loop = false;
                }
                Some(_) => {
                    log::warn!("TSD: ch.{} endless loop without any wait, halted", index);
                    ch.halt();
                }
                None => ch.halt(),
            },
        }
    }

    fn corrupt(&mut self, index: usize, reason: &str) {
        let ch = &mut self.channels[index];
        log::error!("TSD: ch.{} halted at offset {}: {}", index, ch.offset, reason);
        ch.halt();
    }

    fn update_pitch_modulation(&mut self, index: usize) {
        let ch = &mut self.channels[index];
        ch.pitch_modulation.enabled = ch.pitch_modulation.depth != 0;
        if ch.pitch_modulation.enabled {
            ch.portamento = 0;
        }
    }

    /// Resolve and write the channel frequency
    pub(super) fn write_frequency(&mut self, index: usize, bank: &mut DeviceBank) {
        let ch = &mut self.channels[index];
        ch.frequency.hz = self.tables.hz(ch.frequency.kind, ch.effective_param());
        if let Some(module) = bank.module_mut(index) {
            module.frequency = ch.frequency.hz;
        }
    }

    /// Write the pan masked volume of a keyed channel
    pub(super) fn write_volume(&mut self, index: usize, bank: &mut DeviceBank) {
        let ch = &self.channels[index];
        let (l, r) = ch.current_volume();
        let (l, r) = ch.apply_pan(
            self.tables.volume(ch.volume.mode, l),
            self.tables.volume(ch.volume.mode, r),
        );
        if let Some(module) = bank.module_mut(index) {
            module.set_volume(l, r);
        }
    }

    /// Volume state changed: envelopes restart from the new level
    fn refresh_volume(&mut self, index: usize, bank: &mut DeviceBank) {
        let ch = &mut self.channels[index];
        ch.envelope_l = ch.volume.l as i32;
        ch.envelope_r = ch.volume.r as i32;
        if ch.key_on {
            self.write_volume(index, bank);
        }
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerHandler for Sequencer {
    fn on_timer(&mut self, id: TimerId, bank: &mut DeviceBank) {
        match id {
            TimerId::Automation => self.automate(bank),
            TimerId::Sequencer => self.sequence(bank),
        }
    }
}

/// Offset right after the end of local loop `id`, scanning from `offset`
fn find_loop_end(program: &[u8], mut offset: usize, id: u8) -> Option<usize> {
    while offset < program.len() {
        let (command, next) = commands::decode(program, offset).ok()?;
        match command {
            TsdCommand::LocalLoopEnd { id: end } if end == id => return Some(next),
            TsdCommand::End => return None,
            _ => offset = next,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsd::opcode::cmd;

    fn sequencer(programs: Vec<Vec<u8>>) -> (Sequencer, DeviceBank) {
        let mut bank = DeviceBank::new();
        bank.set_max_channel(programs.len());
        let mut seq = Sequencer::new();
        seq.reset(programs, BTreeMap::new());
        (seq, bank)
    }

    /// Sequencer ticks until every channel has halted
    fn run(seq: &mut Sequencer, bank: &mut DeviceBank, limit: usize) -> usize {
        let mut ticks = 0;
        while seq.is_playing() && ticks < limit {
            seq.sequence(bank);
            ticks += 1;
        }
        ticks
    }

    #[test]
    fn test_note_sets_module_parameters() {
        let (mut seq, mut bank) = sequencer(vec![vec![cmd::VOLUME_MONO, 100, 69, 10, cmd::END]]);
        seq.sequence(&mut bank);
        let module = bank.module(0).unwrap();
        assert_eq!(module.frequency, 440);
        assert_eq!((module.volume_l, module.volume_r), (100, 100));
        assert_eq!(seq.channel(0).unwrap().wait, 10);
    }

    #[test]
    fn test_ticks_match_lengths() {
        let program = vec![60, 10, 0x80, 5, 62, 0xFF, 0x01, 0x00, cmd::END];
        let (mut seq, mut bank) = sequencer(vec![program]);
        // one initial tick before the first dispatch
        assert_eq!(run(&mut seq, &mut bank, 10_000), 10 + 5 + 256 + 1);
    }

    #[test]
    fn test_local_loop_with_break() {
        // /:3 c4 / d4 :/  →  c d c d c
        let program = vec![
            cmd::LOCAL_LOOP_START, 0, 3,
            60, 4,
            cmd::LOCAL_LOOP_BREAK, 0,
            62, 8,
            cmd::LOCAL_LOOP_END, 0,
            cmd::END,
        ];
        let (mut seq, mut bank) = sequencer(vec![program]);
        assert_eq!(run(&mut seq, &mut bank, 1000), 3 * 4 + 2 * 8 + 1);
    }

    #[test]
    fn test_break_scans_forward_on_first_pass() {
        let program = vec![
            cmd::LOCAL_LOOP_START, 0, 1,
            60, 4,
            cmd::LOCAL_LOOP_BREAK, 0,
            62, 8,
            cmd::LOCAL_LOOP_END, 0,
            64, 2,
            cmd::END,
        ];
        let (mut seq, mut bank) = sequencer(vec![program]);
        assert_eq!(run(&mut seq, &mut bank, 1000), 4 + 2 + 1);
    }

    #[test]
    fn test_endless_loop_repeats() {
        let program = vec![cmd::ENDLESS_LOOP_POINT, 60, 3, cmd::END];
        let (mut seq, mut bank) = sequencer(vec![program]);
        assert_eq!(run(&mut seq, &mut bank, 100), 100);
        assert!(seq.channel(0).unwrap().active);
    }

    #[test]
    fn test_endless_loop_without_wait_halts() {
        let program = vec![cmd::ENDLESS_LOOP_POINT, cmd::DETUNE, 1, cmd::END];
        let (mut seq, mut bank) = sequencer(vec![program]);
        assert_eq!(run(&mut seq, &mut bank, 100), 1);
    }

    #[test]
    fn test_corrupt_channel_halts_alone() {
        let (mut seq, mut bank) = sequencer(vec![vec![60, 2, 0x8F], vec![62, 50, cmd::END]]);
        for _ in 0..5 {
            seq.sequence(&mut bank);
        }
        assert!(!seq.channel(0).unwrap().active);
        assert!(seq.channel(1).unwrap().active);
    }

    #[test]
    fn test_zero_timer_period_halts_only_its_channel() {
        let programs = vec![
            vec![cmd::TEMPO, 0, 0, 60, 1, cmd::END],
            vec![cmd::FINENESS, 0, 0, 60, 1, cmd::END],
            vec![62, 2, 64, 2, cmd::END],
        ];
        let (mut seq, mut bank) = sequencer(programs);
        bank.set_timer(TimerId::Sequencer, 230);
        bank.set_timer(TimerId::Automation, 368);
        seq.sequence(&mut bank);
        assert!(!seq.channel(0).unwrap().active);
        assert!(!seq.channel(1).unwrap().active);
        assert_eq!(bank.timer(TimerId::Sequencer).period, 230);
        assert_eq!(bank.timer(TimerId::Automation).period, 368);

        let offset = seq.channel(2).unwrap().offset;
        seq.sequence(&mut bank);
        seq.sequence(&mut bank);
        let ch = seq.channel(2).unwrap();
        assert!(ch.active);
        assert!(ch.offset > offset);
    }

    #[test]
    fn test_running_off_the_program_halts() {
        let (mut seq, mut bank) = sequencer(vec![vec![60, 1]]);
        seq.sequence(&mut bank);
        seq.sequence(&mut bank);
        assert!(!seq.channel(0).unwrap().active);
    }

    #[test]
    fn test_tempo_and_fineness_arm_timers() {
        let program = vec![cmd::TEMPO, 0x00, 0xE6, cmd::FINENESS, 0x01, 0x00, cmd::END];
        let (mut seq, mut bank) = sequencer(vec![program]);
        seq.sequence(&mut bank);
        assert_eq!(bank.timer(TimerId::Sequencer).period, 230);
        assert_eq!(bank.timer(TimerId::Automation).period, 256);
    }

    #[test]
    fn test_module_change_and_fm_wiring() {
        let program = vec![
            cmd::MODULE_CHANGE, 0x03,
            cmd::FM_IN, 0x42,
            cmd::FM_OUT, 0x13,
            cmd::END,
        ];
        let (mut seq, mut bank) = sequencer(vec![program]);
        seq.sequence(&mut bank);
        let module = bank.module(0).unwrap();
        assert_eq!(module.module_type(), ModuleType::Sin);
        assert_eq!(module.fm_in, FmInput { rate: 4, pipe: 2 });
        assert_eq!(module.fm_out.mode, FmOutMode::Accumulate);
        assert_eq!(module.fm_out.pipe, 3);
    }

    #[test]
    fn test_pan_masks_module_volume() {
        let program = vec![cmd::PANPOT, 2, cmd::VOLUME_MONO, 80, 60, 4, cmd::END];
        let (mut seq, mut bank) = sequencer(vec![program]);
        seq.sequence(&mut bank);
        let module = bank.module(0).unwrap();
        assert_eq!((module.volume_l, module.volume_r), (0, 80));
    }

    #[test]
    fn test_note_off_without_sustain_silences() {
        let program = vec![cmd::VOLUME_MONO, 80, 60, 1, 0x80, 4, cmd::END];
        let (mut seq, mut bank) = sequencer(vec![program]);
        seq.sequence(&mut bank);
        seq.sequence(&mut bank);
        let module = bank.module(0).unwrap();
        assert_eq!((module.volume_l, module.volume_r), (0, 0));
    }
}
