//! Per-tick automation: sustain, portamento, vibrato and envelopes

use super::sequencer::Sequencer;
use super::tables::Tables;
use crate::device::DeviceBank;
use crate::tsd::opcode::FrequencyType;

impl Sequencer {
    /// One automation tick over all channels
    pub fn automate(&mut self, bank: &mut DeviceBank) {
        for index in 0..self.channels.len() {
            self.sustain(index, bank);
            self.portamento(index, bank);
            self.pitch_modulation(index, bank);
            self.amp_envelope(index, bank);
            self.note_envelope(index, bank);
        }
    }

    /// Decay the key-off volume. Pan is not applied here, so a panned voice
    /// gets both sides back while it fades.
    fn sustain(&mut self, index: usize, bank: &mut DeviceBank) {
        let ch = &mut self.channels[index];
        if ch.key_on || ch.sustain_level == 0 || (ch.sustain_l == 0 && ch.sustain_r == 0) {
            return;
        }
        let level = ch.sustain_level as i32;
        ch.sustain_l = (ch.sustain_l - level).max(0);
        ch.sustain_r = (ch.sustain_r - level).max(0);
        let l = self.tables.volume(ch.volume.mode, ch.sustain_l);
        let r = self.tables.volume(ch.volume.mode, ch.sustain_r);
        if let Some(module) = bank.module_mut(index) {
            module.set_volume(l, r);
        }
    }

    fn portamento(&mut self, index: usize, bank: &mut DeviceBank) {
        let ch = &mut self.channels[index];
        if ch.portamento == 0 {
            return;
        }
        let kind = ch.frequency.kind;
        if kind == FrequencyType::GbSquare {
            if !ch.portamento_warned {
                log::warn!("TSD: ch.{} portamento is not supported for GB_SQUARE", index);
                ch.portamento_warned = true;
            }
            return;
        }
        let (min, max) = Tables::param_range(kind);
        ch.frequency.param =
            Tables::detune(kind, ch.frequency.param, ch.portamento as i32).clamp(min, max);
        self.write_frequency(index, bank);
    }

    fn pitch_modulation(&mut self, index: usize, bank: &mut DeviceBank) {
        let ch = &mut self.channels[index];
        let pm = &mut ch.pitch_modulation;
        if !pm.enabled || !ch.key_on {
            return;
        }
        if pm.delay_count < pm.delay {
            pm.delay_count += 1;
            return;
        }
        pm.width_count = pm.width_count.saturating_add(1);
        if pm.width_count < pm.width.max(1) {
            return;
        }
        pm.width_count = 0;

        pm.current_height += pm.current_diff;
        let turned = if pm.current_height >= pm.current_depth {
            pm.current_height = pm.current_depth;
            pm.current_diff = -(pm.height as i32);
            true
        } else if pm.current_height <= -pm.current_depth {
            pm.current_height = -pm.current_depth;
            pm.current_diff = pm.height as i32;
            true
        } else {
            false
        };
        if turned && pm.delta > 0 {
            pm.delta_count += 1;
            if pm.delta_count >= pm.delta {
                pm.delta_count = 0;
                pm.current_depth = (pm.current_depth + 1).min(pm.depth as i32);
            }
        }
        self.write_frequency(index, bank);
    }

    fn amp_envelope(&mut self, index: usize, bank: &mut DeviceBank) {
        let ch = &mut self.channels[index];
        if !ch.key_on {
            return;
        }
        let Some(table) = self.envelopes.get(&ch.amp_envelope.id) else {
            return;
        };
        let Some(step) = ch.amp_envelope.tick(table) else {
            return;
        };
        // pan is applied on the module write only, the levels stay unmasked
        ch.envelope_l = (ch.envelope_l + step).clamp(0, 255);
        ch.envelope_r = (ch.envelope_r + step).clamp(0, 255);
        self.write_volume(index, bank);
    }

    fn note_envelope(&mut self, index: usize, bank: &mut DeviceBank) {
        let ch = &mut self.channels[index];
        if !ch.key_on {
            return;
        }
        let Some(table) = self.envelopes.get(&ch.note_envelope.id) else {
            return;
        };
        let Some(step) = ch.note_envelope.tick(table) else {
            return;
        };
        ch.note_offset += step;
        self.write_frequency(index, bank);
    }
}
