//! Frequency and volume lookup tables

use crate::tsd::opcode::{FrequencyType, VolumeType};

/// AY-3-8910 master clock
const MSX_CLOCK: f64 = 3_579_545.0;
/// Game Boy square channel base clock
const GB_CLOCK: f64 = 131_072.0;

const MSX_ENTRIES: usize = 4096;
const GB_ENTRIES: usize = 2048;
const FM_ENTRIES: usize = 8192;

/// Equal tempered frequency of a note number, A4 (69) = 440 Hz
pub fn note_hz(note: f64) -> f64 {
    440.0 * 2f64.powf((note - 69.0) / 12.0)
}

/// Precomputed parameter → Hz and volume curves
#[derive(Debug, Clone)]
pub struct Tables {
    msx: Vec<u32>,
    gb: Vec<u32>,
    fm: Vec<u32>,
    fm_volume: [i32; 256],
}

impl Tables {
    pub fn new() -> Self {
        let msx = (0..MSX_ENTRIES)
            .map(|p| {
                if p == 0 {
                    0
                } else {
                    (MSX_CLOCK / 32.0 / p as f64).round() as u32
                }
            })
            .collect();
        let gb = (0..GB_ENTRIES)
            .map(|p| (GB_CLOCK / (GB_ENTRIES - p) as f64).round() as u32)
            .collect();
        let fm = (0..FM_ENTRIES)
            .map(|p| {
                let tone = (p >> 6) as f64;
                let fine = (p & 63) as f64;
                note_hz(tone + fine / 64.0).round() as u32
            })
            .collect();

        let mut fm_volume = [0; 256];
        for (v, entry) in fm_volume.iter_mut().enumerate().skip(1) {
            let db = -((255 - v) as f64) * 0.75;
            *entry = (255.0 * 10f64.powf(db / 20.0)).round() as i32;
        }

        Self {
            msx,
            gb,
            fm,
            fm_volume,
        }
    }

    /// Frequency parameter for a note, before detune
    pub fn note_param(&self, frequency_type: FrequencyType, note: u8) -> i32 {
        let hz = note_hz(note as f64);
        match frequency_type {
            FrequencyType::Normal => hz.round() as i32,
            FrequencyType::Msx => (MSX_CLOCK / 32.0 / hz).round() as i32,
            FrequencyType::GbSquare => GB_ENTRIES as i32 - (GB_CLOCK / hz).round() as i32,
            FrequencyType::Fm => (note as i32) << 6,
        }
    }

    /// Apply a detune so that positive values always raise the pitch
    pub fn detune(frequency_type: FrequencyType, param: i32, detune: i32) -> i32 {
        match frequency_type {
            FrequencyType::Msx => param - detune,
            _ => param + detune,
        }
    }

    /// Valid parameter range of a frequency type
    pub fn param_range(frequency_type: FrequencyType) -> (i32, i32) {
        match frequency_type {
            FrequencyType::Normal => (0, 0xFFFF),
            FrequencyType::Msx => (0, MSX_ENTRIES as i32 - 1),
            FrequencyType::GbSquare => (0, GB_ENTRIES as i32 - 1),
            FrequencyType::Fm => (0, FM_ENTRIES as i32 - 1),
        }
    }

    /// Resolve a parameter to Hz, clamping it into range first
    pub fn hz(&self, frequency_type: FrequencyType, param: i32) -> u32 {
        let (min, max) = Self::param_range(frequency_type);
        let p = param.clamp(min, max);
        match frequency_type {
            FrequencyType::Normal => p as u32,
            FrequencyType::Msx => self.msx[p as usize],
            FrequencyType::GbSquare => self.gb[p as usize],
            FrequencyType::Fm => self.fm[p as usize],
        }
    }

    /// Map a 0..=255 channel volume to a module amplitude
    pub fn volume(&self, volume_type: VolumeType, value: i32) -> i32 {
        let v = value.clamp(0, 255);
        match volume_type {
            VolumeType::Normal => v,
            VolumeType::Fm => self.fm_volume[v as usize],
        }
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_params() {
        let tables = Tables::new();
        assert_eq!(tables.note_param(FrequencyType::Normal, 69), 440);
        // 3579545 / 32 / 440 = 254.2
        assert_eq!(tables.note_param(FrequencyType::Msx, 69), 254);
        // 2048 - 131072 / 440 = 2048 - 297.9
        assert_eq!(tables.note_param(FrequencyType::GbSquare, 69), 1750);
        assert_eq!(tables.note_param(FrequencyType::Fm, 69), 69 << 6);
    }

    #[test]
    fn test_tables_invert_params() {
        let tables = Tables::new();
        assert_eq!(tables.hz(FrequencyType::Fm, 69 << 6), 440);
        assert_eq!(tables.hz(FrequencyType::Msx, 254), 440);
        assert_eq!(tables.hz(FrequencyType::GbSquare, 1750), 440);
        assert_eq!(tables.hz(FrequencyType::Msx, 0), 0);
    }

    #[test]
    fn test_positive_detune_raises_pitch() {
        let tables = Tables::new();
        for t in [
            FrequencyType::Normal,
            FrequencyType::Msx,
            FrequencyType::GbSquare,
            FrequencyType::Fm,
        ] {
            let base = tables.note_param(t, 60);
            let up = Tables::detune(t, base, 16);
            assert!(tables.hz(t, up) > tables.hz(t, base), "{:?}", t);
        }
    }

    #[test]
    fn test_fm_volume_curve() {
        let tables = Tables::new();
        assert_eq!(tables.volume(VolumeType::Fm, 0), 0);
        assert_eq!(tables.volume(VolumeType::Fm, 255), 255);
        // 8 steps down is -6 dB
        assert_eq!(tables.volume(VolumeType::Fm, 247), 128);
        assert_eq!(tables.volume(VolumeType::Normal, 300), 255);
    }
}
