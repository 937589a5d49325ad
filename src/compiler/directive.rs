//! Global `#` directives and the tags they produce

use super::scanner::Scanner;
use super::source::DirectiveStatement;
use crate::error::{Error, Result};
use crate::tsd::opcode::{FrequencyType, ModuleType};
use crate::tsd::{TsdTables, WAVE_LENGTH};

/// Fineness used when `#FINENESS` is absent
pub const DEFAULT_FINENESS: u16 = 368;

/// Upper bound of `#CHANNEL`
pub const MAX_CHANNELS: usize = 676;

/// Longest `#TABLE`
pub const MAX_TABLE_LENGTH: usize = 255;

/// Target hardware selected with `#PRAGMA`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HardwareMode {
    #[default]
    Normal,
    Famicom,
    GameBoy,
}

/// Direction of `<` and `>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OctaveMode {
    /// `>` raises the octave
    #[default]
    Normal,
    Reverse,
}

/// Direction of `(` and `)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VolumeRelative {
    /// `)` raises the volume
    #[default]
    Normal,
    Reverse,
}

/// Accepted range of `v`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VolumeRange {
    /// 0..=15
    #[default]
    Coarse,
    /// 0..=255
    Fine,
}

/// Everything the directives configure
#[derive(Debug, Clone, Default)]
pub struct CompileTags {
    pub title: String,
    pub channels: Option<usize>,
    /// `None` unless `#FINENESS` appeared
    pub fineness: Option<u16>,
    pub hardware: HardwareMode,
    pub octave: OctaveMode,
    pub volume_relative: VolumeRelative,
    pub volume_range: VolumeRange,
    pub tables: TsdTables,
}

impl CompileTags {
    pub fn fineness(&self) -> u16 {
        self.fineness.unwrap_or(DEFAULT_FINENESS)
    }

    /// Largest value `v` accepts
    pub fn volume_max(&self) -> i32 {
        match self.volume_range {
            VolumeRange::Coarse => 15,
            VolumeRange::Fine => 255,
        }
    }

    /// (shift, base) of the coarse scale for the target hardware
    fn coarse_scale(&self) -> (u32, i32) {
        match self.hardware {
            HardwareMode::Normal => (4, 15),
            HardwareMode::Famicom => (3, 7),
            HardwareMode::GameBoy => (2, 3),
        }
    }

    /// Fine values are narrowed to the hardware's native resolution
    fn fine_shift(&self) -> u32 {
        match self.hardware {
            HardwareMode::Normal => 0,
            HardwareMode::Famicom => 1,
            HardwareMode::GameBoy => 2,
        }
    }

    /// Absolute `v` value as written to the TSD stream
    pub fn scale_volume(&self, value: i32) -> u8 {
        let scaled = match self.volume_range {
            VolumeRange::Coarse if value > 0 => {
                let (shift, base) = self.coarse_scale();
                (value << shift) + base
            }
            VolumeRange::Coarse => 0,
            VolumeRange::Fine => value >> self.fine_shift(),
        };
        scaled.clamp(0, 255) as u8
    }

    /// Relative `(`/`)` amount; scaled like `v` but without the base
    pub fn scale_relative(&self, value: i32) -> u8 {
        let scaled = match self.volume_range {
            VolumeRange::Coarse => value << self.coarse_scale().0,
            VolumeRange::Fine => value >> self.fine_shift(),
        };
        scaled.clamp(0, 255) as u8
    }

    /// Module and frequency type forced on a channel by `#PRAGMA`
    pub fn preset(&self, channel: usize) -> Option<(ModuleType, FrequencyType)> {
        match (self.hardware, channel) {
            (HardwareMode::Famicom, 0 | 1) => Some((ModuleType::Fc, FrequencyType::Normal)),
            (HardwareMode::Famicom, 2) => Some((ModuleType::Scc, FrequencyType::Normal)),
            (HardwareMode::Famicom, 3) => Some((ModuleType::Noise, FrequencyType::Normal)),
            (HardwareMode::GameBoy, 0 | 1) => {
                Some((ModuleType::GbSquare, FrequencyType::GbSquare))
            }
            (HardwareMode::GameBoy, 2) => Some((ModuleType::GbWave, FrequencyType::GbSquare)),
            (HardwareMode::GameBoy, 3) => Some((ModuleType::Noise, FrequencyType::Normal)),
            _ => None,
        }
    }

    /// Seed wave 0 for the hardware unless the score defined it
    fn apply_presets(&mut self) {
        let wave = match self.hardware {
            HardwareMode::Normal => return,
            HardwareMode::Famicom => triangle_wave(),
            HardwareMode::GameBoy => sawtooth_wave(),
        };
        self.tables.waves.entry(0).or_insert(wave);
    }
}

fn triangle_wave() -> Vec<i8> {
    (0..WAVE_LENGTH as i32)
        .map(|i| if i < 16 { -120 + 16 * i } else { 120 - 16 * (i - 16) })
        .map(|v| v as i8)
        .collect()
}

fn sawtooth_wave() -> Vec<i8> {
    (0..WAVE_LENGTH as i32).map(|i| (-128 + 8 * i) as i8).collect()
}

/// Parse every directive statement, then apply hardware presets
pub fn parse_directives(statements: &[DirectiveStatement]) -> Result<CompileTags> {
    let mut tags = CompileTags::default();
    for statement in statements {
        parse_statement(&mut tags, statement)?;
    }
    tags.apply_presets();
    Ok(tags)
}

fn parse_statement(tags: &mut CompileTags, statement: &DirectiveStatement) -> Result<()> {
    let mut scanner = Scanner::new(&statement.lines);
    match statement.name.to_ascii_uppercase().as_str() {
        "CHANNEL" => {
            tags.channels = Some(scanner.read_ranged(1, MAX_CHANNELS as i32)? as usize);
        }
        "FINENESS" => {
            tags.fineness = Some(scanner.read_ranged(1, u16::MAX as i32)? as u16);
        }
        "OCTAVE" => {
            tags.octave = match keyword(&mut scanner)?.as_str() {
                "NORMAL" => OctaveMode::Normal,
                "REVERSE" => OctaveMode::Reverse,
                other => return Err(unknown_keyword(statement, other)),
            };
        }
        "VOLUME" => {
            let mut first = true;
            while first || !scanner.is_at_end() {
                first = false;
                match keyword(&mut scanner)?.as_str() {
                    "NORMAL" => tags.volume_relative = VolumeRelative::Normal,
                    "REVERSE" => tags.volume_relative = VolumeRelative::Reverse,
                    "COARSE" => tags.volume_range = VolumeRange::Coarse,
                    "FINE" => tags.volume_range = VolumeRange::Fine,
                    other => return Err(unknown_keyword(statement, other)),
                }
            }
        }
        "PRAGMA" => {
            tags.hardware = match keyword(&mut scanner)?.as_str() {
                "FAMICOM" => HardwareMode::Famicom,
                "GAMEBOY" => HardwareMode::GameBoy,
                other => return Err(unknown_keyword(statement, other)),
            };
        }
        "TITLE" => {
            scanner.skip_spaces();
            let at = scanner.position();
            let text = scanner.read_braced_text()?;
            if text.len() > u16::MAX as usize {
                return Err(scanner.range_at(at, "title is longer than 65535 bytes"));
            }
            tags.title = String::from_utf8(text)
                .map_err(|_| scanner.syntax("title is not valid UTF-8"))?;
        }
        "WAV" => {
            let (id, values) = table(&mut scanner)?;
            if values.len() != WAVE_LENGTH {
                return Err(Error::range(
                    statement.line,
                    statement.offset,
                    format!("wave {} needs {} values, found {}", id, WAVE_LENGTH, values.len()),
                ));
            }
            tags.tables.waves.insert(id, values);
        }
        "TABLE" => {
            let (id, values) = table(&mut scanner)?;
            if values.is_empty() || values.len() > MAX_TABLE_LENGTH {
                return Err(Error::range(
                    statement.line,
                    statement.offset,
                    format!("table {} needs 1 to {} values", id, MAX_TABLE_LENGTH),
                ));
            }
            tags.tables.envelopes.insert(id, values);
        }
        _ => {
            return Err(Error::syntax(
                statement.line,
                statement.offset,
                format!("unknown directive #{}", statement.name),
            ))
        }
    }
    scanner.expect_end()
}

fn keyword(scanner: &mut Scanner) -> Result<String> {
    let word = scanner.read_word();
    if word.is_empty() {
        return Err(scanner.syntax("keyword expected"));
    }
    Ok(word.to_ascii_uppercase())
}

fn unknown_keyword(statement: &DirectiveStatement, word: &str) -> Error {
    Error::syntax(
        statement.line,
        statement.offset,
        format!("unknown keyword '{}' for #{}", word, statement.name),
    )
}

/// `id, <v, v, ...>` shared by `#WAV` and `#TABLE`
fn table(scanner: &mut Scanner) -> Result<(u8, Vec<i8>)> {
    let id = scanner.read_ranged(0, 255)? as u8;
    scanner.skip_spaces();
    if !scanner.eat(b',') {
        return Err(scanner.syntax("',' expected"));
    }
    let values = scanner
        .read_number_list(i8::MIN as i32, i8::MAX as i32)?
        .into_iter()
        .map(|v| v as i8)
        .collect();
    Ok((id, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::source::preprocess;

    fn tags(source: &str) -> Result<CompileTags> {
        parse_directives(&preprocess(source)?.directives)
    }

    #[test]
    fn test_defaults() {
        let tags = tags("#CHANNEL 3").unwrap();
        assert_eq!(tags.channels, Some(3));
        assert_eq!(tags.fineness, None);
        assert_eq!(tags.fineness(), 368);
        assert_eq!(tags.hardware, HardwareMode::Normal);
        assert_eq!(tags.volume_max(), 15);
        assert!(tags.tables.waves.is_empty());
    }

    #[test]
    fn test_channel_range() {
        let err = tags("#CHANNEL 677").unwrap_err();
        assert!(matches!(err, Error::Range { .. }));
        assert_eq!(err.position(), Some((1, 9)));
        assert!(tags("#CHANNEL 0").is_err());
    }

    #[test]
    fn test_modes() {
        let tags = tags("#OCTAVE REVERSE\n#VOLUME reverse FINE\n#FINENESS 100").unwrap();
        assert_eq!(tags.octave, OctaveMode::Reverse);
        assert_eq!(tags.volume_relative, VolumeRelative::Reverse);
        assert_eq!(tags.volume_range, VolumeRange::Fine);
        assert_eq!(tags.fineness, Some(100));
    }

    #[test]
    fn test_title_with_escape() {
        let tags = tags(r"#TITLE <Tom \> Jerry \{2\}>").unwrap();
        assert_eq!(tags.title, "Tom > Jerry {2}");
    }

    #[test]
    fn test_title_length_limit() {
        let longest = format!("#TITLE <{}>", "a".repeat(u16::MAX as usize));
        assert_eq!(tags(&longest).unwrap().title.len(), 65535);

        let err = tags(&format!("#TITLE <{}>", "a".repeat(65536))).unwrap_err();
        assert!(matches!(err, Error::Range { .. }));
        assert_eq!(err.position(), Some((1, 7)));
    }

    #[test]
    fn test_wav_spans_lines() {
        let values: Vec<String> = (0..32).map(|i| (i * 4 - 64).to_string()).collect();
        let source = format!(
            "#WAV 5, <{},\n{}>",
            values[..16].join(","),
            values[16..].join(",")
        );
        let tags = tags(&source).unwrap();
        let wave = &tags.tables.waves[&5];
        assert_eq!(wave.len(), 32);
        assert_eq!(wave[0], -64);
        assert_eq!(wave[31], 60);
    }

    #[test]
    fn test_wav_needs_32_values() {
        let err = tags("#WAV 0, <1, 2, 3>").unwrap_err();
        assert!(matches!(err, Error::Range { .. }));
    }

    #[test]
    fn test_table_value_range() {
        let err = tags("#TABLE 1, <1, 128>").unwrap_err();
        assert!(matches!(err, Error::Range { .. }));
        assert_eq!(err.position(), Some((1, 14)));
        let tags = tags("#TABLE 1, <1, -128>\n#TABLE 1, <7>").unwrap();
        assert_eq!(tags.tables.envelopes[&1], vec![7]);
    }

    #[test]
    fn test_unknown_directive() {
        let err = tags("#CHANNEL 1\n  #FOO 1").unwrap_err();
        assert_eq!(err.position(), Some((2, 3)));
        assert!(err.to_string().contains("unknown directive"));
    }

    #[test]
    fn test_trailing_garbage() {
        let err = tags("#CHANNEL 2 x").unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
        assert!(err.to_string().contains("unexpected 'x'"));
    }

    #[test]
    fn test_volume_scaling() {
        let mut tags = CompileTags::default();
        assert_eq!(tags.scale_volume(0), 0);
        assert_eq!(tags.scale_volume(15), 255);
        assert_eq!(tags.scale_relative(1), 16);
        tags.hardware = HardwareMode::Famicom;
        assert_eq!(tags.scale_volume(15), 127);
        tags.hardware = HardwareMode::GameBoy;
        assert_eq!(tags.scale_volume(15), 63);
        tags.volume_range = VolumeRange::Fine;
        assert_eq!(tags.scale_volume(200), 50);
        assert_eq!(tags.scale_relative(8), 2);
    }

    #[test]
    fn test_famicom_presets() {
        let tags = tags("#PRAGMA FAMICOM").unwrap();
        assert_eq!(tags.preset(0), Some((ModuleType::Fc, FrequencyType::Normal)));
        assert_eq!(tags.preset(2), Some((ModuleType::Scc, FrequencyType::Normal)));
        assert_eq!(tags.preset(3), Some((ModuleType::Noise, FrequencyType::Normal)));
        assert_eq!(tags.preset(4), None);
        let wave = &tags.tables.waves[&0];
        assert_eq!(wave[0], -120);
        assert_eq!(wave[15], 120);
    }

    #[test]
    fn test_seeded_wave_keeps_user_wave() {
        let values = vec!["1"; 32].join(",");
        let tags = tags(&format!("#PRAGMA GAMEBOY\n#WAV 0, <{}>", values)).unwrap();
        assert!(tags.tables.waves[&0].iter().all(|&v| v == 1));
        assert_eq!(tags.preset(2), Some((ModuleType::GbWave, FrequencyType::GbSquare)));
    }
}
