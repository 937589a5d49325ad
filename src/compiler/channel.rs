//! Channel compiler: turns one channel's lines into TSD bytecode

use super::command::{self, ArgSpec, CommandSpec, Presence, Rule};
use super::directive::{CompileTags, OctaveMode, VolumeRelative};
use super::scanner::{Cursor, Scanner};
use super::source::{SourceLine, ESCAPE};
use crate::error::Result;
use crate::tsd::opcode::{
    cmd, encode_length, pack_module, pack_pipe, unpack_module, FmOutMode, ModuleType, FM_PIPES,
    MAX_LENGTH, MAX_LOCAL_LOOPS,
};

/// Ticks in a whole note
pub const WHOLE_NOTE: u32 = 192;

pub const DEFAULT_OCTAVE: i32 = 4;
pub const DEFAULT_LENGTH: u32 = 4;

/// `q` value that sounds the whole length
pub const MAX_GATE: u32 = 8;

/// Input rate wired by `@` on sine modules
pub const LEGACY_FM_RATE: u8 = 4;

/// Sequencer ticks per beat, times 60 seconds, over the tick clock
const TEMPO_BASE: f64 = 22050.0 * 4.0 * 60.0 / WHOLE_NOTE as f64;

/// Compiled bytecode of one channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelProgram {
    pub data: Vec<u8>,
    /// Declared duration, with local loops expanded
    pub ticks: u64,
}

/// Open `[`; expanded at compile time by rewinding the scanner
struct GlobalLoop {
    opened_at: Cursor,
    start: Cursor,
    /// Passes left including the current one
    remaining: i32,
    end: Option<Cursor>,
    local_depth: usize,
}

/// Open `/:` with its tick tally
struct LocalLoop {
    opened_at: Cursor,
    count: u64,
    body: u64,
    before_break: Option<u64>,
}

pub struct ChannelCompiler<'a> {
    tags: &'a CompileTags,
    channel: usize,
    scanner: Scanner<'a>,
    data: Vec<u8>,
    ticks: u64,
    octave: i32,
    length: u32,
    dots: u32,
    gate: u32,
    module: ModuleType,
    global: Option<GlobalLoop>,
    locals: Vec<LocalLoop>,
}

impl<'a> ChannelCompiler<'a> {
    pub fn new(tags: &'a CompileTags, channel: usize, lines: &'a [SourceLine]) -> Self {
        Self {
            tags,
            channel,
            scanner: Scanner::new(lines),
            data: Vec::new(),
            ticks: 0,
            octave: DEFAULT_OCTAVE,
            length: DEFAULT_LENGTH,
            dots: 0,
            gate: MAX_GATE,
            module: ModuleType::Psg,
            global: None,
            locals: Vec::new(),
        }
    }

    pub fn compile(mut self) -> Result<ChannelProgram> {
        self.prologue();
        while !self.scanner.is_at_end() {
            self.command()?;
        }
        if let Some(global) = &self.global {
            return Err(self.scanner.syntax_at(global.opened_at, "'[' is not closed"));
        }
        if let Some(local) = self.locals.last() {
            return Err(self.scanner.syntax_at(local.opened_at, "'/:' is not closed"));
        }
        self.data.push(cmd::END);
        log::debug!(
            "TSS: channel {} compiled to {} byte(s)",
            self.channel,
            self.data.len()
        );
        Ok(ChannelProgram {
            data: self.data,
            ticks: self.ticks,
        })
    }

    fn prologue(&mut self) {
        if let Some((module, frequency)) = self.tags.preset(self.channel) {
            self.emit(&[cmd::MODULE_CHANGE, pack_module(module, frequency)]);
            self.module = module;
        }
        if self.channel == 0 {
            if let Some(fineness) = self.tags.fineness {
                self.data.push(cmd::FINENESS);
                self.data.extend_from_slice(&fineness.to_be_bytes());
            }
        }
    }

    fn emit(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    fn emit_length(&mut self, op: u8, length: u32) {
        self.data.push(op);
        encode_length(length as u16, &mut self.data);
    }

    fn add_ticks(&mut self, ticks: u64) {
        match self.locals.last_mut() {
            Some(local) => local.body += ticks,
            None => self.ticks += ticks,
        }
    }

    fn command(&mut self) -> Result<()> {
        let at = self.scanner.position();
        let Some(first) = self.scanner.peek() else {
            return Ok(());
        };
        let spec = command::lookup(first, self.scanner.peek_second()).ok_or_else(|| {
            self.scanner.syntax_at(
                at,
                format!("unknown command '{}'", (first as char).escape_default()),
            )
        })?;
        for _ in 0..spec.name.len() {
            self.scanner.advance();
        }
        let (args, positions) = self.read_args(spec)?;
        self.apply(spec.rule, &args, &positions, at)
    }

    /// Arguments are comma separated; absent ones take their default.
    /// Each value comes with the position where it was (or would be) read.
    fn read_args(&mut self, spec: &CommandSpec) -> Result<(Vec<Option<i32>>, Vec<Cursor>)> {
        let mut args = Vec::with_capacity(spec.args.len());
        let mut positions = Vec::with_capacity(spec.args.len());
        for (i, arg) in spec.args.iter().enumerate() {
            let (value, at) = if i == 0 {
                self.read_arg(arg)?
            } else {
                let mark = self.scanner.position();
                self.scanner.skip_spaces();
                if self.scanner.eat(b',') {
                    self.read_arg(arg)?
                } else {
                    self.scanner.restore(mark);
                    (None, mark)
                }
            };
            let value = match (value, arg.presence) {
                (Some(v), _) => Some(v),
                (None, Presence::Default(d)) => Some(d),
                (None, Presence::Optional) => None,
                (None, Presence::Required) => {
                    return Err(self.scanner.syntax(format!(
                        "argument {} of '{}' is missing",
                        i + 1,
                        spec.name
                    )))
                }
            };
            args.push(value);
            positions.push(at);
        }
        Ok((args, positions))
    }

    fn read_arg(&mut self, arg: &ArgSpec) -> Result<(Option<i32>, Cursor)> {
        self.scanner.skip_spaces();
        let at = self.scanner.position();
        let Some(value) = self.scanner.read_number() else {
            return Ok((None, at));
        };
        if value < arg.min || value > arg.max {
            return Err(self.scanner.range_at(
                at,
                format!("{} is out of range [{}, {}]", value, arg.min, arg.max),
            ));
        }
        Ok((Some(value), at))
    }

    fn apply(
        &mut self,
        rule: Rule,
        args: &[Option<i32>],
        positions: &[Cursor],
        at: Cursor,
    ) -> Result<()> {
        let arg = |i: usize| args.get(i).copied().flatten().unwrap_or(0);
        match rule {
            Rule::Note(semitone) => self.note(semitone, at)?,
            Rule::Rest => {
                let length = self.read_duration()?;
                self.emit_note(None, length);
            }
            Rule::Octave => self.octave = arg(0),
            Rule::OctaveUp => self.octave += self.octave_step(),
            Rule::OctaveDown => self.octave -= self.octave_step(),
            Rule::Length => {
                self.length = arg(0) as u32;
                self.dots = self.count_dots();
            }
            Rule::Gate => self.gate = arg(0) as u32,
            Rule::Volume => self.volume(args, positions)?,
            Rule::VolumeUp | Rule::VolumeDown => {
                let up = (rule == Rule::VolumeUp)
                    == (self.tags.volume_relative == VolumeRelative::Normal);
                let op = if up {
                    cmd::RELATIVE_VOLUME_UP
                } else {
                    cmd::RELATIVE_VOLUME_DOWN
                };
                let amount = self.tags.scale_relative(arg(0));
                self.emit(&[op, amount]);
            }
            Rule::Detune => self.emit(&[cmd::DETUNE, arg(0) as i8 as u8]),
            Rule::Sustain => {
                self.emit(&[cmd::SUSTAIN, arg(0) as u8]);
                if let Some(port) = args.get(1).copied().flatten() {
                    self.emit(&[cmd::PORTAMENTO, port as i8 as u8]);
                }
            }
            Rule::PitchModulation => self.pitch_modulation(&[arg(0), arg(1), arg(2), arg(3), arg(4)]),
            Rule::AmpEnvelope => self.envelope(cmd::AMP_ENVELOPE, arg(0), arg(1), at)?,
            Rule::NoteEnvelope => self.envelope(cmd::NOTE_ENVELOPE, arg(0), arg(1), at)?,
            Rule::Panpot => self.emit(&[cmd::PANPOT, arg(0) as u8]),
            Rule::KeyOnPhase => self.emit(&[cmd::KEY_ON_PHASE, arg(0) as u8]),
            Rule::Voice => {
                let voice = arg(0) as u8;
                self.emit(&[cmd::VOICE_CHANGE, voice]);
                if self.module == ModuleType::Sin {
                    self.legacy_fm_wiring(voice, at)?;
                }
            }
            Rule::FmIn => self.emit(&[cmd::FM_IN, pack_pipe(arg(0) as u8, arg(1) as u8)]),
            Rule::FmOut => self.emit(&[cmd::FM_OUT, pack_pipe(arg(0) as u8, arg(1) as u8)]),
            Rule::VolumeMode => self.emit(&[cmd::VOLUME_MODE_CHANGE, arg(0) as u8]),
            Rule::Module => {
                let packed = arg(0) as u8;
                self.emit(&[cmd::MODULE_CHANGE, packed]);
                self.module =
                    ModuleType::from_id(unpack_module(packed).module).unwrap_or(ModuleType::Psg);
            }
            Rule::Multiple => self.emit(&[cmd::MULTIPLE, arg(0) as u8]),
            Rule::Tempo => {
                let period = (TEMPO_BASE / arg(0) as f64).round() as u16;
                self.data.push(cmd::TEMPO);
                self.data.extend_from_slice(&period.to_be_bytes());
            }
            Rule::LoopStart => self.loop_start(arg(0), at)?,
            Rule::LoopBreak => self.loop_break(at)?,
            Rule::LoopEnd => self.loop_end(at)?,
            Rule::LocalLoopStart => self.local_loop_start(arg(0), at)?,
            Rule::LocalLoopBreak => self.local_loop_break(at)?,
            Rule::LocalLoopEnd => self.local_loop_end(at)?,
            Rule::EndlessLoop => self.emit(&[cmd::ENDLESS_LOOP_POINT]),
        }
        Ok(())
    }

    fn octave_step(&self) -> i32 {
        match self.tags.octave {
            OctaveMode::Normal => 1,
            OctaveMode::Reverse => -1,
        }
    }

    fn note(&mut self, semitone: i32, at: Cursor) -> Result<()> {
        let mut note = (self.octave + 1) * 12 + semitone;
        loop {
            match self.scanner.peek() {
                Some(b'+') | Some(b'#') => note += 1,
                Some(b'-') => note -= 1,
                _ => break,
            }
            self.scanner.advance();
        }
        let length = self.read_duration()?;
        if !(0..=cmd::LAST_NOTE as i32).contains(&note) {
            return Err(self
                .scanner
                .range_at(at, format!("note {} is out of range", note)));
        }
        self.emit_note(Some(note as u8), length);
        Ok(())
    }

    fn count_dots(&mut self) -> u32 {
        let mut dots = 0;
        while self.scanner.eat(b'.') {
            dots += 1;
        }
        dots
    }

    /// `[n][.]*` terms joined by `^`, in ticks
    fn read_duration(&mut self) -> Result<u32> {
        let at = self.scanner.position();
        let mut total: u32 = 0;
        loop {
            let term_at = self.scanner.position();
            let term = match self.scanner.read_digits() {
                Some(n) => {
                    if !(1..=WHOLE_NOTE as i32).contains(&n) {
                        return Err(self.scanner.range_at(
                            term_at,
                            format!("length {} is out of range [1, {}]", n, WHOLE_NOTE),
                        ));
                    }
                    let dots = self.count_dots();
                    length_ticks(n as u32, dots)
                }
                None => {
                    let dots = self.dots + self.count_dots();
                    length_ticks(self.length, dots)
                }
            };
            total = total.saturating_add(term);
            if !self.scanner.eat(b'^') {
                break;
            }
        }
        if total > MAX_LENGTH {
            return Err(self.scanner.range_at(at, "note length overflow"));
        }
        Ok(total)
    }

    /// Sounding part first, then a note-off for the gated remainder
    fn emit_note(&mut self, note: Option<u8>, length: u32) {
        let sounding = if note.is_some() {
            length * self.gate / MAX_GATE
        } else {
            0
        };
        if let Some(note) = note.filter(|_| sounding > 0) {
            self.emit_length(note, sounding);
        }
        if length > sounding {
            self.emit_length(cmd::NOTE_OFF, length - sounding);
        }
        self.add_ticks(length as u64);
    }

    fn volume(&mut self, args: &[Option<i32>], positions: &[Cursor]) -> Result<()> {
        let max = self.tags.volume_max();
        let over = args.iter().zip(positions).find_map(|(value, &at)| match value {
            Some(v) if *v > max => Some((*v, at)),
            _ => None,
        });
        if let Some((value, at)) = over {
            return Err(self
                .scanner
                .range_at(at, format!("volume {} is out of range [0, {}]", value, max)));
        }
        match (args.first().copied().flatten(), args.get(1).copied().flatten()) {
            (Some(l), Some(r)) => {
                let (l, r) = (self.tags.scale_volume(l), self.tags.scale_volume(r));
                self.emit(&[cmd::VOLUME_LEFT, l, cmd::VOLUME_RIGHT, r]);
            }
            (Some(v), None) => {
                let v = self.tags.scale_volume(v);
                self.emit(&[cmd::VOLUME_MONO, v]);
            }
            _ => {}
        }
        Ok(())
    }

    /// delay, depth, width, height, delta; all zero turns modulation off
    fn pitch_modulation(&mut self, values: &[i32; 5]) {
        if values.iter().all(|&v| v == 0) {
            self.emit(&[cmd::PITCH_MODULATION_DEPTH, 0]);
            return;
        }
        if values[0] != 0 {
            self.data.push(cmd::PITCH_MODULATION_DELAY);
            self.data.extend_from_slice(&(values[0] as u16).to_be_bytes());
        }
        let ops = [
            cmd::PITCH_MODULATION_DEPTH,
            cmd::PITCH_MODULATION_WIDTH,
            cmd::PITCH_MODULATION_HEIGHT,
            cmd::PITCH_MODULATION_DELTA,
        ];
        for (&op, &value) in ops.iter().zip(&values[1..]) {
            if value != 0 {
                self.emit(&[op, value as u8]);
            }
        }
    }

    fn envelope(&mut self, op: u8, id: i32, wait: i32, at: Cursor) -> Result<()> {
        let id = id as u8;
        if wait > 0 && !self.tags.tables.envelopes.contains_key(&id) {
            return Err(self
                .scanner
                .compile_at(at, format!("table {} is not defined", id)));
        }
        self.emit(&[op, id, wait as u8]);
        Ok(())
    }

    /// `@` on a sine module also routes FM pipes: the high nibble selects
    /// the input pipe and the low nibble the output pipe, both 1-based
    fn legacy_fm_wiring(&mut self, voice: u8, at: Cursor) -> Result<()> {
        let input = voice >> 4;
        let output = voice & 0x0F;
        if input as usize > FM_PIPES || output as usize > FM_PIPES {
            return Err(self
                .scanner
                .range_at(at, format!("voice {} selects a missing FM pipe", voice)));
        }
        let fm_in = match input {
            0 => 0,
            n => pack_pipe(LEGACY_FM_RATE, n - 1),
        };
        let fm_out = match output {
            0 => 0,
            n => pack_pipe(FmOutMode::Accumulate as u8, n - 1),
        };
        self.emit(&[cmd::FM_IN, fm_in, cmd::FM_OUT, fm_out]);
        Ok(())
    }

    fn loop_start(&mut self, count: i32, at: Cursor) -> Result<()> {
        if self.global.is_some() {
            return Err(self.scanner.syntax_at(at, "nested '[' is not allowed"));
        }
        self.global = Some(GlobalLoop {
            opened_at: at,
            start: self.scanner.position(),
            remaining: count,
            end: None,
            local_depth: self.locals.len(),
        });
        Ok(())
    }

    /// `|` leaves the loop on its last pass
    fn loop_break(&mut self, at: Cursor) -> Result<()> {
        let Some(global) = self.global.take() else {
            return Err(self.scanner.syntax_at(at, "'|' found without '['"));
        };
        if global.remaining > 1 {
            self.global = Some(global);
            return Ok(());
        }
        if global.local_depth != self.locals.len() {
            return Err(self.scanner.syntax_at(at, "loops are not nested properly"));
        }
        match global.end {
            Some(end) => self.scanner.restore(end),
            None => self.skip_to_loop_end(global.opened_at)?,
        }
        Ok(())
    }

    fn skip_to_loop_end(&mut self, opened_at: Cursor) -> Result<()> {
        while let Some(c) = self.scanner.next_byte() {
            match c {
                b']' => return Ok(()),
                ESCAPE => self.scanner.advance(),
                _ => {}
            }
        }
        Err(self.scanner.syntax_at(opened_at, "'[' is not closed"))
    }

    fn loop_end(&mut self, at: Cursor) -> Result<()> {
        let Some(mut global) = self.global.take() else {
            return Err(self.scanner.syntax_at(at, "']' found without '['"));
        };
        if global.local_depth != self.locals.len() {
            return Err(self.scanner.syntax_at(at, "loops are not nested properly"));
        }
        global.remaining -= 1;
        if global.remaining > 0 {
            global.end = Some(self.scanner.position());
            self.scanner.restore(global.start);
            self.global = Some(global);
        }
        Ok(())
    }

    fn local_loop_start(&mut self, count: i32, at: Cursor) -> Result<()> {
        if self.locals.len() >= MAX_LOCAL_LOOPS {
            return Err(self.scanner.compile_at(at, "local loop is too deep"));
        }
        let id = self.locals.len() as u8;
        self.emit(&[cmd::LOCAL_LOOP_START, id, count as u8]);
        self.locals.push(LocalLoop {
            opened_at: at,
            count: count as u64,
            body: 0,
            before_break: None,
        });
        Ok(())
    }

    fn local_loop_break(&mut self, at: Cursor) -> Result<()> {
        let id = match self.locals.last_mut() {
            Some(local) => {
                // the first break is the one the sequencer honors
                if local.before_break.is_none() {
                    local.before_break = Some(local.body);
                }
                self.locals.len() - 1
            }
            None => return Err(self.scanner.syntax_at(at, "'/' found outside of a local loop")),
        };
        self.emit(&[cmd::LOCAL_LOOP_BREAK, id as u8]);
        Ok(())
    }

    fn local_loop_end(&mut self, at: Cursor) -> Result<()> {
        let Some(local) = self.locals.pop() else {
            return Err(self.scanner.syntax_at(at, "':/' found outside of a local loop"));
        };
        let id = self.locals.len() as u8;
        self.emit(&[cmd::LOCAL_LOOP_END, id]);
        self.add_ticks(local.body * (local.count - 1) + local.before_break.unwrap_or(local.body));
        Ok(())
    }
}

/// Ticks of an `n`th note; each dot adds half of the previous addition
pub fn length_ticks(n: u32, dots: u32) -> u32 {
    let mut add = WHOLE_NOTE / n;
    let mut total = add;
    for _ in 0..dots {
        add /= 2;
        total += add;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::directive::parse_directives;
    use crate::compiler::source::preprocess;
    use crate::error::Error;

    fn compile_with(header: &str, body: &str) -> Result<ChannelProgram> {
        let source = preprocess(&format!("{}\n#A {}", header, body))?;
        let tags = parse_directives(&source.directives)?;
        ChannelCompiler::new(&tags, 0, &source.channels[&0]).compile()
    }

    fn compile(body: &str) -> Result<ChannelProgram> {
        compile_with("#CHANNEL 1", body)
    }

    fn data(body: &str) -> Vec<u8> {
        compile(body).unwrap().data
    }

    // ========================================================================
    // Notes and lengths
    // ========================================================================

    #[test]
    fn test_single_note() {
        let program = compile("c").unwrap();
        assert_eq!(program.data, vec![60, 48, cmd::END]);
        assert_eq!(program.ticks, 48);
    }

    #[test]
    fn test_accidentals_and_octave() {
        assert_eq!(
            data("o5 c+ d- e#"),
            vec![73, 48, 73, 48, 77, 48, cmd::END]
        );
        assert_eq!(data("o4 > c < < c"), vec![72, 48, 48, 48, cmd::END]);
        let reversed = compile_with("#CHANNEL 1\n#OCTAVE REVERSE", "> c").unwrap();
        assert_eq!(reversed.data, vec![48, 48, cmd::END]);
    }

    #[test]
    fn test_durations() {
        let program = compile("c8. c2^4 l16 c c.").unwrap();
        assert_eq!(
            program.data,
            vec![60, 36, 60, 144, 60, 12, 60, 18, cmd::END]
        );
        assert_eq!(program.ticks, 210);
        assert_eq!(data("l4. c"), vec![60, 72, cmd::END]);
    }

    #[test]
    fn test_long_note_uses_extended_length() {
        assert_eq!(data("c1^1"), vec![60, 0xFF, 0x01, 0x80, cmd::END]);
    }

    #[test]
    fn test_note_length_overflow() {
        let body = format!("c1{}", "^1".repeat(341));
        let err = compile(&body).unwrap_err();
        assert!(matches!(err, Error::Range { .. }));
        assert!(err.to_string().contains("note length overflow"));
    }

    #[test]
    fn test_gate() {
        assert_eq!(data("q6 c"), vec![60, 36, 0x80, 12, cmd::END]);
        assert_eq!(data("q0 c"), vec![0x80, 48, cmd::END]);
        assert_eq!(data("r8"), vec![0x80, 24, cmd::END]);
    }

    #[test]
    fn test_note_out_of_range() {
        assert_eq!(data("o8 > g"), vec![127, 48, cmd::END]);
        let err = compile("o8 > g+").unwrap_err();
        assert!(matches!(err, Error::Range { .. }));
        assert_eq!(err.position(), Some((2, 8)));
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    #[test]
    fn test_volume() {
        assert_eq!(
            data("v15 v3,4"),
            vec![cmd::VOLUME_MONO, 255, cmd::VOLUME_LEFT, 63, cmd::VOLUME_RIGHT, 79, cmd::END]
        );
        let err = compile("v16").unwrap_err();
        assert!(matches!(err, Error::Range { .. }));
        assert_eq!(err.position(), Some((2, 4)));
        let err = compile("v3,16").unwrap_err();
        assert!(matches!(err, Error::Range { .. }));
        assert_eq!(err.position(), Some((2, 6)));
        let err = compile("v 16, 2").unwrap_err();
        assert_eq!(err.position(), Some((2, 5)));
        let fine = compile_with("#CHANNEL 1\n#VOLUME FINE", "v200").unwrap();
        assert_eq!(fine.data, vec![cmd::VOLUME_MONO, 200, cmd::END]);
    }

    #[test]
    fn test_relative_volume() {
        assert_eq!(
            data(") (3"),
            vec![cmd::RELATIVE_VOLUME_UP, 16, cmd::RELATIVE_VOLUME_DOWN, 48, cmd::END]
        );
        let reversed = compile_with("#CHANNEL 1\n#VOLUME REVERSE", ")").unwrap();
        assert_eq!(reversed.data, vec![cmd::RELATIVE_VOLUME_DOWN, 16, cmd::END]);
    }

    #[test]
    fn test_simple_parameters() {
        assert_eq!(
            data("k-3 s10,-2 p2 ph64 ml3 @v1 $"),
            vec![
                cmd::DETUNE, 0xFD,
                cmd::SUSTAIN, 10,
                cmd::PORTAMENTO, 0xFE,
                cmd::PANPOT, 2,
                cmd::KEY_ON_PHASE, 64,
                cmd::MULTIPLE, 3,
                cmd::VOLUME_MODE_CHANGE, 1,
                cmd::ENDLESS_LOOP_POINT,
                cmd::END,
            ]
        );
    }

    #[test]
    fn test_pitch_modulation() {
        assert_eq!(data("mp"), vec![cmd::PITCH_MODULATION_DEPTH, 0, cmd::END]);
        assert_eq!(
            data("mp10,2,0,3"),
            vec![
                cmd::PITCH_MODULATION_DELAY, 0, 10,
                cmd::PITCH_MODULATION_DEPTH, 2,
                cmd::PITCH_MODULATION_HEIGHT, 3,
                cmd::END,
            ]
        );
    }

    #[test]
    fn test_envelopes_need_tables() {
        let err = compile("na3").unwrap_err();
        assert!(matches!(err, Error::Compile { .. }));
        assert_eq!(data("na3,0"), vec![cmd::AMP_ENVELOPE, 3, 0, cmd::END]);
        let program = compile_with("#CHANNEL 1\n#TABLE 3,<1>", "na3 nt3,2").unwrap();
        assert_eq!(
            program.data,
            vec![cmd::AMP_ENVELOPE, 3, 1, cmd::NOTE_ENVELOPE, 3, 2, cmd::END]
        );
    }

    #[test]
    fn test_tempo() {
        assert_eq!(data("t120"), vec![cmd::TEMPO, 0x00, 0xE6, cmd::END]);
    }

    #[test]
    fn test_argument_errors() {
        let err = compile("o").unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
        let err = compile("o9").unwrap_err();
        assert!(matches!(err, Error::Range { .. }));
        assert_eq!(err.position(), Some((2, 4)));
        let err = compile("c x").unwrap_err();
        assert_eq!(err.position(), Some((2, 5)));
        assert!(err.to_string().contains("unknown command 'x'"));
    }

    // ========================================================================
    // Modules and FM wiring
    // ========================================================================

    #[test]
    fn test_voice_on_sine_wires_pipes() {
        assert_eq!(
            data("%3 @18"),
            vec![
                cmd::MODULE_CHANGE, 3,
                cmd::VOICE_CHANGE, 18,
                cmd::FM_IN, 0x40,
                cmd::FM_OUT, 0x11,
                cmd::END,
            ]
        );
        assert_eq!(
            data("%3 @0"),
            vec![cmd::MODULE_CHANGE, 3, cmd::VOICE_CHANGE, 0, cmd::FM_IN, 0, cmd::FM_OUT, 0, cmd::END]
        );
        assert_eq!(
            data("%0 @18"),
            vec![cmd::MODULE_CHANGE, 0, cmd::VOICE_CHANGE, 18, cmd::END]
        );
        assert!(matches!(compile("%3 @96"), Err(Error::Range { .. })));
    }

    #[test]
    fn test_explicit_fm_pipes() {
        assert_eq!(
            data("@i2,3 @o1,0"),
            vec![cmd::FM_IN, 0x23, cmd::FM_OUT, 0x10, cmd::END]
        );
    }

    #[test]
    fn test_prologue() {
        let program = compile_with("#CHANNEL 1\n#FINENESS 100", "c").unwrap();
        assert_eq!(program.data, vec![cmd::FINENESS, 0, 100, 60, 48, cmd::END]);

        let famicom = compile_with("#CHANNEL 4\n#PRAGMA FAMICOM", "").unwrap();
        assert_eq!(famicom.data, vec![cmd::MODULE_CHANGE, 0x01, cmd::END]);

        let gameboy = compile_with("#CHANNEL 4\n#PRAGMA GAMEBOY", "").unwrap();
        assert_eq!(gameboy.data, vec![cmd::MODULE_CHANGE, 0x3D, cmd::END]);
    }

    // ========================================================================
    // Loops
    // ========================================================================

    #[test]
    fn test_global_loop_expands() {
        let program = compile("[3 c | d ]").unwrap();
        assert_eq!(
            program.data,
            vec![60, 48, 62, 48, 60, 48, 62, 48, 60, 48, cmd::END]
        );
        assert_eq!(program.ticks, 240);
        assert_eq!(data("[ c ] d"), vec![60, 48, 60, 48, 62, 48, cmd::END]);
    }

    #[test]
    fn test_global_loop_spans_lines() {
        assert_eq!(data("[2 c\n d ]"), vec![60, 48, 62, 48, 60, 48, 62, 48, cmd::END]);
    }

    #[test]
    fn test_global_loop_errors() {
        let err = compile("c ]").unwrap_err();
        assert!(err.to_string().contains("']' found without '['"));
        assert_eq!(err.position(), Some((2, 5)));
        assert!(matches!(compile("|"), Err(Error::Syntax { .. })));
        let err = compile("[ c").unwrap_err();
        assert!(err.to_string().contains("'[' is not closed"));
        assert!(matches!(compile("[2 [2 c ] ]"), Err(Error::Syntax { .. })));
    }

    #[test]
    fn test_local_loop() {
        let program = compile("/:3 c / d :/").unwrap();
        assert_eq!(
            program.data,
            vec![
                cmd::LOCAL_LOOP_START, 0, 3,
                60, 48,
                cmd::LOCAL_LOOP_BREAK, 0,
                62, 48,
                cmd::LOCAL_LOOP_END, 0,
                cmd::END,
            ]
        );
        assert_eq!(program.ticks, 240);
    }

    #[test]
    fn test_nested_local_loops_tally() {
        let program = compile("/: /:3 c :/ :/").unwrap();
        assert_eq!(
            program.data,
            vec![
                cmd::LOCAL_LOOP_START, 0, 2,
                cmd::LOCAL_LOOP_START, 1, 3,
                60, 48,
                cmd::LOCAL_LOOP_END, 1,
                cmd::LOCAL_LOOP_END, 0,
                cmd::END,
            ]
        );
        assert_eq!(program.ticks, 288);
    }

    #[test]
    fn test_local_loop_depth_limit() {
        let ok = format!("{} c {}", "/:".repeat(16), ":/".repeat(16));
        assert!(compile(&ok).is_ok());
        let err = compile(&"/:".repeat(17)).unwrap_err();
        assert!(matches!(err, Error::Compile { .. }));
        assert!(err.to_string().contains("local loop is too deep"));
    }

    #[test]
    fn test_local_loop_errors() {
        assert!(matches!(compile("c /"), Err(Error::Syntax { .. })));
        assert!(matches!(compile(":/"), Err(Error::Syntax { .. })));
        let err = compile("/:2 c").unwrap_err();
        assert!(err.to_string().contains("'/:' is not closed"));
    }

    #[test]
    fn test_length_ticks() {
        assert_eq!(length_ticks(4, 0), 48);
        assert_eq!(length_ticks(4, 2), 84);
        assert_eq!(length_ticks(192, 1), 1);
    }
}
