//! Channel command table

/// How an absent argument is filled in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Default(i32),
    Optional,
}

/// Accepted range and presence of one argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub min: i32,
    pub max: i32,
    pub presence: Presence,
}

const fn required(min: i32, max: i32) -> ArgSpec {
    ArgSpec {
        min,
        max,
        presence: Presence::Required,
    }
}

const fn default(min: i32, max: i32, value: i32) -> ArgSpec {
    ArgSpec {
        min,
        max,
        presence: Presence::Default(value),
    }
}

const fn optional(min: i32, max: i32) -> ArgSpec {
    ArgSpec {
        min,
        max,
        presence: Presence::Optional,
    }
}

/// What the channel compiler does once a command's arguments are read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Note letter with its semitone within the octave
    Note(i32),
    Rest,
    Octave,
    OctaveUp,
    OctaveDown,
    Length,
    Gate,
    Volume,
    VolumeUp,
    VolumeDown,
    Detune,
    Sustain,
    PitchModulation,
    AmpEnvelope,
    NoteEnvelope,
    Panpot,
    KeyOnPhase,
    Voice,
    FmIn,
    FmOut,
    VolumeMode,
    Module,
    Multiple,
    Tempo,
    LoopStart,
    LoopBreak,
    LoopEnd,
    LocalLoopStart,
    LocalLoopBreak,
    LocalLoopEnd,
    EndlessLoop,
}

#[derive(Debug)]
pub struct CommandSpec {
    pub name: &'static str,
    pub args: &'static [ArgSpec],
    pub rule: Rule,
}

const fn command(name: &'static str, args: &'static [ArgSpec], rule: Rule) -> CommandSpec {
    CommandSpec { name, args, rule }
}

/// Two-byte names come first so the longest name wins
pub static COMMANDS: &[CommandSpec] = &[
    command(
        "mp",
        &[
            default(0, 65535, 0),
            default(0, 255, 0),
            default(0, 255, 0),
            default(0, 255, 0),
            default(0, 255, 0),
        ],
        Rule::PitchModulation,
    ),
    command("na", &[required(0, 255), default(0, 255, 1)], Rule::AmpEnvelope),
    command("nt", &[required(0, 255), default(0, 255, 1)], Rule::NoteEnvelope),
    command("ph", &[required(0, 255)], Rule::KeyOnPhase),
    command("ml", &[required(0, 15)], Rule::Multiple),
    command("@i", &[required(0, 15), required(0, 3)], Rule::FmIn),
    command("@o", &[required(0, 2), required(0, 3)], Rule::FmOut),
    command("@v", &[required(0, 1)], Rule::VolumeMode),
    command("/:", &[default(1, 255, 2)], Rule::LocalLoopStart),
    command(":/", &[], Rule::LocalLoopEnd),
    command("c", &[], Rule::Note(0)),
    command("d", &[], Rule::Note(2)),
    command("e", &[], Rule::Note(4)),
    command("f", &[], Rule::Note(5)),
    command("g", &[], Rule::Note(7)),
    command("a", &[], Rule::Note(9)),
    command("b", &[], Rule::Note(11)),
    command("r", &[], Rule::Rest),
    command("o", &[required(1, 8)], Rule::Octave),
    command(">", &[], Rule::OctaveUp),
    command("<", &[], Rule::OctaveDown),
    command("l", &[required(1, 192)], Rule::Length),
    command("q", &[default(0, 8, 8)], Rule::Gate),
    command("v", &[required(0, 255), optional(0, 255)], Rule::Volume),
    command(")", &[default(1, 255, 1)], Rule::VolumeUp),
    command("(", &[default(1, 255, 1)], Rule::VolumeDown),
    command("k", &[required(-128, 127)], Rule::Detune),
    command("s", &[required(0, 255), optional(-128, 127)], Rule::Sustain),
    command("p", &[required(0, 3)], Rule::Panpot),
    command("@", &[required(0, 255)], Rule::Voice),
    command("%", &[required(0, 255)], Rule::Module),
    command("t", &[required(1, 1000)], Rule::Tempo),
    command("[", &[default(1, 255, 2)], Rule::LoopStart),
    command("|", &[], Rule::LoopBreak),
    command("]", &[], Rule::LoopEnd),
    command("/", &[], Rule::LocalLoopBreak),
    command("$", &[], Rule::EndlessLoop),
];

fn matches(name: &str, first: u8, second: Option<u8>) -> bool {
    let name = name.as_bytes();
    match name.len() {
        1 => name[0] == first.to_ascii_lowercase(),
        2 => {
            name[0] == first.to_ascii_lowercase()
                && second.map(|c| c.to_ascii_lowercase()) == Some(name[1])
        }
        _ => false,
    }
}

/// Find the command starting with `first` (and possibly `second`)
pub fn lookup(first: u8, second: Option<u8>) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|spec| matches(spec.name, first, second))
}
