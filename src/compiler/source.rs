//! Source preprocessing: comment and escape blanking, line classification

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Marker written in place of `\`; the escaped byte follows it
pub const ESCAPE: u8 = 0x1B;

const ALPHABET_COUNT: usize = 26;

/// What a line belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// Global directive by name (`#TITLE` → "TITLE")
    Directive(String),
    /// Channel data for a channel id
    Channel(usize),
}

/// One physical source line after preprocessing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// 1-based line number
    pub line: usize,
    /// Same length as the source line; comments, tabs and the `#name`
    /// prefix are blanked to spaces
    pub buffer: Vec<u8>,
    pub kind: Option<LineKind>,
    pub empty: bool,
}

/// A directive with its continuation lines
#[derive(Debug, Clone)]
pub struct DirectiveStatement {
    pub name: String,
    pub line: usize,
    /// Offset of the name in its line
    pub offset: usize,
    pub lines: Vec<SourceLine>,
}

/// Preprocessed score split into directives and per-channel lines
#[derive(Debug, Clone, Default)]
pub struct Source {
    pub directives: Vec<DirectiveStatement>,
    pub channels: BTreeMap<usize, Vec<SourceLine>>,
}

/// Comment nesting carried from line to line
#[derive(Debug, Default)]
pub struct Preprocessor {
    comment_depth: usize,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn comment_depth(&self) -> usize {
        self.comment_depth
    }

    /// Blank comments and escapes of one line, then classify it
    pub fn line(&mut self, line: usize, text: &[u8]) -> Result<SourceLine> {
        let mut buffer = vec![b' '; text.len()];
        let mut empty = true;
        let mut i = 0;
        while i < text.len() {
            let c = text[i];
            if self.comment_depth > 0 {
                match c {
                    // the escaped byte is blanked with it
                    b'\\' => i += 1,
                    b'{' => self.comment_depth += 1,
                    b'}' => self.comment_depth -= 1,
                    _ => {}
                }
            } else {
                match c {
                    b'\\' => {
                        buffer[i] = ESCAPE;
                        if i + 1 < text.len() {
                            i += 1;
                            buffer[i] = text[i];
                        }
                        empty = false;
                    }
                    b'{' => self.comment_depth += 1,
                    b'}' => return Err(Error::syntax(line, i, "'}' appears without '{'")),
                    b' ' | b'\t' => {}
                    _ => {
                        buffer[i] = c;
                        empty = false;
                    }
                }
            }
            i += 1;
        }

        let mut result = SourceLine {
            line,
            buffer,
            kind: None,
            empty,
        };
        if !empty {
            result.kind = take_directive(&mut result.buffer);
        }
        Ok(result)
    }
}

/// Alphabet position of an ASCII letter, case-insensitive
fn alphabet_index(c: u8) -> Option<usize> {
    c.is_ascii_alphabetic()
        .then(|| (c.to_ascii_lowercase() - b'a') as usize)
}

/// `A`..`Z` → 0..25, `AA`..`ZZ` → second * 26 + first
pub fn channel_id(name: &str) -> Option<usize> {
    let bytes = name.as_bytes();
    match bytes.len() {
        1 => alphabet_index(bytes[0]),
        2 => Some(alphabet_index(bytes[1])? * ALPHABET_COUNT + alphabet_index(bytes[0])?),
        _ => None,
    }
}

/// Strip a leading `#name` from the buffer
fn take_directive(buffer: &mut [u8]) -> Option<LineKind> {
    let hash = buffer.iter().position(|&c| c != b' ')?;
    if buffer[hash] != b'#' {
        return None;
    }
    buffer[hash] = b' ';
    let start = hash + 1;
    let end = buffer[start..]
        .iter()
        .position(|&c| c == b' ')
        .map_or(buffer.len(), |n| start + n);
    let name = String::from_utf8_lossy(&buffer[start..end]).into_owned();
    buffer[start..end].fill(b' ');
    Some(match channel_id(&name) {
        Some(id) => LineKind::Channel(id),
        None => LineKind::Directive(name),
    })
}

/// Preprocess a whole score.
///
/// Lines without a `#` continue whatever directive or channel was opened
/// last; such a line before any directive is an error.
pub fn preprocess(text: &str) -> Result<Source> {
    enum Open {
        Nothing,
        Directive(usize),
        Channel(usize),
    }

    let mut pre = Preprocessor::new();
    let mut source = Source::default();
    let mut open = Open::Nothing;

    for (index, raw) in text.split('\n').enumerate() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let number = index + 1;
        // recompute the name offset before the buffer gets blanked
        let name_offset = raw
            .bytes()
            .position(|c| c != b' ' && c != b'\t')
            .map_or(0, |n| n + 1);
        let mut line = pre.line(number, raw.as_bytes())?;
        if line.empty {
            continue;
        }
        match line.kind.clone() {
            Some(LineKind::Directive(name)) => {
                source.directives.push(DirectiveStatement {
                    name,
                    line: number,
                    offset: name_offset,
                    lines: vec![line],
                });
                open = Open::Directive(source.directives.len() - 1);
            }
            Some(LineKind::Channel(id)) => {
                source.channels.entry(id).or_default().push(line);
                open = Open::Channel(id);
            }
            None => match open {
                Open::Nothing => {
                    return Err(Error::syntax(number, 0, "invalid line without any directive"))
                }
                Open::Directive(i) => {
                    let statement = &mut source.directives[i];
                    line.kind = Some(LineKind::Directive(statement.name.clone()));
                    statement.lines.push(line);
                }
                Open::Channel(id) => {
                    line.kind = Some(LineKind::Channel(id));
                    source.channels.entry(id).or_default().push(line);
                }
            },
        }
    }

    if pre.comment_depth() > 0 {
        log::warn!("TSS: comment is not closed at the end of source");
    }
    log::info!("TSS: found {} directive(s)", source.directives.len());
    log::info!("TSS: found {} channel(s)", source.channels.len());
    for (id, lines) in &source.channels {
        log::info!("TSS: channel {} has {} line(s)", id, lines.len());
    }
    Ok(source)
}
