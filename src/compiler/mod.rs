//! TSS Compiler - parses TSS text and generates TSD bytecode
//!
//! Compilation runs in three passes: the source is preprocessed into
//! classified lines, the `#` directives are folded into [`CompileTags`], and
//! every channel is compiled into its own program before the TSD image is
//! written.

pub mod channel;
pub mod command;
pub mod directive;
pub mod scanner;
pub mod source;

use crate::error::{Error, Result};
use crate::tsd::TsdWriter;
use channel::{ChannelCompiler, ChannelProgram};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

pub use directive::CompileTags;

/// Main compiler state
#[derive(Debug, Default)]
pub struct Compiler {
    /// Directive settings of the last compile
    pub tags: CompileTags,
    /// Channel programs of the last compile, indexed by channel
    pub programs: Vec<ChannelProgram>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile TSS input to a TSD file
    pub fn compile<R: Read>(&mut self, mut input: R, output: &Path) -> Result<()> {
        let mut raw = Vec::new();
        input.read_to_end(&mut raw)?;
        let text = String::from_utf8(raw)
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        let data = self.compile_source(&text)?;

        let mut writer = BufWriter::new(File::create(output)?);
        writer.write_all(&data)?;
        writer.flush()?;
        Ok(())
    }

    /// Compile a TSS file to a TSD file
    pub fn compile_file(&mut self, input: &Path, output: &Path) -> Result<()> {
        let file = File::open(input)?;
        self.compile(file, output)
    }

    /// Compile TSS text to an in-memory TSD image.
    ///
    /// Errors carrying a source position are logged as
    /// `TSS: (line,offset) message` before they are returned.
    pub fn compile_source(&mut self, text: &str) -> Result<Vec<u8>> {
        self.build(text).map_err(|e| {
            if let Some((line, offset)) = e.position() {
                log::error!("TSS: ({},{}) {}", line, offset, e.message());
            }
            e
        })
    }

    fn build(&mut self, text: &str) -> Result<Vec<u8>> {
        let source = source::preprocess(text)?;
        let tags = directive::parse_directives(&source.directives)?;

        let Some(count) = tags.channels else {
            let line = source
                .channels
                .values()
                .next()
                .and_then(|lines| lines.first())
                .map_or(1, |l| l.line);
            return Err(Error::compile(line, 0, "#CHANNEL is not specified"));
        };
        if let Some((&id, lines)) = source.channels.range(count..).next() {
            let line = lines.first().map_or(1, |l| l.line);
            return Err(Error::compile(
                line,
                0,
                format!("channel {} is out of range, #CHANNEL is {}", id, count),
            ));
        }

        let mut programs = Vec::with_capacity(count);
        for id in 0..count {
            let lines = source.channels.get(&id).map_or(&[][..], |l| l.as_slice());
            let program = ChannelCompiler::new(&tags, id, lines).compile()?;
            log::info!(
                "TSS: channel {} is {} tick(s), {} byte(s)",
                id,
                program.ticks,
                program.data.len()
            );
            programs.push(program);
        }

        let data: Vec<Vec<u8>> = programs.iter().map(|p| p.data.clone()).collect();
        let image = TsdWriter::new(&tags.title, &data, &tags.tables).to_bytes()?;

        self.tags = tags;
        self.programs = programs;
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsd::TsdReader;

    #[test]
    fn test_compile_source_builds_image() {
        let mut compiler = Compiler::new();
        let image = compiler
            .compile_source("#TITLE <demo>\n#CHANNEL 2\n#A c\n#B r")
            .unwrap();
        let file = TsdReader::new(&image).parse().unwrap();
        assert_eq!(file.title, "demo");
        assert_eq!(file.channels.len(), 2);
        assert_eq!(compiler.programs[0].data, vec![60, 48, 0xFF]);
        assert_eq!(compiler.programs[1].data, vec![0x80, 48, 0xFF]);
    }

    #[test]
    fn test_unused_channels_are_empty_programs() {
        let mut compiler = Compiler::new();
        compiler.compile_source("#CHANNEL 3\n#B c").unwrap();
        assert_eq!(compiler.programs.len(), 3);
        assert_eq!(compiler.programs[0].data, vec![0xFF]);
        assert_eq!(compiler.programs[2].ticks, 0);
    }

    #[test]
    fn test_missing_channel_directive() {
        let mut compiler = Compiler::new();
        let err = compiler.compile_source("#TITLE <x>\n#A c").unwrap_err();
        assert!(matches!(err, Error::Compile { .. }));
        assert_eq!(err.position(), Some((2, 0)));
    }

    #[test]
    fn test_channel_beyond_count() {
        let mut compiler = Compiler::new();
        let err = compiler.compile_source("#CHANNEL 1\n#A c\n#C d").unwrap_err();
        assert!(matches!(err, Error::Compile { .. }));
        assert_eq!(err.position(), Some((3, 0)));
    }

    #[test]
    fn test_invalid_utf8_input() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.tsd");
        let mut compiler = Compiler::new();
        let err = compiler.compile(&[0xFFu8, 0xFE][..], &output).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
