//! Cursor over preprocessed lines with rewindable positions

use super::source::{SourceLine, ESCAPE};
use crate::error::{Error, Result};

/// Position inside a group of lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Index into the scanned lines, not the source line number
    pub line: usize,
    pub offset: usize,
}

/// Reads bytes across line boundaries.
///
/// The cursor always rests on a readable byte or past the last line, so
/// `peek` never has to look ahead.
pub struct Scanner<'a> {
    lines: &'a [SourceLine],
    cursor: Cursor,
}

impl<'a> Scanner<'a> {
    pub fn new(lines: &'a [SourceLine]) -> Self {
        let mut scanner = Self {
            lines,
            cursor: Cursor { line: 0, offset: 0 },
        };
        scanner.settle();
        scanner
    }

    fn settle(&mut self) {
        while let Some(line) = self.lines.get(self.cursor.line) {
            if self.cursor.offset < line.buffer.len() {
                break;
            }
            self.cursor.line += 1;
            self.cursor.offset = 0;
        }
    }

    pub fn position(&self) -> Cursor {
        self.cursor
    }

    pub fn restore(&mut self, cursor: Cursor) {
        self.cursor = cursor;
        self.settle();
    }

    pub fn peek(&self) -> Option<u8> {
        self.lines
            .get(self.cursor.line)
            .map(|line| line.buffer[self.cursor.offset])
    }

    /// Byte after the current one, on the same line only
    pub fn peek_second(&self) -> Option<u8> {
        self.lines
            .get(self.cursor.line)
            .and_then(|line| line.buffer.get(self.cursor.offset + 1))
            .copied()
    }

    pub fn advance(&mut self) {
        if self.cursor.line < self.lines.len() {
            self.cursor.offset += 1;
            self.settle();
        }
    }

    pub fn next_byte(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.advance();
        Some(c)
    }

    pub fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.advance();
        }
    }

    /// Consume `c` if it is the current byte
    pub fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Skip spaces and report whether anything is left
    pub fn is_at_end(&mut self) -> bool {
        self.skip_spaces();
        self.peek().is_none()
    }

    /// Unsigned decimal at the cursor, without skipping spaces
    pub fn read_digits(&mut self) -> Option<i32> {
        let mut value: Option<i32> = None;
        while let Some(c) = self.peek().filter(u8::is_ascii_digit) {
            let digit = (c - b'0') as i32;
            value = Some(value.unwrap_or(0).saturating_mul(10).saturating_add(digit));
            self.advance();
        }
        value
    }

    /// Optionally signed decimal after any spaces. Nothing is consumed when
    /// no digits follow.
    pub fn read_number(&mut self) -> Option<i32> {
        let start = self.position();
        self.skip_spaces();
        let negative = self.eat(b'-');
        match self.read_digits() {
            Some(value) if negative => Some(-value),
            Some(value) => Some(value),
            None => {
                self.restore(start);
                None
            }
        }
    }

    /// Run of bytes up to a space or comma, after any spaces
    pub fn read_word(&mut self) -> String {
        self.skip_spaces();
        let mut word = Vec::new();
        while let Some(c) = self.peek().filter(|&c| c != b' ' && c != b',') {
            word.push(c);
            self.advance();
        }
        String::from_utf8_lossy(&word).into_owned()
    }

    /// Text between `<` and `>`; an escaped byte is taken literally
    pub fn read_braced_text(&mut self) -> Result<Vec<u8>> {
        self.skip_spaces();
        if !self.eat(b'<') {
            return Err(self.syntax("'<' expected"));
        }
        let mut text = Vec::new();
        loop {
            match self.next_byte() {
                None => return Err(self.syntax("'>' expected")),
                Some(b'>') => return Ok(text),
                Some(ESCAPE) => {
                    if let Some(c) = self.next_byte() {
                        text.push(c);
                    }
                }
                Some(c) => text.push(c),
            }
        }
    }

    /// Comma separated numbers between `<` and `>`, each within the range
    pub fn read_number_list(&mut self, min: i32, max: i32) -> Result<Vec<i32>> {
        self.skip_spaces();
        if !self.eat(b'<') {
            return Err(self.syntax("'<' expected"));
        }
        let mut values = Vec::new();
        self.skip_spaces();
        if self.eat(b'>') {
            return Ok(values);
        }
        loop {
            values.push(self.read_ranged(min, max)?);
            self.skip_spaces();
            if self.eat(b',') {
                continue;
            }
            if self.eat(b'>') {
                return Ok(values);
            }
            return Err(self.syntax("',' or '>' expected"));
        }
    }

    /// Required number within `min..=max`
    pub fn read_ranged(&mut self, min: i32, max: i32) -> Result<i32> {
        self.skip_spaces();
        let at = self.position();
        let value = self
            .read_number()
            .ok_or_else(|| self.syntax("number expected"))?;
        if value < min || value > max {
            return Err(self.range_at(
                at,
                format!("{} is out of range [{}, {}]", value, min, max),
            ));
        }
        Ok(value)
    }

    /// Error unless only spaces remain
    pub fn expect_end(&mut self) -> Result<()> {
        if self.is_at_end() {
            return Ok(());
        }
        let rest: Vec<u8> = self.lines[self.cursor.line].buffer[self.cursor.offset..]
            .iter()
            .copied()
            .take_while(|&c| c != b' ')
            .collect();
        Err(self.syntax(format!("unexpected '{}'", String::from_utf8_lossy(&rest))))
    }

    /// Source line number and byte offset of a cursor
    pub fn location(&self, at: Cursor) -> (usize, usize) {
        match self.lines.get(at.line) {
            Some(line) => (line.line, at.offset),
            None => self
                .lines
                .last()
                .map_or((1, 0), |line| (line.line, line.buffer.len())),
        }
    }

    pub fn syntax(&self, message: impl Into<String>) -> Error {
        self.syntax_at(self.cursor, message)
    }

    pub fn syntax_at(&self, at: Cursor, message: impl Into<String>) -> Error {
        let (line, offset) = self.location(at);
        Error::syntax(line, offset, message)
    }

    pub fn range_at(&self, at: Cursor, message: impl Into<String>) -> Error {
        let (line, offset) = self.location(at);
        Error::range(line, offset, message)
    }

    pub fn compile_at(&self, at: Cursor, message: impl Into<String>) -> Error {
        let (line, offset) = self.location(at);
        Error::compile(line, offset, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::source::Preprocessor;

    fn lines(texts: &[&str]) -> Vec<SourceLine> {
        let mut pre = Preprocessor::new();
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| pre.line(i + 1, text.as_bytes()).unwrap())
            .collect()
    }

    #[test]
    fn test_reads_across_lines() {
        let lines = lines(&["ab", "", "c"]);
        let mut scanner = Scanner::new(&lines);
        let mut read = Vec::new();
        while let Some(c) = scanner.next_byte() {
            read.push(c);
        }
        assert_eq!(read, b"abc");
        assert!(scanner.is_at_end());
    }

    #[test]
    fn test_restore_rewinds() {
        let lines = lines(&["o4 c", "d e"]);
        let mut scanner = Scanner::new(&lines);
        scanner.advance();
        let mark = scanner.position();
        while scanner.next_byte().is_some() {}
        scanner.restore(mark);
        assert_eq!(scanner.peek(), Some(b'4'));
    }

    #[test]
    fn test_numbers() {
        let lines = lines(&["  -12 34x -y"]);
        let mut scanner = Scanner::new(&lines);
        assert_eq!(scanner.read_number(), Some(-12));
        assert_eq!(scanner.read_number(), Some(34));
        assert_eq!(scanner.read_number(), None);
        assert_eq!(scanner.peek(), Some(b'x'));
        scanner.advance();
        assert_eq!(scanner.read_number(), None);
        scanner.skip_spaces();
        assert_eq!(scanner.peek(), Some(b'-'));
    }

    #[test]
    fn test_read_ranged_reports_position() {
        let lines = lines(&["x 300"]);
        let mut scanner = Scanner::new(&lines);
        scanner.advance();
        let err = scanner.read_ranged(0, 255).unwrap_err();
        assert!(matches!(err, Error::Range { .. }));
        assert_eq!(err.position(), Some((1, 2)));
    }

    #[test]
    fn test_braced_text_with_escape() {
        let lines = lines(&[r" <a\>b> rest"]);
        let mut scanner = Scanner::new(&lines);
        assert_eq!(scanner.read_braced_text().unwrap(), b"a>b");
        assert!(scanner.expect_end().is_err());
    }

    #[test]
    fn test_number_list() {
        let lines = lines(&["<1, -2,", " 3 >"]);
        let mut scanner = Scanner::new(&lines);
        assert_eq!(scanner.read_number_list(-128, 127).unwrap(), vec![1, -2, 3]);
        assert!(scanner.expect_end().is_ok());
    }

    #[test]
    fn test_expect_end_names_garbage() {
        let lines = lines(&["  junk more"]);
        let mut scanner = Scanner::new(&lines);
        let err = scanner.expect_end().unwrap_err();
        assert_eq!(err.position(), Some((1, 2)));
        assert!(err.to_string().contains("unexpected 'junk'"));
    }

    #[test]
    fn test_location_past_end() {
        let lines = lines(&["abc"]);
        let mut scanner = Scanner::new(&lines);
        while scanner.next_byte().is_some() {}
        assert_eq!(scanner.location(scanner.position()), (1, 3));
    }
}
