use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Syntax error at line {line}, offset {offset}: {message}")]
    Syntax {
        line: usize,
        offset: usize,
        message: String,
    },

    #[error("Range error at line {line}, offset {offset}: {message}")]
    Range {
        line: usize,
        offset: usize,
        message: String,
    },

    #[error("Compile error at line {line}, offset {offset}: {message}")]
    Compile {
        line: usize,
        offset: usize,
        message: String,
    },

    #[error("TSD parse error: {0}")]
    TsdParse(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn syntax(line: usize, offset: usize, message: impl Into<String>) -> Self {
        Error::Syntax {
            line,
            offset,
            message: message.into(),
        }
    }

    pub fn range(line: usize, offset: usize, message: impl Into<String>) -> Self {
        Error::Range {
            line,
            offset,
            message: message.into(),
        }
    }

    pub fn compile(line: usize, offset: usize, message: impl Into<String>) -> Self {
        Error::Compile {
            line,
            offset,
            message: message.into(),
        }
    }

    /// Source position carried by compile-time errors
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            Error::Syntax { line, offset, .. }
            | Error::Range { line, offset, .. }
            | Error::Compile { line, offset, .. } => Some((*line, *offset)),
            _ => None,
        }
    }

    /// Human readable reason without the position prefix
    pub fn message(&self) -> String {
        match self {
            Error::Syntax { message, .. }
            | Error::Range { message, .. }
            | Error::Compile { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
