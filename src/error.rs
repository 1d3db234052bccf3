use std::{error, fmt};

/// A single error taxonomy for the whole assemble-and-link pipeline.
///
/// Every variant carries the file/line the condition was detected at, matching
/// `picasso`'s `throwError("%s:%d: error: ...")` convention.
#[derive(Debug, Clone)]
pub enum AssembleError {
    /// Bad identifier, missing bracket/parameter, too many parameters.
    Lex {
        file: String,
        line: u32,
        message: String,
    },
    /// Duplicate identifier, undefined label/procedure/entry, uniform
    /// redeclaration with a mismatched type or size.
    Symbol {
        file: String,
        line: u32,
        message: String,
    },
    /// Register out of class range, integer out of range, bad swizzle.
    Range {
        file: String,
        line: u32,
        message: String,
    },
    /// OPDESC pool full, uniform slots exhausted, block stack overflow,
    /// constant table full, MAD slot reservation impossible.
    Capacity {
        file: String,
        line: u32,
        message: String,
    },
    /// `.else`/`.end` without a matching open, unclosed block at EOF,
    /// instruction outside any PROC, VSH size exceeds 512 instructions.
    Structure {
        file: String,
        line: u32,
        message: String,
    },
    /// Duplicate `v*` inputs in one instruction, output mask collision,
    /// geometry-shader register 7+ used for a non-dummy output.
    Semantic {
        file: String,
        line: u32,
        message: String,
    },
}

impl AssembleError {
    #[must_use]
    pub fn file(&self) -> &str {
        match self {
            Self::Lex { file, .. }
            | Self::Symbol { file, .. }
            | Self::Range { file, .. }
            | Self::Capacity { file, .. }
            | Self::Structure { file, .. }
            | Self::Semantic { file, .. } => file,
        }
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        match self {
            Self::Lex { line, .. }
            | Self::Symbol { line, .. }
            | Self::Range { line, .. }
            | Self::Capacity { line, .. }
            | Self::Structure { line, .. }
            | Self::Semantic { line, .. } => *line,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Lex { message, .. }
            | Self::Symbol { message, .. }
            | Self::Range { message, .. }
            | Self::Capacity { message, .. }
            | Self::Structure { message, .. }
            | Self::Semantic { message, .. } => message,
        }
    }
}

impl fmt::Display for AssembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: error: {}", self.file(), self.line(), self.message())
    }
}

impl error::Error for AssembleError {}

pub type Result<T> = std::result::Result<T, AssembleError>;
