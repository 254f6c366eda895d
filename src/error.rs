//! Diagnostics raised by the compiler: [`CompileError`], the sink that
//! collects them ([`Diagnostics`]), and the resync policy each site asks
//! for ([`ResyncTo`]).
use thiserror::Error;

/// Any error the compiler can raise while turning tokens into a [`crate::opcode::Function`].
///
/// Each variant carries the source line and enough detail to reproduce the
/// original diagnostic text; none of them abort compilation by themselves —
/// see [`Diagnostics`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("line {line}: unexpected token near '{found}', expected {expected}")]
    UnexpectedToken {
        line: u32,
        found: String,
        expected: String,
    },

    #[error("line {line}: missing '{delimiter}'")]
    MissingDelimiter { line: u32, delimiter: String },

    #[error("line {line}: '{name}' is undefined")]
    UndefinedSymbol { line: u32, name: String },

    #[error("line {line}: '{name}' is already defined")]
    AlreadyDefined { line: u32, name: String },

    #[error("line {line}: lvalue required")]
    LvalueRequired { line: u32 },

    #[error("line {line}: duplicate 'case' value in switch")]
    DuplicateCase { line: u32 },

    #[error("line {line}: multiple 'default' in switch")]
    DuplicateDefault { line: u32 },

    #[error("line {line}: duplicate member '{name}' in object type")]
    DuplicateObjectMember { line: u32, name: String },

    #[error("line {line}: '{name}' is a builtin, cannot redefine")]
    BuiltinNameCollision { line: u32, name: String },

    #[error("line {line}: too many dimensions in matrix declaration (max {max})")]
    TooManyDimensions { line: u32, max: usize },

    #[error("line {line}: expected 'while' after 'do' body")]
    MissingWhileAfterDo { line: u32 },

    #[error("line {line}: '{keyword}' used outside of a {context}")]
    MisplacedKeyword {
        line: u32,
        keyword: &'static str,
        context: &'static str,
    },

    #[error("line {line}: goto references undefined label '{label}'")]
    UndefinedLabel { line: u32, label: String },

    #[error("maximum input (read) depth reached")]
    IncludeDepthExceeded,

    #[error("line {line}: cannot allocate constant")]
    ConstantPoolExhausted { line: u32 },

    #[error("'{directive}' is disabled by configuration")]
    PermissionDenied { directive: &'static str },
}

impl CompileError {
    pub fn line(&self) -> Option<u32> {
        match self {
            CompileError::UnexpectedToken { line, .. }
            | CompileError::MissingDelimiter { line, .. }
            | CompileError::UndefinedSymbol { line, .. }
            | CompileError::AlreadyDefined { line, .. }
            | CompileError::LvalueRequired { line }
            | CompileError::DuplicateCase { line }
            | CompileError::DuplicateDefault { line }
            | CompileError::DuplicateObjectMember { line, .. }
            | CompileError::BuiltinNameCollision { line, .. }
            | CompileError::TooManyDimensions { line, .. }
            | CompileError::MissingWhileAfterDo { line }
            | CompileError::MisplacedKeyword { line, .. }
            | CompileError::UndefinedLabel { line, .. }
            | CompileError::ConstantPoolExhausted { line } => Some(*line),
            CompileError::IncludeDepthExceeded | CompileError::PermissionDenied { .. } => None,
        }
    }
}

/// What a caller wants the lexer to skip to after a [`CompileError`] is reported.
///
/// Mirrors the original's resync-to-delimiter recovery: the function under
/// construction is still finalized, but its error count prevents execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncTo {
    Nothing,
    Comma,
    Semicolon,
}

/// Collects [`CompileError`]s without aborting the surrounding parse.
///
/// One sink is shared by the whole compilation (including nested `read`
/// includes); `had_error()` gates whether the resulting function may be
/// handed to the VM.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<CompileError>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, error: CompileError) {
        log::debug!("compile error: {error}");
        self.errors.push(error);
    }

    pub fn had_error(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    pub fn take(&mut self) -> Vec<CompileError> {
        std::mem::take(&mut self.errors)
    }
}
