//! Token kinds and the [`Token`] produced by the [`crate::lexer::Lexer`]
//! reference implementation of the `token_source` contract.

/// Lexer mode, saved and restored around every compound construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenMode {
    /// Newlines inside an expression are insignificant.
    #[default]
    Default,
    /// A newline terminates the current statement.
    Newlines,
    /// Reserved words are returned as plain symbols (used for filenames).
    AllSyms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,
    Newline,
    Error,

    Number,
    ImaginaryNumber,
    String,
    Symbol,

    // keywords
    If,
    Else,
    For,
    While,
    Do,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Goto,
    Return,
    Local,
    Global,
    Static,
    Mat,
    Obj,
    Print,
    Quit,
    Abort,
    Show,
    Define,
    Undefine,
    Help,
    Read,
    Write,
    Cd,

    // punctuation / operators
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,
    Arrow,     // ->
    Question,  // ?

    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash, // //
    Percent,
    Caret, // ^ (power)
    Ampersand,
    Pipe,
    Hash,       // # set op
    Backslash,  // \ set minus
    Tilde,      // ~ one's complement / xor
    Bang,       // ! (postfix factorial, or logical not in prefix position)
    LeftShift,
    RightShift,

    PlusPlus,
    MinusMinus,

    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    SlashSlashAssign,
    PercentAssign,
    AmpersandAssign,
    PipeAssign,
    LeftShiftAssign,
    RightShiftAssign,
    CaretAssign,
    HashAssign,
    TildeAssign,
    BackslashAssign,

    EqEq,
    NotEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,

    AndAnd,
    OrOr,
}

impl TokenKind {
    pub fn is_keyword(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            If | Else
                | For
                | While
                | Do
                | Switch
                | Case
                | Default
                | Break
                | Continue
                | Goto
                | Return
                | Local
                | Global
                | Static
                | Mat
                | Obj
                | Print
                | Quit
                | Abort
                | Show
                | Define
                | Undefine
                | Help
                | Read
                | Write
                | Cd
        )
    }
}

/// A scanned lexeme: its kind, source text, and line number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub line: u32,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, text: &'a str, line: u32) -> Self {
        Token { kind, text, line }
    }
}
