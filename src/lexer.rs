//! Reference implementation of the `token_source` contract: a char-slice
//! cursor plus a keyword table, extended with token modes, the `label:`
//! one-char lookahead, and a bounded file-inclusion stack.
use crate::token::{Token, TokenKind, TokenMode};

struct Source<'a> {
    text: &'a str,
    start: usize,
    current: usize,
    line: u32,
}

impl<'a> Source<'a> {
    fn new(text: &'a str) -> Self {
        Source {
            text,
            start: 0,
            current: 0,
            line: 1,
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.text.len()
    }

    fn peek(&self) -> Option<char> {
        self.text[self.current..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut it = self.text[self.current..].chars();
        it.next();
        it.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.current += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn match_and_advance(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn lexeme(&self) -> &'a str {
        &self.text[self.start..self.current]
    }
}

/// One entry of the bounded `read`-include stack: the file's own cursor,
/// restored when the include finishes or errors out.
struct IncludeFrame<'a> {
    source: Source<'a>,
    mode: TokenMode,
}

pub struct Lexer<'a> {
    source: Source<'a>,
    mode: TokenMode,
    includes: Vec<IncludeFrame<'a>>,
    max_include_depth: usize,
    pushed_back: Option<Token<'a>>,
}

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("if", TokenKind::If),
    ("else", TokenKind::Else),
    ("for", TokenKind::For),
    ("while", TokenKind::While),
    ("do", TokenKind::Do),
    ("switch", TokenKind::Switch),
    ("case", TokenKind::Case),
    ("default", TokenKind::Default),
    ("break", TokenKind::Break),
    ("continue", TokenKind::Continue),
    ("goto", TokenKind::Goto),
    ("return", TokenKind::Return),
    ("local", TokenKind::Local),
    ("global", TokenKind::Global),
    ("static", TokenKind::Static),
    ("mat", TokenKind::Mat),
    ("obj", TokenKind::Obj),
    ("print", TokenKind::Print),
    ("quit", TokenKind::Quit),
    ("abort", TokenKind::Abort),
    ("show", TokenKind::Show),
    ("define", TokenKind::Define),
    ("undefine", TokenKind::Undefine),
    ("help", TokenKind::Help),
    ("read", TokenKind::Read),
    ("write", TokenKind::Write),
    ("cd", TokenKind::Cd),
];

fn is_id_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_id_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str, max_include_depth: usize) -> Self {
        Lexer {
            source: Source::new(text),
            mode: TokenMode::Default,
            includes: Vec::new(),
            max_include_depth,
            pushed_back: None,
        }
    }

    pub fn line_number(&self) -> u32 {
        self.source.line
    }

    pub fn token_mode(&mut self, mode: TokenMode) -> TokenMode {
        std::mem::replace(&mut self.mode, mode)
    }

    /// Begin scanning `text` as an included file; fails if the bounded
    /// include stack is already at capacity.
    pub fn push_include(&mut self, text: &'a str) -> Result<(), ()> {
        if self.includes.len() >= self.max_include_depth {
            return Err(());
        }
        let previous = std::mem::replace(&mut self.source, Source::new(text));
        self.includes.push(IncludeFrame {
            source: previous,
            mode: self.mode,
        });
        Ok(())
    }

    /// Returns to the including file, if any. `true` if an include was popped.
    pub fn pop_include(&mut self) -> bool {
        if let Some(frame) = self.includes.pop() {
            self.source = frame.source;
            self.mode = frame.mode;
            true
        } else {
            false
        }
    }

    pub fn include_depth(&self) -> usize {
        self.includes.len()
    }

    /// One-character lookahead used only to disambiguate `name:` label
    /// definitions from the start of a statement; does not consume.
    pub fn peek_char_is_colon(&self) -> bool {
        self.source.peek() == Some(':')
    }

    /// Push back exactly one token (the `rescantoken` contract operation).
    pub fn rescan(&mut self, token: Token<'a>) {
        debug_assert!(self.pushed_back.is_none(), "only one token of pushback supported");
        self.pushed_back = Some(token);
    }

    pub fn next_token(&mut self) -> Token<'a> {
        if let Some(tok) = self.pushed_back.take() {
            return tok;
        }
        self.scan_token()
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.source.peek() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.source.advance();
                }
                Some('\n') => {
                    if self.mode == TokenMode::Newlines {
                        return;
                    }
                    self.source.advance();
                }
                Some('#') if self.source.peek_next() == Some('#') => {
                    // block comment `## ... ##`, matching the original's comment syntax
                    self.source.advance();
                    self.source.advance();
                    while !self.source.is_at_end()
                        && !(self.source.peek() == Some('#') && self.source.peek_next() == Some('#'))
                    {
                        self.source.advance();
                    }
                    self.source.advance();
                    self.source.advance();
                }
                _ => return,
            }
        }
    }

    fn make(&self, kind: TokenKind) -> Token<'a> {
        Token::new(kind, self.source.lexeme(), self.source.line)
    }

    fn error(&self, text: &'a str) -> Token<'a> {
        Token::new(TokenKind::Error, text, self.source.line)
    }

    fn scan_token(&mut self) -> Token<'a> {
        self.skip_whitespace();
        self.source.start = self.source.current;

        let Some(c) = self.source.advance() else {
            return self.make(TokenKind::Eof);
        };

        if c == '\n' {
            return self.make(TokenKind::Newline);
        }
        if is_id_start(c) {
            return self.identifier();
        }
        if c.is_ascii_digit() {
            return self.number();
        }
        if c == '"' {
            return self.string();
        }

        use TokenKind::*;
        match c {
            '(' => self.make(LeftParen),
            ')' => self.make(RightParen),
            '{' => self.make(LeftBrace),
            '}' => self.make(RightBrace),
            '[' => self.make(LeftBracket),
            ']' => self.make(RightBracket),
            ',' => self.make(Comma),
            ';' => self.make(Semicolon),
            ':' => self.make(Colon),
            '.' => self.make(Dot),
            '?' => self.make(Question),
            '~' => {
                if self.source.match_and_advance('=') {
                    self.make(TildeAssign)
                } else {
                    self.make(Tilde)
                }
            }
            '#' => {
                if self.source.match_and_advance('=') {
                    self.make(HashAssign)
                } else {
                    self.make(Hash)
                }
            }
            '\\' => {
                if self.source.match_and_advance('=') {
                    self.make(BackslashAssign)
                } else {
                    self.make(Backslash)
                }
            }
            '+' => {
                if self.source.match_and_advance('+') {
                    self.make(PlusPlus)
                } else if self.source.match_and_advance('=') {
                    self.make(PlusAssign)
                } else {
                    self.make(Plus)
                }
            }
            '-' => {
                if self.source.match_and_advance('-') {
                    self.make(MinusMinus)
                } else if self.source.match_and_advance('=') {
                    self.make(MinusAssign)
                } else if self.source.match_and_advance('>') {
                    self.make(Arrow)
                } else {
                    self.make(Minus)
                }
            }
            '*' => {
                if self.source.match_and_advance('=') {
                    self.make(StarAssign)
                } else {
                    self.make(Star)
                }
            }
            '/' => {
                if self.source.match_and_advance('/') {
                    if self.source.match_and_advance('=') {
                        self.make(SlashSlashAssign)
                    } else {
                        self.make(SlashSlash)
                    }
                } else if self.source.match_and_advance('=') {
                    self.make(SlashAssign)
                } else {
                    self.make(Slash)
                }
            }
            '%' => {
                if self.source.match_and_advance('=') {
                    self.make(PercentAssign)
                } else {
                    self.make(Percent)
                }
            }
            '^' => {
                if self.source.match_and_advance('=') {
                    self.make(CaretAssign)
                } else {
                    self.make(Caret)
                }
            }
            '&' => {
                if self.source.match_and_advance('&') {
                    self.make(AndAnd)
                } else if self.source.match_and_advance('=') {
                    self.make(AmpersandAssign)
                } else {
                    self.make(Ampersand)
                }
            }
            '|' => {
                if self.source.match_and_advance('|') {
                    self.make(OrOr)
                } else if self.source.match_and_advance('=') {
                    self.make(PipeAssign)
                } else {
                    self.make(Pipe)
                }
            }
            '!' => {
                if self.source.match_and_advance('=') {
                    self.make(NotEq)
                } else {
                    self.make(Bang)
                }
            }
            '=' => {
                if self.source.match_and_advance('=') {
                    self.make(EqEq)
                } else {
                    self.make(Assign)
                }
            }
            '<' => {
                if self.source.match_and_advance('<') {
                    if self.source.match_and_advance('=') {
                        self.make(LeftShiftAssign)
                    } else {
                        self.make(LeftShift)
                    }
                } else if self.source.match_and_advance('=') {
                    self.make(LessEq)
                } else {
                    self.make(Less)
                }
            }
            '>' => {
                if self.source.match_and_advance('>') {
                    if self.source.match_and_advance('=') {
                        self.make(RightShiftAssign)
                    } else {
                        self.make(RightShift)
                    }
                } else if self.source.match_and_advance('=') {
                    self.make(GreaterEq)
                } else {
                    self.make(Greater)
                }
            }
            _ => self.error("unexpected character"),
        }
    }

    fn identifier(&mut self) -> Token<'a> {
        while self.source.peek().is_some_and(is_id_continue) {
            self.source.advance();
        }
        let text = self.source.lexeme();
        if self.mode != TokenMode::AllSyms {
            if let Some((_, kind)) = KEYWORDS.iter().find(|(kw, _)| *kw == text) {
                return self.make(*kind);
            }
        }
        self.make(TokenKind::Symbol)
    }

    fn number(&mut self) -> Token<'a> {
        while self.source.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.source.advance();
        }
        if self.source.peek() == Some('.') && self.source.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.source.advance();
            while self.source.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.source.advance();
            }
        }
        if matches!(self.source.peek(), Some('i') | Some('I')) {
            self.source.advance();
            return self.make(TokenKind::ImaginaryNumber);
        }
        self.make(TokenKind::Number)
    }

    fn string(&mut self) -> Token<'a> {
        while self.source.peek().is_some_and(|c| c != '"') && !self.source.is_at_end() {
            self.source.advance();
        }
        if self.source.is_at_end() {
            return self.error("unterminated string");
        }
        self.source.advance();
        self.make(TokenKind::String)
    }
}
