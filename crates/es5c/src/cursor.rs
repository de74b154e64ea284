//! Token Cursor: a one-token-ahead, one-token-behind window
//! over the lexer, plus the regexp/division disambiguation the lexer needs
//! from its caller and a one-shot override for contexts where a leading
//! `/` can never validly begin a regexp (e.g. directly after `)` closing an
//! `if` condition still permits a regexp body, but the cursor itself is the
//! place that decides the flag passed to `Lexer::next_token`).

use crate::error::CompileResult;
use crate::lexer::token::{division_follows, Punct, Token, TokenKind};
use crate::lexer::{Lexer, Position};

/// Saved cursor state, used by the two-pass function body driver to rewind to the start of a nested function's body and re-scan it
/// in pass 2 without re-running pass 1's declaration scan.
#[derive(Debug, Clone, Copy)]
pub struct CursorMark {
    lexer_pos: Position,
}

pub struct TokenCursor<'a> {
    lexer: Lexer<'a>,
    cur: Token,
    /// Lexer position just before `cur` was scanned, so `mark()` can
    /// reproduce `cur` exactly on `restore()` rather than skipping past it.
    cur_start: Position,
    prev: Option<Token>,
    /// One-shot flag: the parser sets this just before advancing over a
    /// token that can never be followed by a regexp literal regardless of
    /// what `division_follows` would otherwise say.
    reject_regexp_in_adv: bool,
}

impl<'a> TokenCursor<'a> {
    pub fn new(src: &'a str) -> CompileResult<Self> {
        let mut lexer = Lexer::new(src);
        let cur_start = lexer.save();
        let cur = lexer.next_token(true)?;
        Ok(Self { lexer, cur, cur_start, prev: None, reject_regexp_in_adv: false })
    }

    #[must_use]
    pub fn current(&self) -> &Token {
        &self.cur
    }

    #[must_use]
    pub fn previous(&self) -> Option<&Token> {
        self.prev.as_ref()
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.cur.line
    }

    /// Suppresses regexp-context on the very next `advance()`, used right
    /// after emitting a postfix `++`/`--` target where a following `/`
    /// must be read as division.
    pub fn suppress_next_regexp(&mut self) {
        self.reject_regexp_in_adv = true;
    }

    /// Consumes the current token and scans the next one.
    pub fn advance(&mut self) -> CompileResult<()> {
        let regexp_allowed = if self.reject_regexp_in_adv {
            self.reject_regexp_in_adv = false;
            false
        } else {
            !division_follows(&self.cur.kind)
        };
        self.cur_start = self.lexer.save();
        let next = self.lexer.next_token(regexp_allowed)?;
        self.prev = Some(std::mem::replace(&mut self.cur, next));
        Ok(())
    }

    /// Consumes the current token if it matches `p`, else returns an error.
    pub fn expect_punct(&mut self, p: Punct) -> CompileResult<()> {
        if self.cur.is_punct(p) {
            self.advance()
        } else {
            Err(crate::error::CompileError::syntax(format!("expected `{p:?}`, found {}", self.cur.kind))
                .with_line(self.cur.line))
        }
    }

    pub fn eat_punct(&mut self, p: Punct) -> CompileResult<bool> {
        if self.cur.is_punct(p) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self.cur.kind, TokenKind::Eof)
    }

    /// Saves enough state to later `restore` the lexer to exactly this
    /// point.
    #[must_use]
    pub fn mark(&self) -> CursorMark {
        CursorMark { lexer_pos: self.cur_start }
    }

    pub fn restore(&mut self, mark: CursorMark) -> CompileResult<()> {
        self.lexer.restore(mark.lexer_pos);
        self.cur_start = mark.lexer_pos;
        self.cur = self.lexer.next_token(true)?;
        self.prev = None;
        Ok(())
    }

    /// The raw source slice between two byte offsets, used for the textual
    /// (not value-based) directive-prologue escape check.
    #[must_use]
    pub fn source_slice(&self, start: usize, end: usize) -> &'a str {
        &self.lexer.source()[start..end]
    }
}
