//! Token kinds, binding-power table, and the "does a following `/` start a
//! regexp" table.
//!
//! The original compiler keeps both bits of per-token metadata (binding
//! power, regexp-context) in one byte-packed array indexed by token number.
//! `lbp` keeps that shape directly: `PUNCT_LBP` is a literal `[u8; N]` array
//! indexed by `Punct`'s discriminant, with only the two binding keywords
//! (`instanceof`/`in`, which sit outside the `Punct` space entirely) left as
//! a residual match arm. `division_follows` stays a plain `match`: its true
//! cases span `Ident`/`Literal`/specific `Keyword`s as well as `Punct`, a
//! wider set than a `Punct`-indexed array alone could cover.

use std::fmt;

/// ES5.1 reserved words that are never valid identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Keyword {
    Break,
    Case,
    Catch,
    Continue,
    Debugger,
    Default,
    Delete,
    Do,
    Else,
    Finally,
    For,
    Function,
    If,
    In,
    Instanceof,
    New,
    Return,
    Switch,
    This,
    Throw,
    Try,
    Typeof,
    Var,
    Void,
    While,
    With,
    Null,
    True,
    False,
}

/// Words reserved only in strict mode (ES5.1 §7.6.1.2): legal identifiers
/// in non-strict code, syntax errors as binding names in strict code.
pub const STRICT_RESERVED: &[&str] =
    &["implements", "interface", "package", "private", "protected", "public", "static", "let", "yield"];

/// Punctuators and operators. Named rather than stored as raw strings so
/// `lbp`/`starts_regexp_after` can match on them directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Punct {
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Semi,
    Comma,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
    EqEqEq,
    NotEqEq,
    Plus,
    Minus,
    Star,
    Percent,
    Slash,
    PlusPlus,
    MinusMinus,
    Shl,
    Shr,
    UShr,
    Amp,
    Pipe,
    Caret,
    Bang,
    Tilde,
    AmpAmp,
    PipePipe,
    Question,
    Colon,
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    PercentEq,
    SlashEq,
    ShlEq,
    ShrEq,
    UShrEq,
    AmpEq,
    PipeEq,
    CaretEq,
}

/// Literal payload carried by a token, materialized eagerly by the lexer
/// rather than re-scanned later.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    /// Decoded string value, plus whether the raw source text contained a
    /// backslash escape.
    String { value: String, had_escape: bool },
    Regexp { pattern: String, flags: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Eof,
    Ident(String),
    Keyword(Keyword),
    Punct(Punct),
    Literal(Literal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// True when at least one `LineTerminator` appeared between the
    /// previous token and this one.
    pub newline_before: bool,
    pub line: u32,
    pub byte_offset: usize,
}

impl Token {
    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    #[must_use]
    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_punct(&self, p: Punct) -> bool {
        matches!(&self.kind, TokenKind::Punct(q) if *q == p)
    }

    #[must_use]
    pub fn is_keyword(&self, k: Keyword) -> bool {
        matches!(&self.kind, TokenKind::Keyword(q) if *q == k)
    }

    /// Text usable as an `IdentifierName` (ES5.1 §7.6): any identifier or
    /// reserved word. Used for property names after `.` and for object
    /// literal keys, where reserved words are permitted even though they
    /// cannot bind a variable.
    #[must_use]
    pub fn identifier_name(&self) -> Option<String> {
        match &self.kind {
            TokenKind::Ident(s) => Some(s.clone()),
            TokenKind::Keyword(k) => Some(k.to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Eof => write!(f, "<eof>"),
            TokenKind::Ident(s) => write!(f, "identifier `{s}`"),
            TokenKind::Keyword(k) => write!(f, "`{k}`"),
            TokenKind::Punct(p) => write!(f, "{p:?}"),
            TokenKind::Literal(Literal::Number(n)) => write!(f, "number `{n}`"),
            TokenKind::Literal(Literal::String { value, .. }) => write!(f, "string `{value}`"),
            TokenKind::Literal(Literal::Regexp { pattern, flags }) => write!(f, "regexp /{pattern}/{flags}"),
        }
    }
}

/// Binding powers, weakest to strongest. Ordering only
/// matters relative to the `BP_*` constants used by the Pratt parser.
pub mod bp {
    pub const NONE: u8 = 0;
    pub const COMMA: u8 = 10;
    pub const ASSIGNMENT: u8 = 20;
    pub const CONDITIONAL: u8 = 30;
    pub const LOR: u8 = 40;
    pub const LAND: u8 = 50;
    pub const BOR: u8 = 60;
    pub const BXOR: u8 = 70;
    pub const BAND: u8 = 80;
    pub const EQUALITY: u8 = 90;
    pub const RELATIONAL: u8 = 100;
    pub const SHIFT: u8 = 110;
    pub const ADDITIVE: u8 = 120;
    pub const MULTIPLICATIVE: u8 = 130;
    pub const POSTFIX: u8 = 140;
    pub const CALL: u8 = 150;
    pub const MEMBER: u8 = 160;
}

/// Left binding power indexed by `Punct`'s discriminant, in the same order
/// `Punct` declares its variants. The two binding keywords (`instanceof`/
/// `in`) live outside `Punct` and are handled directly in `lbp`.
#[rustfmt::skip]
const PUNCT_LBP: [u8; 48] = [
    bp::NONE,           // LBrace
    bp::NONE,           // RBrace
    bp::CALL,           // LParen
    bp::NONE,           // RParen
    bp::MEMBER,         // LBracket
    bp::NONE,           // RBracket
    bp::MEMBER,         // Dot
    bp::NONE,           // Semi
    bp::COMMA,          // Comma
    bp::RELATIONAL,     // Lt
    bp::RELATIONAL,     // Gt
    bp::RELATIONAL,     // Le
    bp::RELATIONAL,     // Ge
    bp::EQUALITY,       // EqEq
    bp::EQUALITY,       // NotEq
    bp::EQUALITY,       // EqEqEq
    bp::EQUALITY,       // NotEqEq
    bp::ADDITIVE,       // Plus
    bp::ADDITIVE,       // Minus
    bp::MULTIPLICATIVE, // Star
    bp::MULTIPLICATIVE, // Percent
    bp::MULTIPLICATIVE, // Slash
    bp::POSTFIX,        // PlusPlus
    bp::POSTFIX,        // MinusMinus
    bp::SHIFT,          // Shl
    bp::SHIFT,          // Shr
    bp::SHIFT,          // UShr
    bp::BAND,           // Amp
    bp::BOR,            // Pipe
    bp::BXOR,           // Caret
    bp::NONE,           // Bang
    bp::NONE,           // Tilde
    bp::LAND,           // AmpAmp
    bp::LOR,            // PipePipe
    bp::CONDITIONAL,    // Question
    bp::NONE,           // Colon
    bp::ASSIGNMENT,     // Eq
    bp::ASSIGNMENT,     // PlusEq
    bp::ASSIGNMENT,     // MinusEq
    bp::ASSIGNMENT,     // StarEq
    bp::ASSIGNMENT,     // PercentEq
    bp::ASSIGNMENT,     // SlashEq
    bp::ASSIGNMENT,     // ShlEq
    bp::ASSIGNMENT,     // ShrEq
    bp::ASSIGNMENT,     // UShrEq
    bp::ASSIGNMENT,     // AmpEq
    bp::ASSIGNMENT,     // PipeEq
    bp::ASSIGNMENT,     // CaretEq
];

/// Left binding power of a token when it appears in `led` position
///. Zero means "this token cannot continue an expression",
/// terminating the Pratt loop.
#[must_use]
pub fn lbp(kind: &TokenKind) -> u8 {
    match kind {
        TokenKind::Punct(p) => PUNCT_LBP[*p as usize],
        TokenKind::Keyword(Keyword::Instanceof | Keyword::In) => bp::RELATIONAL,
        _ => bp::NONE,
    }
}

/// `true` when a `/` immediately after this token kind begins a division
/// (rather than a regexp literal) — the lexer's regexp-vs-division
/// disambiguation table.
#[must_use]
pub fn division_follows(kind: &TokenKind) -> bool {
    use Punct::*;
    match kind {
        TokenKind::Ident(_) => true,
        TokenKind::Literal(_) => true,
        TokenKind::Keyword(Keyword::This | Keyword::Null | Keyword::True | Keyword::False) => true,
        TokenKind::Punct(RParen | RBracket | RBrace | PlusPlus | MinusMinus) => true,
        _ => false,
    }
}
