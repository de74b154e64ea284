//! Error taxonomy for the compiler.
//!
//! Hand-rolls the error enum with `strum` derives instead of reaching for
//! `thiserror`.

use std::fmt;

/// Result alias for any operation that can fail to compile.
pub type CompileResult<T> = Result<T, CompileError>;

/// The three error kinds a compile failure can carry. Not a type
/// hierarchy — a flat tag distinguishing abstract kinds, not type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ErrorKind {
    /// Unexpected token, missing terminator, duplicate label, strict-mode
    /// name violations, misplaced `with`/`continue`/`return`, invalid LHS.
    Syntax,
    /// Recursion limit exceeded, operand cannot be shuffled, too many
    /// formals/consts/functions/temporaries.
    Range,
    /// Impossible IR state; indicates a bug in the compiler itself.
    Internal,
}

/// A compile failure: kind, message, and (usually) the source line the
/// live token cursor was on when the failure was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub line: Option<u32>,
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), line: None }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    pub fn range(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Range, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Annotates the error with a line number, the way the host wraps a
    /// protected compile call and stamps on the current line.
    #[must_use]
    pub fn with_line(mut self, line: u32) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}: {} (line {})", self.kind, self.message, line),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for CompileError {}
