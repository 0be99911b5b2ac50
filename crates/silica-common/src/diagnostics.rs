//! Diagnostic taxonomy and error accumulation.
//!
//! Every error the core can report carries a stable `ErrorKind`, a primary
//! `SourceLocation` and optionally a list of related locations with
//! messages (overload candidate lists, dependency cycles). Local errors
//! accumulate in the `ErrorReporter`; fatal kinds short-circuit the current
//! compilation unit.

use crate::location::SourceLocation;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticCategory {
    Warning,
    Error,
    Message,
}

/// Stable error kinds reported by the core.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Parser callback failed. Fatal to the compilation unit.
    ParseError,
    /// A constructor or the lowerer rejected mismatched term kinds.
    TypeMismatch,
    /// A term fails a structural invariant.
    MalformedTerm,
    /// A parameter index escapes its binder.
    IndexOutOfRange,
    /// No overload candidate matched.
    OverloadNotFound,
    /// No unique most-specific overload candidate.
    OverloadAmbiguous,
    /// Initialiser dependency cycle among globals.
    CircularGlobal,
    /// A generic's body construction demanded its own resolved body.
    CircularGeneric,
    /// A move/copy is required where the type has disabled that interface.
    LifecycleForbidden,
    /// A bug in the core. Fatal.
    InternalInvariant,
}

impl ErrorKind {
    /// Fatal kinds abort the current unit instead of accumulating.
    #[inline]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, ErrorKind::ParseError | ErrorKind::InternalInvariant)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::ParseError => "parse error",
            ErrorKind::TypeMismatch => "type mismatch",
            ErrorKind::MalformedTerm => "malformed term",
            ErrorKind::IndexOutOfRange => "parameter index out of range",
            ErrorKind::OverloadNotFound => "overload not found",
            ErrorKind::OverloadAmbiguous => "ambiguous overload",
            ErrorKind::CircularGlobal => "circular global initialisation",
            ErrorKind::CircularGeneric => "circular generic type",
            ErrorKind::LifecycleForbidden => "lifecycle operation forbidden",
            ErrorKind::InternalInvariant => "internal invariant violated",
        };
        f.write_str(s)
    }
}

/// A secondary location attached to a diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedInformation {
    pub location: SourceLocation,
    pub message: String,
}

/// A structured diagnostic record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub kind: ErrorKind,
    pub location: SourceLocation,
    pub message: String,
    pub related_information: Vec<RelatedInformation>,
}

impl Diagnostic {
    pub fn error(kind: ErrorKind, location: SourceLocation, message: impl Into<String>) -> Self {
        Diagnostic {
            category: DiagnosticCategory::Error,
            kind,
            location,
            message: message.into(),
            related_information: Vec::new(),
        }
    }

    pub fn with_related(mut self, location: SourceLocation, message: impl Into<String>) -> Self {
        self.related_information.push(RelatedInformation {
            location,
            message: message.into(),
        });
        self
    }
}

/// An error value propagated out of a failed operation.
///
/// The diagnostic has usually also been pushed to the reporter; carrying it
/// in the error lets callers decorate it with further context.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub diagnostic: Diagnostic,
}

impl CompileError {
    pub fn new(kind: ErrorKind, location: SourceLocation, message: impl Into<String>) -> Self {
        CompileError {
            diagnostic: Diagnostic::error(kind, location, message),
        }
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.diagnostic.kind
    }

    pub fn with_related(mut self, location: SourceLocation, message: impl Into<String>) -> Self {
        self.diagnostic = self.diagnostic.with_related(location, message);
        self
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.diagnostic.kind, self.diagnostic.message)
    }
}

impl std::error::Error for CompileError {}

pub type CompileResult<T> = Result<T, CompileError>;

/// Accumulates diagnostics for a compilation unit.
#[derive(Debug, Default)]
pub struct ErrorReporter {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
}

impl ErrorReporter {
    pub fn new() -> Self {
        ErrorReporter::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        if diagnostic.category == DiagnosticCategory::Error {
            self.error_count += 1;
        }
        self.diagnostics.push(diagnostic);
    }

    /// Record the error's diagnostic and pass the error back for propagation.
    pub fn emit(&mut self, error: CompileError) -> CompileError {
        self.report(error.diagnostic.clone());
        error
    }

    #[inline]
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    #[inline]
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.error_count = 0;
        std::mem::take(&mut self.diagnostics)
    }
}

#[cfg(test)]
#[path = "tests/diagnostics.rs"]
mod tests;
