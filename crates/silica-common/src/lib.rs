//! Common types and utilities for the silica compiler core.
//!
//! This crate provides foundational types used across all silica crates:
//! - Source spans and logical source locations (`Span`, `SourceLocation`)
//! - The diagnostic taxonomy (`Diagnostic`, `ErrorKind`, `ErrorReporter`)
//! - Compiler limits and thresholds

// Span / SourceLocation - physical byte ranges plus logical symbol paths
pub mod location;
pub use location::{LogicalPath, PathInterner, PathSegmentId, SourceLocation, Span};

// Diagnostics - error taxonomy and accumulation
pub mod diagnostics;
pub use diagnostics::{
    CompileError, CompileResult, Diagnostic, DiagnosticCategory, ErrorKind, ErrorReporter,
    RelatedInformation,
};

// Centralized limits and thresholds
pub mod limits;
