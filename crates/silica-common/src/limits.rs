//! Centralized limits and thresholds.
//!
//! Recursion through user-controlled structures is bounded so that a
//! degenerate input produces a diagnostic instead of a stack overflow.

/// Maximum nesting of parameter binders (`Exists`, function types, generic
/// patterns) the binding algebra will walk through.
pub const MAX_BINDER_DEPTH: u32 = 256;

/// Maximum depth of recursive generic-type instantiation during lowering.
pub const MAX_GENERIC_DEPTH: u32 = 128;

/// Maximum cleanup-stack depth inside a single lowered function.
pub const MAX_CLEANUP_DEPTH: usize = 4096;

/// Maximum number of related locations attached to a single diagnostic.
pub const MAX_RELATED_INFORMATION: usize = 32;
