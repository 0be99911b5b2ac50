//! Source location tracking.
//!
//! A `Span` is a physical byte range in some source text. A `SourceLocation`
//! pairs a span with a `LogicalPath`: the chain of named scopes (module,
//! type, function, ...) enclosing the construct. Logical paths drive symbol
//! naming, so they are interned in a `PathInterner` and referenced by id.
//!
//! Spans are small (8 bytes) and cheap to copy.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A span of source code, represented as a byte range.
///
/// Spans use half-open intervals: `[start, end)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset (inclusive)
    pub start: u32,
    /// End byte offset (exclusive)
    pub end: u32,
}

impl Span {
    /// Create a new span from start and end offsets.
    #[inline]
    pub const fn new(start: u32, end: u32) -> Self {
        Span { start, end }
    }

    /// Create a dummy/invalid span (used for synthetic nodes).
    #[inline]
    pub const fn dummy() -> Self {
        Span {
            start: u32::MAX,
            end: u32::MAX,
        }
    }

    /// Check if this is a dummy/invalid span.
    #[inline]
    pub const fn is_dummy(&self) -> bool {
        self.start == u32::MAX && self.end == u32::MAX
    }

    /// Merge two spans to create a span covering both.
    #[inline]
    pub const fn merge(&self, other: Span) -> Span {
        let start = if self.start < other.start {
            self.start
        } else {
            other.start
        };
        let end = if self.end > other.end {
            self.end
        } else {
            other.end
        };
        Span { start, end }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// =============================================================================
// LogicalPath - interned chains of named scopes
// =============================================================================

/// Id of an interned logical path node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathSegmentId(pub u32);

/// A logical source location: a node in the tree of named scopes.
///
/// `LogicalPath::ROOT` is the anonymous root of every path tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogicalPath(pub PathSegmentId);

impl LogicalPath {
    /// The root path, parent of all top-level names.
    pub const ROOT: LogicalPath = LogicalPath(PathSegmentId(0));

    #[inline]
    pub const fn is_root(&self) -> bool {
        self.0.0 == 0
    }
}

struct PathNode {
    parent: Option<LogicalPath>,
    name: String,
}

/// Interner for logical paths.
///
/// Paths are deduplicated per (parent, name) pair, so path ids are stable
/// and comparable for the lifetime of the interner.
pub struct PathInterner {
    nodes: Vec<PathNode>,
    children: FxHashMap<(LogicalPath, String), LogicalPath>,
}

impl PathInterner {
    pub fn new() -> Self {
        PathInterner {
            nodes: vec![PathNode {
                parent: None,
                name: String::new(),
            }],
            children: FxHashMap::default(),
        }
    }

    /// Get or create the child of `parent` named `name`.
    pub fn named_child(&mut self, parent: LogicalPath, name: &str) -> LogicalPath {
        if let Some(&id) = self.children.get(&(parent, name.to_string())) {
            return id;
        }
        let id = LogicalPath(PathSegmentId(self.nodes.len() as u32));
        self.nodes.push(PathNode {
            parent: Some(parent),
            name: name.to_string(),
        });
        self.children.insert((parent, name.to_string()), id);
        id
    }

    /// The name of the final segment of `path`. Empty for the root.
    pub fn name(&self, path: LogicalPath) -> &str {
        &self.nodes[path.0.0 as usize].name
    }

    /// The parent of `path`, or `None` for the root.
    pub fn parent(&self, path: LogicalPath) -> Option<LogicalPath> {
        self.nodes[path.0.0 as usize].parent
    }

    /// All segment names from the root down to `path`, in order.
    pub fn segments(&self, path: LogicalPath) -> Vec<&str> {
        let mut out = Vec::new();
        let mut cur = path;
        while let Some(parent) = self.parent(cur) {
            out.push(self.name(cur));
            cur = parent;
        }
        out.reverse();
        out
    }

    /// Render a path as `a.b.c` for diagnostics.
    pub fn display(&self, path: LogicalPath) -> String {
        let segments = self.segments(path);
        if segments.is_empty() {
            "(root)".to_string()
        } else {
            segments.join(".")
        }
    }
}

impl Default for PathInterner {
    fn default() -> Self {
        PathInterner::new()
    }
}

// =============================================================================
// SourceLocation
// =============================================================================

/// A full source location: physical span plus logical scope path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub span: Span,
    pub logical: LogicalPath,
}

impl SourceLocation {
    #[inline]
    pub const fn new(span: Span, logical: LogicalPath) -> Self {
        SourceLocation { span, logical }
    }

    /// A synthetic location with a dummy span at the path root.
    #[inline]
    pub const fn synthetic() -> Self {
        SourceLocation {
            span: Span::dummy(),
            logical: LogicalPath::ROOT,
        }
    }

    /// Same physical span, logical path descended into `name`.
    pub fn named_child(&self, paths: &mut PathInterner, name: &str) -> SourceLocation {
        SourceLocation {
            span: self.span,
            logical: paths.named_child(self.logical, name),
        }
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        SourceLocation::synthetic()
    }
}

#[cfg(test)]
#[path = "tests/location.rs"]
mod tests;
