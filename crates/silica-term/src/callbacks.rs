//! Collaborator contracts.
//!
//! The core never binds these to concrete implementations: the parser, the
//! macro system, the target description and the platform loader are all
//! injected by the driver. Only the shapes below are consumed.

use crate::term::TermId;
use silica_common::{CompileResult, SourceLocation};
use std::collections::BTreeMap;

/// A JSON-like property value used by target descriptions.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Null,
    Boolean(bool),
    Integer(i64),
    String(String),
    List(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    pub fn str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        match self {
            PropertyValue::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Follow a dotted path of map keys and return the string at its end.
    pub fn path_str(&self, path: &str) -> Option<&str> {
        let mut current = self;
        for key in path.split('.') {
            current = current.get(key)?;
        }
        current.str()
    }
}

/// The shape of a parse tree, as far as the core consumes it.
#[derive(Clone, Debug, PartialEq)]
pub enum ParseTree {
    /// An identifier, number or other single token.
    Token(String),
    /// A bracketed or statement-list grouping of sub-trees.
    Group(Vec<ParseTree>),
}

/// Parser callback: byte range in, parse trees out.
pub trait ParserCallback {
    fn parse(&self, source: &[u8], location: SourceLocation) -> CompileResult<Vec<ParseTree>>;
}

/// Name lookup plus overload extension, driven by the macro system.
pub trait EvaluateContext {
    /// Resolve an identifier to a term, if this scope binds it.
    fn lookup(&self, name: &str) -> Option<TermId>;

    /// Append overload values this scope supplies for the given site.
    fn overload_list(&self, site: TermId, out: &mut Vec<TermId>);
}

/// What a macro expansion is expected to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacroTarget {
    Term,
    Type,
    AggregateMember,
    Implementation,
}

/// Macro evaluator: the core routes macro values to it and never
/// interprets a macro itself.
pub trait MacroEvaluator {
    fn evaluate(
        &self,
        macro_value: TermId,
        arguments: &[ParseTree],
        evaluate_context: &dyn EvaluateContext,
        target: MacroTarget,
        location: SourceLocation,
    ) -> CompileResult<TermId>;
}

/// Target property evaluation over (build, host) target descriptions.
///
/// Used to fetch per-target integer widths, library symbol names
/// (`{"type": "c", "name": ...}` maps) and JIT configuration.
pub trait TargetCallback {
    fn evaluate(&self, build_target: &PropertyValue, host_target: &PropertyValue) -> PropertyValue;
}

/// A loaded shared library (JIT path only).
pub trait PlatformLibrary {
    fn symbol(&self, name: &str) -> Option<*mut ()>;
}

/// Loads shared libraries from property-value descriptions.
pub trait PlatformLoader {
    fn load(&self, description: &PropertyValue) -> CompileResult<Box<dyn PlatformLibrary>>;
}
