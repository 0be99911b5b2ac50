//! IR1 term model for the silica compiler core.
//!
//! This crate is organized into several submodules:
//! - `term` - the `TermKind` variant, arena and interning
//! - `context` - `CompileContext` owning all compilation state
//! - `builder` - term constructors with kind/arity validation
//! - `rewrite` - the generic structural walker
//! - `binding` - parameterize/specialize/anonymize/match
//! - `dispatch` - overload resolution for interfaces and metadata
//! - `generics` - two-phase recursive type construction
//! - `callbacks` - injected collaborator contracts

pub mod term;
pub use term::{
    FunctionParameter, GenericId, InterfaceBase, Linkage, ModuleId, OverloadPattern,
    ParameterMode, ResultMode, ScalarKind, StatementMode, TargetCallbackId, TermArena, TermData,
    TermFlags, TermId, TermInfo, TermKind, TermList, TermMode, TypeMode,
};

pub mod context;
pub use context::{
    Builtins, CompileContext, CoreOptions, DelayedBody, GenericData, GenericPrimitive, ModuleData,
};

pub mod builder;
pub use builder::{
    INTERFACE_COPYABLE_COPY, INTERFACE_COPYABLE_COPY_INIT, INTERFACE_COPYABLE_MOVABLE,
    INTERFACE_MOVABLE_CLEAR, INTERFACE_MOVABLE_FINI, INTERFACE_MOVABLE_INIT,
    INTERFACE_MOVABLE_MOVE, INTERFACE_MOVABLE_MOVE_INIT,
};

pub mod rewrite;

pub mod binding;
pub use binding::{anonymize, match_terms, parameterize, shift, specialize};

pub mod dispatch;
pub use dispatch::{
    metadata_lookup, metadata_lookup_in, overload_lookup, overload_match, OverloadLookup,
};

pub mod generics;
pub use generics::{generic_with_body, instance_unwrap};

pub mod callbacks;
pub use callbacks::{
    EvaluateContext, MacroEvaluator, MacroTarget, ParseTree, ParserCallback, PlatformLibrary,
    PlatformLoader, PropertyValue, TargetCallback,
};
