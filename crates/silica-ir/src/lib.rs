//! Typed SSA target IR for the silica compiler.
//!
//! The lowerer emits this IR; a pre-existing native code generator
//! consumes it through the `ModuleSink` contract. The model is
//! deliberately small: interned types (with recursive definitions for
//! lowered generics), constant values for global initialisers, and
//! basic-block function bodies with explicit stack allocation.

pub mod types;
pub use types::{IrScalar, IrType, IrTypeId, RecursiveId, TypeTable};

pub mod value;
pub use value::ConstValue;

pub mod body;
pub use body::{
    BlockId, BodyBuilder, FunctionBody, Instr, Terminator, ValueData, ValueId, ValueKind,
};

pub mod module;
pub use module::{IrLinkage, IrModule, IrSymbol, ModuleSink, SymbolDef, SymbolId};
