//! Lowered-value representation.

use silica_common::CompileError;
use silica_ir::ValueId;
use silica_term::TermId;

/// Storage class of a lowered value.
///
/// Divergent paths merge by the pointwise join on the lattice
/// `Functional < RvalueRef <= LvalueRef < Stack`; `Bottom` arms are
/// discarded before joining.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Storage {
    /// A register value.
    Functional,
    LvalueRef,
    RvalueRef,
    /// An addressable slot owned by the current scope.
    Stack,
    /// Does not normally return.
    Bottom,
}

/// Join of two non-bottom storage classes.
pub fn merge_storage(x: Storage, y: Storage) -> Storage {
    debug_assert!(x != Storage::Bottom && y != Storage::Bottom);
    match (x, y) {
        (Storage::Stack, _) | (_, Storage::Stack) => Storage::Stack,
        (Storage::Functional, Storage::Functional) => Storage::Functional,
        (Storage::Functional, _) | (_, Storage::Functional) => Storage::Stack,
        (Storage::LvalueRef, _) | (_, Storage::LvalueRef) => Storage::LvalueRef,
        (Storage::RvalueRef, Storage::RvalueRef) => Storage::RvalueRef,
        (Storage::Bottom, _) | (_, Storage::Bottom) => unreachable!("Bottom arms are discarded before joining"),
    }
}

/// A lowered IR1 term: its storage class, its IR value (absent for
/// bottom), and its IR1 type.
#[derive(Clone, Copy, Debug)]
pub struct Lowered {
    pub storage: Storage,
    pub value: Option<ValueId>,
    pub ty: TermId,
}

impl Lowered {
    pub fn bottom(ty: TermId) -> Self {
        Lowered {
            storage: Storage::Bottom,
            value: None,
            ty,
        }
    }

    pub fn new(storage: Storage, value: ValueId, ty: TermId) -> Self {
        Lowered {
            storage,
            value: Some(value),
            ty,
        }
    }

    #[inline]
    pub fn is_bottom(&self) -> bool {
        self.storage == Storage::Bottom
    }

    /// The IR value; callers must have excluded bottom.
    #[inline]
    pub fn id(&self) -> ValueId {
        self.value.expect("bottom value has no IR representation")
    }
}

/// Result of building a term at global scope.
///
/// `Deferred` is the private control-flow channel for values that cannot
/// be computed at link time; it triggers initialiser synthesis and never
/// escapes this crate.
#[derive(Debug)]
pub(crate) enum Defer {
    /// Not computable at link time; synthesise an initialiser.
    NotGlobal,
    Error(CompileError),
}

impl From<CompileError> for Defer {
    fn from(error: CompileError) -> Self {
        Defer::Error(error)
    }
}

pub(crate) type GlobalResult<T> = Result<T, Defer>;

#[cfg(test)]
#[path = "tests/storage.rs"]
mod tests;
