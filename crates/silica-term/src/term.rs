//! The IR1 term representation.
//!
//! Every IR1 node is a `TermKind` stored in a `TermArena` and addressed by
//! `TermId`. Pure ("functional") terms are hash-consed: constructing a
//! structurally equal pure term a second time returns the identical id.
//! Statements, blocks, jumps, globals and other effectful nodes are
//! identity-addressed; every construction allocates a fresh id.
//!
//! The per-class vtable dispatch of a classic OO tree is replaced by
//! `match` over `TermKind`. Hashing and equality of the interning key are
//! derived from the variant, so adding a field to a kind automatically
//! extends both.

use bitflags::bitflags;
use rustc_hash::FxHashMap;
use silica_common::SourceLocation;
use smallvec::SmallVec;

/// Id of a term in a `TermArena`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(pub u32);

/// Id of a generic type definition (side table on the compile context).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenericId(pub u32);

/// Id of a module (side table on the compile context).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

/// Id of an injected target callback (side table on the compile context).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TargetCallbackId(pub u32);

/// Storage mode of a term's value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TermMode {
    /// A plain value.
    Value,
    /// An l-value reference.
    LRef,
    /// An r-value reference.
    RRef,
    /// Does not normally return.
    Bottom,
}

/// Storage class of a term that denotes a type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeMode {
    /// Not a type.
    None,
    /// The type of types.
    Metatype,
    /// Register-representable with trivial lifecycle.
    Primitive,
    /// Non-trivial lifecycle; values need addressable storage.
    Complex,
}

/// Storage modes for function parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParameterMode {
    /// Input parameter, passed by address.
    Input,
    /// Output parameter, passed by address.
    Output,
    /// Input/output parameter, passed by address.
    Io,
    /// R-value reference.
    Rvalue,
    /// Functional value, passed in a register.
    Functional,
    /// Phantom value; erased before code generation.
    Phantom,
}

/// Storage modes for function results and jump parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResultMode {
    ByValue,
    Functional,
    Rvalue,
    Lvalue,
}

/// Storage modes for statements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatementMode {
    /// Store (possibly a copy of) the result value.
    Value,
    /// Freeze the result value into a register.
    Functional,
    /// Store the reference which is the result of this expression.
    Ref,
    /// Destroy the result immediately after computation.
    Destroy,
}

/// Linkage of a module global.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Linkage {
    Local,
    Private,
    OneDefinition,
    Public,
    None,
}

/// Scalar kinds of the number type family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    /// Pointer-sized signed integer.
    IPtr,
    /// Pointer-sized unsigned integer; also the size type.
    UPtr,
}

impl ScalarKind {
    pub const fn is_signed(&self) -> bool {
        matches!(
            self,
            ScalarKind::I8 | ScalarKind::I16 | ScalarKind::I32 | ScalarKind::I64 | ScalarKind::IPtr
        )
    }
}

bitflags! {
    /// Property flags carried by every term.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct TermFlags: u8 {
        /// Evaluation has no observable effect and yields a deterministic
        /// value; the term may be interned.
        const PURE = 1 << 0;
    }
}

/// The result type, mode and properties of a term.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TermInfo {
    /// The term's type. `None` only for the metatype sentinel.
    pub ty: Option<TermId>,
    pub mode: TermMode,
    pub flags: TermFlags,
    /// Storage class when this term denotes a type.
    pub type_mode: TypeMode,
}

impl TermInfo {
    #[inline]
    pub const fn is_pure(&self) -> bool {
        self.flags.contains(TermFlags::PURE)
    }

    /// Can this term be the type of another term? (The metatype counts.)
    #[inline]
    pub const fn is_type(&self) -> bool {
        !matches!(self.type_mode, TypeMode::None)
    }
}

/// One parameter of a function type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionParameter {
    pub mode: ParameterMode,
    pub ty: TermId,
}

/// A base interface of an interface, with the parameters to supply to it
/// and the element path locating it inside the derived interface value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InterfaceBase {
    pub interface: TermId,
    pub parameters: Vec<TermId>,
    pub path: Vec<u32>,
}

/// A pattern for overload matching: a parameterised term list with a count
/// of leading wildcard binders.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OverloadPattern {
    pub n_wildcards: u32,
    pub pattern: Vec<TermId>,
}

pub type TermList = SmallVec<[TermId; 4]>;

/// The universal IR1 node variant.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TermKind {
    // ----- Types -----
    /// The type of types.
    Metatype,
    /// The type with no values; `mode = Bottom` values have this type.
    BottomType,
    /// The unit type.
    EmptyType,
    BooleanType,
    NumberType(ScalarKind),
    /// The type of upward-reference chains.
    UprefType,
    /// Pointer to `target`, with an upward-reference chain locating the
    /// pointee inside an enclosing aggregate (`UprefNull` when free).
    PointerType { target: TermId, upref: TermId },
    ArrayType { element: TermId, length: TermId },
    StructType { members: TermList },
    UnionType { members: TermList },
    StringType { length: TermId },
    /// A function type. This is a binder: parameter types and the result
    /// type may reference earlier parameters as `Parameter(0, i)`.
    FunctionType {
        result_mode: ResultMode,
        result: TermId,
        parameters: Vec<FunctionParameter>,
        /// Number of leading phantom parameters.
        n_phantom: u32,
    },
    /// A value of type `value_type` known to lie at `upref` inside some
    /// enclosing aggregate.
    DerivedType { value_type: TermId, upref: TermId },
    /// The singleton type of one fixed functional value.
    ConstantType { value: TermId },
    /// Existential binder over `parameter_types`.
    Exists {
        result: TermId,
        parameter_types: TermList,
    },
    /// A de-Bruijn-indexed bound variable of type `ty`.
    Parameter { ty: TermId, depth: u32, index: u32 },
    /// Application of a recursive generic to type arguments.
    TypeInstance {
        generic: TermId,
        parameters: TermList,
    },
    /// A recursive type definition; its pattern and delayed body live in a
    /// side table keyed by `GenericId`, so the term interns per generic.
    GenericType { generic: GenericId },

    // ----- Placeholders -----
    /// An unbound placeholder (function parameter, pattern variable).
    /// Identity node: distinct anonymouses never compare equal.
    Anonymous,

    // ----- Constructor values -----
    EmptyValue,
    BooleanValue(bool),
    IntegerValue { scalar: ScalarKind, value: u64 },
    StringValue { value: String },
    /// The default-initialised value of a type.
    DefaultValue { ty: TermId },
    StructValue { ty: TermId, members: TermList },
    ArrayValue { ty: TermId, elements: Vec<TermId> },
    UnionValue {
        ty: TermId,
        index: u32,
        value: TermId,
    },
    /// Wraps a member value into a generic instance.
    InstanceValue { instance: TermId, member: TermId },
    /// One link of an upward-reference chain.
    Upref {
        outer_type: TermId,
        index: TermId,
        next: TermId,
    },
    /// Terminator of an upward-reference chain.
    UprefNull,
    /// Marks an l-value as movable-from (yields an r-value reference).
    MovableValue { value: TermId },
    /// A resolved reference to an interface witness.
    InterfaceValue {
        interface: TermId,
        parameters: TermList,
        implementation: Option<TermId>,
    },

    // ----- Address arithmetic -----
    /// Member `index` of an aggregate value.
    ElementValue { aggregate: TermId, index: TermId },
    /// Pointer to member `index` of a pointed-to aggregate.
    ElementPtr { pointer: TermId, index: TermId },
    /// Address of a referenced value.
    PointerTo { value: TermId },
    /// The value a pointer points to (an l-value reference).
    PointerTarget { pointer: TermId },
    /// Pointer to the enclosing aggregate of a derived pointer.
    OuterPtr { pointer: TermId },
    /// Pure reference to a block-local statement.
    StatementRef { statement: TermId },

    // ----- Control flow (identity nodes) -----
    Statement { value: TermId, mode: StatementMode },
    Block {
        statements: Vec<TermId>,
        result: TermId,
    },
    IfThenElse {
        condition: TermId,
        true_value: TermId,
        false_value: TermId,
    },
    /// A labelled multi-entry target. `argument` is an `Anonymous` bound to
    /// the jump argument inside `value`. Exit targets (function returns)
    /// have no value of their own.
    JumpTarget {
        value: Option<TermId>,
        argument: Option<TermId>,
        argument_mode: ResultMode,
    },
    JumpGroup {
        initial: TermId,
        entries: Vec<TermId>,
    },
    JumpTo {
        target: TermId,
        argument: Option<TermId>,
    },
    TryFinally {
        try_expr: TermId,
        finally_expr: TermId,
        /// Run the finally expression only on exception exits.
        except_only: bool,
    },
    /// Brings implementations into scope for the duration of `value`.
    IntroduceImplementation {
        implementations: Vec<TermId>,
        value: TermId,
    },
    /// Evaluates an effectful computation to a frozen functional value.
    FunctionalEvaluate { value: TermId },

    // ----- Effects -----
    /// Initialise the storage referenced by `target` with `assign_value`,
    /// then evaluate `inner` (`target` is finalised if `inner` throws).
    InitializeValue {
        target: TermId,
        assign_value: TermId,
        inner: TermId,
    },
    /// Finalise the storage referenced by `target`.
    FinalizeValue { target: TermId },
    /// Assign `assign_value` over the initialised storage at `target`.
    AssignValue { target: TermId, assign_value: TermId },
    FunctionCall { target: TermId, arguments: Vec<TermId> },

    // ----- Module-scope symbols (identity nodes) -----
    GlobalVariable {
        module: ModuleId,
        ty: TermId,
        value: TermId,
        linkage: Linkage,
        constant: bool,
        merge: bool,
        symbol_name: Option<String>,
    },
    Function {
        module: ModuleId,
        ty: TermId,
        linkage: Linkage,
        arguments: Vec<TermId>,
        /// Jump target representing function return; `None` for functions
        /// that return by falling off the body.
        return_target: Option<TermId>,
        body: TermId,
        symbol_name: Option<String>,
    },
    GlobalStatement {
        module: ModuleId,
        value: TermId,
        mode: StatementMode,
        linkage: Linkage,
    },
    /// A named symbol from an external library, resolved via the target
    /// callback in the side table.
    LibrarySymbol {
        library: TermId,
        callback: TargetCallbackId,
        ty: TermId,
    },
    /// An external library described by a target callback.
    Library { callback: TargetCallbackId },
    /// A functional value evaluated once at global scope.
    GlobalEvaluate { module: ModuleId, value: TermId },

    // ----- Static dispatch (identity nodes) -----
    Interface {
        n_implicit: u32,
        pattern: Vec<TermId>,
        derived_pattern: Vec<TermId>,
        /// Expected type of implementation values, parameterised over the
        /// interface pattern and derived pattern.
        value_type: TermId,
        bases: Vec<InterfaceBase>,
        values: Vec<TermId>,
    },
    Implementation {
        interface: TermId,
        overload_pattern: OverloadPattern,
        /// Values of the interface's derived parameters.
        dependent: Vec<TermId>,
        value: TermId,
        /// Dynamic implementations reference an in-scope value directly;
        /// static ones are templates instantiated per lookup.
        dynamic: bool,
        /// Element path from `value` to the interface value proper.
        path: Vec<u32>,
    },
    MetadataType {
        n_implicit: u32,
        pattern: Vec<TermId>,
        values: Vec<TermId>,
    },
    Metadata {
        metadata_type: TermId,
        overload_pattern: OverloadPattern,
        value: TermId,
    },
}

impl TermKind {
    /// Whether nodes of this kind are hash-consed. Identity kinds allocate
    /// a fresh id per construction even for equal inputs.
    pub fn is_interned(&self) -> bool {
        !matches!(
            self,
            TermKind::Anonymous
                | TermKind::Statement { .. }
                | TermKind::Block { .. }
                | TermKind::IfThenElse { .. }
                | TermKind::JumpTarget { .. }
                | TermKind::JumpGroup { .. }
                | TermKind::JumpTo { .. }
                | TermKind::TryFinally { .. }
                | TermKind::IntroduceImplementation { .. }
                | TermKind::FunctionalEvaluate { .. }
                | TermKind::InitializeValue { .. }
                | TermKind::FinalizeValue { .. }
                | TermKind::AssignValue { .. }
                | TermKind::FunctionCall { .. }
                | TermKind::GlobalVariable { .. }
                | TermKind::Function { .. }
                | TermKind::GlobalStatement { .. }
                | TermKind::LibrarySymbol { .. }
                | TermKind::Library { .. }
                | TermKind::GlobalEvaluate { .. }
                | TermKind::Interface { .. }
                | TermKind::Implementation { .. }
                | TermKind::MetadataType { .. }
                | TermKind::Metadata { .. }
        )
    }
}

/// A term together with its computed info and location.
#[derive(Clone, Debug)]
pub struct TermData {
    pub kind: TermKind,
    pub info: TermInfo,
    pub location: SourceLocation,
}

/// Arena of terms with hash-consing of pure kinds.
pub struct TermArena {
    terms: Vec<TermData>,
    interned: FxHashMap<TermKind, TermId>,
}

impl TermArena {
    pub fn new() -> Self {
        TermArena {
            terms: Vec::new(),
            interned: FxHashMap::default(),
        }
    }

    #[inline]
    pub fn get(&self, id: TermId) -> &TermData {
        &self.terms[id.0 as usize]
    }

    #[inline]
    pub fn kind(&self, id: TermId) -> &TermKind {
        &self.get(id).kind
    }

    #[inline]
    pub fn info(&self, id: TermId) -> TermInfo {
        self.get(id).info
    }

    #[inline]
    pub fn location(&self, id: TermId) -> SourceLocation {
        self.get(id).location
    }

    /// Mutable access to an identity node. Interned nodes are immutable.
    pub fn kind_mut(&mut self, id: TermId) -> &mut TermKind {
        let data = &mut self.terms[id.0 as usize];
        debug_assert!(!data.kind.is_interned(), "interned terms are immutable");
        &mut data.kind
    }

    /// Look up an interned kind without allocating.
    pub fn lookup(&self, kind: &TermKind) -> Option<TermId> {
        self.interned.get(kind).copied()
    }

    /// Intern or allocate a term. Interned kinds return the existing id for
    /// structurally equal inputs; identity kinds always allocate.
    pub fn insert(&mut self, kind: TermKind, info: TermInfo, location: SourceLocation) -> TermId {
        if kind.is_interned() {
            if let Some(&id) = self.interned.get(&kind) {
                return id;
            }
            let id = TermId(self.terms.len() as u32);
            self.interned.insert(kind.clone(), id);
            self.terms.push(TermData {
                kind,
                info,
                location,
            });
            id
        } else {
            let id = TermId(self.terms.len() as u32);
            self.terms.push(TermData {
                kind,
                info,
                location,
            });
            id
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl Default for TermArena {
    fn default() -> Self {
        TermArena::new()
    }
}
