//! Term construction.
//!
//! Constructors live directly on `CompileContext`. Pure-term constructors
//! intern: identical inputs yield the identical `TermId` for the lifetime
//! of the context. Effect-term constructors allocate a fresh identity node
//! per call. Every constructor computes the result info (type, mode,
//! purity, type storage class) from its operands and validates kind and
//! arity constraints: `TypeMismatch` for mismatched kinds, `MalformedTerm`
//! when a non-type appears where a type is required.

use crate::context::{Builtins, CompileContext, DelayedBody, GenericData, GenericPrimitive};
use crate::term::{
    FunctionParameter, GenericId, InterfaceBase, Linkage, ModuleId, OverloadPattern, ParameterMode,
    ResultMode, ScalarKind, StatementMode, TargetCallbackId, TermFlags, TermId, TermInfo, TermKind,
    TermList, TermMode, TypeMode,
};
use silica_common::{CompileResult, ErrorKind, SourceLocation};

/// Member indices of the builtin `Movable` interface value.
pub const INTERFACE_MOVABLE_INIT: u32 = 0;
pub const INTERFACE_MOVABLE_FINI: u32 = 1;
pub const INTERFACE_MOVABLE_CLEAR: u32 = 2;
pub const INTERFACE_MOVABLE_MOVE_INIT: u32 = 3;
pub const INTERFACE_MOVABLE_MOVE: u32 = 4;

/// Member indices of the builtin `Copyable` interface value.
pub const INTERFACE_COPYABLE_MOVABLE: u32 = 0;
pub const INTERFACE_COPYABLE_COPY_INIT: u32 = 1;
pub const INTERFACE_COPYABLE_COPY: u32 = 2;

impl CompileContext {
    /// Intern or allocate `kind`, computing its info from its operands.
    pub(crate) fn create(&mut self, kind: TermKind, location: SourceLocation) -> CompileResult<TermId> {
        if kind.is_interned() {
            if let Some(id) = self.arena.lookup(&kind) {
                return Ok(id);
            }
        }
        let info = self.infer_info(&kind, location)?;
        Ok(self.arena.insert(kind, info, location))
    }

    fn malformed(&mut self, location: SourceLocation, message: impl Into<String>) -> silica_common::CompileError {
        self.error(ErrorKind::MalformedTerm, location, message)
    }

    fn mismatch(&mut self, location: SourceLocation, message: impl Into<String>) -> silica_common::CompileError {
        self.error(ErrorKind::TypeMismatch, location, message)
    }

    /// Require that `id` denotes a type.
    fn require_type(&mut self, id: TermId, location: SourceLocation) -> CompileResult<()> {
        if !self.info(id).is_type() {
            return Err(self.malformed(location, "a type is required here"));
        }
        Ok(())
    }

    /// Require that `id` is a pure (functional) term.
    fn require_pure(&mut self, id: TermId, location: SourceLocation) -> CompileResult<()> {
        if !self.info(id).is_pure() {
            return Err(self.malformed(location, "a functional operand is required here"));
        }
        Ok(())
    }

    fn join_type_mode(a: TypeMode, b: TypeMode) -> TypeMode {
        match (a, b) {
            (TypeMode::Complex, _) | (_, TypeMode::Complex) => TypeMode::Complex,
            _ => TypeMode::Primitive,
        }
    }

    /// Aggregate storage class: complex iff any member is complex.
    fn members_type_mode(&self, members: &[TermId]) -> TypeMode {
        let mut mode = TypeMode::Primitive;
        for &m in members {
            mode = Self::join_type_mode(mode, self.info(m).type_mode);
        }
        mode
    }

    fn any_bottom(&self, ids: &[TermId]) -> bool {
        ids.iter().any(|&id| self.info(id).mode == TermMode::Bottom)
    }

    /// Compute the info record for a kind from its operands.
    ///
    /// Walking the variant here is what generates hashing and equality for
    /// interning too: a new child field extends all three automatically.
    fn infer_info(&mut self, kind: &TermKind, location: SourceLocation) -> CompileResult<TermInfo> {
        let b = self.builtins();
        let pure_value = |ty: TermId| TermInfo {
            ty: Some(ty),
            mode: TermMode::Value,
            flags: TermFlags::PURE,
            type_mode: TypeMode::None,
        };
        let type_info = |type_mode: TypeMode| TermInfo {
            ty: Some(b.metatype),
            mode: TermMode::Value,
            flags: TermFlags::PURE,
            type_mode,
        };
        let effect = |ty: TermId, mode: TermMode| TermInfo {
            ty: Some(ty),
            mode,
            flags: TermFlags::empty(),
            type_mode: TypeMode::None,
        };

        let info = match kind {
            TermKind::Metatype => TermInfo {
                ty: None,
                mode: TermMode::Value,
                flags: TermFlags::PURE,
                type_mode: TypeMode::Metatype,
            },
            TermKind::BottomType
            | TermKind::EmptyType
            | TermKind::BooleanType
            | TermKind::NumberType(_)
            | TermKind::UprefType
            | TermKind::StringType { .. } => type_info(TypeMode::Primitive),
            TermKind::PointerType { target, .. } => {
                self.require_type(*target, location)?;
                type_info(TypeMode::Primitive)
            }
            TermKind::ArrayType { element, .. } => {
                self.require_type(*element, location)?;
                type_info(self.info(*element).type_mode)
            }
            TermKind::StructType { members } | TermKind::UnionType { members } => {
                for &m in members.iter() {
                    self.require_type(m, location)?;
                }
                type_info(self.members_type_mode(members))
            }
            TermKind::FunctionType { .. } => type_info(TypeMode::Primitive),
            TermKind::DerivedType { value_type, .. } => {
                self.require_type(*value_type, location)?;
                type_info(self.info(*value_type).type_mode)
            }
            TermKind::ConstantType { .. } => type_info(TypeMode::Primitive),
            TermKind::Exists { result, .. } => {
                self.require_type(*result, location)?;
                type_info(self.info(*result).type_mode)
            }
            TermKind::Parameter { ty, .. } => {
                self.require_type(*ty, location)?;
                let type_mode = if self.info(*ty).type_mode == TypeMode::Metatype {
                    TypeMode::Complex
                } else {
                    TypeMode::None
                };
                TermInfo {
                    ty: Some(*ty),
                    mode: TermMode::Value,
                    flags: TermFlags::PURE,
                    type_mode,
                }
            }
            TermKind::TypeInstance { generic, .. } => {
                let TermKind::GenericType { generic: gid } = *self.kind(*generic) else {
                    return Err(self.mismatch(location, "type instance of a non-generic term"));
                };
                let mode = match self.generic(gid).primitive_mode {
                    GenericPrimitive::Always => TypeMode::Primitive,
                    GenericPrimitive::Never => TypeMode::Complex,
                    GenericPrimitive::Recurse => match self.generic_body_ready(gid) {
                        Some(body) if self.info(body).type_mode == TypeMode::Primitive => {
                            TypeMode::Primitive
                        }
                        _ => TypeMode::Complex,
                    },
                };
                type_info(mode)
            }
            TermKind::GenericType { .. } => TermInfo {
                ty: Some(b.metatype),
                mode: TermMode::Value,
                flags: TermFlags::PURE,
                type_mode: TypeMode::None,
            },
            TermKind::Anonymous => {
                unreachable!("anonymous terms are created through CompileContext::anonymous")
            }
            TermKind::EmptyValue => pure_value(b.empty_type),
            TermKind::BooleanValue(_) => pure_value(b.boolean_type),
            TermKind::IntegerValue { scalar, .. } => {
                let ty = self.create(TermKind::NumberType(*scalar), location)?;
                pure_value(ty)
            }
            TermKind::StringValue { value } => {
                let len = self.size_value(value.len() as u64 + 1, location)?;
                let ty = self.create(TermKind::StringType { length: len }, location)?;
                pure_value(ty)
            }
            TermKind::DefaultValue { ty } => {
                self.require_type(*ty, location)?;
                pure_value(*ty)
            }
            TermKind::StructValue { ty, .. }
            | TermKind::ArrayValue { ty, .. }
            | TermKind::UnionValue { ty, .. } => pure_value(*ty),
            TermKind::InstanceValue { instance, .. } => pure_value(*instance),
            TermKind::Upref { .. } | TermKind::UprefNull => pure_value(b.upref_type),
            TermKind::MovableValue { value } => {
                if self.info(*value).mode != TermMode::LRef {
                    return Err(self.mismatch(location, "only an l-value reference can be moved from"));
                }
                TermInfo {
                    ty: Some(self.type_of(*value)),
                    mode: TermMode::RRef,
                    flags: TermFlags::PURE,
                    type_mode: TypeMode::None,
                }
            }
            TermKind::InterfaceValue {
                interface,
                parameters,
                ..
            } => {
                let ty = self.interface_type_after(*interface, parameters, location)?;
                pure_value(ty)
            }
            TermKind::ElementValue { aggregate, index } => {
                let agg_info = self.info(*aggregate);
                let agg_ty = self.type_of(*aggregate);
                let element_ty = self.element_type(agg_ty, *index, location)?;
                let mode = if agg_info.mode == TermMode::Bottom {
                    TermMode::Bottom
                } else {
                    agg_info.mode
                };
                TermInfo {
                    ty: Some(element_ty),
                    mode,
                    flags: TermFlags::PURE,
                    type_mode: TypeMode::None,
                }
            }
            TermKind::ElementPtr { pointer, index } => {
                let ptr_ty = self.type_of(*pointer);
                let TermKind::PointerType { target, .. } = self.kind(ptr_ty).clone() else {
                    return Err(self.mismatch(location, "element pointer requires a pointer operand"));
                };
                let element_ty = self.element_type(target, *index, location)?;
                let next = self.upref(target, *index, self.builtins().upref_null, location)?;
                let ty = self.pointer_type_upref(element_ty, next, location)?;
                pure_value(ty)
            }
            TermKind::PointerTo { value } => {
                let mode = self.info(*value).mode;
                if !matches!(mode, TermMode::LRef | TermMode::RRef) {
                    return Err(self.mismatch(location, "cannot take the address of a non-reference"));
                }
                let ty = self.pointer_type(self.type_of(*value), location)?;
                pure_value(ty)
            }
            TermKind::PointerTarget { pointer } => {
                let ptr_ty = self.type_of(*pointer);
                let TermKind::PointerType { target, .. } = *self.kind(ptr_ty) else {
                    return Err(self.mismatch(location, "dereference of a non-pointer"));
                };
                TermInfo {
                    ty: Some(target),
                    mode: TermMode::LRef,
                    flags: TermFlags::PURE,
                    type_mode: TypeMode::None,
                }
            }
            TermKind::OuterPtr { pointer } => {
                let ptr_ty = self.type_of(*pointer);
                let TermKind::PointerType { target: _, upref } = *self.kind(ptr_ty) else {
                    return Err(self.mismatch(location, "outer pointer of a non-pointer"));
                };
                let TermKind::Upref {
                    outer_type, next, ..
                } = *self.kind(upref)
                else {
                    return Err(self.mismatch(
                        location,
                        "pointer has no upward reference to an enclosing aggregate",
                    ));
                };
                let ty = self.pointer_type_upref(outer_type, next, location)?;
                pure_value(ty)
            }
            TermKind::StatementRef { statement } => {
                let info = self.info(*statement);
                TermInfo {
                    ty: info.ty,
                    mode: info.mode,
                    flags: TermFlags::PURE,
                    // A frozen local that holds a type is itself usable as
                    // a type.
                    type_mode: info.type_mode,
                }
            }
            TermKind::Statement { value, mode } => {
                let value_info = self.info(*value);
                let value_ty = self.type_of(*value);
                let term_mode = if value_info.mode == TermMode::Bottom {
                    TermMode::Bottom
                } else {
                    match mode {
                        StatementMode::Value => TermMode::LRef,
                        StatementMode::Functional => TermMode::Value,
                        StatementMode::Ref => value_info.mode,
                        StatementMode::Destroy => TermMode::Value,
                    }
                };
                let ty = if *mode == StatementMode::Destroy {
                    b.empty_type
                } else {
                    value_ty
                };
                let type_mode = if *mode == StatementMode::Functional {
                    value_info.type_mode
                } else {
                    TypeMode::None
                };
                TermInfo {
                    ty: Some(ty),
                    mode: term_mode,
                    flags: TermFlags::empty(),
                    type_mode,
                }
            }
            TermKind::Block { statements, result } => {
                let result_info = self.info(*result);
                let result_ty = self.type_of(*result);
                let ty = crate::binding::anonymize(self, result_ty, statements, location)?;
                let mode = if result_info.mode == TermMode::Bottom || self.any_bottom(statements) {
                    TermMode::Bottom
                } else {
                    result_info.mode
                };
                effect(ty, mode)
            }
            TermKind::IfThenElse {
                condition,
                true_value,
                false_value,
            } => {
                if self.type_of(*condition) != b.boolean_type
                    && self.info(*condition).mode != TermMode::Bottom
                {
                    return Err(self.mismatch(location, "condition must have boolean type"));
                }
                let t = self.info(*true_value);
                let f = self.info(*false_value);
                let (ty, mode) = match (t.mode, f.mode) {
                    (TermMode::Bottom, TermMode::Bottom) => (b.bottom_type, TermMode::Bottom),
                    (TermMode::Bottom, _) => (self.type_of(*false_value), f.mode),
                    (_, TermMode::Bottom) => (self.type_of(*true_value), t.mode),
                    (tm, fm) => {
                        let t_ty = self.type_of(*true_value);
                        let f_ty = self.type_of(*false_value);
                        if t_ty != f_ty {
                            return Err(self.mismatch(location, "branch types do not agree"));
                        }
                        let mode = if tm == fm { tm } else { TermMode::Value };
                        (t_ty, mode)
                    }
                };
                effect(ty, mode)
            }
            TermKind::JumpTarget { .. } => effect(b.empty_type, TermMode::Value),
            TermKind::JumpGroup { initial, entries } => {
                let mut arms = vec![*initial];
                for &entry in entries.iter() {
                    if let TermKind::JumpTarget {
                        value: Some(value), ..
                    } = *self.kind(entry)
                    {
                        arms.push(value);
                    }
                }
                let mut ty = None;
                let mut mode = None;
                for arm in arms {
                    let info = self.info(arm);
                    if info.mode == TermMode::Bottom {
                        continue;
                    }
                    let arm_ty = self.type_of(arm);
                    match (ty, mode) {
                        (None, _) => {
                            ty = Some(arm_ty);
                            mode = Some(info.mode);
                        }
                        (Some(t), Some(m)) => {
                            if t != arm_ty {
                                return Err(self.mismatch(
                                    location,
                                    "jump group entry types do not agree",
                                ));
                            }
                            if m != info.mode {
                                mode = Some(TermMode::Value);
                            }
                        }
                        _ => unreachable!(),
                    }
                }
                match (ty, mode) {
                    (Some(ty), Some(mode)) => effect(ty, mode),
                    _ => effect(b.bottom_type, TermMode::Bottom),
                }
            }
            TermKind::JumpTo { .. } => effect(b.bottom_type, TermMode::Bottom),
            TermKind::TryFinally { try_expr, .. } => {
                let info = self.info(*try_expr);
                effect(self.type_of(*try_expr), info.mode)
            }
            TermKind::IntroduceImplementation { value, .. } => {
                let info = self.info(*value);
                effect(self.type_of(*value), info.mode)
            }
            TermKind::FunctionalEvaluate { value } => {
                let info = self.info(*value);
                let mode = if info.mode == TermMode::Bottom {
                    TermMode::Bottom
                } else {
                    TermMode::Value
                };
                TermInfo {
                    ty: Some(self.type_of(*value)),
                    mode,
                    flags: TermFlags::empty(),
                    type_mode: info.type_mode,
                }
            }
            TermKind::InitializeValue { target, inner, .. } => {
                let info = self.info(*inner);
                let mode = if self.info(*target).mode == TermMode::Bottom {
                    TermMode::Bottom
                } else {
                    info.mode
                };
                effect(self.type_of(*inner), mode)
            }
            TermKind::FinalizeValue { .. } | TermKind::AssignValue { .. } => {
                effect(b.empty_type, TermMode::Value)
            }
            TermKind::FunctionCall { target, arguments } => {
                let fn_ty = self.type_of(*target);
                let TermKind::FunctionType {
                    result_mode,
                    result,
                    parameters,
                    ..
                } = self.kind(fn_ty).clone()
                else {
                    return Err(self.mismatch(location, "call target is not a function"));
                };
                if arguments.len() != parameters.len() {
                    return Err(self.mismatch(
                        location,
                        format!(
                            "function expects {} arguments, {} given",
                            parameters.len(),
                            arguments.len()
                        ),
                    ));
                }
                let result_ty = crate::binding::specialize(self, result, arguments, location)?;
                let mode = if self.any_bottom(arguments)
                    || self.info(*target).mode == TermMode::Bottom
                    || result_ty == b.bottom_type
                {
                    TermMode::Bottom
                } else {
                    match result_mode {
                        ResultMode::ByValue | ResultMode::Functional => TermMode::Value,
                        ResultMode::Lvalue => TermMode::LRef,
                        ResultMode::Rvalue => TermMode::RRef,
                    }
                };
                effect(result_ty, mode)
            }
            TermKind::GlobalVariable { ty, .. } => TermInfo {
                ty: Some(*ty),
                mode: TermMode::LRef,
                flags: TermFlags::PURE,
                type_mode: TypeMode::None,
            },
            TermKind::Function { ty, .. } => TermInfo {
                ty: Some(*ty),
                mode: TermMode::LRef,
                flags: TermFlags::PURE,
                type_mode: TypeMode::None,
            },
            TermKind::GlobalStatement { value, mode, .. } => {
                let value_info = self.info(*value);
                let value_ty = self.type_of(*value);
                let term_mode = match mode {
                    StatementMode::Value => TermMode::LRef,
                    StatementMode::Functional => TermMode::Value,
                    StatementMode::Ref => value_info.mode,
                    StatementMode::Destroy => TermMode::Value,
                };
                let type_mode = if *mode == StatementMode::Functional {
                    value_info.type_mode
                } else {
                    TypeMode::None
                };
                TermInfo {
                    ty: Some(value_ty),
                    mode: term_mode,
                    flags: TermFlags::PURE,
                    type_mode,
                }
            }
            TermKind::LibrarySymbol { ty, .. } => TermInfo {
                ty: Some(*ty),
                mode: TermMode::LRef,
                flags: TermFlags::PURE,
                type_mode: TypeMode::None,
            },
            TermKind::Library { .. } => TermInfo {
                ty: Some(b.empty_type),
                mode: TermMode::Value,
                flags: TermFlags::PURE,
                type_mode: TypeMode::None,
            },
            TermKind::GlobalEvaluate { value, .. } => TermInfo {
                ty: Some(self.type_of(*value)),
                mode: TermMode::Value,
                flags: TermFlags::PURE,
                type_mode: self.info(*value).type_mode,
            },
            TermKind::Interface { .. }
            | TermKind::Implementation { .. }
            | TermKind::MetadataType { .. }
            | TermKind::Metadata { .. } => effect(b.empty_type, TermMode::Value),
        };
        Ok(info)
    }

    // =========================================================================
    // Types
    // =========================================================================

    pub fn metatype(&self) -> TermId {
        self.builtins().metatype
    }

    pub fn bottom_type(&self) -> TermId {
        self.builtins().bottom_type
    }

    pub fn empty_type(&self) -> TermId {
        self.builtins().empty_type
    }

    pub fn boolean_type(&self) -> TermId {
        self.builtins().boolean_type
    }

    pub fn size_type(&self) -> TermId {
        self.builtins().size_type
    }

    pub fn number_type(&mut self, scalar: ScalarKind, location: SourceLocation) -> CompileResult<TermId> {
        self.create(TermKind::NumberType(scalar), location)
    }

    /// Pointer with no upward reference.
    pub fn pointer_type(&mut self, target: TermId, location: SourceLocation) -> CompileResult<TermId> {
        let upref = self.builtins().upref_null;
        self.pointer_type_upref(target, upref, location)
    }

    /// Pointer whose pointee is known to lie inside an enclosing aggregate.
    pub fn pointer_type_upref(
        &mut self,
        target: TermId,
        upref: TermId,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        self.require_type(target, location)?;
        self.create(TermKind::PointerType { target, upref }, location)
    }

    pub fn array_type(
        &mut self,
        element: TermId,
        length: TermId,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        self.require_pure(length, location)?;
        self.create(TermKind::ArrayType { element, length }, location)
    }

    pub fn array_type_sized(
        &mut self,
        element: TermId,
        length: u64,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        let length = self.size_value(length, location)?;
        self.array_type(element, length, location)
    }

    pub fn struct_type(
        &mut self,
        members: impl IntoIterator<Item = TermId>,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        let members: TermList = members.into_iter().collect();
        self.create(TermKind::StructType { members }, location)
    }

    pub fn union_type(
        &mut self,
        members: impl IntoIterator<Item = TermId>,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        let members: TermList = members.into_iter().collect();
        self.create(TermKind::UnionType { members }, location)
    }

    pub fn string_type(&mut self, length: TermId, location: SourceLocation) -> CompileResult<TermId> {
        self.require_pure(length, location)?;
        self.create(TermKind::StringType { length }, location)
    }

    /// A function type. Parameter types and the result type are already
    /// parameterised: they reference earlier parameters as
    /// `Parameter(0, i)`. Phantom parameters must precede all others.
    pub fn function_type(
        &mut self,
        result_mode: ResultMode,
        result: TermId,
        parameters: Vec<FunctionParameter>,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        let mut n_phantom = 0u32;
        let mut seen_regular = false;
        for parameter in &parameters {
            if parameter.mode == ParameterMode::Phantom {
                if seen_regular {
                    return Err(self.mismatch(
                        location,
                        "phantom parameters must precede non-phantom parameters",
                    ));
                }
                n_phantom += 1;
            } else {
                seen_regular = true;
            }
        }
        self.require_type(result, location)?;
        self.create(
            TermKind::FunctionType {
                result_mode,
                result,
                parameters,
                n_phantom,
            },
            location,
        )
    }

    pub fn derived_type(
        &mut self,
        value_type: TermId,
        upref: TermId,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        self.create(TermKind::DerivedType { value_type, upref }, location)
    }

    pub fn constant_type(&mut self, value: TermId, location: SourceLocation) -> CompileResult<TermId> {
        self.require_pure(value, location)?;
        self.create(TermKind::ConstantType { value }, location)
    }

    pub fn exists(
        &mut self,
        result: TermId,
        parameter_types: impl IntoIterator<Item = TermId>,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        let parameter_types: TermList = parameter_types.into_iter().collect();
        for &ty in &parameter_types {
            self.require_type(ty, location)?;
        }
        self.create(
            TermKind::Exists {
                result,
                parameter_types,
            },
            location,
        )
    }

    /// A de-Bruijn-indexed bound variable of the given type.
    pub fn parameter(
        &mut self,
        ty: TermId,
        depth: u32,
        index: u32,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        self.create(TermKind::Parameter { ty, depth, index }, location)
    }

    /// Apply a generic to type arguments.
    pub fn instance(
        &mut self,
        generic: TermId,
        parameters: impl IntoIterator<Item = TermId>,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        let parameters: TermList = parameters.into_iter().collect();
        let TermKind::GenericType { generic: gid } = *self.kind(generic) else {
            return Err(self.mismatch(location, "type instance of a non-generic term"));
        };
        if parameters.len() != self.generic(gid).pattern.len() {
            return Err(self.mismatch(
                location,
                format!(
                    "generic expects {} parameters, {} given",
                    self.generic(gid).pattern.len(),
                    parameters.len()
                ),
            ));
        }
        self.create(
            TermKind::TypeInstance {
                generic,
                parameters,
            },
            location,
        )
    }

    /// Create a generic type in two phases: the parameter pattern now, the
    /// body later via `callback` (invoked at most once and memoised).
    pub fn create_generic(
        &mut self,
        pattern: Vec<TermId>,
        primitive_mode: GenericPrimitive,
        location: SourceLocation,
        callback: impl FnOnce(&mut CompileContext, GenericId) -> CompileResult<TermId> + 'static,
    ) -> CompileResult<TermId> {
        let gid = self.register_generic(GenericData {
            pattern,
            primitive_mode,
            body: DelayedBody::Pending(Box::new(callback)),
            overloads: Vec::new(),
            location,
        });
        self.create(TermKind::GenericType { generic: gid }, location)
    }

    /// The term for an already-registered generic.
    pub fn generic_term(&mut self, generic: GenericId, location: SourceLocation) -> CompileResult<TermId> {
        self.create(TermKind::GenericType { generic }, location)
    }

    /// The member type of an aggregate type at a constant index.
    pub fn element_type(
        &mut self,
        aggregate_type: TermId,
        index: TermId,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        match self.kind(aggregate_type).clone() {
            TermKind::StructType { members } | TermKind::UnionType { members } => {
                let i = self.size_from(index, location)? as usize;
                members.get(i).copied().ok_or_else(|| {
                    self.mismatch(location, format!("member index {i} out of range"))
                })
            }
            TermKind::ArrayType { element, .. } => Ok(element),
            TermKind::StringType { .. } => self.number_type(ScalarKind::U8, location),
            TermKind::TypeInstance {
                generic,
                parameters,
            } => {
                let TermKind::GenericType { generic: gid } = *self.kind(generic) else {
                    return Err(self.mismatch(location, "type instance of a non-generic term"));
                };
                let body = self.generic_body(gid)?;
                let unwrapped = crate::binding::specialize(self, body, &parameters, location)?;
                self.element_type(unwrapped, index, location)
            }
            TermKind::DerivedType { value_type, .. } => {
                self.element_type(value_type, index, location)
            }
            _ => Err(self.mismatch(location, "element access on a non-aggregate type")),
        }
    }

    // =========================================================================
    // Constants and constructor values
    // =========================================================================

    pub fn empty_value(&self) -> TermId {
        self.builtins().empty_value
    }

    pub fn upref_null(&self) -> TermId {
        self.builtins().upref_null
    }

    pub fn boolean_value(&mut self, value: bool, location: SourceLocation) -> CompileResult<TermId> {
        self.create(TermKind::BooleanValue(value), location)
    }

    pub fn integer_value(
        &mut self,
        scalar: ScalarKind,
        value: u64,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        self.create(TermKind::IntegerValue { scalar, value }, location)
    }

    /// A value of the size type.
    pub fn size_value(&mut self, value: u64, location: SourceLocation) -> CompileResult<TermId> {
        self.integer_value(ScalarKind::UPtr, value, location)
    }

    /// Extract a constant size. The operand must be a size-typed constant.
    pub fn size_from(&mut self, value: TermId, location: SourceLocation) -> CompileResult<u64> {
        match *self.kind(value) {
            TermKind::IntegerValue {
                scalar: ScalarKind::UPtr,
                value,
            } => Ok(value),
            _ => Err(self.mismatch(location, "a constant size is required here")),
        }
    }

    pub fn size_equals(&self, value: TermId, n: u64) -> bool {
        matches!(
            *self.kind(value),
            TermKind::IntegerValue { scalar: ScalarKind::UPtr, value: v } if v == n
        )
    }

    pub fn string_value(&mut self, value: impl Into<String>, location: SourceLocation) -> CompileResult<TermId> {
        self.create(
            TermKind::StringValue {
                value: value.into(),
            },
            location,
        )
    }

    pub fn default_value(&mut self, ty: TermId, location: SourceLocation) -> CompileResult<TermId> {
        self.create(TermKind::DefaultValue { ty }, location)
    }

    pub fn struct_value(
        &mut self,
        ty: TermId,
        members: impl IntoIterator<Item = TermId>,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        let members: TermList = members.into_iter().collect();
        let TermKind::StructType {
            members: member_types,
        } = self.kind(ty).clone()
        else {
            return Err(self.mismatch(location, "struct value requires a struct type"));
        };
        if members.len() != member_types.len() {
            return Err(self.mismatch(
                location,
                format!(
                    "struct has {} members, {} values given",
                    member_types.len(),
                    members.len()
                ),
            ));
        }
        for &m in &members {
            self.require_pure(m, location)?;
        }
        self.create(TermKind::StructValue { ty, members }, location)
    }

    pub fn array_value(
        &mut self,
        ty: TermId,
        elements: Vec<TermId>,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        let TermKind::ArrayType { length, .. } = *self.kind(ty) else {
            return Err(self.mismatch(location, "array value requires an array type"));
        };
        if !self.size_equals(length, elements.len() as u64) {
            return Err(self.mismatch(location, "array value length does not match its type"));
        }
        self.create(TermKind::ArrayValue { ty, elements }, location)
    }

    pub fn union_value(
        &mut self,
        ty: TermId,
        index: u32,
        value: TermId,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        let TermKind::UnionType { members } = self.kind(ty).clone() else {
            return Err(self.mismatch(location, "union value requires a union type"));
        };
        if index as usize >= members.len() {
            return Err(self.mismatch(location, format!("union member index {index} out of range")));
        }
        self.create(TermKind::UnionValue { ty, index, value }, location)
    }

    pub fn instance_value(
        &mut self,
        instance: TermId,
        member: TermId,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        if !matches!(self.kind(instance), TermKind::TypeInstance { .. }) {
            return Err(self.mismatch(location, "instance value requires a generic instance type"));
        }
        self.create(TermKind::InstanceValue { instance, member }, location)
    }

    pub fn upref(
        &mut self,
        outer_type: TermId,
        index: TermId,
        next: TermId,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        self.create(
            TermKind::Upref {
                outer_type,
                index,
                next,
            },
            location,
        )
    }

    pub fn upref_indexed(
        &mut self,
        outer_type: TermId,
        index: u64,
        next: TermId,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        let index = self.size_value(index, location)?;
        self.upref(outer_type, index, next, location)
    }

    pub fn movable(&mut self, value: TermId, location: SourceLocation) -> CompileResult<TermId> {
        self.create(TermKind::MovableValue { value }, location)
    }

    pub fn interface_value(
        &mut self,
        interface: TermId,
        parameters: impl IntoIterator<Item = TermId>,
        implementation: Option<TermId>,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        let parameters: TermList = parameters.into_iter().collect();
        self.create(
            TermKind::InterfaceValue {
                interface,
                parameters,
                implementation,
            },
            location,
        )
    }

    // =========================================================================
    // Aggregate access
    // =========================================================================

    pub fn element_value(
        &mut self,
        aggregate: TermId,
        index: TermId,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        self.create(TermKind::ElementValue { aggregate, index }, location)
    }

    pub fn element_value_indexed(
        &mut self,
        aggregate: TermId,
        index: u64,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        let index = self.size_value(index, location)?;
        self.element_value(aggregate, index, location)
    }

    pub fn element_ptr(
        &mut self,
        pointer: TermId,
        index: TermId,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        self.create(TermKind::ElementPtr { pointer, index }, location)
    }

    pub fn ptr_to(&mut self, value: TermId, location: SourceLocation) -> CompileResult<TermId> {
        self.create(TermKind::PointerTo { value }, location)
    }

    pub fn ptr_target(&mut self, pointer: TermId, location: SourceLocation) -> CompileResult<TermId> {
        self.create(TermKind::PointerTarget { pointer }, location)
    }

    pub fn outer_ptr(&mut self, pointer: TermId, location: SourceLocation) -> CompileResult<TermId> {
        self.create(TermKind::OuterPtr { pointer }, location)
    }

    pub fn statement_ref(&mut self, statement: TermId, location: SourceLocation) -> CompileResult<TermId> {
        if !matches!(
            self.kind(statement),
            TermKind::Statement { .. } | TermKind::GlobalStatement { .. }
        ) {
            return Err(self.mismatch(location, "statement reference to a non-statement"));
        }
        self.create(TermKind::StatementRef { statement }, location)
    }

    // =========================================================================
    // Placeholders
    // =========================================================================

    /// A fresh unbound placeholder. Each call allocates a distinct node.
    pub fn anonymous(
        &mut self,
        ty: TermId,
        mode: TermMode,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        self.require_type(ty, location)?;
        let type_mode = if self.info(ty).type_mode == TypeMode::Metatype {
            TypeMode::Complex
        } else {
            TypeMode::None
        };
        let info = TermInfo {
            ty: Some(ty),
            mode,
            flags: TermFlags::PURE,
            type_mode,
        };
        Ok(self.arena.insert(TermKind::Anonymous, info, location))
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    pub fn statement(
        &mut self,
        value: TermId,
        mode: StatementMode,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        self.create(TermKind::Statement { value, mode }, location)
    }

    pub fn block(
        &mut self,
        statements: Vec<TermId>,
        result: TermId,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        for &s in &statements {
            if !matches!(self.kind(s), TermKind::Statement { .. }) {
                return Err(self.mismatch(location, "block entries must be statements"));
            }
        }
        self.create(TermKind::Block { statements, result }, location)
    }

    pub fn if_then_else(
        &mut self,
        condition: TermId,
        true_value: TermId,
        false_value: TermId,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        self.create(
            TermKind::IfThenElse {
                condition,
                true_value,
                false_value,
            },
            location,
        )
    }

    pub fn jump_target(
        &mut self,
        value: TermId,
        argument_mode: ResultMode,
        argument: Option<TermId>,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        if let Some(argument) = argument {
            if !matches!(self.kind(argument), TermKind::Anonymous) {
                return Err(self.mismatch(location, "jump target argument must be anonymous"));
            }
        }
        self.create(
            TermKind::JumpTarget {
                value: Some(value),
                argument,
                argument_mode,
            },
            location,
        )
    }

    /// A target with no body, used for function returns.
    pub fn exit_target(
        &mut self,
        ty: TermId,
        argument_mode: ResultMode,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        let argument = self.anonymous(ty, TermMode::Value, location)?;
        self.create(
            TermKind::JumpTarget {
                value: None,
                argument: Some(argument),
                argument_mode,
            },
            location,
        )
    }

    pub fn jump_to(
        &mut self,
        target: TermId,
        argument: Option<TermId>,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        if !matches!(self.kind(target), TermKind::JumpTarget { .. }) {
            return Err(self.mismatch(location, "jump to a non-target"));
        }
        self.create(TermKind::JumpTo { target, argument }, location)
    }

    pub fn jump_group(
        &mut self,
        initial: TermId,
        entries: Vec<TermId>,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        for &e in &entries {
            if !matches!(self.kind(e), TermKind::JumpTarget { .. }) {
                return Err(self.mismatch(location, "jump group entries must be jump targets"));
            }
        }
        self.create(TermKind::JumpGroup { initial, entries }, location)
    }

    pub fn try_finally(
        &mut self,
        try_expr: TermId,
        finally_expr: TermId,
        except_only: bool,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        self.create(
            TermKind::TryFinally {
                try_expr,
                finally_expr,
                except_only,
            },
            location,
        )
    }

    pub fn introduce_implementation(
        &mut self,
        implementations: Vec<TermId>,
        value: TermId,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        for &i in &implementations {
            if !matches!(self.kind(i), TermKind::Implementation { .. }) {
                return Err(self.mismatch(location, "expected an implementation"));
            }
        }
        self.create(
            TermKind::IntroduceImplementation {
                implementations,
                value,
            },
            location,
        )
    }

    pub fn functional_eval(&mut self, value: TermId, location: SourceLocation) -> CompileResult<TermId> {
        self.create(TermKind::FunctionalEvaluate { value }, location)
    }

    /// Wrap in `FunctionalEvaluate` unless the value is already pure.
    pub fn to_functional(&mut self, value: TermId, location: SourceLocation) -> CompileResult<TermId> {
        if self.info(value).is_pure() {
            Ok(value)
        } else {
            self.functional_eval(value, location)
        }
    }

    // =========================================================================
    // Effects
    // =========================================================================

    pub fn initialize_value(
        &mut self,
        target: TermId,
        assign_value: TermId,
        inner: TermId,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        self.create(
            TermKind::InitializeValue {
                target,
                assign_value,
                inner,
            },
            location,
        )
    }

    pub fn finalize_value(&mut self, target: TermId, location: SourceLocation) -> CompileResult<TermId> {
        self.create(TermKind::FinalizeValue { target }, location)
    }

    pub fn assign_value(
        &mut self,
        target: TermId,
        assign_value: TermId,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        self.create(
            TermKind::AssignValue {
                target,
                assign_value,
            },
            location,
        )
    }

    pub fn function_call(
        &mut self,
        target: TermId,
        arguments: Vec<TermId>,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        self.create(TermKind::FunctionCall { target, arguments }, location)
    }

    // =========================================================================
    // Globals
    // =========================================================================

    pub fn global_variable(
        &mut self,
        module: ModuleId,
        ty: TermId,
        value: TermId,
        linkage: Linkage,
        constant: bool,
        merge: bool,
        symbol_name: Option<String>,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        self.require_type(ty, location)?;
        let id = self.create(
            TermKind::GlobalVariable {
                module,
                ty,
                value,
                linkage,
                constant,
                merge,
                symbol_name,
            },
            location,
        )?;
        self.add_module_global(module, id);
        Ok(id)
    }

    pub fn function(
        &mut self,
        module: ModuleId,
        ty: TermId,
        linkage: Linkage,
        arguments: Vec<TermId>,
        return_target: Option<TermId>,
        body: TermId,
        symbol_name: Option<String>,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        let TermKind::FunctionType { parameters, .. } = self.kind(ty).clone() else {
            return Err(self.mismatch(location, "function requires a function type"));
        };
        if arguments.len() != parameters.len() {
            return Err(self.mismatch(location, "function argument count does not match its type"));
        }
        for &a in &arguments {
            if !matches!(self.kind(a), TermKind::Anonymous) {
                return Err(self.mismatch(location, "function arguments must be anonymous terms"));
            }
        }
        let id = self.create(
            TermKind::Function {
                module,
                ty,
                linkage,
                arguments,
                return_target,
                body,
                symbol_name,
            },
            location,
        )?;
        self.add_module_global(module, id);
        Ok(id)
    }

    pub fn global_statement(
        &mut self,
        module: ModuleId,
        value: TermId,
        mode: StatementMode,
        linkage: Linkage,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        let id = self.create(
            TermKind::GlobalStatement {
                module,
                value,
                mode,
                linkage,
            },
            location,
        )?;
        self.add_module_global(module, id);
        Ok(id)
    }

    pub fn library(&mut self, callback: TargetCallbackId, location: SourceLocation) -> CompileResult<TermId> {
        self.create(TermKind::Library { callback }, location)
    }

    pub fn library_symbol(
        &mut self,
        library: TermId,
        callback: TargetCallbackId,
        ty: TermId,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        if !matches!(self.kind(library), TermKind::Library { .. }) {
            return Err(self.mismatch(location, "library symbol requires a library"));
        }
        self.require_type(ty, location)?;
        self.create(
            TermKind::LibrarySymbol {
                library,
                callback,
                ty,
            },
            location,
        )
    }

    pub fn global_evaluate(
        &mut self,
        module: ModuleId,
        value: TermId,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        let id = self.create(TermKind::GlobalEvaluate { module, value }, location)?;
        self.add_module_global(module, id);
        Ok(id)
    }

    // =========================================================================
    // Static dispatch trees
    // =========================================================================

    pub fn interface_new(
        &mut self,
        n_implicit: u32,
        pattern: Vec<TermId>,
        derived_pattern: Vec<TermId>,
        value_type: TermId,
        bases: Vec<InterfaceBase>,
        values: Vec<TermId>,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        self.require_type(value_type, location)?;
        self.create(
            TermKind::Interface {
                n_implicit,
                pattern,
                derived_pattern,
                value_type,
                bases,
                values,
            },
            location,
        )
    }

    pub fn implementation_new(
        &mut self,
        interface: TermId,
        n_wildcards: u32,
        pattern: Vec<TermId>,
        dependent: Vec<TermId>,
        value: TermId,
        dynamic: bool,
        path: Vec<u32>,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        if !matches!(self.kind(interface), TermKind::Interface { .. }) {
            return Err(self.mismatch(location, "implementation of a non-interface"));
        }
        if dynamic && !path.is_empty() {
            return Err(self.malformed(location, "dynamic implementations cannot carry a path"));
        }
        self.create(
            TermKind::Implementation {
                interface,
                overload_pattern: OverloadPattern {
                    n_wildcards,
                    pattern,
                },
                dependent,
                value,
                dynamic,
                path,
            },
            location,
        )
    }

    pub fn metadata_type_new(
        &mut self,
        n_implicit: u32,
        pattern: Vec<TermId>,
        values: Vec<TermId>,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        self.create(
            TermKind::MetadataType {
                n_implicit,
                pattern,
                values,
            },
            location,
        )
    }

    pub fn metadata_new(
        &mut self,
        metadata_type: TermId,
        n_wildcards: u32,
        pattern: Vec<TermId>,
        value: TermId,
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        if !matches!(self.kind(metadata_type), TermKind::MetadataType { .. }) {
            return Err(self.mismatch(location, "metadata of a non-metadata type"));
        }
        self.create(
            TermKind::Metadata {
                metadata_type,
                overload_pattern: OverloadPattern {
                    n_wildcards,
                    pattern,
                },
                value,
            },
            location,
        )
    }

    /// Attach an overload value to its overload site after construction.
    pub fn attach_overload(&mut self, site: TermId, value: TermId, location: SourceLocation) -> CompileResult<()> {
        match self.arena.kind_mut(site) {
            TermKind::Interface { values, .. } | TermKind::MetadataType { values, .. } => {
                values.push(value);
                Ok(())
            }
            _ => Err(self.mismatch(location, "overload values attach to interfaces or metadata types")),
        }
    }

    /// The value type of an interface for a given parameter list.
    pub fn interface_type_after(
        &mut self,
        interface: TermId,
        parameters: &[TermId],
        location: SourceLocation,
    ) -> CompileResult<TermId> {
        let TermKind::Interface {
            pattern,
            derived_pattern,
            value_type,
            ..
        } = self.kind(interface).clone()
        else {
            return Err(self.mismatch(location, "not an interface"));
        };
        if parameters.len() != pattern.len() + derived_pattern.len() {
            return Err(self.mismatch(location, "incorrect number of parameters to interface"));
        }
        crate::binding::specialize(self, value_type, parameters, location)
    }
}

// =============================================================================
// Builtin construction
// =============================================================================

/// Create the per-context builtin terms. Runs once from
/// `CompileContext::new`; the construction itself cannot fail.
pub(crate) fn make_builtins(ctx: &mut CompileContext) -> Builtins {
    let location = SourceLocation::synthetic();

    let pure_type = |ty: Option<TermId>, type_mode: TypeMode| TermInfo {
        ty,
        mode: TermMode::Value,
        flags: TermFlags::PURE,
        type_mode,
    };

    let metatype = ctx
        .arena
        .insert(TermKind::Metatype, pure_type(None, TypeMode::Metatype), location);
    let bottom_type = ctx.arena.insert(
        TermKind::BottomType,
        pure_type(Some(metatype), TypeMode::Primitive),
        location,
    );
    let empty_type = ctx.arena.insert(
        TermKind::EmptyType,
        pure_type(Some(metatype), TypeMode::Primitive),
        location,
    );
    let boolean_type = ctx.arena.insert(
        TermKind::BooleanType,
        pure_type(Some(metatype), TypeMode::Primitive),
        location,
    );
    let upref_type = ctx.arena.insert(
        TermKind::UprefType,
        pure_type(Some(metatype), TypeMode::Primitive),
        location,
    );
    let size_type = ctx.arena.insert(
        TermKind::NumberType(ScalarKind::UPtr),
        pure_type(Some(metatype), TypeMode::Primitive),
        location,
    );
    let empty_value = ctx.arena.insert(
        TermKind::EmptyValue,
        TermInfo {
            ty: Some(empty_type),
            mode: TermMode::Value,
            flags: TermFlags::PURE,
            type_mode: TypeMode::None,
        },
        location,
    );
    let upref_null = ctx.arena.insert(
        TermKind::UprefNull,
        TermInfo {
            ty: Some(upref_type),
            mode: TermMode::Value,
            flags: TermFlags::PURE,
            type_mode: TypeMode::None,
        },
        location,
    );

    ctx.set_builtins(Builtins {
        metatype,
        bottom_type,
        empty_type,
        empty_value,
        boolean_type,
        upref_type,
        upref_null,
        size_type,
        // Placeholders until the lifecycle interfaces exist.
        movable_interface: metatype,
        copyable_interface: metatype,
    });

    let movable_interface =
        make_lifecycle_interface(ctx, true).expect("builtin Movable interface construction");
    ctx.update_builtins(|b| b.movable_interface = movable_interface);
    let copyable_interface =
        make_lifecycle_interface(ctx, false).expect("builtin Copyable interface construction");
    ctx.update_builtins(|b| b.copyable_interface = copyable_interface);

    ctx.builtins()
}

/// Build the `Movable` or `Copyable` interface.
///
/// The interface pattern is a single type parameter `T`. The value type is
/// a struct of pointers to the lifecycle functions; inside each function
/// type binder `T` sits one binder level out.
fn make_lifecycle_interface(ctx: &mut CompileContext, movable: bool) -> CompileResult<TermId> {
    let location = SourceLocation::synthetic();
    let metatype = ctx.metatype();
    let empty = ctx.empty_type();

    // T as seen from the value-type level (one binder: the interface pattern).
    let t_outer = ctx.parameter(metatype, 0, 0, location)?;
    // T as seen from inside a member function type (one more binder).
    let t_inner = ctx.parameter(metatype, 1, 0, location)?;
    let obj_ptr = ctx.pointer_type(t_inner, location)?;

    // Object pointers are primitive and travel in registers.
    let unary = ctx.function_type(
        ResultMode::ByValue,
        empty,
        vec![FunctionParameter {
            mode: ParameterMode::Functional,
            ty: obj_ptr,
        }],
        location,
    )?;
    let binary = ctx.function_type(
        ResultMode::ByValue,
        empty,
        vec![
            FunctionParameter {
                mode: ParameterMode::Functional,
                ty: obj_ptr,
            },
            FunctionParameter {
                mode: ParameterMode::Functional,
                ty: obj_ptr,
            },
        ],
        location,
    )?;
    let unary_ptr = ctx.pointer_type(unary, location)?;
    let binary_ptr = ctx.pointer_type(binary, location)?;

    let value_type = if movable {
        // init, fini, clear, move_init, move
        ctx.struct_type(
            [unary_ptr, unary_ptr, unary_ptr, binary_ptr, binary_ptr],
            location,
        )?
    } else {
        // base Movable value, copy_init, copy
        let movable_iface = ctx.builtins().movable_interface;
        let movable_value_type =
            ctx.interface_type_after(movable_iface, &[t_outer], location)?;
        let movable_ptr = ctx.pointer_type(movable_value_type, location)?;
        ctx.struct_type([movable_ptr, binary_ptr, binary_ptr], location)?
    };

    let bases = if movable {
        Vec::new()
    } else {
        let movable_iface = ctx.builtins().movable_interface;
        vec![InterfaceBase {
            interface: movable_iface,
            parameters: vec![t_outer],
            path: vec![INTERFACE_COPYABLE_MOVABLE],
        }]
    };

    ctx.interface_new(0, vec![metatype], Vec::new(), value_type, bases, Vec::new(), location)
}

#[cfg(test)]
#[path = "tests/builder.rs"]
mod tests;
