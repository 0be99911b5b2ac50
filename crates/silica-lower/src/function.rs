//! Function lowering: IR1 bodies to basic-block IR2.
//!
//! The lowering threads a function state through the walk: a scope map
//! from anonymous and statement nodes to their IR values, a LIFO cleanup
//! stack with normal and exception-only entries, a jump map for enclosing
//! jump targets, the list of locally introduced implementations, and the
//! set of globals the body depends on (collected for the scheduler).
//!
//! Leaving a scope runs the cleanup stack from the current top down to the
//! target's depth. Jump exits cache a landing block per (cleanup, target)
//! so repeated exits share cleanup code, threading any carried value
//! through a phi at each landing block.

use crate::globals::GlobalBuilder;
use crate::storage::{merge_storage, Defer, Lowered, Storage};
use rustc_hash::{FxHashMap, FxHashSet};
use silica_common::{CompileResult, ErrorKind, SourceLocation};
use silica_ir::{BlockId, BodyBuilder, ConstValue, FunctionBody, IrType, IrTypeId, ValueId};
use silica_term::{
    ModuleId, ParameterMode, ResultMode, StatementMode, TermId, TermKind, TypeMode,
};

#[derive(Clone)]
pub(crate) enum CleanupKind {
    /// Destroy the object in `slot` and release the slot.
    Destroy { slot: ValueId, ty: TermId },
    /// Run destructors for the object at `ptr` without releasing its
    /// storage (the storage is owned elsewhere: a global, or a member of
    /// an enclosing aggregate).
    Finalize { ptr: ValueId, ty: TermId },
    /// Release a stack slot with no object in it.
    StackFree { slot: ValueId },
    /// Run a try/finally's finally expression.
    Finally { expr: TermId },
}

pub(crate) struct CleanupEntry {
    kind: CleanupKind,
    except_only: bool,
    dominator: BlockId,
    /// Landing block and carried phi per jump target that has already
    /// exited through this cleanup.
    landing: FxHashMap<TermId, (BlockId, Option<ValueId>)>,
}

#[derive(Clone, Copy)]
pub(crate) struct JumpData {
    pub block: BlockId,
    /// Phi (reference/functional arguments) or slot element pointer
    /// (by-value arguments).
    pub storage: Option<ValueId>,
    pub cleanup_depth: usize,
    pub argument_mode: ResultMode,
}

#[derive(Clone, Default)]
pub(crate) struct FunState {
    /// Anonymous and statement nodes to their lowered values.
    pub vars: FxHashMap<TermId, Lowered>,
    /// Implementations introduced by enclosing `IntroduceImplementation`s.
    pub implementations: Vec<TermId>,
    pub jump_map: FxHashMap<TermId, JumpData>,
}

pub(crate) struct FunctionLowering<'a, 'ctx> {
    pub gb: &'a mut GlobalBuilder<'ctx>,
    pub module: ModuleId,
    pub body: FunctionBody,
    cur_block: BlockId,
    pub(crate) state: FunState,
    pub(crate) cleanups: Vec<CleanupEntry>,
    pub dependencies: FxHashSet<TermId>,
    /// The function's return target; `exit_to` treats it specially.
    return_target: Option<TermId>,
    /// Destination pointer for complex by-value results.
    return_storage: Option<ValueId>,
}

/// Lower a function global to a finished body.
pub(crate) fn lower_function_body(
    gb: &mut GlobalBuilder<'_>,
    module: ModuleId,
    function: TermId,
    dependencies: &mut FxHashSet<TermId>,
) -> CompileResult<FunctionBody> {
    let location = gb.ctx.location(function);
    let TermKind::Function {
        ty,
        arguments,
        return_target,
        body,
        ..
    } = gb.ctx.kind(function).clone()
    else {
        return Err(gb.ctx.error(
            ErrorKind::InternalInvariant,
            location,
            "function lowering requires a function",
        ));
    };
    let TermKind::FunctionType {
        result_mode,
        result,
        parameters,
        ..
    } = gb.ctx.kind(ty).clone()
    else {
        return Err(gb.ctx.error(
            ErrorKind::TypeMismatch,
            location,
            "function global has a non-function type",
        ));
    };
    let _span = tracing::debug_span!("lower_function").entered();

    let mut lowering = FunctionLowering::new(gb, module);
    let entry = lowering.new_block(None);
    lowering.cur_block = entry;

    // Bind arguments. Phantom and compile-time (metatype) parameters have
    // no machine representation; the remainder index the IR argument list.
    let mut ir_index = 0u32;
    for (anonymous, parameter) in arguments.iter().zip(&parameters) {
        if parameter.mode == ParameterMode::Phantom {
            continue;
        }
        let arg_ty = lowering.gb.ctx.type_of(*anonymous);
        if parameter.mode == ParameterMode::Functional
            && lowering.gb.ctx.info(arg_ty).type_mode == TypeMode::Metatype
        {
            continue;
        }
        let ir_ty = lowering.gb.lower_type(module, arg_ty, location)?;
        let (value_ty, storage) = match parameter.mode {
            ParameterMode::Functional => (ir_ty, Storage::Functional),
            ParameterMode::Rvalue => {
                let state = lowering.gb.module_state(module);
                (state.ir.types.pointer(ir_ty), Storage::RvalueRef)
            }
            _ => {
                let state = lowering.gb.module_state(module);
                (state.ir.types.pointer(ir_ty), Storage::LvalueRef)
            }
        };
        let value = lowering.with_builder(|b| b.argument(ir_index, value_ty));
        ir_index += 1;
        lowering
            .state
            .vars
            .insert(*anonymous, Lowered::new(storage, value, arg_ty));
    }

    // Complex by-value results arrive through a trailing destination
    // pointer; primitive by-value results return in a register.
    let mut exit_mode = result_mode;
    if result_mode == ResultMode::ByValue {
        if lowering.gb.ctx.info(result).type_mode == TypeMode::Complex {
            let result_ir = lowering.gb.lower_type(module, result, location)?;
            let ptr_ty = lowering.gb.module_state(module).ir.types.pointer(result_ir);
            let value = lowering.with_builder(|b| b.argument(ir_index, ptr_ty));
            lowering.return_storage = Some(value);
        } else {
            exit_mode = ResultMode::Functional;
        }
    }

    // A missing return target means the function returns by falling off
    // its body; synthesise one so every exit goes through `exit_to`.
    let target = match return_target {
        Some(target) => target,
        None => {
            let result_ty = lowering.gb.ctx.specialize(
                result,
                &arguments,
                location,
            )?;
            lowering.gb.ctx.exit_target(result_ty, exit_mode, location)?
        }
    };
    lowering.return_target = Some(target);

    let exit_jump = lowering.gb.ctx.jump_to(target, Some(body), location)?;
    lowering.run(exit_jump, None)?;

    let body = {
        dependencies.extend(std::mem::take(&mut lowering.dependencies));
        lowering.body
    };
    Ok(body)
}

/// Lower a synthesised initialiser/finaliser body: no arguments, no
/// result.
pub(crate) fn lower_init_body(
    gb: &mut GlobalBuilder<'_>,
    module: ModuleId,
    body: TermId,
    dependencies: &mut FxHashSet<TermId>,
) -> CompileResult<FunctionBody> {
    let _span = tracing::debug_span!("lower_init").entered();
    let mut lowering = FunctionLowering::new(gb, module);
    let entry = lowering.new_block(None);
    lowering.cur_block = entry;

    let result = lowering.run(body, None)?;
    lowering.destroy_now(&result)?;
    lowering.cleanup_to(0)?;
    if !lowering.with_builder(|b| b.is_terminated()) {
        lowering.with_builder(|b| b.return_void());
    }

    let dependencies_out = std::mem::take(&mut lowering.dependencies);
    dependencies.extend(dependencies_out);
    Ok(lowering.body)
}

impl<'a, 'ctx> FunctionLowering<'a, 'ctx> {
    fn new(gb: &'a mut GlobalBuilder<'ctx>, module: ModuleId) -> Self {
        // Materialise the module state before borrowing it per-emission.
        gb.module_state(module);
        FunctionLowering {
            gb,
            module,
            body: FunctionBody::new(),
            cur_block: BlockId(0),
            state: FunState::default(),
            cleanups: Vec::new(),
            dependencies: FxHashSet::default(),
            return_target: None,
            return_storage: None,
        }
    }

    pub(crate) fn with_builder<R>(&mut self, f: impl FnOnce(&mut BodyBuilder) -> R) -> R {
        let state = self
            .gb
            .modules
            .get_mut(&self.module)
            .expect("module state created in new()");
        let mut builder = BodyBuilder::new(&mut state.ir.types, &mut self.body);
        builder.set_insert_point(self.cur_block);
        f(&mut builder)
    }

    fn new_block(&mut self, dominator: Option<BlockId>) -> BlockId {
        let state = self
            .gb
            .modules
            .get_mut(&self.module)
            .expect("module state created in new()");
        let mut builder = BodyBuilder::new(&mut state.ir.types, &mut self.body);
        builder.new_block(dominator)
    }

    fn set_insert_point(&mut self, block: BlockId) {
        self.cur_block = block;
    }

    /// Continue emission in a fresh block no path reaches; used after
    /// terminators so unreachable IR1 suffixes still lower harmlessly.
    fn start_dead_block(&mut self) {
        let dead = self.new_block(None);
        self.set_insert_point(dead);
    }

    pub(crate) fn lower_type(&mut self, ty: TermId, location: SourceLocation) -> CompileResult<IrTypeId> {
        self.gb.lower_type(self.module, ty, location)
    }

    /// Allocate a stack slot for a value of IR1 type `ty`. The caller is
    /// responsible for pairing it with a destroy or stack-free cleanup.
    pub(crate) fn alloca_term(&mut self, ty: TermId, location: SourceLocation) -> CompileResult<ValueId> {
        let ir_ty = self.lower_type(ty, location)?;
        Ok(self.with_builder(|b| b.alloca(ir_ty)))
    }

    // =========================================================================
    // Cleanup stack
    // =========================================================================

    pub(crate) fn push_cleanup(&mut self, kind: CleanupKind, except_only: bool) {
        let dominator = self.cur_block;
        self.cleanups.push(CleanupEntry {
            kind,
            except_only,
            dominator,
            landing: FxHashMap::default(),
        });
    }

    fn emit_cleanup(&mut self, kind: &CleanupKind) -> CompileResult<()> {
        match kind {
            CleanupKind::Destroy { slot, ty } => self.destroy_slot(*slot, *ty),
            CleanupKind::Finalize { ptr, ty } => {
                let location = self.gb.ctx.location(*ty);
                self.object_fini(*ptr, *ty, location)
            }
            CleanupKind::StackFree { slot } => {
                let slot = *slot;
                self.with_builder(|b| b.freea(slot));
                Ok(())
            }
            CleanupKind::Finally { expr } => self.run_void(*expr),
        }
    }

    /// Pop and run cleanups down to `depth` on the normal path, in LIFO
    /// order. Exception-only entries are discarded.
    pub(crate) fn cleanup_to(&mut self, depth: usize) -> CompileResult<()> {
        while self.cleanups.len() > depth {
            let entry = self.cleanups.pop().expect("length checked");
            if entry.except_only {
                continue;
            }
            self.emit_cleanup(&entry.kind)?;
        }
        Ok(())
    }

    /// Pop cleanups down to `depth` without emitting them: after a
    /// subtree that does not normally return, or to retire exception-only
    /// entries once the guarded construction has completed.
    pub(crate) fn discard_cleanups(&mut self, depth: usize) {
        self.cleanups.truncate(depth);
    }

    /// Leave the function or jump out of the current scope, running every
    /// normal cleanup between here and the target.
    ///
    /// Landing blocks are cached per (cleanup, target); a repeated exit
    /// through the same cleanup branches into the existing chain.
    fn exit_to(
        &mut self,
        target: TermId,
        mut value: Option<ValueId>,
        location: SourceLocation,
    ) -> CompileResult<()> {
        let is_return = self.return_target == Some(target);
        let target_depth = if is_return {
            0
        } else {
            match self.state.jump_map.get(&target) {
                Some(data) => data.cleanup_depth,
                None => {
                    return Err(self.gb.ctx.error(
                        ErrorKind::MalformedTerm,
                        location,
                        "jump target is not in scope",
                    ));
                }
            }
        };

        let mut level = self.cleanups.len();
        while level > target_depth {
            level -= 1;
            if self.cleanups[level].except_only {
                continue;
            }
            if let Some(&(block, phi)) = self.cleanups[level].landing.get(&target) {
                let from = self.cur_block;
                self.with_builder(|b| {
                    b.branch(block);
                    if let (Some(phi), Some(v)) = (phi, value) {
                        b.add_phi_edge(phi, from, v);
                    }
                });
                self.start_dead_block();
                return Ok(());
            }

            let dominator = self.cleanups[level].dominator;
            let next = self.new_block(Some(dominator));
            let from = self.cur_block;
            let phi = self.with_builder(|b| {
                b.branch(next);
                b.set_insert_point(next);
                value.map(|v| {
                    let ty = b.value_type(v);
                    let phi = b.phi(ty);
                    b.add_phi_edge(phi, from, v);
                    phi
                })
            });
            self.set_insert_point(next);
            value = phi;
            let kind = self.cleanups[level].kind.clone();
            self.emit_cleanup(&kind)?;
            self.cleanups[level].landing.insert(target, (next, phi));
        }

        if is_return {
            self.with_builder(|b| match value {
                Some(v) => b.return_(v),
                None => b.return_void(),
            });
        } else {
            let data = self.state.jump_map[&target];
            let from = self.cur_block;
            self.with_builder(|b| {
                b.branch(data.block);
                if let (Some(storage), Some(v)) = (data.storage, value) {
                    if matches!(
                        data.argument_mode,
                        ResultMode::Functional | ResultMode::Lvalue | ResultMode::Rvalue
                    ) {
                        b.add_phi_edge(storage, from, v);
                    }
                }
            });
        }
        self.start_dead_block();
        Ok(())
    }

    // =========================================================================
    // The main walk
    // =========================================================================

    /// Lower one term. `dest`, when provided, is a stack slot the result
    /// should be constructed into if it needs addressable storage.
    pub(crate) fn run(&mut self, term: TermId, dest: Option<ValueId>) -> CompileResult<Lowered> {
        let location = self.gb.ctx.location(term);
        let ty = self.gb.ctx.type_of(term);
        match self.gb.ctx.kind(term).clone() {
            TermKind::Block { statements, result } => {
                self.run_block(&statements, result, dest, location)
            }
            TermKind::IfThenElse {
                condition,
                true_value,
                false_value,
            } => self.run_if_then_else(term, condition, true_value, false_value, dest, location),
            TermKind::JumpGroup { initial, entries } => {
                self.run_jump_group(term, initial, &entries, dest, location)
            }
            TermKind::JumpTo { target, argument } => {
                self.run_jump(target, argument, location)?;
                Ok(Lowered::bottom(ty))
            }
            TermKind::TryFinally {
                try_expr,
                finally_expr,
                except_only,
            } => self.run_try_finally(try_expr, finally_expr, except_only, dest, location),
            TermKind::FunctionCall { target, arguments } => {
                self.run_call(term, target, &arguments, dest, location)
            }
            TermKind::InitializeValue {
                target,
                assign_value,
                inner,
            } => self.run_initialize(target, assign_value, inner, dest, location),
            TermKind::AssignValue {
                target,
                assign_value,
            } => self.run_assign(target, assign_value, location),
            TermKind::FinalizeValue { target } => self.run_finalize(target, location),
            TermKind::IntroduceImplementation {
                implementations,
                value,
            } => {
                let saved = self.state.implementations.len();
                self.state.implementations.extend(implementations);
                let result = self.run(value, dest);
                self.state.implementations.truncate(saved);
                result
            }
            TermKind::FunctionalEvaluate { value } => {
                let inner = self.run(value, None)?;
                if inner.is_bottom() {
                    return Ok(Lowered::bottom(ty));
                }
                let v = self.to_register(&inner, location)?;
                Ok(Lowered::new(Storage::Functional, v, ty))
            }
            TermKind::StatementRef { statement } => {
                let Some(var) = self.state.vars.get(&statement).copied() else {
                    if matches!(
                        self.gb.ctx.kind(statement),
                        TermKind::GlobalStatement { .. }
                    ) {
                        return self.run(statement, dest);
                    }
                    return Err(self.gb.ctx.error(
                        ErrorKind::MalformedTerm,
                        location,
                        "variable is not in scope",
                    ));
                };
                // A stack variable is seen by its users as a reference.
                Ok(match var.storage {
                    Storage::Stack => Lowered::new(Storage::LvalueRef, var.id(), var.ty),
                    _ => var,
                })
            }
            TermKind::Anonymous => match self.state.vars.get(&term).copied() {
                Some(var) => Ok(var),
                None => Err(self.gb.ctx.error(
                    ErrorKind::InternalInvariant,
                    location,
                    "unbound placeholder reached function lowering",
                )),
            },
            // A functional global statement denotes its pure value, not
            // storage.
            TermKind::GlobalStatement { value, mode, .. }
                if mode == StatementMode::Functional =>
            {
                self.run(value, dest)
            }
            TermKind::Function { .. }
            | TermKind::GlobalVariable { .. }
            | TermKind::GlobalStatement { .. }
            | TermKind::GlobalEvaluate { .. }
            | TermKind::LibrarySymbol { .. } => {
                if !matches!(self.gb.ctx.kind(term), TermKind::LibrarySymbol { .. }) {
                    self.dependencies.insert(term);
                }
                let symbol = self.gb.declare_global(self.module, term)?;
                let symbol_ty = {
                    let state = self.gb.module_state(self.module);
                    let ty = state.ir.symbol(symbol).ty;
                    state.ir.types.pointer(ty)
                };
                let value =
                    self.with_builder(|b| b.constant(ConstValue::Symbol(symbol), symbol_ty));
                Ok(Lowered::new(Storage::LvalueRef, value, ty))
            }
            kind if !kind.is_interned() => Err(self.gb.ctx.error(
                ErrorKind::InternalInvariant,
                location,
                "unexpected effect term in function lowering",
            )),
            _ => self.run_pure(term, dest, location),
        }
    }

    /// Lower a pure term: as a link-time constant when possible, otherwise
    /// as address arithmetic and loads over in-scope values.
    fn run_pure(
        &mut self,
        term: TermId,
        dest: Option<ValueId>,
        location: SourceLocation,
    ) -> CompileResult<Lowered> {
        let ty = self.gb.ctx.type_of(term);

        // Complex-typed constructor terms always build into storage.
        let is_constructor = matches!(
            self.gb.ctx.kind(term),
            TermKind::DefaultValue { .. }
                | TermKind::StructValue { .. }
                | TermKind::ArrayValue { .. }
                | TermKind::UnionValue { .. }
                | TermKind::InstanceValue { .. }
                | TermKind::StringValue { .. }
        );
        if is_constructor && self.gb.ctx.info(ty).type_mode == TypeMode::Complex {
            return self.run_constructor(term, dest, location);
        }

        match self.gb.lower_const(self.module, term, &mut self.dependencies) {
            Ok(const_value) => {
                let value = self.materialize_const(const_value, location)?;
                Ok(Lowered::new(Storage::Functional, value, ty))
            }
            Err(Defer::Error(error)) => Err(error),
            Err(Defer::NotGlobal) => self.run_pure_dynamic(term, dest, location),
        }
    }

    /// Pure terms whose operands are runtime values: address arithmetic,
    /// loads and in-scope interface witnesses.
    fn run_pure_dynamic(
        &mut self,
        term: TermId,
        dest: Option<ValueId>,
        location: SourceLocation,
    ) -> CompileResult<Lowered> {
        let ty = self.gb.ctx.type_of(term);
        match self.gb.ctx.kind(term).clone() {
            TermKind::ElementValue { aggregate, index } => {
                let base = self.run(aggregate, None)?;
                if base.is_bottom() {
                    return Ok(Lowered::bottom(ty));
                }
                match base.storage {
                    Storage::Stack | Storage::LvalueRef | Storage::RvalueRef => {
                        let constant_index = self.gb.ctx.size_from(index, location)?;
                        let index_value = self.size_register(constant_index)?;
                        let base_value = base.id();
                        let element = self.with_builder(|b| {
                            b.element_ptr(base_value, index_value, constant_index)
                        });
                        let storage = match base.storage {
                            Storage::Stack => Storage::LvalueRef,
                            other => other,
                        };
                        Ok(Lowered::new(storage, element, ty))
                    }
                    Storage::Functional => Err(self.gb.ctx.error(
                        ErrorKind::TypeMismatch,
                        location,
                        "member access requires addressable storage",
                    )),
                    Storage::Bottom => unreachable!("checked above"),
                }
            }
            TermKind::ElementPtr { pointer, index } => {
                let base = self.run(pointer, None)?;
                if base.is_bottom() {
                    return Ok(Lowered::bottom(ty));
                }
                let base_value = self.to_register(&base, location)?;
                let constant_index = self.gb.ctx.size_from(index, location)?;
                let index_value = self.size_register(constant_index)?;
                let element = self
                    .with_builder(|b| b.element_ptr(base_value, index_value, constant_index));
                Ok(Lowered::new(Storage::Functional, element, ty))
            }
            TermKind::PointerTarget { pointer } => {
                let base = self.run(pointer, None)?;
                if base.is_bottom() {
                    return Ok(Lowered::bottom(ty));
                }
                let value = self.to_register(&base, location)?;
                Ok(Lowered::new(Storage::LvalueRef, value, ty))
            }
            TermKind::PointerTo { value } => {
                let inner = self.run(value, None)?;
                if inner.is_bottom() {
                    return Ok(Lowered::bottom(ty));
                }
                match inner.storage {
                    Storage::Stack | Storage::LvalueRef | Storage::RvalueRef => {
                        Ok(Lowered::new(Storage::Functional, inner.id(), ty))
                    }
                    _ => Err(self.gb.ctx.error(
                        ErrorKind::TypeMismatch,
                        location,
                        "cannot take the address of a register value",
                    )),
                }
            }
            TermKind::OuterPtr { pointer } => {
                let base = self.run(pointer, None)?;
                if base.is_bottom() {
                    return Ok(Lowered::bottom(ty));
                }
                let base_value = self.to_register(&base, location)?;
                let ir_ty = self.lower_type(ty, location)?;
                let value = self.with_builder(|b| b.outer_ptr(base_value, ir_ty));
                Ok(Lowered::new(Storage::Functional, value, ty))
            }
            TermKind::MovableValue { value } => {
                let inner = self.run(value, None)?;
                if inner.is_bottom() {
                    return Ok(Lowered::bottom(ty));
                }
                if !matches!(inner.storage, Storage::LvalueRef | Storage::Stack) {
                    return Err(self.gb.ctx.error(
                        ErrorKind::TypeMismatch,
                        location,
                        "only an l-value reference can be moved from",
                    ));
                }
                Ok(Lowered::new(Storage::RvalueRef, inner.id(), ty))
            }
            TermKind::InterfaceValue {
                interface,
                parameters,
                implementation,
            } => self.run_interface_value(interface, &parameters, implementation, location),
            TermKind::DefaultValue { .. }
            | TermKind::StructValue { .. }
            | TermKind::ArrayValue { .. }
            | TermKind::UnionValue { .. }
            | TermKind::InstanceValue { .. } => self.run_constructor(term, dest, location),
            _ => Err(self.gb.ctx.error(
                ErrorKind::MalformedTerm,
                location,
                "term has no run-time lowering",
            )),
        }
    }

    fn run_constructor(
        &mut self,
        term: TermId,
        dest: Option<ValueId>,
        location: SourceLocation,
    ) -> CompileResult<Lowered> {
        let ty = self.gb.ctx.type_of(term);
        let slot = match dest {
            Some(slot) => slot,
            None => {
                // A temporary owned by the current scope.
                let slot = self.alloca_term(ty, location)?;
                self.push_cleanup(CleanupKind::Destroy { slot, ty }, false);
                slot
            }
        };
        self.object_construct_term(slot, term, location)?;
        Ok(Lowered::new(Storage::Stack, slot, ty))
    }

    /// Load a lowered value into a register.
    pub(crate) fn to_register(&mut self, value: &Lowered, location: SourceLocation) -> CompileResult<ValueId> {
        match value.storage {
            Storage::Functional => Ok(value.id()),
            Storage::Stack | Storage::LvalueRef | Storage::RvalueRef => {
                let v = value.id();
                Ok(self.with_builder(|b| b.load(v)))
            }
            Storage::Bottom => {
                let ir_ty = self.lower_type(value.ty, location)?;
                Ok(self.with_builder(|b| b.undef(ir_ty)))
            }
        }
    }

    /// Lower a term and discard its result, destroying any temporary.
    pub(crate) fn run_void(&mut self, term: TermId) -> CompileResult<()> {
        let result = self.run(term, None)?;
        self.destroy_now(&result)
    }

    pub(crate) fn size_register(&mut self, value: u64) -> CompileResult<ValueId> {
        let ty = {
            let state = self.gb.module_state(self.module);
            state.ir.types.scalar(silica_ir::IrScalar::UPtr)
        };
        Ok(self.with_builder(|b| b.constant(ConstValue::Int { ty, value }, ty)))
    }

    /// The IR type of a link-time constant.
    fn const_type(&mut self, value: &ConstValue) -> IrTypeId {
        let state = self.gb.module_state(self.module);
        fn walk(state: &mut crate::globals::ModuleState, value: &ConstValue) -> IrTypeId {
            match value {
                ConstValue::Undef(ty) | ConstValue::Null(ty) => *ty,
                ConstValue::Unit => state.ir.types.unit(),
                ConstValue::Bool(_) => state.ir.types.scalar(silica_ir::IrScalar::Bool),
                ConstValue::Int { ty, .. } => *ty,
                ConstValue::Bytes(bytes) => {
                    let byte = state.ir.types.scalar(silica_ir::IrScalar::U8);
                    state.ir.types.intern(IrType::Array(byte, bytes.len() as u64))
                }
                ConstValue::Struct(members) => {
                    let members: Vec<IrTypeId> =
                        members.iter().map(|m| walk(state, m)).collect();
                    state.ir.types.intern(IrType::Struct(members))
                }
                ConstValue::Array(members) => {
                    let element = members
                        .first()
                        .map(|m| walk(state, m))
                        .unwrap_or_else(|| state.ir.types.unit());
                    state
                        .ir
                        .types
                        .intern(IrType::Array(element, members.len() as u64))
                }
                ConstValue::Union { ty, .. } => *ty,
                ConstValue::Symbol(symbol) => {
                    let ty = state.ir.symbol(*symbol).ty;
                    state.ir.types.pointer(ty)
                }
                ConstValue::ElementPtr { base, indices } => {
                    let base_ty = walk(state, base);
                    let mut pointee = state.ir.types.pointee(base_ty).unwrap_or(base_ty);
                    for &index in indices {
                        if let Some(member) = state.ir.types.element(pointee, index) {
                            pointee = member;
                        }
                    }
                    state.ir.types.pointer(pointee)
                }
            }
        }
        walk(state, value)
    }

    pub(crate) fn materialize_const(
        &mut self,
        value: ConstValue,
        _location: SourceLocation,
    ) -> CompileResult<ValueId> {
        let ty = self.const_type(&value);
        Ok(self.with_builder(|b| b.constant(value, ty)))
    }

    /// Resolve an interface witness in function scope: introduced
    /// implementations shadow the global instantiation cache, and dynamic
    /// implementations lower their in-scope value directly.
    pub(crate) fn run_interface_value(
        &mut self,
        interface: TermId,
        parameters: &[TermId],
        implementation: Option<TermId>,
        location: SourceLocation,
    ) -> CompileResult<Lowered> {
        let extra = self.state.implementations.clone();
        let (selected, wildcards) = match implementation {
            Some(implementation) => {
                let wildcards = silica_term::overload_match(
                    self.gb.ctx,
                    implementation,
                    parameters,
                    location,
                )?;
                (implementation, wildcards)
            }
            None => {
                let lookup = silica_term::overload_lookup(
                    self.gb.ctx,
                    interface,
                    parameters,
                    location,
                    &extra,
                )?;
                (lookup.value, lookup.wildcards)
            }
        };

        let TermKind::Implementation { value, dynamic, .. } = self.gb.ctx.kind(selected).clone()
        else {
            return Err(self.gb.ctx.error(
                ErrorKind::InternalInvariant,
                location,
                "interface lookup selected a non-implementation",
            ));
        };

        if dynamic {
            // The implementation is a concrete value already in scope,
            // instantiated at the inferred wildcards.
            let value = silica_term::specialize(self.gb.ctx, value, &wildcards, location)?;
            return self.run(value, None);
        }

        let shadowed = extra.contains(&selected);
        let maybe = if shadowed { Some(selected) } else { None };
        match self.gb.get_implementation(
            self.module,
            interface,
            parameters,
            location,
            &mut self.dependencies,
            maybe,
        ) {
            Ok(const_value) => {
                let ty = self
                    .gb
                    .ctx
                    .interface_type_after(interface, parameters, location)?;
                let v = self.materialize_const(const_value, location)?;
                Ok(Lowered::new(Storage::Functional, v, ty))
            }
            Err(Defer::Error(error)) => Err(error),
            Err(Defer::NotGlobal) => Err(self.gb.ctx.error(
                ErrorKind::InternalInvariant,
                location,
                "static implementation failed to instantiate",
            )),
        }
    }

    // =========================================================================
    // Control constructs
    // =========================================================================

    fn run_block(
        &mut self,
        statements: &[TermId],
        result: TermId,
        dest: Option<ValueId>,
        location: SourceLocation,
    ) -> CompileResult<Lowered> {
        let saved_vars = self.state.vars.clone();
        let saved_depth = self.cleanups.len();

        for &statement in statements {
            let TermKind::Statement { value, mode } = *self.gb.ctx.kind(statement) else {
                return Err(self.gb.ctx.error(
                    ErrorKind::MalformedTerm,
                    location,
                    "block entries must be statements",
                ));
            };
            let statement_location = self.gb.ctx.location(statement);
            let value_ty = self.gb.ctx.type_of(value);

            let lowered = match mode {
                StatementMode::Value => {
                    let slot = self.alloca_term(value_ty, statement_location)?;
                    let computed = self.run(value, Some(slot))?;
                    if computed.is_bottom() {
                        self.discard_cleanups(saved_depth);
                        self.state.vars = saved_vars;
                        return Ok(Lowered::bottom(self.gb.ctx.type_of(result)));
                    }
                    let stored = match computed.storage {
                        Storage::Stack => {
                            debug_assert_eq!(computed.id(), slot);
                            computed
                        }
                        Storage::Functional => {
                            let v = computed.id();
                            self.with_builder(|b| b.store(v, slot));
                            Lowered::new(Storage::Stack, slot, value_ty)
                        }
                        Storage::LvalueRef => {
                            self.copy_construct(value_ty, slot, computed.id(), statement_location)?;
                            Lowered::new(Storage::Stack, slot, value_ty)
                        }
                        Storage::RvalueRef => {
                            self.move_construct(value_ty, slot, computed.id(), statement_location)?;
                            Lowered::new(Storage::Stack, slot, value_ty)
                        }
                        Storage::Bottom => unreachable!("checked above"),
                    };
                    self.push_cleanup(
                        CleanupKind::Destroy {
                            slot,
                            ty: value_ty,
                        },
                        false,
                    );
                    stored
                }
                StatementMode::Functional => {
                    let computed = self.run(value, None)?;
                    if computed.is_bottom() {
                        self.discard_cleanups(saved_depth);
                        self.state.vars = saved_vars;
                        return Ok(Lowered::bottom(self.gb.ctx.type_of(result)));
                    }
                    match computed.storage {
                        Storage::Functional => computed,
                        Storage::LvalueRef | Storage::RvalueRef | Storage::Stack => {
                            if self.gb.ctx.info(value_ty).type_mode == TypeMode::Complex {
                                return Err(self.gb.ctx.error(
                                    ErrorKind::TypeMismatch,
                                    statement_location,
                                    "a value with non-trivial lifecycle cannot be frozen into a register",
                                ));
                            }
                            let v = computed.id();
                            let loaded = self.with_builder(|b| b.load(v));
                            self.destroy_now(&computed)?;
                            Lowered::new(Storage::Functional, loaded, value_ty)
                        }
                        Storage::Bottom => unreachable!("checked above"),
                    }
                }
                StatementMode::Ref => {
                    let computed = self.run(value, None)?;
                    if computed.is_bottom() {
                        self.discard_cleanups(saved_depth);
                        self.state.vars = saved_vars;
                        return Ok(Lowered::bottom(self.gb.ctx.type_of(result)));
                    }
                    match computed.storage {
                        Storage::LvalueRef | Storage::RvalueRef => computed,
                        Storage::Functional => {
                            return Err(self.gb.ctx.error(
                                ErrorKind::TypeMismatch,
                                statement_location,
                                "cannot take a reference to a register value",
                            ));
                        }
                        Storage::Stack => {
                            return Err(self.gb.ctx.error(
                                ErrorKind::TypeMismatch,
                                statement_location,
                                "cannot take a reference to a temporary",
                            ));
                        }
                        Storage::Bottom => unreachable!("checked above"),
                    }
                }
                StatementMode::Destroy => {
                    let computed = self.run(value, None)?;
                    if computed.is_bottom() {
                        self.discard_cleanups(saved_depth);
                        self.state.vars = saved_vars;
                        return Ok(Lowered::bottom(self.gb.ctx.type_of(result)));
                    }
                    self.destroy_now(&computed)?;
                    let ty = self.gb.ctx.empty_type();
                    let unit = {
                        let state = self.gb.module_state(self.module);
                        state.ir.types.unit()
                    };
                    let v = self.with_builder(|b| b.constant(ConstValue::Unit, unit));
                    Lowered::new(Storage::Functional, v, ty)
                }
            };
            self.state.vars.insert(statement, lowered);
        }

        let mut result_value = self.run(result, dest)?;
        if result_value.is_bottom() {
            self.discard_cleanups(saved_depth);
            self.state.vars = saved_vars;
            return Ok(result_value);
        }

        // A result that still lives in a dying local must be materialised
        // before the local is destroyed.
        let mut keep_depth = saved_depth;
        result_value =
            self.preserve_escaping(result_value, dest, &mut keep_depth, location)?;

        self.cleanup_to(keep_depth)?;
        self.state.vars = saved_vars;
        Ok(result_value)
    }

    /// If `value` points into storage owned by cleanups above `*depth`,
    /// copy or move it out before those cleanups run.
    ///
    /// A replacement temporary is registered just below the dying entries
    /// and `*depth` is raised past it, so the caller's cleanup sweep
    /// leaves it alive for the enclosing scope.
    fn preserve_escaping(
        &mut self,
        value: Lowered,
        dest: Option<ValueId>,
        depth: &mut usize,
        location: SourceLocation,
    ) -> CompileResult<Lowered> {
        let Some(v) = value.value else {
            return Ok(value);
        };
        let dying = self.cleanups[*depth..].iter().any(|entry| {
            matches!(
                entry.kind,
                CleanupKind::Destroy { slot, .. } | CleanupKind::StackFree { slot }
                if slot == v
            )
        });
        if !dying || value.storage == Storage::Functional {
            return Ok(value);
        }

        let slot = match dest {
            Some(slot) => slot,
            None => {
                let slot = self.alloca_term(value.ty, location)?;
                let entry = CleanupEntry {
                    kind: CleanupKind::Destroy {
                        slot,
                        ty: value.ty,
                    },
                    except_only: false,
                    dominator: self.cur_block,
                    landing: FxHashMap::default(),
                };
                self.cleanups.insert(*depth, entry);
                *depth += 1;
                slot
            }
        };
        match value.storage {
            Storage::Stack | Storage::RvalueRef => {
                self.move_construct(value.ty, slot, value.id(), location)?;
            }
            Storage::LvalueRef => {
                self.copy_construct(value.ty, slot, value.id(), location)?;
            }
            _ => {}
        }
        Ok(Lowered::new(Storage::Stack, slot, value.ty))
    }

    fn run_if_then_else(
        &mut self,
        term: TermId,
        condition: TermId,
        true_value: TermId,
        false_value: TermId,
        dest: Option<ValueId>,
        location: SourceLocation,
    ) -> CompileResult<Lowered> {
        let ty = self.gb.ctx.type_of(term);
        let cond = self.run(condition, None)?;
        if cond.is_bottom() {
            return Ok(Lowered::bottom(ty));
        }
        let cond_value = self.to_register(&cond, location)?;

        let dominator = self.cur_block;
        let true_block = self.new_block(Some(dominator));
        let false_block = self.new_block(Some(dominator));
        self.with_builder(|b| b.cond_branch(cond_value, true_block, false_block));

        let mut entries = Vec::with_capacity(2);

        self.set_insert_point(true_block);
        let true_result = self.run(true_value, dest)?;
        entries.push((self.cur_block, true_result));

        self.set_insert_point(false_block);
        let false_result = self.run(false_value, dest)?;
        entries.push((self.cur_block, false_result));

        self.merge_exit(ty, dest, entries, dominator, location)
    }

    /// Merge divergent execution paths.
    ///
    /// Bottom arms are discarded; the surviving storage classes join on
    /// the lattice `Functional < RvalueRef <= LvalueRef < Stack`. A stack
    /// join materialises every arm into the shared slot; any other join
    /// becomes a single phi at the merge block.
    fn merge_exit(
        &mut self,
        ty: TermId,
        dest: Option<ValueId>,
        entries: Vec<(BlockId, Lowered)>,
        dominator: BlockId,
        location: SourceLocation,
    ) -> CompileResult<Lowered> {
        let live: Vec<(BlockId, Lowered)> = entries
            .into_iter()
            .filter(|(_, l)| !l.is_bottom())
            .collect();

        match live.len() {
            0 => {
                self.start_dead_block();
                Ok(Lowered::bottom(ty))
            }
            1 => {
                let (block, value) = live.into_iter().next().expect("length checked");
                self.set_insert_point(block);
                Ok(value)
            }
            _ => {
                let storage = live
                    .iter()
                    .skip(1)
                    .fold(live[0].1.storage, |acc, (_, l)| merge_storage(acc, l.storage));
                let merge_block = self.new_block(Some(dominator));

                if storage == Storage::Stack {
                    let slot = match dest {
                        Some(slot) => slot,
                        None => {
                            let slot = self.alloca_term(ty, location)?;
                            self.push_cleanup(CleanupKind::Destroy { slot, ty }, false);
                            slot
                        }
                    };
                    for (block, value) in live {
                        self.set_insert_point(block);
                        match value.storage {
                            Storage::Stack => {
                                // Arms handed the shared slot built in
                                // place; otherwise move the temporary in.
                                if value.id() != slot {
                                    self.move_construct(ty, slot, value.id(), location)?;
                                }
                            }
                            Storage::Functional => {
                                let v = value.id();
                                self.with_builder(|b| b.store(v, slot));
                            }
                            Storage::LvalueRef => {
                                self.copy_construct(ty, slot, value.id(), location)?;
                            }
                            Storage::RvalueRef => {
                                self.move_construct(ty, slot, value.id(), location)?;
                            }
                            Storage::Bottom => unreachable!("bottom arms filtered"),
                        }
                        self.with_builder(|b| b.branch(merge_block));
                    }
                    self.set_insert_point(merge_block);
                    Ok(Lowered::new(Storage::Stack, slot, ty))
                } else {
                    let inner = self.lower_type(ty, location)?;
                    let phi_ty = if storage == Storage::Functional {
                        inner
                    } else {
                        let state = self.gb.module_state(self.module);
                        state.ir.types.pointer(inner)
                    };
                    let mut edges = Vec::with_capacity(live.len());
                    for (block, value) in live {
                        self.set_insert_point(block);
                        self.with_builder(|b| b.branch(merge_block));
                        edges.push((block, value.id()));
                    }
                    self.set_insert_point(merge_block);
                    let phi = self.with_builder(|b| {
                        let phi = b.phi(phi_ty);
                        for (block, value) in edges {
                            b.add_phi_edge(phi, block, value);
                        }
                        phi
                    });
                    Ok(Lowered::new(storage, phi, ty))
                }
            }
        }
    }

    fn run_jump_group(
        &mut self,
        term: TermId,
        initial: TermId,
        entries: &[TermId],
        dest: Option<ValueId>,
        location: SourceLocation,
    ) -> CompileResult<Lowered> {
        let ty = self.gb.ctx.type_of(term);
        let dominator = self.cur_block;
        let saved_jump_map = self.state.jump_map.clone();
        let saved_depth = self.cleanups.len();

        // By-value arguments share one union-typed slot sized by the code
        // generator to the largest member; reference and functional
        // arguments travel through phis.
        let mut by_value: Vec<(TermId, TermId)> = Vec::new();
        for &entry in entries {
            let TermKind::JumpTarget {
                argument,
                argument_mode,
                ..
            } = self.gb.ctx.kind(entry).clone()
            else {
                return Err(self.gb.ctx.error(
                    ErrorKind::MalformedTerm,
                    location,
                    "jump group entries must be jump targets",
                ));
            };
            if let Some(argument) = argument {
                if argument_mode == ResultMode::ByValue {
                    by_value.push((entry, self.gb.ctx.type_of(argument)));
                }
            }
        }

        let union_slot = if by_value.is_empty() {
            None
        } else {
            let mut member_types = Vec::with_capacity(by_value.len());
            for &(_, arg_ty) in &by_value {
                member_types.push(self.lower_type(arg_ty, location)?);
            }
            let union_ty = {
                let state = self.gb.module_state(self.module);
                state.ir.types.intern(IrType::Union(member_types))
            };
            let slot = self.with_builder(|b| b.alloca(union_ty));
            self.push_cleanup(CleanupKind::StackFree { slot }, false);
            Some(slot)
        };

        // Register every target before lowering anything that can jump.
        for &entry in entries {
            let TermKind::JumpTarget {
                argument,
                argument_mode,
                ..
            } = self.gb.ctx.kind(entry).clone()
            else {
                unreachable!("validated above");
            };
            let block = self.new_block(Some(dominator));
            let storage = match argument {
                None => None,
                Some(argument) => {
                    let arg_ty = self.gb.ctx.type_of(argument);
                    if argument_mode == ResultMode::ByValue {
                        let index = by_value
                            .iter()
                            .position(|&(e, _)| e == entry)
                            .expect("collected above") as u64;
                        let slot = union_slot.expect("slot allocated for by-value entries");
                        let index_value = self.size_register(index)?;
                        let element =
                            self.with_builder(|b| b.element_ptr(slot, index_value, index));
                        Some(element)
                    } else {
                        let inner = self.lower_type(arg_ty, location)?;
                        let phi_ty = if argument_mode == ResultMode::Functional {
                            inner
                        } else {
                            let state = self.gb.module_state(self.module);
                            state.ir.types.pointer(inner)
                        };
                        let saved = self.cur_block;
                        self.set_insert_point(block);
                        let phi = self.with_builder(|b| b.phi(phi_ty));
                        self.set_insert_point(saved);
                        Some(phi)
                    }
                }
            };
            self.state.jump_map.insert(
                entry,
                JumpData {
                    block,
                    storage,
                    cleanup_depth: self.cleanups.len(),
                    argument_mode,
                },
            );
        }

        let mut merge_entries = Vec::with_capacity(entries.len() + 1);

        let initial_result = self.run(initial, dest)?;
        merge_entries.push((self.cur_block, initial_result));

        for &entry in entries {
            let data = self.state.jump_map[&entry];
            let TermKind::JumpTarget {
                value,
                argument,
                argument_mode,
            } = self.gb.ctx.kind(entry).clone()
            else {
                unreachable!("validated above");
            };
            let Some(value) = value else {
                return Err(self.gb.ctx.error(
                    ErrorKind::MalformedTerm,
                    location,
                    "jump group entries must carry a body",
                ));
            };
            self.set_insert_point(data.block);

            let entry_depth = self.cleanups.len();
            let saved_vars = self.state.vars.clone();
            if let Some(argument) = argument {
                let arg_ty = self.gb.ctx.type_of(argument);
                let bound = match argument_mode {
                    ResultMode::ByValue => {
                        // Move the argument out of the shared union slot
                        // into the entry's own variable.
                        let slot = self.alloca_term(arg_ty, location)?;
                        let source = data.storage.expect("by-value target has storage");
                        self.move_construct_destroy(arg_ty, slot, source, location)?;
                        self.push_cleanup(
                            CleanupKind::Destroy { slot, ty: arg_ty },
                            false,
                        );
                        Lowered::new(Storage::Stack, slot, arg_ty)
                    }
                    ResultMode::Lvalue => Lowered::new(
                        Storage::LvalueRef,
                        data.storage.expect("reference target has a phi"),
                        arg_ty,
                    ),
                    ResultMode::Rvalue => Lowered::new(
                        Storage::RvalueRef,
                        data.storage.expect("reference target has a phi"),
                        arg_ty,
                    ),
                    ResultMode::Functional => Lowered::new(
                        Storage::Functional,
                        data.storage.expect("functional target has a phi"),
                        arg_ty,
                    ),
                };
                self.state.vars.insert(argument, bound);
            }

            let entry_result = self.run(value, dest)?;
            let mut keep_depth = entry_depth;
            let entry_result =
                self.preserve_escaping(entry_result, dest, &mut keep_depth, location)?;
            if !entry_result.is_bottom() {
                self.cleanup_to(keep_depth)?;
            } else {
                self.discard_cleanups(entry_depth);
            }
            self.state.vars = saved_vars;
            merge_entries.push((self.cur_block, entry_result));
        }

        let result = self.merge_exit(ty, dest, merge_entries, dominator, location)?;
        // Release the shared argument slot on exit from the group.
        if !result.is_bottom() {
            self.cleanup_to(saved_depth)?;
        } else {
            self.discard_cleanups(saved_depth);
        }
        self.state.jump_map = saved_jump_map;
        Ok(result)
    }

    fn run_jump(
        &mut self,
        target: TermId,
        argument: Option<TermId>,
        location: SourceLocation,
    ) -> CompileResult<()> {
        let TermKind::JumpTarget { argument_mode, .. } = *self.gb.ctx.kind(target) else {
            return Err(self.gb.ctx.error(
                ErrorKind::MalformedTerm,
                location,
                "jump to a non-target",
            ));
        };

        let mut carried: Option<ValueId> = None;
        if let Some(argument) = argument {
            // Where a by-value argument lands: the return storage for the
            // function exit, the target's slot for a jump group entry.
            let by_value_storage = if self.return_target == Some(target) {
                self.return_storage
            } else {
                self.state.jump_map.get(&target).and_then(|d| d.storage)
            };

            let arg_ty = self.gb.ctx.type_of(argument);
            let dest = if argument_mode == ResultMode::ByValue {
                by_value_storage
            } else {
                None
            };
            let result = self.run(argument, dest)?;

            match result.storage {
                Storage::Bottom => return Ok(()),
                Storage::Stack => match argument_mode {
                    ResultMode::Lvalue | ResultMode::Rvalue => {
                        return Err(self.gb.ctx.error(
                            ErrorKind::TypeMismatch,
                            location,
                            "cannot pass a reference to a value going out of scope",
                        ));
                    }
                    ResultMode::ByValue => {
                        // Constructed in place when the target has storage;
                        // otherwise carried in a register below. A
                        // temporary that missed the slot is moved in and
                        // left to its own cleanup.
                        if by_value_storage.is_none() {
                            let v = result.id();
                            carried = Some(self.with_builder(|b| b.load(v)));
                            self.destroy_now(&result)?;
                        } else if Some(result.id()) != by_value_storage {
                            let slot = by_value_storage.expect("checked above");
                            self.move_construct(arg_ty, slot, result.id(), location)?;
                        }
                    }
                    ResultMode::Functional => {
                        let v = result.id();
                        carried = Some(self.with_builder(|b| b.load(v)));
                        self.destroy_now(&result)?;
                    }
                },
                Storage::LvalueRef => match argument_mode {
                    ResultMode::ByValue => match by_value_storage {
                        Some(slot) => {
                            self.copy_construct(arg_ty, slot, result.id(), location)?;
                        }
                        None => {
                            let v = result.id();
                            carried = Some(self.with_builder(|b| b.load(v)));
                        }
                    },
                    ResultMode::Lvalue | ResultMode::Rvalue => carried = Some(result.id()),
                    ResultMode::Functional => {
                        let v = result.id();
                        carried = Some(self.with_builder(|b| b.load(v)));
                    }
                },
                Storage::RvalueRef => match argument_mode {
                    ResultMode::ByValue => match by_value_storage {
                        Some(slot) => {
                            self.move_construct(arg_ty, slot, result.id(), location)?;
                        }
                        None => {
                            let v = result.id();
                            carried = Some(self.with_builder(|b| b.load(v)));
                        }
                    },
                    ResultMode::Lvalue => {
                        return Err(self.gb.ctx.error(
                            ErrorKind::TypeMismatch,
                            location,
                            "cannot convert an r-value reference to an l-value reference",
                        ));
                    }
                    ResultMode::Rvalue => carried = Some(result.id()),
                    ResultMode::Functional => {
                        let v = result.id();
                        carried = Some(self.with_builder(|b| b.load(v)));
                    }
                },
                Storage::Functional => match argument_mode {
                    ResultMode::ByValue => match by_value_storage {
                        Some(slot) => {
                            let v = result.id();
                            self.with_builder(|b| b.store(v, slot));
                        }
                        None => carried = Some(result.id()),
                    },
                    ResultMode::Functional => carried = Some(result.id()),
                    ResultMode::Lvalue | ResultMode::Rvalue => {
                        return Err(self.gb.ctx.error(
                            ErrorKind::TypeMismatch,
                            location,
                            "cannot convert a register value to a reference",
                        ));
                    }
                },
            }
        }

        self.exit_to(target, carried, location)
    }

    fn run_try_finally(
        &mut self,
        try_expr: TermId,
        finally_expr: TermId,
        except_only: bool,
        dest: Option<ValueId>,
        location: SourceLocation,
    ) -> CompileResult<Lowered> {
        let depth = self.cleanups.len();
        self.push_cleanup(CleanupKind::Finally { expr: finally_expr }, except_only);
        let result = self.run(try_expr, dest)?;
        let mut keep_depth = depth;
        let result = self.preserve_escaping(result, dest, &mut keep_depth, location)?;
        if result.is_bottom() {
            self.discard_cleanups(depth);
        } else {
            self.cleanup_to(keep_depth)?;
        }
        Ok(result)
    }

    fn run_call(
        &mut self,
        term: TermId,
        target: TermId,
        arguments: &[TermId],
        dest: Option<ValueId>,
        location: SourceLocation,
    ) -> CompileResult<Lowered> {
        let result_ty = self.gb.ctx.type_of(term);
        let fn_ty = self.gb.ctx.type_of(target);
        let TermKind::FunctionType {
            result_mode,
            parameters,
            ..
        } = self.gb.ctx.kind(fn_ty).clone()
        else {
            return Err(self.gb.ctx.error(
                ErrorKind::TypeMismatch,
                location,
                "call target is not a function",
            ));
        };

        let arg_depth = self.cleanups.len();
        let mut ir_arguments: Vec<ValueId> = Vec::with_capacity(arguments.len() + 1);

        for (argument, parameter) in arguments.iter().zip(&parameters) {
            if parameter.mode == ParameterMode::Phantom {
                continue;
            }
            let arg_ty = self.gb.ctx.type_of(*argument);
            if parameter.mode == ParameterMode::Functional
                && self.gb.ctx.info(arg_ty).type_mode == TypeMode::Metatype
            {
                continue;
            }
            let arg_location = self.gb.ctx.location(*argument);
            let result = self.run(*argument, None)?;
            if result.is_bottom() {
                self.discard_cleanups(arg_depth);
                return Ok(Lowered::bottom(result_ty));
            }

            let value = match result.storage {
                Storage::Stack | Storage::LvalueRef => match parameter.mode {
                    ParameterMode::Input | ParameterMode::Output | ParameterMode::Io => {
                        result.id()
                    }
                    ParameterMode::Functional => {
                        let v = result.id();
                        self.with_builder(|b| b.load(v))
                    }
                    ParameterMode::Rvalue => {
                        // The callee consumes the argument; pass a copy.
                        let copy = self.alloca_term(arg_ty, arg_location)?;
                        self.copy_construct(arg_ty, copy, result.id(), arg_location)?;
                        self.push_cleanup(
                            CleanupKind::Destroy {
                                slot: copy,
                                ty: arg_ty,
                            },
                            false,
                        );
                        copy
                    }
                    ParameterMode::Phantom => unreachable!("skipped above"),
                },
                Storage::RvalueRef => match parameter.mode {
                    ParameterMode::Input | ParameterMode::Io | ParameterMode::Rvalue => {
                        result.id()
                    }
                    ParameterMode::Output => {
                        return Err(self.gb.ctx.error(
                            ErrorKind::TypeMismatch,
                            arg_location,
                            "cannot pass an r-value to an output argument",
                        ));
                    }
                    ParameterMode::Functional => {
                        return Err(self.gb.ctx.error(
                            ErrorKind::TypeMismatch,
                            arg_location,
                            "cannot pass an r-value to a functional argument",
                        ));
                    }
                    ParameterMode::Phantom => unreachable!("skipped above"),
                },
                Storage::Functional => match parameter.mode {
                    ParameterMode::Functional => result.id(),
                    ParameterMode::Input => {
                        // Spill to give the callee an address.
                        let ir_ty = self.lower_type(arg_ty, arg_location)?;
                        let slot = self.with_builder(|b| b.alloca(ir_ty));
                        let v = result.id();
                        self.with_builder(|b| b.store(v, slot));
                        self.push_cleanup(CleanupKind::StackFree { slot }, false);
                        slot
                    }
                    ParameterMode::Output | ParameterMode::Io | ParameterMode::Rvalue => {
                        return Err(self.gb.ctx.error(
                            ErrorKind::TypeMismatch,
                            arg_location,
                            "cannot pass a register value by reference",
                        ));
                    }
                    ParameterMode::Phantom => unreachable!("skipped above"),
                },
                Storage::Bottom => unreachable!("checked above"),
            };
            ir_arguments.push(value);
        }

        // Complex by-value results take a destination slot as an implicit
        // trailing argument.
        let mut sret_slot = None;
        if result_mode == ResultMode::ByValue
            && self.gb.ctx.info(result_ty).type_mode == TypeMode::Complex
        {
            let slot = match dest {
                Some(slot) => slot,
                None => {
                    let slot = self.alloca_term(result_ty, location)?;
                    // Owned by the caller's scope; registered below the
                    // argument temporaries so it survives their cleanup.
                    let entry = CleanupEntry {
                        kind: CleanupKind::Destroy {
                            slot,
                            ty: result_ty,
                        },
                        except_only: false,
                        dominator: self.cur_block,
                        landing: FxHashMap::default(),
                    };
                    self.cleanups.insert(arg_depth, entry);
                    slot
                }
            };
            ir_arguments.push(slot);
            sret_slot = Some(slot);
        }

        let callee = self.run(target, None)?;
        if callee.is_bottom() {
            self.discard_cleanups(arg_depth);
            return Ok(Lowered::bottom(result_ty));
        }
        if callee.storage != Storage::LvalueRef {
            return Err(self.gb.ctx.error(
                ErrorKind::TypeMismatch,
                location,
                "call target must be an l-value reference to a function",
            ));
        }

        let callee_value = callee.id();
        let call = self.with_builder(|b| b.call(callee_value, ir_arguments));

        // Argument temporaries die after the call, in reverse order. The
        // sret slot was registered below them and survives.
        let cleanup_floor = if sret_slot.is_some() && dest.is_none() {
            arg_depth + 1
        } else {
            arg_depth
        };
        self.cleanup_to(cleanup_floor)?;

        Ok(match result_mode {
            ResultMode::ByValue => match sret_slot {
                Some(slot) => Lowered::new(Storage::Stack, slot, result_ty),
                None => Lowered::new(Storage::Functional, call, result_ty),
            },
            ResultMode::Functional => Lowered::new(Storage::Functional, call, result_ty),
            ResultMode::Lvalue => Lowered::new(Storage::LvalueRef, call, result_ty),
            ResultMode::Rvalue => Lowered::new(Storage::RvalueRef, call, result_ty),
        })
    }

    fn run_initialize(
        &mut self,
        target: TermId,
        assign_value: TermId,
        inner: TermId,
        dest: Option<ValueId>,
        location: SourceLocation,
    ) -> CompileResult<Lowered> {
        let target_result = self.run(target, None)?;
        if target_result.is_bottom() {
            return Ok(Lowered::bottom(self.gb.ctx.type_of(inner)));
        }
        let target_ty = self.gb.ctx.type_of(target);
        let target_ptr = target_result.id();
        self.object_construct_term(target_ptr, assign_value, location)?;

        // The fresh object is torn down again if the continuation throws;
        // its storage (the global) is not released.
        let depth = self.cleanups.len();
        self.push_cleanup(
            CleanupKind::Finalize {
                ptr: target_ptr,
                ty: target_ty,
            },
            true,
        );
        let result = self.run(inner, dest)?;
        self.discard_cleanups(depth);
        Ok(result)
    }

    fn run_assign(
        &mut self,
        target: TermId,
        assign_value: TermId,
        location: SourceLocation,
    ) -> CompileResult<Lowered> {
        let empty = self.gb.ctx.empty_type();
        let target_result = self.run(target, None)?;
        if target_result.is_bottom() {
            return Ok(Lowered::bottom(empty));
        }
        let target_ty = self.gb.ctx.type_of(target);
        let target_ptr = target_result.id();

        let value = self.run(assign_value, None)?;
        if value.is_bottom() {
            return Ok(Lowered::bottom(empty));
        }
        match value.storage {
            Storage::Functional => {
                let v = value.id();
                self.with_builder(|b| b.store(v, target_ptr));
            }
            Storage::LvalueRef => {
                self.object_assign(target_ty, target_ptr, value.id(), false, location)?;
            }
            Storage::RvalueRef | Storage::Stack => {
                self.object_assign(target_ty, target_ptr, value.id(), true, location)?;
                self.destroy_now(&value)?;
            }
            Storage::Bottom => unreachable!("checked above"),
        }
        self.unit_value(location)
    }

    fn run_finalize(&mut self, target: TermId, location: SourceLocation) -> CompileResult<Lowered> {
        let empty = self.gb.ctx.empty_type();
        let target_result = self.run(target, None)?;
        if target_result.is_bottom() {
            return Ok(Lowered::bottom(empty));
        }
        let target_ty = self.gb.ctx.type_of(target);
        let ptr = target_result.id();
        self.object_fini(ptr, target_ty, location)?;
        self.unit_value(location)
    }

    pub(crate) fn unit_value(&mut self, _location: SourceLocation) -> CompileResult<Lowered> {
        let empty = self.gb.ctx.empty_type();
        let unit = {
            let state = self.gb.module_state(self.module);
            state.ir.types.unit()
        };
        let v = self.with_builder(|b| b.constant(ConstValue::Unit, unit));
        Ok(Lowered::new(Storage::Functional, v, empty))
    }
}

#[cfg(test)]
#[path = "tests/function.rs"]
mod tests;
