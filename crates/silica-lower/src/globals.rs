//! Global symbol building and scheduling.
//!
//! Each module global lowers to one IR2 symbol. The builder tracks a
//! status per global; requesting a symbol drains a work queue of its
//! dependencies, then initialiser priorities are assigned by a
//! topological pass over the initialisation-dependency edges.

use crate::consts::library_symbol_name;
use crate::function::{lower_function_body, lower_init_body};
use crate::mangle::SymbolNameSet;
use crate::storage::Defer;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use silica_common::{CompileResult, ErrorKind, SourceLocation};
use silica_ir::{ConstValue, IrLinkage, IrModule, IrTypeId, ModuleSink, SymbolId};
use silica_term::{
    CompileContext, Linkage, ModuleId, PropertyValue, StatementMode, TermId, TermKind, TypeMode,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BuildState {
    Ready,
    InProgress,
    /// Body done; initialiser still to schedule.
    Built,
    BuiltAll,
}

#[derive(Debug)]
pub(crate) struct GlobalStatus {
    state: BuildState,
    pub symbol: Option<SymbolId>,
    pub dependencies: FxHashSet<TermId>,
    pub init: Option<SymbolId>,
    pub fini: Option<SymbolId>,
    pub priority: u32,
}

impl Default for GlobalStatus {
    fn default() -> Self {
        GlobalStatus {
            state: BuildState::Ready,
            symbol: None,
            dependencies: FxHashSet::default(),
            init: None,
            fini: None,
            priority: 0,
        }
    }
}

/// Cached instantiation of a static implementation (one-definition
/// overload global).
pub(crate) struct ImplEntry {
    pub value: ConstValue,
    pub dependencies: FxHashSet<TermId>,
}

/// Per-module lowering state.
pub struct ModuleState {
    pub ir: IrModule,
    pub names: SymbolNameSet,
    /// Declared symbols per global term.
    pub(crate) symbols: FxHashMap<TermId, SymbolId>,
    pub(crate) type_cache: FxHashMap<TermId, IrTypeId>,
    /// Recursive lowering of generic instances, keyed by instance term.
    pub(crate) instance_cache: FxHashMap<TermId, IrTypeId>,
    pub(crate) impl_cache: FxHashMap<(TermId, Vec<TermId>), ImplEntry>,
}

impl ModuleState {
    fn new(name: &str) -> Self {
        ModuleState {
            ir: IrModule::new(name),
            names: SymbolNameSet::new(),
            symbols: FxHashMap::default(),
            type_cache: FxHashMap::default(),
            instance_cache: FxHashMap::default(),
            impl_cache: FxHashMap::default(),
        }
    }
}

/// Lowers module globals to IR2 symbols and schedules initialisers.
pub struct GlobalBuilder<'ctx> {
    pub ctx: &'ctx mut CompileContext,
    /// Insertion-ordered so emission order follows module creation.
    pub(crate) modules: IndexMap<ModuleId, ModuleState>,
    pub(crate) statuses: FxHashMap<TermId, GlobalStatus>,
    /// Build-target description handed to target callbacks.
    pub target: PropertyValue,
    /// Host-target description (differs from `target` when cross
    /// compiling for a JIT host).
    pub host_target: PropertyValue,
}

impl<'ctx> GlobalBuilder<'ctx> {
    pub fn new(ctx: &'ctx mut CompileContext) -> Self {
        GlobalBuilder {
            ctx,
            modules: IndexMap::new(),
            statuses: FxHashMap::default(),
            target: PropertyValue::Null,
            host_target: PropertyValue::Null,
        }
    }

    pub fn with_target(mut self, target: PropertyValue) -> Self {
        self.host_target = target.clone();
        self.target = target;
        self
    }

    pub(crate) fn module_state(&mut self, module: ModuleId) -> &mut ModuleState {
        let name = self.ctx.module(module).name.clone();
        self.modules
            .entry(module)
            .or_insert_with(|| ModuleState::new(&name))
    }

    pub(crate) fn status(&mut self, global: TermId) -> &mut GlobalStatus {
        self.statuses.entry(global).or_default()
    }

    /// The module a global belongs to.
    pub(crate) fn global_module(&mut self, global: TermId, location: SourceLocation) -> CompileResult<ModuleId> {
        match *self.ctx.kind(global) {
            TermKind::GlobalVariable { module, .. }
            | TermKind::Function { module, .. }
            | TermKind::GlobalStatement { module, .. }
            | TermKind::GlobalEvaluate { module, .. } => Ok(module),
            _ => Err(self.ctx.error(
                ErrorKind::InternalInvariant,
                location,
                "not a module global",
            )),
        }
    }

    fn global_linkage(&self, global: TermId) -> Linkage {
        match *self.ctx.kind(global) {
            TermKind::GlobalVariable { linkage, .. }
            | TermKind::Function { linkage, .. }
            | TermKind::GlobalStatement { linkage, .. } => linkage,
            _ => Linkage::Private,
        }
    }

    fn ir_linkage(linkage: Linkage, same_module: bool) -> IrLinkage {
        match linkage {
            Linkage::Local => IrLinkage::Local,
            Linkage::Private => IrLinkage::Private,
            Linkage::OneDefinition => IrLinkage::OneDefinition,
            Linkage::Public => {
                if same_module {
                    IrLinkage::Export
                } else {
                    IrLinkage::Import
                }
            }
            Linkage::None => IrLinkage::Private,
        }
    }

    /// The stored type of a global.
    pub(crate) fn global_type(&mut self, global: TermId, location: SourceLocation) -> CompileResult<TermId> {
        match self.ctx.kind(global).clone() {
            TermKind::GlobalVariable { ty, .. } | TermKind::Function { ty, .. } => Ok(ty),
            TermKind::GlobalStatement { value, .. } | TermKind::GlobalEvaluate { value, .. } => {
                Ok(self.ctx.type_of(value))
            }
            TermKind::LibrarySymbol { ty, .. } => Ok(ty),
            _ => Err(self.ctx.error(
                ErrorKind::InternalInvariant,
                location,
                "not a global",
            )),
        }
    }

    /// Declare a symbol for `global` in `in_module`, creating the
    /// declaration on first use. Does not lower the global's body.
    pub(crate) fn declare_global(
        &mut self,
        in_module: ModuleId,
        global: TermId,
    ) -> CompileResult<SymbolId> {
        let location = self.ctx.location(global);

        if let TermKind::LibrarySymbol { callback, ty, .. } = self.ctx.kind(global).clone() {
            if let Some(&symbol) = self.module_state(in_module).symbols.get(&global) {
                return Ok(symbol);
            }
            let description = self
                .ctx
                .target_callback(callback)
                .evaluate(&self.target, &self.host_target);
            let name = library_symbol_name(self.ctx, &description, location)?;
            let ir_ty = self.lower_type(in_module, ty, location)?;
            let state = self.module_state(in_module);
            let symbol = match state.ir.get_member(&name) {
                Some(existing) => existing,
                None => state.ir.new_member(name, ir_ty, IrLinkage::Import),
            };
            state.symbols.insert(global, symbol);
            return Ok(symbol);
        }

        let own_module = self.global_module(global, location)?;
        if let Some(&symbol) = self.module_state(in_module).symbols.get(&global) {
            return Ok(symbol);
        }

        if let TermKind::GlobalStatement { mode, .. } = *self.ctx.kind(global) {
            if mode != StatementMode::Value {
                return Err(self.ctx.error(
                    ErrorKind::TypeMismatch,
                    location,
                    "global statements which are not of value type do not have storage",
                ));
            }
        }

        let linkage = self.global_linkage(global);
        let same_module = own_module == in_module;
        if !same_module && linkage != Linkage::Public {
            return Err(self.ctx.error(
                ErrorKind::TypeMismatch,
                location,
                "module-private global used in a different module",
            ));
        }

        let explicit_name = match self.ctx.kind(global) {
            TermKind::GlobalVariable { symbol_name, .. } | TermKind::Function { symbol_name, .. } => {
                symbol_name.clone()
            }
            _ => None,
        };

        let ty = self.global_type(global, location)?;
        let ir_ty = self.lower_type(in_module, ty, location)?;
        let paths = &self.ctx.paths;
        let state = self.modules.get_mut(&in_module).expect("state created above");
        let name = match explicit_name {
            Some(name) => name,
            None => state
                .names
                .path_name(paths, location.logical, linkage == Linkage::Local),
        };
        if state.ir.get_member(&name).is_some() {
            // This global has no symbol yet (checked above), so the name
            // belongs to a different definition.
            return Err(self.ctx.error(
                ErrorKind::TypeMismatch,
                location,
                format!("conflicting global symbol name {name:?}"),
            ));
        }
        let symbol = state
            .ir
            .new_member(name, ir_ty, Self::ir_linkage(linkage, same_module));
        state.symbols.insert(global, symbol);
        if same_module {
            self.status(global).symbol = Some(symbol);
        }
        Ok(symbol)
    }

    /// Lower one global's body, synthesising an initialiser (and for
    /// complex types a finaliser) when the value cannot be computed at
    /// link time.
    fn run_module_global(&mut self, global: TermId) -> CompileResult<()> {
        let location = self.ctx.location(global);
        let module = self.global_module(global, location)?;
        let symbol = self.declare_global(module, global)?;
        let _span = tracing::debug_span!("lower_global", symbol = symbol.0).entered();

        match self.ctx.kind(global).clone() {
            TermKind::Function { .. } => {
                let mut dependencies = FxHashSet::default();
                let body = lower_function_body(self, module, global, &mut dependencies)?;
                self.module_state(module).ir.set_body(symbol, body);
                self.status(global).dependencies.extend(dependencies);
            }
            TermKind::GlobalVariable {
                ty,
                value,
                constant,
                merge,
                ..
            } => {
                self.run_global_value(global, module, symbol, ty, value, constant, merge)?;
            }
            TermKind::GlobalStatement { value, .. } => {
                let ty = self.ctx.type_of(value);
                self.run_global_value(global, module, symbol, ty, value, false, false)?;
            }
            TermKind::GlobalEvaluate { value, .. } => {
                let ty = self.ctx.type_of(value);
                self.run_global_value(global, module, symbol, ty, value, true, false)?;
            }
            _ => {
                return Err(self.ctx.error(
                    ErrorKind::InternalInvariant,
                    location,
                    "unknown module global kind",
                ));
            }
        }
        Ok(())
    }

    fn run_global_value(
        &mut self,
        global: TermId,
        module: ModuleId,
        symbol: SymbolId,
        ty: TermId,
        value: TermId,
        constant: bool,
        merge: bool,
    ) -> CompileResult<()> {
        let location = self.ctx.location(global);
        if self.ctx.has_free_anonymous(value) {
            return Err(self.ctx.error(
                ErrorKind::InternalInvariant,
                location,
                "global value reaches an unbound placeholder",
            ));
        }

        let mut dependencies = FxHashSet::default();
        match self.lower_const(module, value, &mut dependencies) {
            Ok(const_value) => {
                let state = self.module_state(module);
                state.ir.set_value(symbol, const_value);
                state.ir.symbol_mut(symbol).constant = constant;
                state.ir.symbol_mut(symbol).merge = merge;
            }
            Err(Defer::Error(error)) => return Err(error),
            Err(Defer::NotGlobal) => {
                tracing::debug!(global = global.0, "value not link-time constant, synthesising initialiser");
                let ir_ty = self.lower_type(module, ty, location)?;
                let state = self.module_state(module);
                state.ir.set_value(symbol, ConstValue::Undef(ir_ty));

                let init = self.synthesize_lifecycle_fn(module, global, value, true, &mut dependencies)?;
                self.status(global).init = Some(init);

                if self.ctx.info(ty).type_mode == TypeMode::Complex {
                    let fini =
                        self.synthesize_lifecycle_fn(module, global, value, false, &mut dependencies)?;
                    self.status(global).fini = Some(fini);
                }
            }
        }
        self.status(global).dependencies.extend(dependencies);
        Ok(())
    }

    /// Synthesise a module-load constructor (or destructor) function for a
    /// global whose value is not link-time computable.
    fn synthesize_lifecycle_fn(
        &mut self,
        module: ModuleId,
        global: TermId,
        value: TermId,
        init: bool,
        dependencies: &mut FxHashSet<TermId>,
    ) -> CompileResult<SymbolId> {
        let location = self.ctx.location(global);
        let body_term = if init {
            let empty = self.ctx.empty_value();
            self.ctx.initialize_value(global, value, empty, location)?
        } else {
            self.ctx.finalize_value(global, location)?
        };

        let unit = {
            let state = self.module_state(module);
            state.ir.types.intern(silica_ir::IrType::Function {
                parameters: Vec::new(),
                result: None,
                sret: false,
            })
        };
        let base = if init { "_Y_ctor" } else { "_Y_dtor" };
        let name = self.module_state(module).names.unique_name(base);
        let symbol = self
            .module_state(module)
            .ir
            .new_member(name, unit, IrLinkage::Local);

        let body = lower_init_body(self, module, body_term, dependencies)?;
        self.module_state(module).ir.set_body(symbol, body);
        Ok(symbol)
    }

    /// Which initialised globals this one's initialiser must wait for.
    ///
    /// Walks dependency edges transitively through built globals that have
    /// no initialiser of their own. With `already_built`, globals already
    /// fully scheduled count as dependencies directly.
    fn initializer_dependencies(
        &mut self,
        global: TermId,
        already_built: bool,
    ) -> FxHashSet<TermId> {
        let mut out = FxHashSet::default();
        let mut visited = FxHashSet::default();
        let mut queue = vec![global];
        while let Some(current) = queue.pop() {
            let deps: Vec<TermId> = self.status(current).dependencies.iter().copied().collect();
            for dep in deps {
                let status = self.status(dep);
                match status.state {
                    BuildState::Built => {
                        if status.init.is_some() {
                            out.insert(dep);
                        } else if visited.insert(dep) {
                            queue.push(dep);
                        }
                    }
                    BuildState::BuiltAll => {
                        if already_built {
                            out.insert(dep);
                        }
                    }
                    _ => {}
                }
            }
        }
        out
    }

    /// Build a global and everything it depends on, then assign
    /// initialiser priorities for the newly built set.
    pub fn build_global(&mut self, global: TermId) -> CompileResult<SymbolId> {
        let mut queue = vec![global];
        let mut visited = FxHashSet::default();
        visited.insert(global);

        while let Some(current) = queue.pop() {
            match self.status(current).state {
                BuildState::Built | BuildState::BuiltAll => {}
                BuildState::InProgress => {
                    let location = self.ctx.location(current);
                    return Err(self.ctx.error(
                        ErrorKind::CircularGlobal,
                        location,
                        "circular dependency amongst global variables",
                    ));
                }
                BuildState::Ready => {
                    self.status(current).state = BuildState::InProgress;
                    self.run_module_global(current)?;
                    self.status(current).state = BuildState::Built;
                }
            }

            if self.status(current).state == BuildState::BuiltAll {
                continue;
            }
            let deps: Vec<TermId> = self.status(current).dependencies.iter().copied().collect();
            for dep in deps {
                if visited.insert(dep) {
                    queue.push(dep);
                }
            }
        }

        self.schedule_initializers(global, &visited)?;

        let status = self.status(global);
        debug_assert_eq!(status.state, BuildState::BuiltAll);
        let symbol = status.symbol;
        match symbol {
            Some(symbol) => Ok(symbol),
            None => {
                let location = self.ctx.location(global);
                Err(self.ctx.error(
                    ErrorKind::InternalInvariant,
                    location,
                    "global built without a symbol",
                ))
            }
        }
    }

    /// Topologically order the initialisers among `visited` and assign
    /// priorities `1 + max(dependency priorities)`.
    fn schedule_initializers(
        &mut self,
        requested: TermId,
        visited: &FxHashSet<TermId>,
    ) -> CompileResult<()> {
        let mut with_init: Vec<TermId> = visited
            .iter()
            .copied()
            .filter(|&g| {
                let status = self.status(g);
                status.state == BuildState::Built && status.init.is_some()
            })
            .collect();
        // Deterministic processing order regardless of set iteration.
        with_init.sort_unstable();

        let mut edges: FxHashMap<TermId, Vec<TermId>> = FxHashMap::default();
        let mut in_degree: FxHashMap<TermId, usize> = FxHashMap::default();
        for &g in &with_init {
            in_degree.entry(g).or_insert(0);
        }
        for &g in &with_init {
            for dep in self.initializer_dependencies(g, false) {
                if in_degree.contains_key(&dep) {
                    edges.entry(dep).or_default().push(g);
                    *in_degree.entry(g).or_insert(0) += 1;
                }
            }
        }

        let mut ready: Vec<TermId> = with_init
            .iter()
            .copied()
            .filter(|g| in_degree[g] == 0)
            .collect();
        let mut sorted = Vec::with_capacity(with_init.len());
        while let Some(g) = ready.pop() {
            sorted.push(g);
            if let Some(successors) = edges.get(&g) {
                for &s in &successors.clone() {
                    let d = in_degree.get_mut(&s).expect("successor registered");
                    *d -= 1;
                    if *d == 0 {
                        ready.push(s);
                    }
                }
            }
        }

        if sorted.len() != with_init.len() {
            let location = self.ctx.location(requested);
            let mut error = silica_common::CompileError::new(
                ErrorKind::CircularGlobal,
                location,
                "circular dependency found in global initialisers",
            );
            let mut cycle: Vec<TermId> = with_init
                .iter()
                .copied()
                .filter(|g| !sorted.contains(g))
                .collect();
            cycle.sort_unstable();
            for g in cycle {
                let name = self.ctx.paths.display(self.ctx.location(g).logical);
                error = error.with_related(
                    self.ctx.location(g),
                    format!("{name} participates in the initialiser cycle"),
                );
            }
            return Err(self.ctx.reporter.emit(error));
        }

        for &g in &sorted {
            let mut priority = 0;
            for dep in self.initializer_dependencies(g, true) {
                priority = priority.max(self.status(dep).priority + 1);
            }
            let location = self.ctx.location(g);
            let module = self.global_module(g, location)?;
            {
                let status = self.status(g);
                status.state = BuildState::BuiltAll;
                status.priority = priority;
            }
            let (init, fini) = {
                let status = self.status(g);
                (status.init, status.fini)
            };
            let state = self.module_state(module);
            let init = init.expect("scheduled globals carry an initialiser");
            state.ir.constructors.push((init, priority));
            if let Some(fini) = fini {
                state.ir.destructors.push((fini, priority));
            }
            tracing::debug!(global = g.0, priority, "scheduled initialiser");
        }

        let mut remaining: Vec<TermId> = visited
            .iter()
            .copied()
            .filter(|&g| self.status(g).state == BuildState::Built)
            .collect();
        remaining.sort_unstable();
        for g in remaining {
            let mut priority = 0;
            for dep in self.initializer_dependencies(g, false) {
                priority = priority.max(self.status(dep).priority);
            }
            let status = self.status(g);
            status.state = BuildState::BuiltAll;
            status.priority = priority;
        }

        Ok(())
    }

    /// Finish and hand each module to the sink, constructor lists ordered
    /// by ascending priority and destructor lists by descending priority.
    pub fn emit_to(mut self, sink: &mut dyn ModuleSink) {
        for (_, mut state) in self.modules.drain(..) {
            state.ir.constructors.sort_by_key(|&(_, priority)| priority);
            state
                .ir
                .destructors
                .sort_by_key(|&(_, priority)| std::cmp::Reverse(priority));
            sink.emit(&state.ir);
        }
    }

    /// Take a finished module out of the builder (test convenience).
    pub fn take_module(&mut self, module: ModuleId) -> Option<IrModule> {
        self.modules.shift_remove(&module).map(|mut state| {
            state.ir.constructors.sort_by_key(|&(_, priority)| priority);
            state
                .ir
                .destructors
                .sort_by_key(|&(_, priority)| std::cmp::Reverse(priority));
            state.ir
        })
    }
}

#[cfg(test)]
#[path = "tests/globals.rs"]
mod tests;
