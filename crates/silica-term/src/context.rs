//! The compile context: owner of all IR1 state for one compilation.
//!
//! A `CompileContext` owns the term arena, the logical-path interner, the
//! diagnostic reporter, the generic-type side table and the module table.
//! It is single-threaded; independent contexts share nothing.

use crate::callbacks::TargetCallback;
use crate::term::{
    GenericId, ModuleId, TargetCallbackId, TermArena, TermId, TermInfo, TermKind,
};
use silica_common::{
    CompileError, CompileResult, ErrorKind, ErrorReporter, PathInterner, SourceLocation,
};

/// Primitive-mode of a generic type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenericPrimitive {
    /// Instances are always primitive.
    Always,
    /// Instances always have non-trivial lifecycle.
    Never,
    /// Instances are primitive iff the instantiated body is.
    Recurse,
}

/// One-shot memoised body of a generic type.
pub enum DelayedBody {
    /// Not yet evaluated.
    Pending(Box<dyn FnOnce(&mut CompileContext, GenericId) -> CompileResult<TermId>>),
    /// Evaluation in progress; re-entry is a `CircularGeneric` error.
    Running,
    Done(TermId),
    /// Evaluation failed; later accesses re-raise.
    Failed,
}

pub struct GenericData {
    /// Parameter pattern; entry `i` may reference earlier entries as
    /// `Parameter(0, j)` with `j < i`.
    pub pattern: Vec<TermId>,
    pub primitive_mode: GenericPrimitive,
    pub body: DelayedBody,
    /// Overload values attached to this generic, searched during dispatch.
    pub overloads: Vec<TermId>,
    pub location: SourceLocation,
}

pub struct ModuleData {
    pub name: String,
    pub location: SourceLocation,
    pub globals: Vec<TermId>,
}

/// Context-wide options.
#[derive(Clone, Copy, Debug)]
pub struct CoreOptions {
    /// Keep compiling the unit after a local error.
    pub multi_error: bool,
    /// Mark one-definition overload globals as mergeable.
    pub merge_one_definition: bool,
}

impl Default for CoreOptions {
    fn default() -> Self {
        CoreOptions {
            multi_error: true,
            merge_one_definition: true,
        }
    }
}

/// Well-known terms created once per context.
#[derive(Clone, Copy, Debug)]
pub struct Builtins {
    pub metatype: TermId,
    pub bottom_type: TermId,
    pub empty_type: TermId,
    pub empty_value: TermId,
    pub boolean_type: TermId,
    pub upref_type: TermId,
    pub upref_null: TermId,
    /// The size type: pointer-sized unsigned integer.
    pub size_type: TermId,
    pub movable_interface: TermId,
    pub copyable_interface: TermId,
}

pub struct CompileContext {
    pub arena: TermArena,
    pub paths: PathInterner,
    pub reporter: ErrorReporter,
    pub options: CoreOptions,
    generics: Vec<GenericData>,
    modules: Vec<ModuleData>,
    target_callbacks: Vec<Box<dyn TargetCallback>>,
    builtins: Option<Builtins>,
}

impl CompileContext {
    pub fn new() -> Self {
        let mut ctx = CompileContext {
            arena: TermArena::new(),
            paths: PathInterner::new(),
            reporter: ErrorReporter::new(),
            options: CoreOptions::default(),
            generics: Vec::new(),
            modules: Vec::new(),
            target_callbacks: Vec::new(),
            builtins: None,
        };
        crate::builder::make_builtins(&mut ctx);
        ctx
    }

    #[inline]
    pub fn builtins(&self) -> Builtins {
        self.builtins.expect("context builtins initialised in new()")
    }

    #[inline]
    pub(crate) fn set_builtins(&mut self, builtins: Builtins) {
        self.builtins = Some(builtins);
    }

    pub(crate) fn update_builtins(&mut self, f: impl FnOnce(&mut Builtins)) {
        let mut b = self.builtins();
        f(&mut b);
        self.builtins = Some(b);
    }

    // ----- Term access -----

    #[inline]
    pub fn kind(&self, id: TermId) -> &TermKind {
        self.arena.kind(id)
    }

    #[inline]
    pub fn info(&self, id: TermId) -> TermInfo {
        self.arena.info(id)
    }

    #[inline]
    pub fn location(&self, id: TermId) -> SourceLocation {
        self.arena.location(id)
    }

    /// The type of a term; the metatype for terms typed by the sentinel.
    pub fn type_of(&self, id: TermId) -> TermId {
        self.arena
            .info(id)
            .ty
            .unwrap_or_else(|| self.builtins().metatype)
    }

    // ----- Errors -----

    /// Build, record and return an error.
    pub fn error(
        &mut self,
        kind: ErrorKind,
        location: SourceLocation,
        message: impl Into<String>,
    ) -> CompileError {
        self.reporter
            .emit(CompileError::new(kind, location, message))
    }

    // ----- Generics -----

    pub fn register_generic(&mut self, data: GenericData) -> GenericId {
        let id = GenericId(self.generics.len() as u32);
        self.generics.push(data);
        id
    }

    #[inline]
    pub fn generic(&self, id: GenericId) -> &GenericData {
        &self.generics[id.0 as usize]
    }

    #[inline]
    pub fn generic_mut(&mut self, id: GenericId) -> &mut GenericData {
        &mut self.generics[id.0 as usize]
    }

    /// Attach an overload value to a generic so dispatch can find it from
    /// instances of the generic.
    pub fn add_generic_overload(&mut self, id: GenericId, overload_value: TermId) {
        self.generics[id.0 as usize].overloads.push(overload_value);
    }

    /// Evaluate a generic's delayed body, at most once.
    ///
    /// Re-entrant evaluation raises `CircularGeneric`; a failed body
    /// re-raises on every later access.
    pub fn generic_body(&mut self, id: GenericId) -> CompileResult<TermId> {
        let location = self.generics[id.0 as usize].location;
        match &self.generics[id.0 as usize].body {
            DelayedBody::Done(body) => return Ok(*body),
            DelayedBody::Running => {
                return Err(self.error(
                    ErrorKind::CircularGeneric,
                    location,
                    "generic type body depends on its own resolved body",
                ));
            }
            DelayedBody::Failed => {
                return Err(self.error(
                    ErrorKind::CircularGeneric,
                    location,
                    "generic type body previously failed to build",
                ));
            }
            DelayedBody::Pending(_) => {}
        }
        let DelayedBody::Pending(callback) =
            std::mem::replace(&mut self.generics[id.0 as usize].body, DelayedBody::Running)
        else {
            unreachable!("checked pending above");
        };
        match callback(self, id) {
            Ok(body) => {
                self.generics[id.0 as usize].body = DelayedBody::Done(body);
                Ok(body)
            }
            Err(err) => {
                self.generics[id.0 as usize].body = DelayedBody::Failed;
                Err(err)
            }
        }
    }

    /// Whether the generic's body has already been evaluated.
    pub fn generic_body_ready(&self, id: GenericId) -> Option<TermId> {
        match self.generic(id).body {
            DelayedBody::Done(body) => Some(body),
            _ => None,
        }
    }

    // ----- Modules -----

    pub fn new_module(&mut self, name: impl Into<String>, location: SourceLocation) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(ModuleData {
            name: name.into(),
            location,
            globals: Vec::new(),
        });
        id
    }

    #[inline]
    pub fn module(&self, id: ModuleId) -> &ModuleData {
        &self.modules[id.0 as usize]
    }

    pub(crate) fn add_module_global(&mut self, module: ModuleId, global: TermId) {
        self.modules[module.0 as usize].globals.push(global);
    }

    // ----- Target callbacks -----

    pub fn register_target_callback(&mut self, callback: Box<dyn TargetCallback>) -> TargetCallbackId {
        let id = TargetCallbackId(self.target_callbacks.len() as u32);
        self.target_callbacks.push(callback);
        id
    }

    #[inline]
    pub fn target_callback(&self, id: TargetCallbackId) -> &dyn TargetCallback {
        self.target_callbacks[id.0 as usize].as_ref()
    }
}

impl Default for CompileContext {
    fn default() -> Self {
        CompileContext::new()
    }
}
