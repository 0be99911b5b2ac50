//! Link-time lowering of pure terms: types, constant values and
//! one-definition overload globals.
//!
//! `lower_const` is the global-scope functional builder. A value that is
//! pure but not computable at link time reports `Defer::NotGlobal`, which
//! the global builder turns into initialiser synthesis; it never escapes
//! this crate.

use crate::globals::{GlobalBuilder, ImplEntry};
use crate::mangle::SymbolNameBuilder;
use crate::storage::{Defer, GlobalResult};
use rustc_hash::FxHashSet;
use silica_common::{CompileResult, ErrorKind, SourceLocation};
use silica_ir::{ConstValue, IrScalar, IrType, IrTypeId};
use silica_term::{
    dispatch, instance_unwrap, specialize, CompileContext, ModuleId, ParameterMode, PropertyValue,
    ResultMode, ScalarKind, StatementMode, TermId, TermKind, TypeMode,
};

pub(crate) fn scalar_ir(scalar: ScalarKind) -> IrScalar {
    match scalar {
        ScalarKind::Bool => IrScalar::Bool,
        ScalarKind::I8 => IrScalar::I8,
        ScalarKind::I16 => IrScalar::I16,
        ScalarKind::I32 => IrScalar::I32,
        ScalarKind::I64 => IrScalar::I64,
        ScalarKind::U8 => IrScalar::U8,
        ScalarKind::U16 => IrScalar::U16,
        ScalarKind::U32 => IrScalar::U32,
        ScalarKind::U64 => IrScalar::U64,
        ScalarKind::IPtr => IrScalar::IPtr,
        ScalarKind::UPtr => IrScalar::UPtr,
    }
}

/// Resolve a library symbol description (`{"type": "c", "name": ...}`) to
/// its link name.
pub(crate) fn library_symbol_name(
    ctx: &mut CompileContext,
    description: &PropertyValue,
    location: SourceLocation,
) -> CompileResult<String> {
    let Some(kind) = description.path_str("type") else {
        return Err(ctx.error(
            ErrorKind::TypeMismatch,
            location,
            "library symbol description is missing property 'type'",
        ));
    };
    if kind != "c" {
        return Err(ctx.error(
            ErrorKind::TypeMismatch,
            location,
            format!("unrecognised library symbol type {kind:?}"),
        ));
    }
    match description.path_str("name") {
        Some(name) => Ok(name.to_string()),
        None => Err(ctx.error(
            ErrorKind::TypeMismatch,
            location,
            "library symbol description is missing property 'name'",
        )),
    }
}

impl GlobalBuilder<'_> {
    /// Lower a type term to an IR type in `module`'s table.
    pub(crate) fn lower_type(
        &mut self,
        module: ModuleId,
        ty: TermId,
        location: SourceLocation,
    ) -> CompileResult<IrTypeId> {
        if let Some(&cached) = self.module_state(module).type_cache.get(&ty) {
            return Ok(cached);
        }
        let kind = self.ctx.kind(ty).clone();
        let lowered = match kind {
            // Zero-sized at runtime: type values are erased.
            TermKind::Metatype
            | TermKind::EmptyType
            | TermKind::BottomType
            | TermKind::ConstantType { .. } => self.module_state(module).ir.types.unit(),
            TermKind::BooleanType => self.module_state(module).ir.types.scalar(IrScalar::Bool),
            TermKind::NumberType(scalar) => {
                let s = scalar_ir(scalar);
                self.module_state(module).ir.types.scalar(s)
            }
            TermKind::UprefType => self.module_state(module).ir.types.scalar(IrScalar::IPtr),
            TermKind::PointerType { target, .. } => {
                let inner = self.lower_type(module, target, location)?;
                self.module_state(module).ir.types.pointer(inner)
            }
            TermKind::StringType { length } => {
                let len = self.ctx.size_from(length, location)?;
                let byte = self.module_state(module).ir.types.scalar(IrScalar::U8);
                self.module_state(module)
                    .ir
                    .types
                    .intern(IrType::Array(byte, len))
            }
            TermKind::ArrayType { element, length } => {
                let len = self.ctx.size_from(length, location)?;
                let inner = self.lower_type(module, element, location)?;
                self.module_state(module)
                    .ir
                    .types
                    .intern(IrType::Array(inner, len))
            }
            TermKind::StructType { members } => {
                let mut lowered = Vec::with_capacity(members.len());
                for member in members {
                    lowered.push(self.lower_type(module, member, location)?);
                }
                self.module_state(module)
                    .ir
                    .types
                    .intern(IrType::Struct(lowered))
            }
            TermKind::UnionType { members } => {
                let mut lowered = Vec::with_capacity(members.len());
                for member in members {
                    lowered.push(self.lower_type(module, member, location)?);
                }
                self.module_state(module)
                    .ir
                    .types
                    .intern(IrType::Union(lowered))
            }
            TermKind::FunctionType {
                result_mode,
                result,
                parameters,
                ..
            } => self.lower_function_type(module, result_mode, result, &parameters, location)?,
            TermKind::DerivedType { value_type, .. } => {
                self.lower_type(module, value_type, location)?
            }
            TermKind::Exists { result, .. } => self.lower_type(module, result, location)?,
            TermKind::TypeInstance { .. } => self.lower_instance(module, ty, location)?,
            TermKind::StatementRef { statement } => {
                let value = match *self.ctx.kind(statement) {
                    TermKind::Statement { value, mode } if mode == StatementMode::Functional => {
                        value
                    }
                    TermKind::GlobalStatement { value, mode, .. }
                        if mode == StatementMode::Functional =>
                    {
                        value
                    }
                    _ => {
                        return Err(self.ctx.error(
                            ErrorKind::TypeMismatch,
                            location,
                            "type depends on a non-functional local",
                        ));
                    }
                };
                self.lower_type(module, value, location)?
            }
            TermKind::Parameter { .. } => {
                return Err(self.ctx.error(
                    ErrorKind::TypeMismatch,
                    location,
                    "type is not concrete at this point",
                ));
            }
            _ => {
                return Err(self.ctx.error(
                    ErrorKind::MalformedTerm,
                    location,
                    "a type is required here",
                ));
            }
        };
        self.module_state(module).type_cache.insert(ty, lowered);
        Ok(lowered)
    }

    fn lower_function_type(
        &mut self,
        module: ModuleId,
        result_mode: ResultMode,
        result: TermId,
        parameters: &[silica_term::FunctionParameter],
        location: SourceLocation,
    ) -> CompileResult<IrTypeId> {
        let mut lowered_parameters = Vec::new();
        for parameter in parameters {
            if parameter.mode == ParameterMode::Phantom {
                continue;
            }
            // Metatype-valued functional parameters are compile-time only.
            if parameter.mode == ParameterMode::Functional
                && self.ctx.info(parameter.ty).type_mode == TypeMode::Metatype
            {
                continue;
            }
            let inner = self.lower_type(module, parameter.ty, location)?;
            let lowered = match parameter.mode {
                ParameterMode::Functional => inner,
                _ => self.module_state(module).ir.types.pointer(inner),
            };
            lowered_parameters.push(lowered);
        }

        let (result_ty, sret) = match result_mode {
            ResultMode::Functional => {
                let inner = self.lower_type(module, result, location)?;
                let unit = self.module_state(module).ir.types.unit();
                (if inner == unit { None } else { Some(inner) }, false)
            }
            ResultMode::ByValue => {
                if self.ctx.info(result).type_mode == TypeMode::Complex {
                    // Returned through a trailing destination pointer.
                    (None, true)
                } else {
                    let inner = self.lower_type(module, result, location)?;
                    let unit = self.module_state(module).ir.types.unit();
                    (if inner == unit { None } else { Some(inner) }, false)
                }
            }
            ResultMode::Lvalue | ResultMode::Rvalue => {
                let inner = self.lower_type(module, result, location)?;
                let ptr = self.module_state(module).ir.types.pointer(inner);
                (Some(ptr), false)
            }
        };

        Ok(self.module_state(module).ir.types.intern(IrType::Function {
            parameters: lowered_parameters,
            result: result_ty,
            sret,
        }))
    }

    /// Lower a generic instance as a recursive IR type, registering the
    /// definition before lowering the body so self-reference terminates.
    fn lower_instance(
        &mut self,
        module: ModuleId,
        instance: TermId,
        location: SourceLocation,
    ) -> CompileResult<IrTypeId> {
        if let Some(&cached) = self.module_state(module).instance_cache.get(&instance) {
            return Ok(cached);
        }
        let (recursive, apply) = {
            let types = &mut self.module_state(module).ir.types;
            let recursive = types.new_recursive(Vec::new());
            let apply = types.intern(IrType::Apply {
                recursive,
                arguments: Vec::new(),
            });
            (recursive, apply)
        };
        self.module_state(module)
            .instance_cache
            .insert(instance, apply);

        let body = instance_unwrap(self.ctx, instance, location)?;
        let lowered = self.lower_type(module, body, location)?;
        self.module_state(module)
            .ir
            .types
            .resolve_recursive(recursive, lowered);
        Ok(apply)
    }

    /// The zero value of a primitive type.
    pub(crate) fn zero_const(
        &mut self,
        module: ModuleId,
        ty: TermId,
        location: SourceLocation,
    ) -> GlobalResult<ConstValue> {
        let kind = self.ctx.kind(ty).clone();
        let value = match kind {
            TermKind::EmptyType | TermKind::Metatype | TermKind::ConstantType { .. } => {
                ConstValue::Unit
            }
            TermKind::BooleanType => ConstValue::Bool(false),
            TermKind::NumberType(scalar) => {
                let s = scalar_ir(scalar);
                let ir = self.module_state(module).ir.types.scalar(s);
                ConstValue::Int { ty: ir, value: 0 }
            }
            TermKind::PointerType { .. } => {
                let ir = self.lower_type(module, ty, location)?;
                ConstValue::Null(ir)
            }
            TermKind::StringType { length } => {
                let len = self.ctx.size_from(length, location).map_err(Defer::Error)?;
                ConstValue::Bytes(vec![0; len as usize])
            }
            TermKind::ArrayType { element, length } => {
                let len = self.ctx.size_from(length, location).map_err(Defer::Error)?;
                let element = self.zero_const(module, element, location)?;
                ConstValue::Array(vec![element; len as usize])
            }
            TermKind::StructType { members } => {
                let mut out = Vec::with_capacity(members.len());
                for member in members {
                    out.push(self.zero_const(module, member, location)?);
                }
                ConstValue::Struct(out)
            }
            TermKind::UnionType { members } => {
                let ir = self.lower_type(module, ty, location)?;
                let Some(&first) = members.first() else {
                    return Ok(ConstValue::Unit);
                };
                let value = self.zero_const(module, first, location)?;
                ConstValue::Union {
                    ty: ir,
                    index: 0,
                    value: Box::new(value),
                }
            }
            TermKind::DerivedType { value_type, .. } => {
                self.zero_const(module, value_type, location)?
            }
            TermKind::TypeInstance { .. } => {
                if self.ctx.info(ty).type_mode != TypeMode::Primitive {
                    return Err(Defer::NotGlobal);
                }
                let body = instance_unwrap(self.ctx, ty, location).map_err(Defer::Error)?;
                self.zero_const(module, body, location)?
            }
            _ => return Err(Defer::NotGlobal),
        };
        Ok(value)
    }

    /// Lower a pure term to a link-time constant.
    ///
    /// Referenced globals are declared (not built) and recorded in `deps`
    /// for the scheduler.
    pub(crate) fn lower_const(
        &mut self,
        module: ModuleId,
        term: TermId,
        deps: &mut FxHashSet<TermId>,
    ) -> GlobalResult<ConstValue> {
        let location = self.ctx.location(term);
        let kind = self.ctx.kind(term).clone();
        let value = match kind {
            TermKind::EmptyValue | TermKind::UprefNull => ConstValue::Unit,
            TermKind::BooleanValue(b) => ConstValue::Bool(b),
            TermKind::IntegerValue { scalar, value } => {
                let s = scalar_ir(scalar);
                let ir = self.module_state(module).ir.types.scalar(s);
                ConstValue::Int { ty: ir, value }
            }
            TermKind::StringValue { value } => {
                let mut bytes = value.into_bytes();
                bytes.push(0);
                ConstValue::Bytes(bytes)
            }
            TermKind::DefaultValue { ty } => {
                if self.ctx.info(ty).type_mode == TypeMode::Complex {
                    return Err(Defer::NotGlobal);
                }
                self.zero_const(module, ty, location)?
            }
            TermKind::StructValue { members, .. } => {
                let mut out = Vec::with_capacity(members.len());
                for member in members {
                    out.push(self.lower_const(module, member, deps)?);
                }
                ConstValue::Struct(out)
            }
            TermKind::ArrayValue { elements, .. } => {
                let mut out = Vec::with_capacity(elements.len());
                for element in elements {
                    out.push(self.lower_const(module, element, deps)?);
                }
                ConstValue::Array(out)
            }
            TermKind::UnionValue { ty, index, value } => {
                let ir = self.lower_type(module, ty, location)?;
                let value = self.lower_const(module, value, deps)?;
                ConstValue::Union {
                    ty: ir,
                    index,
                    value: Box::new(value),
                }
            }
            TermKind::InstanceValue { member, .. } => self.lower_const(module, member, deps)?,
            // A functional global statement denotes its pure value.
            TermKind::GlobalStatement { value, mode, .. }
                if mode == StatementMode::Functional =>
            {
                self.lower_const(module, value, deps)?
            }
            // The value of a global evaluation exists only after load time.
            TermKind::GlobalEvaluate { .. } => return Err(Defer::NotGlobal),
            // A global denotes its link-time address.
            TermKind::Function { .. }
            | TermKind::GlobalVariable { .. }
            | TermKind::GlobalStatement { .. } => {
                deps.insert(term);
                let symbol = self.declare_global(module, term)?;
                ConstValue::Symbol(symbol)
            }
            TermKind::LibrarySymbol { .. } => {
                let symbol = self.declare_global(module, term)?;
                ConstValue::Symbol(symbol)
            }
            TermKind::PointerTo { value } => self.lower_const(module, value, deps)?,
            TermKind::PointerTarget { pointer } => self.lower_const(module, pointer, deps)?,
            TermKind::ElementPtr { pointer, index } => {
                let base = self.lower_const(module, pointer, deps)?;
                let index = self.ctx.size_from(index, location).map_err(Defer::Error)?;
                match base {
                    ConstValue::ElementPtr { base, mut indices } => {
                        indices.push(index);
                        ConstValue::ElementPtr { base, indices }
                    }
                    other => ConstValue::ElementPtr {
                        base: Box::new(other),
                        indices: vec![index],
                    },
                }
            }
            TermKind::ElementValue { aggregate, index } => {
                let base = self.lower_const(module, aggregate, deps)?;
                let index = self.ctx.size_from(index, location).map_err(Defer::Error)?;
                match base {
                    ConstValue::Struct(members) | ConstValue::Array(members) => members
                        .into_iter()
                        .nth(index as usize)
                        .ok_or(Defer::NotGlobal)?,
                    ConstValue::Symbol(_) | ConstValue::ElementPtr { .. } => {
                        // A member of storage, not of a constant.
                        return Err(Defer::NotGlobal);
                    }
                    _ => return Err(Defer::NotGlobal),
                }
            }
            TermKind::MovableValue { .. } => return Err(Defer::NotGlobal),
            TermKind::InterfaceValue {
                interface,
                parameters,
                implementation,
            } => self.get_implementation(
                module,
                interface,
                &parameters,
                location,
                deps,
                implementation,
            )?,
            // Type terms in value position are erased.
            TermKind::Metatype
            | TermKind::BottomType
            | TermKind::EmptyType
            | TermKind::BooleanType
            | TermKind::NumberType(_)
            | TermKind::UprefType
            | TermKind::PointerType { .. }
            | TermKind::ArrayType { .. }
            | TermKind::StructType { .. }
            | TermKind::UnionType { .. }
            | TermKind::StringType { .. }
            | TermKind::FunctionType { .. }
            | TermKind::DerivedType { .. }
            | TermKind::ConstantType { .. }
            | TermKind::Exists { .. }
            | TermKind::TypeInstance { .. }
            | TermKind::GenericType { .. }
            | TermKind::Upref { .. } => ConstValue::Unit,
            TermKind::Anonymous | TermKind::Parameter { .. } => {
                return Err(Defer::Error(self.ctx.error(
                    ErrorKind::InternalInvariant,
                    location,
                    "unbound placeholder reached global lowering",
                )));
            }
            _ => return Err(Defer::NotGlobal),
        };
        Ok(value)
    }

    /// Instantiate a static implementation as a one-definition global and
    /// return a pointer constant to its interface value (§ overload
    /// globals). Repeated lookups for the same `(interface, parameters)`
    /// key yield the same symbol.
    pub(crate) fn get_implementation(
        &mut self,
        module: ModuleId,
        interface: TermId,
        parameters: &[TermId],
        location: SourceLocation,
        deps: &mut FxHashSet<TermId>,
        maybe_implementation: Option<TermId>,
    ) -> GlobalResult<ConstValue> {
        // Introduced implementations shadow the module cache; only the
        // plain lookup path is keyed.
        let key = (interface, parameters.to_vec());
        if maybe_implementation.is_none() {
            if let Some(entry) = self.module_state(module).impl_cache.get(&key) {
                deps.extend(entry.dependencies.iter().copied());
                return Ok(entry.value.clone());
            }
        }

        let (selected, wildcards) = match maybe_implementation {
            Some(implementation) => {
                let wildcards =
                    dispatch::overload_match(self.ctx, implementation, parameters, location)
                        .map_err(Defer::Error)?;
                (implementation, wildcards)
            }
            None => {
                let lookup =
                    dispatch::overload_lookup(self.ctx, interface, parameters, location, &[])
                        .map_err(Defer::Error)?;
                (lookup.value, lookup.wildcards)
            }
        };
        let TermKind::Implementation {
            value,
            dynamic,
            path,
            ..
        } = self.ctx.kind(selected).clone()
        else {
            return Err(Defer::Error(self.ctx.error(
                ErrorKind::InternalInvariant,
                location,
                "interface lookup selected a non-implementation",
            )));
        };
        if dynamic {
            // A dynamic implementation is a runtime value in some scope;
            // it has no global instantiation.
            return Err(Defer::NotGlobal);
        }

        let value_term =
            specialize(self.ctx, value, &wildcards, location).map_err(Defer::Error)?;
        let mut my_deps = FxHashSet::default();
        let const_value = self.lower_const(module, value_term, &mut my_deps)?;

        let value_ty = self.ctx.type_of(value_term);
        let ir_ty = self.lower_type(module, value_ty, location)?;

        let mut name_builder = SymbolNameBuilder::new();
        name_builder.emit_segment("impl");
        name_builder.emit_path(&self.ctx.paths, self.ctx.location(interface).logical);
        for &parameter in parameters {
            name_builder.emit_path(&self.ctx.paths, self.ctx.location(parameter).logical);
        }
        let base_name = name_builder.name();
        let state = self.module_state(module);
        let name = if state.ir.get_member(&base_name).is_some() {
            state.names.unique_name(&base_name)
        } else {
            base_name
        };

        let merge = self.ctx.options.merge_one_definition;
        let state = self.module_state(module);
        let symbol = state
            .ir
            .new_member(name, ir_ty, silica_ir::IrLinkage::OneDefinition);
        state.ir.set_value(symbol, const_value);
        state.ir.symbol_mut(symbol).constant = true;
        state.ir.symbol_mut(symbol).merge = merge;

        let mut pointer = ConstValue::Symbol(symbol);
        if !path.is_empty() {
            pointer = ConstValue::ElementPtr {
                base: Box::new(pointer),
                indices: path.iter().map(|&i| i as u64).collect(),
            };
        }

        tracing::debug!(
            interface = interface.0,
            symbol = symbol.0,
            "instantiated static implementation"
        );

        deps.extend(my_deps.iter().copied());
        if maybe_implementation.is_none() {
            self.module_state(module).impl_cache.insert(
                key,
                ImplEntry {
                    value: pointer.clone(),
                    dependencies: my_deps,
                },
            );
        }
        Ok(pointer)
    }
}
