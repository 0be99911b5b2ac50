use crate::globals::GlobalBuilder;
use silica_common::{LogicalPath, SourceLocation, Span};
use silica_ir::{FunctionBody, Instr, IrType, SymbolDef, Terminator, ValueKind};
use silica_term::{
    CompileContext, FunctionParameter, Linkage, ModuleId, ParameterMode, ResultMode, ScalarKind,
    StatementMode, TermId, TermMode,
};

fn named_loc(ctx: &mut CompileContext, name: &str) -> SourceLocation {
    let logical = ctx.paths.named_child(LogicalPath::ROOT, name);
    SourceLocation::new(Span::dummy(), logical)
}

/// Build a public function and lower it, returning its body.
fn lower(
    ctx: &mut CompileContext,
    module: ModuleId,
    name: &str,
    fn_ty: TermId,
    arguments: Vec<TermId>,
    body: TermId,
) -> FunctionBody {
    let location = named_loc(ctx, name);
    let function = ctx
        .function(
            module,
            fn_ty,
            Linkage::Public,
            arguments,
            None,
            body,
            None,
            location,
        )
        .unwrap();
    let mut gb = GlobalBuilder::new(ctx);
    let symbol = gb.build_global(function).unwrap();
    let mut ir = gb.take_module(module).unwrap();
    let def = std::mem::replace(&mut ir.symbol_mut(symbol).def, SymbolDef::Declared);
    match def {
        SymbolDef::Body(body) => body,
        _ => panic!("function should have a body"),
    }
}

#[test]
fn identity_function_is_a_single_return() {
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "identity");
    let module = ctx.new_module("m", location);

    // The dependent identity signature, specialised at T = i32 before
    // lowering.
    let metatype = ctx.metatype();
    let t = ctx.parameter(metatype, 0, 0, location).unwrap();
    let i32_ty = ctx.number_type(ScalarKind::I32, location).unwrap();
    let result_ty = ctx.specialize(t, &[i32_ty], location).unwrap();
    assert_eq!(result_ty, i32_ty);

    let fn_ty = ctx
        .function_type(
            ResultMode::Functional,
            result_ty,
            vec![FunctionParameter {
                mode: ParameterMode::Functional,
                ty: result_ty,
            }],
            location,
        )
        .unwrap();
    let x = ctx.anonymous(i32_ty, TermMode::Value, location).unwrap();
    let body = lower(&mut ctx, module, "identity", fn_ty, vec![x], x);

    // The body is a single return of the argument with no allocas.
    assert_eq!(body.count_instrs(|i| matches!(i, Instr::Alloca { .. })), 0);
    assert_eq!(body.count_instrs(|i| matches!(i, Instr::Call { .. })), 0);
    let (_, entry) = body.blocks().next().unwrap();
    let Some(Terminator::Return(Some(value))) = &entry.terminator else {
        panic!("entry should return a value");
    };
    assert!(matches!(
        body.value(*value).kind,
        ValueKind::Argument(0)
    ));
}

#[test]
fn every_alloca_is_paired_with_a_freea() {
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "pairing");
    let module = ctx.new_module("m", location);
    let empty_ty = ctx.empty_type();

    // Two value-mode locals in a block.
    let one = ctx.integer_value(ScalarKind::I32, 1, location).unwrap();
    let two = ctx.integer_value(ScalarKind::I32, 2, location).unwrap();
    let s1 = ctx.statement(one, StatementMode::Value, location).unwrap();
    let s2 = ctx.statement(two, StatementMode::Value, location).unwrap();
    let tail = ctx.empty_value();
    let block = ctx.block(vec![s1, s2], tail, location).unwrap();

    let fn_ty = ctx
        .function_type(ResultMode::Functional, empty_ty, vec![], location)
        .unwrap();
    let body = lower(&mut ctx, module, "pairing", fn_ty, vec![], block);

    let allocas = body.count_instrs(|i| matches!(i, Instr::Alloca { .. }));
    let freeas = body.count_instrs(|i| matches!(i, Instr::FreeA { .. }));
    assert_eq!(allocas, 2);
    assert_eq!(allocas, freeas);
}

#[test]
fn block_cleanups_run_in_reverse_order() {
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "reverse");
    let module = ctx.new_module("m", location);
    let empty_ty = ctx.empty_type();

    let one = ctx.integer_value(ScalarKind::I32, 1, location).unwrap();
    let two = ctx.integer_value(ScalarKind::I32, 2, location).unwrap();
    let s1 = ctx.statement(one, StatementMode::Value, location).unwrap();
    let s2 = ctx.statement(two, StatementMode::Value, location).unwrap();
    let tail = ctx.empty_value();
    let block = ctx.block(vec![s1, s2], tail, location).unwrap();

    let fn_ty = ctx
        .function_type(ResultMode::Functional, empty_ty, vec![], location)
        .unwrap();
    let body = lower(&mut ctx, module, "reverse", fn_ty, vec![], block);

    // Collect allocas and freeas in emission order; the second slot is
    // released first.
    let mut allocas = Vec::new();
    let mut freed = Vec::new();
    for (_, block) in body.blocks() {
        for &instr in &block.instrs {
            match &body.value(instr).kind {
                ValueKind::Instr {
                    instr: Instr::Alloca { .. },
                    ..
                } => allocas.push(instr),
                ValueKind::Instr {
                    instr: Instr::FreeA { slot },
                    ..
                } => freed.push(*slot),
                _ => {}
            }
        }
    }
    assert_eq!(allocas.len(), 2);
    assert_eq!(freed, vec![allocas[1], allocas[0]]);
}

#[test]
fn functional_arguments_spill_for_address_parameters() {
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "spill");
    let module = ctx.new_module("m", location);
    let i32_ty = ctx.number_type(ScalarKind::I32, location).unwrap();

    let callee_ty = ctx
        .function_type(
            ResultMode::Functional,
            i32_ty,
            vec![FunctionParameter {
                mode: ParameterMode::Input,
                ty: i32_ty,
            }],
            location,
        )
        .unwrap();
    let callee_arg = ctx.anonymous(i32_ty, TermMode::LRef, location).unwrap();
    let seven = ctx.integer_value(ScalarKind::I32, 7, location).unwrap();
    let callee_loc = named_loc(&mut ctx, "callee");
    let callee = ctx
        .function(
            module,
            callee_ty,
            Linkage::Public,
            vec![callee_arg],
            None,
            seven,
            None,
            callee_loc,
        )
        .unwrap();

    let forty_two = ctx.integer_value(ScalarKind::I32, 42, location).unwrap();
    let call = ctx.function_call(callee, vec![forty_two], location).unwrap();
    let fn_ty = ctx
        .function_type(ResultMode::Functional, i32_ty, vec![], location)
        .unwrap();
    let stmt = ctx.statement(call, StatementMode::Functional, location).unwrap();
    let sref = ctx.statement_ref(stmt, location).unwrap();
    let block = ctx.block(vec![stmt], sref, location).unwrap();
    let body = lower(&mut ctx, module, "spill", fn_ty, vec![], block);

    // The register argument is spilled to a slot, passed by address, and
    // the slot released after the call.
    assert_eq!(body.count_instrs(|i| matches!(i, Instr::Alloca { .. })), 1);
    assert_eq!(body.count_instrs(|i| matches!(i, Instr::Store { .. })), 1);
    assert_eq!(body.count_instrs(|i| matches!(i, Instr::FreeA { .. })), 1);
    assert_eq!(body.count_instrs(|i| matches!(i, Instr::Call { .. })), 1);
}

#[test]
fn if_then_else_merges_through_a_phi() {
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "select");
    let module = ctx.new_module("m", location);
    let i32_ty = ctx.number_type(ScalarKind::I32, location).unwrap();
    let bool_ty = ctx.boolean_type();

    let cond = ctx.anonymous(bool_ty, TermMode::Value, location).unwrap();
    let one = ctx.integer_value(ScalarKind::I32, 1, location).unwrap();
    let two = ctx.integer_value(ScalarKind::I32, 2, location).unwrap();
    let choice = ctx.if_then_else(cond, one, two, location).unwrap();

    let fn_ty = ctx
        .function_type(
            ResultMode::Functional,
            i32_ty,
            vec![FunctionParameter {
                mode: ParameterMode::Functional,
                ty: bool_ty,
            }],
            location,
        )
        .unwrap();
    let body = lower(&mut ctx, module, "select", fn_ty, vec![cond], choice);

    assert_eq!(body.count_instrs(|i| matches!(i, Instr::Alloca { .. })), 0);
    let phis = body
        .values()
        .filter(|(_, v)| matches!(v.kind, ValueKind::Phi { .. }))
        .count();
    assert_eq!(phis, 1);
    // Both arms feed the phi.
    let (_, phi) = body
        .values()
        .find(|(_, v)| matches!(v.kind, ValueKind::Phi { .. }))
        .unwrap();
    let ValueKind::Phi { edges, .. } = &phi.kind else {
        unreachable!();
    };
    assert_eq!(edges.len(), 2);
}

#[test]
fn jump_group_by_value_arguments_share_a_union_slot() {
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "jumps");
    let module = ctx.new_module("m", location);
    let i32_ty = ctx.number_type(ScalarKind::I32, location).unwrap();
    let i64_ty = ctx.number_type(ScalarKind::I64, location).unwrap();
    let empty_ty = ctx.empty_type();
    let empty_value = ctx.empty_value();

    let arg32 = ctx.anonymous(i32_ty, TermMode::Value, location).unwrap();
    let arg64 = ctx.anonymous(i64_ty, TermMode::Value, location).unwrap();
    let t32 = ctx
        .jump_target(empty_value, ResultMode::ByValue, Some(arg32), location)
        .unwrap();
    let t64 = ctx
        .jump_target(empty_value, ResultMode::ByValue, Some(arg64), location)
        .unwrap();
    let five = ctx.integer_value(ScalarKind::I32, 5, location).unwrap();
    let initial = ctx.jump_to(t32, Some(five), location).unwrap();
    let group = ctx
        .jump_group(initial, vec![t32, t64], location)
        .unwrap();

    let fn_ty = ctx
        .function_type(ResultMode::Functional, empty_ty, vec![], location)
        .unwrap();
    let function = ctx
        .function(
            module,
            fn_ty,
            Linkage::Public,
            vec![],
            None,
            group,
            None,
            location,
        )
        .unwrap();
    let mut gb = GlobalBuilder::new(&mut ctx);
    let symbol = gb.build_global(function).unwrap();
    let ir = gb.take_module(module).unwrap();
    let SymbolDef::Body(body) = &ir.symbol(symbol).def else {
        panic!("function should have a body");
    };

    // Exactly one union-typed slot carries the by-value arguments; every
    // other alloca is an entry's own variable.
    let mut union_allocas = Vec::new();
    for (_, value) in body.values() {
        if let ValueKind::Instr {
            instr: Instr::Alloca { ty },
            ..
        } = &value.kind
        {
            if matches!(ir.types.get(*ty), IrType::Union(_)) {
                union_allocas.push(*ty);
            }
        }
    }
    assert_eq!(union_allocas.len(), 1);
    let IrType::Union(members) = ir.types.get(union_allocas[0]) else {
        unreachable!();
    };
    assert_eq!(members.len(), 2);

    assert!(body.count_instrs(|i| matches!(i, Instr::FreeA { .. })) >= 1);
    assert!(body.count_instrs(|i| matches!(i, Instr::ElementPtr { .. })) >= 1);
}

#[test]
fn bottom_arms_are_discarded_in_merges() {
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "diverge");
    let module = ctx.new_module("m", location);
    let i32_ty = ctx.number_type(ScalarKind::I32, location).unwrap();
    let bool_ty = ctx.boolean_type();

    // One arm jumps straight out of the function.
    let cond = ctx.anonymous(bool_ty, TermMode::Value, location).unwrap();
    let exit = ctx
        .exit_target(i32_ty, ResultMode::Functional, location)
        .unwrap();
    let one = ctx.integer_value(ScalarKind::I32, 1, location).unwrap();
    let two = ctx.integer_value(ScalarKind::I32, 2, location).unwrap();
    let bail = ctx.jump_to(exit, Some(one), location).unwrap();
    let choice = ctx.if_then_else(cond, bail, two, location).unwrap();

    let fn_ty = ctx
        .function_type(
            ResultMode::Functional,
            i32_ty,
            vec![FunctionParameter {
                mode: ParameterMode::Functional,
                ty: bool_ty,
            }],
            location,
        )
        .unwrap();

    let function = ctx
        .function(
            module,
            fn_ty,
            Linkage::Public,
            vec![cond],
            Some(exit),
            choice,
            None,
            location,
        )
        .unwrap();
    let mut gb = GlobalBuilder::new(&mut ctx);
    let symbol = gb.build_global(function).unwrap();
    let mut ir = gb.take_module(module).unwrap();
    let def = std::mem::replace(&mut ir.symbol_mut(symbol).def, SymbolDef::Declared);
    let SymbolDef::Body(body) = def else {
        panic!("function should have a body");
    };

    // No phi: the surviving arm flows straight through.
    let phis = body
        .values()
        .filter(|(_, v)| matches!(v.kind, ValueKind::Phi { .. }))
        .count();
    assert_eq!(phis, 0);
    // Two returns: the early exit and the fall-through.
    let returns = body
        .blocks()
        .filter(|(_, b)| matches!(b.terminator, Some(Terminator::Return(_))))
        .count();
    assert_eq!(returns, 2);
}

#[test]
fn try_finally_runs_the_finally_on_the_normal_path() {
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "finally");
    let module = ctx.new_module("m", location);
    let i32_ty = ctx.number_type(ScalarKind::I32, location).unwrap();
    let empty_ty = ctx.empty_type();

    // The finally expression stores through a pointer argument so its
    // emission is observable.
    let ptr_ty = ctx.pointer_type(i32_ty, location).unwrap();
    let out = ctx.anonymous(ptr_ty, TermMode::Value, location).unwrap();
    let target = ctx.ptr_target(out, location).unwrap();
    let nine = ctx.integer_value(ScalarKind::I32, 9, location).unwrap();
    let effect = ctx.assign_value(target, nine, location).unwrap();

    let payload = ctx.empty_value();
    let guarded = ctx.try_finally(payload, effect, false, location).unwrap();

    let fn_ty = ctx
        .function_type(
            ResultMode::Functional,
            empty_ty,
            vec![FunctionParameter {
                mode: ParameterMode::Functional,
                ty: ptr_ty,
            }],
            location,
        )
        .unwrap();
    let body = lower(&mut ctx, module, "finally", fn_ty, vec![out], guarded);
    assert_eq!(body.count_instrs(|i| matches!(i, Instr::Store { .. })), 1);
}

#[test]
fn exception_only_finally_is_skipped_on_the_normal_path() {
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "efinally");
    let module = ctx.new_module("m", location);
    let i32_ty = ctx.number_type(ScalarKind::I32, location).unwrap();
    let empty_ty = ctx.empty_type();

    let ptr_ty = ctx.pointer_type(i32_ty, location).unwrap();
    let out = ctx.anonymous(ptr_ty, TermMode::Value, location).unwrap();
    let target = ctx.ptr_target(out, location).unwrap();
    let nine = ctx.integer_value(ScalarKind::I32, 9, location).unwrap();
    let effect = ctx.assign_value(target, nine, location).unwrap();

    let payload = ctx.empty_value();
    let guarded = ctx.try_finally(payload, effect, true, location).unwrap();

    let fn_ty = ctx
        .function_type(
            ResultMode::Functional,
            empty_ty,
            vec![FunctionParameter {
                mode: ParameterMode::Functional,
                ty: ptr_ty,
            }],
            location,
        )
        .unwrap();
    let body = lower(&mut ctx, module, "efinally", fn_ty, vec![out], guarded);
    assert_eq!(body.count_instrs(|i| matches!(i, Instr::Store { .. })), 0);
}
