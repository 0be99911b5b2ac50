use crate::binding::{anonymize, match_terms, parameterize, specialize};
use crate::context::CompileContext;
use crate::term::{ScalarKind, StatementMode, TermKind, TermMode};
use silica_common::{ErrorKind, SourceLocation};

fn loc() -> SourceLocation {
    SourceLocation::synthetic()
}

#[test]
fn parameterize_specialize_round_trip() {
    let mut ctx = CompileContext::new();
    let metatype = ctx.metatype();
    let t = ctx.anonymous(metatype, TermMode::Value, loc()).unwrap();
    let ptr_t = ctx.pointer_type(t, loc()).unwrap();
    let s = ctx.struct_type([t, ptr_t], loc()).unwrap();

    let closed = parameterize(&mut ctx, s, &[t], loc()).unwrap();
    assert_ne!(closed, s);
    assert!(!ctx.has_free_anonymous(closed));

    let open = specialize(&mut ctx, closed, &[t], loc()).unwrap();
    assert_eq!(open, s);
}

#[test]
fn parameterize_increments_depth_under_binders() {
    let mut ctx = CompileContext::new();
    let metatype = ctx.metatype();
    let t = ctx.anonymous(metatype, TermMode::Value, loc()).unwrap();
    // exists x: T. T  — the bound occurrence of T sits under one binder.
    let inner = ctx.exists(t, [t], loc()).unwrap();
    let closed = parameterize(&mut ctx, inner, &[t], loc()).unwrap();
    let TermKind::Exists {
        result,
        parameter_types,
    } = ctx.kind(closed).clone()
    else {
        panic!("expected an existential");
    };
    let TermKind::Parameter { depth, index, .. } = *ctx.kind(result) else {
        panic!("expected a parameter result");
    };
    assert_eq!((depth, index), (1, 0));
    let TermKind::Parameter { depth, .. } = *ctx.kind(parameter_types[0]) else {
        panic!("expected a parameter type");
    };
    assert_eq!(depth, 1);
}

#[test]
fn specialize_reports_escaping_index() {
    let mut ctx = CompileContext::new();
    let metatype = ctx.metatype();
    let p = ctx.parameter(metatype, 0, 3, loc()).unwrap();
    let i32_ty = ctx.number_type(ScalarKind::I32, loc()).unwrap();
    let err = specialize(&mut ctx, p, &[i32_ty], loc()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
}

#[test]
fn specialize_substitutes_into_interface_value_types() {
    let mut ctx = CompileContext::new();
    // The builtin Movable value type references its pattern parameter from
    // inside function-type binders; specialising it must reach them.
    let movable = ctx.builtins().movable_interface;
    let i32_ty = ctx.number_type(ScalarKind::I32, loc()).unwrap();
    let value_type = ctx.interface_type_after(movable, &[i32_ty], loc()).unwrap();
    let TermKind::StructType { members } = ctx.kind(value_type).clone() else {
        panic!("expected the lifecycle function table");
    };
    assert_eq!(members.len(), 5);
    // Each member is a pointer to a function taking i32*.
    let TermKind::PointerType { target, .. } = *ctx.kind(members[0]) else {
        panic!("expected function pointer member");
    };
    let TermKind::FunctionType { parameters, .. } = ctx.kind(target).clone() else {
        panic!("expected function type");
    };
    let TermKind::PointerType { target: obj, .. } = *ctx.kind(parameters[0].ty) else {
        panic!("expected object pointer parameter");
    };
    assert_eq!(obj, i32_ty);
}

#[test]
fn match_reflexive_with_no_wildcards() {
    let mut ctx = CompileContext::new();
    let i32_ty = ctx.number_type(ScalarKind::I32, loc()).unwrap();
    let ptr = ctx.pointer_type(i32_ty, loc()).unwrap();
    let s = ctx.struct_type([i32_ty, ptr], loc()).unwrap();
    let mut wildcards = [];
    assert!(match_terms(&mut ctx, s, s, &mut wildcards, loc()).unwrap());
}

#[test]
fn match_binds_wildcards() {
    let mut ctx = CompileContext::new();
    let metatype = ctx.metatype();
    let i32_ty = ctx.number_type(ScalarKind::I32, loc()).unwrap();
    let w = ctx.parameter(metatype, 0, 0, loc()).unwrap();
    let pattern = ctx.pointer_type(w, loc()).unwrap();
    let value = ctx.pointer_type(i32_ty, loc()).unwrap();
    let mut wildcards = [None];
    assert!(match_terms(&mut ctx, pattern, value, &mut wildcards, loc()).unwrap());
    assert_eq!(wildcards[0], Some(i32_ty));
}

#[test]
fn match_rejects_conflicting_bindings() {
    let mut ctx = CompileContext::new();
    let metatype = ctx.metatype();
    let i32_ty = ctx.number_type(ScalarKind::I32, loc()).unwrap();
    let i64_ty = ctx.number_type(ScalarKind::I64, loc()).unwrap();
    let w = ctx.parameter(metatype, 0, 0, loc()).unwrap();
    // struct { T, T } cannot match struct { i32, i64 }.
    let pattern = ctx.struct_type([w, w], loc()).unwrap();
    let value = ctx.struct_type([i32_ty, i64_ty], loc()).unwrap();
    let mut wildcards = [None];
    assert!(!match_terms(&mut ctx, pattern, value, &mut wildcards, loc()).unwrap());
}

#[test]
fn match_distinct_anonymouses_only_match_themselves() {
    let mut ctx = CompileContext::new();
    let metatype = ctx.metatype();
    let a = ctx.anonymous(metatype, TermMode::Value, loc()).unwrap();
    let b = ctx.anonymous(metatype, TermMode::Value, loc()).unwrap();
    let mut wildcards = [];
    assert!(match_terms(&mut ctx, a, a, &mut wildcards, loc()).unwrap());
    assert!(!match_terms(&mut ctx, a, b, &mut wildcards, loc()).unwrap());
}

#[test]
fn match_ignores_pointer_upward_references() {
    let mut ctx = CompileContext::new();
    let i32_ty = ctx.number_type(ScalarKind::I32, loc()).unwrap();
    let i64_ty = ctx.number_type(ScalarKind::I64, loc()).unwrap();
    let outer = ctx.struct_type([i32_ty, i64_ty], loc()).unwrap();
    let plain = ctx.pointer_type(i32_ty, loc()).unwrap();
    let null = ctx.upref_null();
    let chain = ctx.upref_indexed(outer, 0, null, loc()).unwrap();
    let derived = ctx.pointer_type_upref(i32_ty, chain, loc()).unwrap();
    assert_ne!(plain, derived);
    let mut wildcards = [];
    assert!(match_terms(&mut ctx, plain, derived, &mut wildcards, loc()).unwrap());
}

#[test]
fn anonymize_of_nothing_is_identity() {
    let mut ctx = CompileContext::new();
    let i32_ty = ctx.number_type(ScalarKind::I32, loc()).unwrap();
    let out = anonymize(&mut ctx, i32_ty, &[], loc()).unwrap();
    assert_eq!(out, i32_ty);
}

#[test]
fn anonymize_closes_statement_references() {
    let mut ctx = CompileContext::new();
    let metatype = ctx.metatype();
    let i32_ty = ctx.number_type(ScalarKind::I32, loc()).unwrap();
    // let t : Type = ...; the type `pointer(t)` mentions the local.
    let eval = ctx.functional_eval(i32_ty, loc()).unwrap();
    let stmt = ctx.statement(eval, StatementMode::Functional, loc()).unwrap();
    let sref = ctx.statement_ref(stmt, loc()).unwrap();
    assert_eq!(ctx.type_of(sref), metatype);
    let ptr = ctx.pointer_type(sref, loc()).unwrap();

    let closed = anonymize(&mut ctx, ptr, &[stmt], loc()).unwrap();
    let TermKind::Exists {
        result,
        parameter_types,
    } = ctx.kind(closed).clone()
    else {
        panic!("expected an existential");
    };
    assert_eq!(parameter_types.len(), 1);
    assert_eq!(parameter_types[0], metatype);
    let TermKind::PointerType { target, .. } = *ctx.kind(result) else {
        panic!("expected pointer result");
    };
    // The reference sits directly inside the new existential binder.
    assert!(matches!(
        *ctx.kind(target),
        TermKind::Parameter {
            depth: 0,
            index: 0,
            ..
        }
    ));

    // A term without the statement is untouched.
    let unrelated = ctx.pointer_type(i32_ty, loc()).unwrap();
    let same = anonymize(&mut ctx, unrelated, &[stmt], loc()).unwrap();
    assert_eq!(same, unrelated);
}
