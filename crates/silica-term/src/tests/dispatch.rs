use crate::context::CompileContext;
use crate::dispatch::{metadata_lookup, overload_lookup};
use crate::term::{ScalarKind, TermId};
use silica_common::{ErrorKind, SourceLocation};

fn loc() -> SourceLocation {
    SourceLocation::synthetic()
}

/// A one-type-parameter interface with no attached values.
fn show_interface(ctx: &mut CompileContext) -> TermId {
    let metatype = ctx.metatype();
    let empty = ctx.empty_type();
    ctx.interface_new(0, vec![metatype], vec![], empty, vec![], vec![], loc())
        .unwrap()
}

fn impl_for(ctx: &mut CompileContext, interface: TermId, n_wildcards: u32, pattern: Vec<TermId>) -> TermId {
    let value = ctx.empty_value();
    let id = ctx
        .implementation_new(interface, n_wildcards, pattern, vec![], value, false, vec![], loc())
        .unwrap();
    ctx.attach_overload(interface, id, loc()).unwrap();
    id
}

#[test]
fn most_specific_candidate_wins() {
    let mut ctx = CompileContext::new();
    let show = show_interface(&mut ctx);
    let metatype = ctx.metatype();
    let i32_ty = ctx.number_type(ScalarKind::I32, loc()).unwrap();
    let w = ctx.parameter(metatype, 0, 0, loc()).unwrap();
    let ptr_any = ctx.pointer_type(w, loc()).unwrap();
    let ptr_i32 = ctx.pointer_type(i32_ty, loc()).unwrap();

    let generic_impl = impl_for(&mut ctx, show, 1, vec![ptr_any]);
    let specific_impl = impl_for(&mut ctx, show, 0, vec![ptr_i32]);

    let lookup = overload_lookup(&mut ctx, show, &[ptr_i32], loc(), &[]).unwrap();
    assert_eq!(lookup.value, specific_impl);
    assert!(lookup.wildcards.is_empty());
    let _ = generic_impl;
}

#[test]
fn generic_candidate_used_when_specific_absent() {
    let mut ctx = CompileContext::new();
    let show = show_interface(&mut ctx);
    let metatype = ctx.metatype();
    let i32_ty = ctx.number_type(ScalarKind::I32, loc()).unwrap();
    let w = ctx.parameter(metatype, 0, 0, loc()).unwrap();
    let ptr_any = ctx.pointer_type(w, loc()).unwrap();
    let ptr_i32 = ctx.pointer_type(i32_ty, loc()).unwrap();

    let generic_impl = impl_for(&mut ctx, show, 1, vec![ptr_any]);

    let lookup = overload_lookup(&mut ctx, show, &[ptr_i32], loc(), &[]).unwrap();
    assert_eq!(lookup.value, generic_impl);
    assert_eq!(lookup.wildcards, vec![i32_ty]);
}

#[test]
fn missing_overload_is_reported() {
    let mut ctx = CompileContext::new();
    let show = show_interface(&mut ctx);
    let i32_ty = ctx.number_type(ScalarKind::I32, loc()).unwrap();
    let err = overload_lookup(&mut ctx, show, &[i32_ty], loc(), &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OverloadNotFound);
}

#[test]
fn incomparable_candidates_are_ambiguous() {
    let mut ctx = CompileContext::new();
    let metatype = ctx.metatype();
    let empty = ctx.empty_type();
    let two_param = ctx
        .interface_new(0, vec![metatype, metatype], vec![], empty, vec![], vec![], loc())
        .unwrap();
    let i32_ty = ctx.number_type(ScalarKind::I32, loc()).unwrap();
    let w = ctx.parameter(metatype, 0, 0, loc()).unwrap();

    // (i32, T) and (T, i32) both match (i32, i32) and neither refines the
    // other.
    impl_for(&mut ctx, two_param, 1, vec![i32_ty, w]);
    impl_for(&mut ctx, two_param, 1, vec![w, i32_ty]);

    let err = overload_lookup(&mut ctx, two_param, &[i32_ty, i32_ty], loc(), &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OverloadAmbiguous);
    assert_eq!(err.diagnostic.related_information.len(), 2);
}

#[test]
fn candidate_order_does_not_affect_result() {
    for flip in [false, true] {
        let mut ctx = CompileContext::new();
        let show = show_interface(&mut ctx);
        let metatype = ctx.metatype();
        let i32_ty = ctx.number_type(ScalarKind::I32, loc()).unwrap();
        let w = ctx.parameter(metatype, 0, 0, loc()).unwrap();
        let ptr_any = ctx.pointer_type(w, loc()).unwrap();
        let ptr_i32 = ctx.pointer_type(i32_ty, loc()).unwrap();

        let (a, b) = if flip {
            let b = impl_for(&mut ctx, show, 0, vec![ptr_i32]);
            let a = impl_for(&mut ctx, show, 1, vec![ptr_any]);
            (a, b)
        } else {
            let a = impl_for(&mut ctx, show, 1, vec![ptr_any]);
            let b = impl_for(&mut ctx, show, 0, vec![ptr_i32]);
            (a, b)
        };
        let _ = a;
        let lookup = overload_lookup(&mut ctx, show, &[ptr_i32], loc(), &[]).unwrap();
        assert_eq!(lookup.value, b);
    }
}

#[test]
fn extra_context_values_participate() {
    let mut ctx = CompileContext::new();
    let show = show_interface(&mut ctx);
    let metatype = ctx.metatype();
    let i32_ty = ctx.number_type(ScalarKind::I32, loc()).unwrap();
    let w = ctx.parameter(metatype, 0, 0, loc()).unwrap();
    let ptr_any = ctx.pointer_type(w, loc()).unwrap();
    let ptr_i32 = ctx.pointer_type(i32_ty, loc()).unwrap();

    // Not attached to the interface; supplied by the caller's scope.
    let value = ctx.empty_value();
    let scoped = ctx
        .implementation_new(show, 0, vec![ptr_i32], vec![], value, true, vec![], loc())
        .unwrap();
    let _ = ptr_any;

    let lookup = overload_lookup(&mut ctx, show, &[ptr_i32], loc(), &[scoped]).unwrap();
    assert_eq!(lookup.value, scoped);
}

#[test]
fn overloads_found_through_generic_instances() {
    use crate::context::GenericPrimitive;
    let mut ctx = CompileContext::new();
    let show = show_interface(&mut ctx);
    let metatype = ctx.metatype();
    let i32_ty = ctx.number_type(ScalarKind::I32, loc()).unwrap();

    // A generic carrying a Show implementation for every instance of
    // itself.
    let generic = crate::generics::generic_with_body(
        &mut ctx,
        vec![metatype],
        GenericPrimitive::Recurse,
        loc(),
        move |ctx, _gid, params| {
            let p = params[0];
            ctx.struct_type([p], loc())
        },
    )
    .unwrap();
    let crate::term::TermKind::GenericType { generic: gid } = *ctx.kind(generic) else {
        panic!("expected generic");
    };
    let w = ctx.parameter(metatype, 0, 0, loc()).unwrap();
    let inst_pattern = ctx.instance(generic, [w], loc()).unwrap();
    let value = ctx.empty_value();
    let attached = ctx
        .implementation_new(show, 1, vec![inst_pattern], vec![], value, false, vec![], loc())
        .unwrap();
    ctx.add_generic_overload(gid, attached);

    let inst_i32 = ctx.instance(generic, [i32_ty], loc()).unwrap();
    let lookup = overload_lookup(&mut ctx, show, &[inst_i32], loc(), &[]).unwrap();
    assert_eq!(lookup.value, attached);
    assert_eq!(lookup.wildcards, vec![i32_ty]);
}

#[test]
fn metadata_lookup_specializes_payload() {
    let mut ctx = CompileContext::new();
    let metatype = ctx.metatype();
    let md_type = ctx.metadata_type_new(0, vec![metatype], vec![], loc()).unwrap();
    let w = ctx.parameter(metatype, 0, 0, loc()).unwrap();
    // The payload is `pointer(T)`: lookup at i32 yields `pointer(i32)`.
    let payload = ctx.pointer_type(w, loc()).unwrap();
    let md = ctx.metadata_new(md_type, 1, vec![w], payload, loc()).unwrap();
    ctx.attach_overload(md_type, md, loc()).unwrap();

    let i32_ty = ctx.number_type(ScalarKind::I32, loc()).unwrap();
    let result = metadata_lookup(&mut ctx, md_type, &[i32_ty], loc(), &[]).unwrap();
    let expected = ctx.pointer_type(i32_ty, loc()).unwrap();
    assert_eq!(result, expected);
}
