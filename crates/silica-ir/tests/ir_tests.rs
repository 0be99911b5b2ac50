use silica_ir::{
    BodyBuilder, ConstValue, FunctionBody, Instr, IrLinkage, IrModule, IrScalar, IrType,
    Terminator, TypeTable, ValueKind,
};

#[test]
fn types_intern_structurally() {
    let mut types = TypeTable::new();
    let i32_ty = types.scalar(IrScalar::I32);
    let p1 = types.pointer(i32_ty);
    let p2 = types.pointer(i32_ty);
    assert_eq!(p1, p2);

    let s1 = types.intern(IrType::Struct(vec![i32_ty, p1]));
    let s2 = types.intern(IrType::Struct(vec![i32_ty, p1]));
    assert_eq!(s1, s2);

    let u = types.intern(IrType::Union(vec![i32_ty, p1]));
    assert_ne!(s1, u);
}

#[test]
fn recursive_types_resolve_and_project() {
    let mut types = TypeTable::new();
    let i32_ty = types.scalar(IrScalar::I32);
    let recursive = types.new_recursive(vec![]);
    let apply = types.intern(IrType::Apply {
        recursive,
        arguments: vec![],
    });
    let tail = types.pointer(apply);
    let body = types.intern(IrType::Struct(vec![i32_ty, tail]));
    types.resolve_recursive(recursive, body);

    assert_eq!(types.recursive_body(recursive), Some(body));
    // Element access unwraps the application.
    assert_eq!(types.element(apply, 0), Some(i32_ty));
    assert_eq!(types.element(apply, 1), Some(tail));
    assert_eq!(types.element(apply, 2), None);
}

#[test]
fn body_builder_tracks_types_through_loads() {
    let mut types = TypeTable::new();
    let mut body = FunctionBody::new();
    let mut builder = BodyBuilder::new(&mut types, &mut body);
    let entry = builder.new_block(None);
    builder.set_insert_point(entry);

    let i64_ty = builder.types.scalar(IrScalar::I64);
    let slot = builder.alloca(i64_ty);
    let value = builder.constant(
        ConstValue::Int {
            ty: i64_ty,
            value: 9,
        },
        i64_ty,
    );
    builder.store(value, slot);
    let loaded = builder.load(slot);
    assert_eq!(builder.value_type(loaded), i64_ty);
    builder.freea(slot);
    builder.return_(loaded);
    assert!(builder.is_terminated());

    assert_eq!(body.count_instrs(|i| matches!(i, Instr::Alloca { .. })), 1);
    assert_eq!(body.count_instrs(|i| matches!(i, Instr::FreeA { .. })), 1);
    let (_, entry_block) = body.blocks().next().unwrap();
    assert!(matches!(
        entry_block.terminator,
        Some(Terminator::Return(Some(_)))
    ));
}

#[test]
fn phi_edges_accumulate() {
    let mut types = TypeTable::new();
    let mut body = FunctionBody::new();
    let mut builder = BodyBuilder::new(&mut types, &mut body);
    let a = builder.new_block(None);
    let b = builder.new_block(Some(a));
    let merge = builder.new_block(Some(a));

    let bool_ty = builder.types.scalar(IrScalar::Bool);
    let i32_ty = builder.types.scalar(IrScalar::I32);
    builder.set_insert_point(a);
    let cond = builder.constant(ConstValue::Bool(true), bool_ty);
    let one = builder.constant(
        ConstValue::Int {
            ty: i32_ty,
            value: 1,
        },
        i32_ty,
    );
    builder.cond_branch(cond, b, merge);

    builder.set_insert_point(b);
    let two = builder.constant(
        ConstValue::Int {
            ty: i32_ty,
            value: 2,
        },
        i32_ty,
    );
    builder.branch(merge);

    builder.set_insert_point(merge);
    let phi = builder.phi(i32_ty);
    builder.add_phi_edge(phi, a, one);
    builder.add_phi_edge(phi, b, two);
    builder.return_(phi);

    let ValueKind::Phi { edges, .. } = &body.value(phi).kind else {
        panic!("expected a phi");
    };
    assert_eq!(edges.len(), 2);
}

#[test]
fn modules_declare_and_define_symbols() {
    let mut module = IrModule::new("m");
    let i32_ty = module.types.scalar(IrScalar::I32);
    let g = module.new_member("_Yg", i32_ty, IrLinkage::Export);
    assert_eq!(module.get_member("_Yg"), Some(g));
    assert_eq!(module.get_member("_Yh"), None);

    module.set_value(
        g,
        ConstValue::Int {
            ty: i32_ty,
            value: 3,
        },
    );
    assert!(matches!(
        module.symbol(g).def,
        silica_ir::SymbolDef::Value(ConstValue::Int { value: 3, .. })
    ));
}

#[test]
fn undef_detection_recurses() {
    let mut types = TypeTable::new();
    let i32_ty = types.scalar(IrScalar::I32);
    let plain = ConstValue::Struct(vec![ConstValue::Int {
        ty: i32_ty,
        value: 0,
    }]);
    assert!(!plain.has_undef());
    let tainted = ConstValue::Struct(vec![ConstValue::Undef(i32_ty)]);
    assert!(tainted.has_undef());
}
