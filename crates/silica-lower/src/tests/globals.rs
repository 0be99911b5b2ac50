use crate::globals::GlobalBuilder;
use crate::mangle::decode_name;
use silica_common::{ErrorKind, LogicalPath, SourceLocation, Span};
use silica_ir::{ConstValue, SymbolDef};
use silica_term::{
    CompileContext, FunctionParameter, Linkage, ModuleId, ParameterMode, PropertyValue,
    ResultMode, ScalarKind, TargetCallback, TermId,
};

fn named_loc(ctx: &mut CompileContext, name: &str) -> SourceLocation {
    let logical = ctx.paths.named_child(LogicalPath::ROOT, name);
    SourceLocation::new(Span::dummy(), logical)
}

/// `fn <name>(input i32) -> functional i32` returning a constant.
fn make_identity_like(
    ctx: &mut CompileContext,
    module: ModuleId,
    name: &str,
) -> TermId {
    let location = named_loc(ctx, name);
    let i32_ty = ctx.number_type(ScalarKind::I32, location).unwrap();
    let fn_ty = ctx
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
    let arg = ctx
        .anonymous(i32_ty, silica_term::TermMode::LRef, location)
        .unwrap();
    let body = ctx.integer_value(ScalarKind::I32, 7, location).unwrap();
    ctx.function(
        module,
        fn_ty,
        Linkage::Public,
        vec![arg],
        None,
        body,
        None,
        location,
    )
    .unwrap()
}

#[test]
fn constant_global_lowers_to_a_constant_symbol() {
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "answer");
    let module = ctx.new_module("m", location);
    let i32_ty = ctx.number_type(ScalarKind::I32, location).unwrap();
    let value = ctx.integer_value(ScalarKind::I32, 42, location).unwrap();
    let global = ctx
        .global_variable(module, i32_ty, value, Linkage::Public, true, false, None, location)
        .unwrap();

    let mut gb = GlobalBuilder::new(&mut ctx);
    let symbol = gb.build_global(global).unwrap();
    let ir = gb.take_module(module).unwrap();

    let sym = ir.symbol(symbol);
    assert!(sym.constant);
    assert!(matches!(
        sym.def,
        SymbolDef::Value(ConstValue::Int { value: 42, .. })
    ));
    assert!(ir.constructors.is_empty());
    assert!(ir.destructors.is_empty());

    // The mangled name recovers the logical path.
    let (segments, rest) = decode_name(&sym.name).unwrap();
    assert_eq!(segments, vec!["answer"]);
    assert!(rest.is_empty());
}

#[test]
fn non_constant_global_synthesises_an_initialiser() {
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "dynamic");
    let module = ctx.new_module("m", location);
    let f = make_identity_like(&mut ctx, module, "f");
    let i32_ty = ctx.number_type(ScalarKind::I32, location).unwrap();
    let seed = ctx.integer_value(ScalarKind::I32, 1, location).unwrap();
    let value = ctx.function_call(f, vec![seed], location).unwrap();
    let global = ctx
        .global_variable(module, i32_ty, value, Linkage::Public, false, false, None, location)
        .unwrap();

    let mut gb = GlobalBuilder::new(&mut ctx);
    let symbol = gb.build_global(global).unwrap();
    let ir = gb.take_module(module).unwrap();

    // Static value is undef; the constructor fills it at load time.
    assert!(matches!(
        ir.symbol(symbol).def,
        SymbolDef::Value(ConstValue::Undef(_))
    ));
    assert_eq!(ir.constructors.len(), 1);
    let (ctor, priority) = ir.constructors[0];
    assert_eq!(priority, 0);
    assert!(ir.symbol(ctor).name.starts_with("_Y_ctor"));

    // The constructor body calls f and stores into the global.
    let SymbolDef::Body(body) = &ir.symbol(ctor).def else {
        panic!("constructor should have a body");
    };
    assert!(body.count_instrs(|i| matches!(i, silica_ir::Instr::Call { .. })) >= 1);
    assert!(body.count_instrs(|i| matches!(i, silica_ir::Instr::Store { .. })) >= 1);

    // The referenced function was built too.
    let f_name_count = ir
        .symbols()
        .filter(|(_, s)| matches!(s.def, SymbolDef::Body(_)))
        .count();
    assert!(f_name_count >= 2, "both f and the constructor have bodies");
}

#[test]
fn initialiser_priorities_follow_dependencies() {
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "prio");
    let module = ctx.new_module("m", location);
    let f = make_identity_like(&mut ctx, module, "f");
    let i32_ty = ctx.number_type(ScalarKind::I32, location).unwrap();

    let a_loc = named_loc(&mut ctx, "a");
    let seed = ctx.integer_value(ScalarKind::I32, 1, a_loc).unwrap();
    let a_value = ctx.function_call(f, vec![seed], a_loc).unwrap();
    let a = ctx
        .global_variable(module, i32_ty, a_value, Linkage::Public, false, false, None, a_loc)
        .unwrap();

    let b_loc = named_loc(&mut ctx, "b");
    let b_value = ctx.function_call(f, vec![a], b_loc).unwrap();
    let b = ctx
        .global_variable(module, i32_ty, b_value, Linkage::Public, false, false, None, b_loc)
        .unwrap();

    let mut gb = GlobalBuilder::new(&mut ctx);
    gb.build_global(b).unwrap();
    let _ = a;
    let ir = gb.take_module(module).unwrap();

    // a's initialiser runs before b's: priorities form a linear extension
    // of the dependency edge a -> b.
    assert_eq!(ir.constructors.len(), 2);
    assert_eq!(ir.constructors[0].1, 0);
    assert_eq!(ir.constructors[1].1, 1);
    assert!(ir.constructors[0].1 <= ir.constructors[1].1);
}

#[test]
fn circular_initialisers_are_reported_with_both_globals() {
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "cycle");
    let module = ctx.new_module("m", location);
    let f = make_identity_like(&mut ctx, module, "f");
    let i32_ty = ctx.number_type(ScalarKind::I32, location).unwrap();

    // a = f(b) and b = f(a): both need dynamic initialisers and each
    // depends on the other.
    let a_loc = named_loc(&mut ctx, "a");
    let b_loc = named_loc(&mut ctx, "b");
    let zero = ctx.integer_value(ScalarKind::I32, 0, a_loc).unwrap();
    let a_placeholder = ctx.function_call(f, vec![zero], a_loc).unwrap();
    let a = ctx
        .global_variable(
            module,
            i32_ty,
            a_placeholder,
            Linkage::Public,
            false,
            false,
            None,
            a_loc,
        )
        .unwrap();
    let b_value = ctx.function_call(f, vec![a], b_loc).unwrap();
    let b = ctx
        .global_variable(module, i32_ty, b_value, Linkage::Public, false, false, None, b_loc)
        .unwrap();
    // Close the cycle: a's real value calls f(b).
    let a_value = ctx.function_call(f, vec![b], a_loc).unwrap();
    let silica_term::TermKind::GlobalVariable { value, .. } = ctx.arena.kind_mut(a) else {
        panic!("expected a global variable");
    };
    *value = a_value;

    let mut gb = GlobalBuilder::new(&mut ctx);
    let err = gb.build_global(a).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CircularGlobal);
    assert!(err.diagnostic.related_information.len() >= 2);
    let all: String = err
        .diagnostic
        .related_information
        .iter()
        .map(|r| r.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    assert!(all.contains('a') && all.contains('b'));
}

struct MallocTarget;

impl TargetCallback for MallocTarget {
    fn evaluate(&self, _build: &PropertyValue, _host: &PropertyValue) -> PropertyValue {
        let mut map = std::collections::BTreeMap::new();
        map.insert("type".to_string(), PropertyValue::String("c".into()));
        map.insert("name".to_string(), PropertyValue::String("malloc".into()));
        PropertyValue::Map(map)
    }
}

#[test]
fn library_symbols_import_by_target_name() {
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "uses_malloc");
    let module = ctx.new_module("m", location);
    let callback = ctx.register_target_callback(Box::new(MallocTarget));
    let library = ctx.library(callback, location).unwrap();

    let i32_ty = ctx.number_type(ScalarKind::I32, location).unwrap();
    let malloc_ty = ctx
        .function_type(
            ResultMode::Functional,
            i32_ty,
            vec![FunctionParameter {
                mode: ParameterMode::Functional,
                ty: i32_ty,
            }],
            location,
        )
        .unwrap();
    let malloc = ctx
        .library_symbol(library, callback, malloc_ty, location)
        .unwrap();

    // A global holding a pointer to the library symbol.
    let ptr = ctx.ptr_to(malloc, location).unwrap();
    let ptr_ty = ctx.type_of(ptr);
    let global = ctx
        .global_variable(module, ptr_ty, ptr, Linkage::Public, true, false, None, location)
        .unwrap();

    let mut gb = GlobalBuilder::new(&mut ctx);
    let symbol = gb.build_global(global).unwrap();
    let ir = gb.take_module(module).unwrap();

    let SymbolDef::Value(ConstValue::Symbol(target)) = ir.symbol(symbol).def else {
        panic!("expected a symbol-address initialiser");
    };
    assert_eq!(ir.symbol(target).name, "malloc");
    assert_eq!(ir.symbol(target).linkage, silica_ir::IrLinkage::Import);
}

#[test]
fn conflicting_symbol_names_are_rejected() {
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "clash");
    let module = ctx.new_module("m", location);
    let i32_ty = ctx.number_type(ScalarKind::I32, location).unwrap();
    let one = ctx.integer_value(ScalarKind::I32, 1, location).unwrap();
    let two = ctx.integer_value(ScalarKind::I32, 2, location).unwrap();
    // Two distinct globals at the same logical location.
    let g1 = ctx
        .global_variable(module, i32_ty, one, Linkage::Public, true, false, None, location)
        .unwrap();
    let g2 = ctx
        .global_variable(module, i32_ty, two, Linkage::Public, true, false, None, location)
        .unwrap();

    let mut gb = GlobalBuilder::new(&mut ctx);
    gb.build_global(g1).unwrap();
    let err = gb.build_global(g2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
}

#[test]
fn local_linkage_globals_get_distinct_names() {
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "local");
    let module = ctx.new_module("m", location);
    let i32_ty = ctx.number_type(ScalarKind::I32, location).unwrap();
    let one = ctx.integer_value(ScalarKind::I32, 1, location).unwrap();
    let g1 = ctx
        .global_variable(module, i32_ty, one, Linkage::Local, true, false, None, location)
        .unwrap();
    let g2 = ctx
        .global_variable(module, i32_ty, one, Linkage::Local, true, false, None, location)
        .unwrap();

    let mut gb = GlobalBuilder::new(&mut ctx);
    let s1 = gb.build_global(g1).unwrap();
    let s2 = gb.build_global(g2).unwrap();
    let ir = gb.take_module(module).unwrap();
    assert_ne!(ir.symbol(s1).name, ir.symbol(s2).name);
    assert_eq!(ir.symbol(s1).linkage, silica_ir::IrLinkage::Local);
}
