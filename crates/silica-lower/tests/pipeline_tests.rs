//! End-to-end pipeline tests: terms in, emitted modules out.

use silica_common::{LogicalPath, SourceLocation, Span};
use silica_ir::{ConstValue, Instr, IrModule, ModuleSink, SymbolDef};
use silica_lower::GlobalBuilder;
use silica_term::{
    CompileContext, Linkage, ResultMode, ScalarKind, TermMode,
};

fn named_loc(ctx: &mut CompileContext, name: &str) -> SourceLocation {
    let logical = ctx.paths.named_child(LogicalPath::ROOT, name);
    SourceLocation::new(Span::dummy(), logical)
}

/// Opt into lowering logs with `RUST_LOG=silica_lower=debug`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct CollectingSink {
    names: Vec<String>,
    symbols: Vec<(String, bool)>,
}

impl ModuleSink for CollectingSink {
    fn emit(&mut self, module: &IrModule) {
        self.names.push(module.name.clone());
        for (_, symbol) in module.symbols() {
            self.symbols
                .push((symbol.name.clone(), matches!(symbol.def, SymbolDef::Body(_))));
        }
    }
}

#[test]
fn modules_flow_to_the_sink() {
    init_tracing();
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "prog");
    let module = ctx.new_module("prog", location);

    // answer : i32 = 42
    let answer_loc = named_loc(&mut ctx, "answer");
    let i32_ty = ctx.number_type(ScalarKind::I32, answer_loc).unwrap();
    let forty_two = ctx.integer_value(ScalarKind::I32, 42, answer_loc).unwrap();
    let answer = ctx
        .global_variable(
            module, i32_ty, forty_two, Linkage::Public, true, false, None, answer_loc,
        )
        .unwrap();

    // get : fn() -> functional i32 { answer }
    let get_loc = named_loc(&mut ctx, "get");
    let fn_ty = ctx
        .function_type(ResultMode::Functional, i32_ty, vec![], get_loc)
        .unwrap();
    let read = ctx.functional_eval(answer, get_loc).unwrap();
    let get = ctx
        .function(
            module,
            fn_ty,
            Linkage::Public,
            vec![],
            None,
            read,
            None,
            get_loc,
        )
        .unwrap();

    let mut gb = GlobalBuilder::new(&mut ctx);
    gb.build_global(get).unwrap();
    let mut sink = CollectingSink::default();
    gb.emit_to(&mut sink);

    assert_eq!(sink.names, vec!["prog".to_string()]);
    // Both the function (with a body) and the constant global made it out.
    assert!(sink.symbols.iter().any(|(_, has_body)| *has_body));
    assert!(sink.symbols.iter().any(|(_, has_body)| !*has_body));
    assert_eq!(sink.symbols.len(), 2);
}

#[test]
fn reading_a_global_loads_through_its_symbol() {
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "prog");
    let module = ctx.new_module("prog", location);

    let answer_loc = named_loc(&mut ctx, "answer");
    let i32_ty = ctx.number_type(ScalarKind::I32, answer_loc).unwrap();
    let forty_two = ctx.integer_value(ScalarKind::I32, 42, answer_loc).unwrap();
    let answer = ctx
        .global_variable(
            module, i32_ty, forty_two, Linkage::Public, true, false, None, answer_loc,
        )
        .unwrap();

    let get_loc = named_loc(&mut ctx, "get");
    let fn_ty = ctx
        .function_type(ResultMode::Functional, i32_ty, vec![], get_loc)
        .unwrap();
    let read = ctx.functional_eval(answer, get_loc).unwrap();
    let get = ctx
        .function(
            module,
            fn_ty,
            Linkage::Public,
            vec![],
            None,
            read,
            None,
            get_loc,
        )
        .unwrap();

    let mut gb = GlobalBuilder::new(&mut ctx);
    let symbol = gb.build_global(get).unwrap();
    let ir = gb.take_module(module).unwrap();
    let SymbolDef::Body(body) = &ir.symbol(symbol).def else {
        panic!("function should have a body");
    };
    assert_eq!(body.count_instrs(|i| matches!(i, Instr::Load { .. })), 1);
    assert_eq!(body.count_instrs(|i| matches!(i, Instr::Alloca { .. })), 0);
}

#[test]
fn requesting_the_same_global_twice_is_stable() {
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "stable");
    let module = ctx.new_module("stable", location);
    let i32_ty = ctx.number_type(ScalarKind::I32, location).unwrap();
    let one = ctx.integer_value(ScalarKind::I32, 1, location).unwrap();
    let g = ctx
        .global_variable(module, i32_ty, one, Linkage::Public, true, false, None, location)
        .unwrap();

    let mut gb = GlobalBuilder::new(&mut ctx);
    let s1 = gb.build_global(g).unwrap();
    let s2 = gb.build_global(g).unwrap();
    assert_eq!(s1, s2);
    let ir = gb.take_module(module).unwrap();
    assert!(matches!(
        ir.symbol(s1).def,
        SymbolDef::Value(ConstValue::Int { value: 1, .. })
    ));
}

#[test]
fn anonymous_placeholders_cannot_escape_to_globals() {
    let mut ctx = CompileContext::new();
    let location = named_loc(&mut ctx, "escape");
    let module = ctx.new_module("escape", location);
    let i32_ty = ctx.number_type(ScalarKind::I32, location).unwrap();
    let loose = ctx.anonymous(i32_ty, TermMode::Value, location).unwrap();
    // A struct value carrying an unbound placeholder.
    let s_ty = ctx.struct_type([i32_ty], location).unwrap();
    let value = ctx.struct_value(s_ty, [loose], location).unwrap();
    let g = ctx
        .global_variable(module, s_ty, value, Linkage::Public, true, false, None, location)
        .unwrap();

    let mut gb = GlobalBuilder::new(&mut ctx);
    let err = gb.build_global(g).unwrap_err();
    assert_eq!(err.kind(), silica_common::ErrorKind::InternalInvariant);
}
